use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pesa::{resolve_period, AnalysisSession, StatementPipeline, StatementReport};
use pesa_core::{AnalysisConfig, Granularity, TransactionCategory, YearMonth};
use pesa_import::{Classifier, StatementTemplate};
use pesa_pdf::PdfRsBackend;

#[derive(Parser)]
#[command(name = "pesa", version, about = "Analyse password-protected M-Pesa PDF statements")]
struct Cli {
    /// Statement PDF
    file: PathBuf,

    /// Statement password (usually the ID number the statement was requested with)
    #[arg(short, long, env = "PESA_PASSWORD", hide_env_values = true)]
    password: String,

    /// Analysis settings (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Statement layout template (TOML)
    #[arg(long)]
    template: Option<PathBuf>,

    /// Classifier rule table (TOML)
    #[arg(long)]
    rules: Option<PathBuf>,

    /// First day to include (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last day to include (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Restrict to a calendar month (YYYY-MM); repeat for several months
    #[arg(long, value_name = "YYYY-MM")]
    month: Vec<YearMonth>,

    /// Time series bucket: day, week or month
    #[arg(long)]
    granularity: Option<Granularity>,

    /// Length of the top-counterparty rankings
    #[arg(long)]
    top: Option<usize>,

    /// Only summarise this category
    #[arg(long)]
    category: Option<TransactionCategory>,

    /// Emit the report as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    if let Some(granularity) = cli.granularity {
        config.granularity = granularity;
    }
    if let Some(top) = cli.top {
        if top == 0 {
            bail!("--top must be at least 1");
        }
        config.top_n = top;
    }
    if cli.category == Some(TransactionCategory::Unclassified) {
        config.include_unclassified = true;
    }

    let mut pipeline = StatementPipeline::new(PdfRsBackend, &config);
    if let Some(path) = &cli.template {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read template {}", path.display()))?;
        let template = StatementTemplate::from_toml(&content)
            .with_context(|| format!("Invalid template {}", path.display()))?;
        pipeline = pipeline.with_template(template, &config);
    }
    if let Some(path) = &cli.rules {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rules {}", path.display()))?;
        let classifier = Classifier::from_toml(&content)
            .with_context(|| format!("Invalid rules {}", path.display()))?;
        pipeline = pipeline.with_classifier(classifier);
    }

    let bytes = std::fs::read(&cli.file)
        .with_context(|| format!("Failed to read {}", cli.file.display()))?;

    let mut session = AnalysisSession::new(&config);
    let ledger = session
        .load(&pipeline, &bytes, &cli.password)
        .with_context(|| format!("Failed to process {}", cli.file.display()))?;
    let filter = resolve_period(&cli.month, cli.from, cli.to, ledger)?;

    let Some(report) = StatementReport::build(&session, cli.category, filter) else {
        bail!("No statement loaded");
    };
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.to_text());
    }
    Ok(())
}
