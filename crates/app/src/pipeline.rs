use std::path::Path;
use thiserror::Error;

use pesa_core::{AnalysisConfig, Ledger, LedgerBuilder, TieBreak, Transaction};
use pesa_import::{Classifier, ParseWarning, ParseWarningKind, StatementParser, StatementTemplate};
use pesa_pdf::{DocumentBackend, ExtractError, Extractor};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Statement extraction failed: {0}")]
    Extract(#[from] ExtractError),
}

/// The result of one statement processing run.
#[derive(Debug)]
pub struct PipelineOutput {
    pub ledger: Ledger,
    /// Rows left out of the ledger, in statement order.
    pub warnings: Vec<ParseWarning>,
    pub page_count: usize,
    pub template_version: String,
}

/// Orchestrates: extract → parse → classify → build ledger.
pub struct StatementPipeline<B: DocumentBackend> {
    extractor: Extractor<B>,
    parser: StatementParser,
    classifier: Classifier,
    builder: LedgerBuilder,
}

impl<B: DocumentBackend> StatementPipeline<B> {
    pub fn new(backend: B, config: &AnalysisConfig) -> Self {
        Self {
            extractor: Extractor::new(backend),
            parser: StatementParser::new(StatementTemplate::mpesa_2024(), config.locale.clone()),
            classifier: Classifier::default(),
            builder: LedgerBuilder::new(config.tolerance()).with_tie_break(TieBreak::Chronological),
        }
    }

    pub fn with_template(mut self, template: StatementTemplate, config: &AnalysisConfig) -> Self {
        self.parser = StatementParser::new(template, config.locale.clone());
        self
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.builder = self.builder.with_tie_break(tie_break);
        self
    }

    /// Process a statement on disk.
    pub fn process_file(&self, path: &Path, password: &str) -> Result<PipelineOutput, PipelineError> {
        let bytes = std::fs::read(path)?;
        self.process_bytes(&bytes, password)
    }

    /// Process raw statement bytes. Fatal extraction errors surface before any parsing.
    pub fn process_bytes(&self, bytes: &[u8], password: &str) -> Result<PipelineOutput, PipelineError> {
        // 1. Decrypt and lay out pages.
        let pages = self.extractor.extract(bytes, password)?;

        // 2. Fold lines into raw rows.
        let parsed = self.parser.parse(&pages);
        let mut warnings = parsed.warnings;

        // 3. Classify.
        let mut transactions = Vec::with_capacity(parsed.lines.len());
        for raw in parsed.lines {
            let class = self.classifier.classify(&raw);
            let id = raw.transaction_id.clone();
            let position = raw.position;
            match Transaction::new(raw, class) {
                Ok(tx) => transactions.push(tx),
                Err(conflict) => warnings.push(ParseWarning {
                    transaction_id: id,
                    position,
                    kind: ParseWarningKind::AmountConflict(conflict),
                }),
            }
        }
        let unclassified = transactions
            .iter()
            .filter(|t| t.category == pesa_core::TransactionCategory::Unclassified)
            .count();

        // 4. Order and check balance continuity.
        let ledger = self.builder.build(transactions);

        tracing::info!(
            "Processed statement: {} page(s), {} transaction(s), {} unclassified, {} warning(s), {} balance anomalies",
            pages.len(),
            ledger.len(),
            unclassified,
            warnings.len(),
            ledger.anomalies().len()
        );

        Ok(PipelineOutput {
            ledger,
            warnings,
            page_count: pages.len(),
            template_version: self.parser.template().version().to_string(),
        })
    }
}
