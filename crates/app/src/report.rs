use chrono::NaiveDate;
use serde::Serialize;
use std::fmt::Write as _;
use thiserror::Error;

use pesa_analysis::CategorySummary;
use pesa_core::{
    BalanceAnomaly, DateRange, Direction, Ledger, Money, Period, TransactionCategory, YearMonth,
};
use pesa_import::ParseWarning;

use crate::hash;
use crate::session::AnalysisSession;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("--month cannot be combined with --from or --to")]
    MonthWithBounds,
    #[error("Start date {start} is after end date {end}")]
    Inverted { start: NaiveDate, end: NaiveDate },
}

/// Turns the CLI's period flags into a filter.
///
/// Months may repeat and need not be adjacent. An open `--from`/`--to` bound falls back to
/// the ledger's first or last transaction date.
pub fn resolve_period(
    months: &[YearMonth],
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    ledger: &Ledger,
) -> Result<Option<Period>, RangeError> {
    if !months.is_empty() {
        if from.is_some() || to.is_some() {
            return Err(RangeError::MonthWithBounds);
        }
        return Ok(Some(Period::months(months.iter().copied())));
    }
    if from.is_none() && to.is_none() {
        return Ok(None);
    }

    let bounds = ledger.date_range();
    let (Some(start), Some(end)) = (from.or(bounds.map(|b| b.start)), to.or(bounds.map(|b| b.end)))
    else {
        // Empty ledger with one open bound: collapse onto the given date.
        let day = from.or(to).unwrap_or_default();
        return Ok(Some(DateRange::new(day, day).into()));
    };
    if start > end {
        return Err(RangeError::Inverted { start, end });
    }
    Ok(Some(DateRange::new(start, end).into()))
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerOverview {
    pub transaction_count: usize,
    pub date_range: Option<DateRange>,
    pub opening_balance: Option<Money>,
    pub closing_balance: Option<Money>,
    pub total_paid_in: Money,
    pub total_paid_out: Money,
    pub unexplained: Money,
    pub months: Vec<YearMonth>,
}

impl LedgerOverview {
    pub fn of(ledger: &Ledger) -> Self {
        Self {
            transaction_count: ledger.len(),
            date_range: ledger.date_range(),
            opening_balance: ledger.opening_balance(),
            closing_balance: ledger.closing_balance(),
            total_paid_in: ledger.total(Direction::Credit),
            total_paid_out: ledger.total(Direction::Debit),
            unexplained: ledger.unexplained(),
            months: ledger.months(),
        }
    }
}

/// Everything the CLI prints for one statement.
#[derive(Debug, Clone, Serialize)]
pub struct StatementReport {
    pub fingerprint: String,
    pub filter: Option<Period>,
    pub overview: LedgerOverview,
    pub anomalies: Vec<BalanceAnomaly>,
    pub warnings: Vec<ParseWarning>,
    pub summaries: Vec<CategorySummary>,
}

impl StatementReport {
    /// `None` when the session holds no statement.
    pub fn build(
        session: &AnalysisSession,
        category: Option<TransactionCategory>,
        filter: Option<Period>,
    ) -> Option<Self> {
        let ledger = session.ledger()?;
        let summaries = match category {
            Some(category) => session.summarize(category, filter.as_ref()).into_iter().collect(),
            None => session.summarize_all(filter.as_ref()),
        };
        Some(Self {
            fingerprint: session.fingerprint().unwrap_or_default().to_string(),
            filter,
            overview: LedgerOverview::of(ledger),
            anomalies: session.anomalies().to_vec(),
            warnings: session.warnings().to_vec(),
            summaries,
        })
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let o = &self.overview;
        let _ = writeln!(out, "Statement {}", hash::short(&self.fingerprint));
        if let Some(range) = o.date_range {
            let _ = writeln!(out, "  Period:        {range}");
        }
        let _ = writeln!(out, "  Transactions:  {}", o.transaction_count);
        if let (Some(open), Some(close)) = (o.opening_balance, o.closing_balance) {
            let _ = writeln!(out, "  Balance:       {open} -> {close}");
        }
        let _ = writeln!(out, "  Paid in:       {}", o.total_paid_in);
        let _ = writeln!(out, "  Paid out:      {}", o.total_paid_out);
        if !self.anomalies.is_empty() {
            let _ = writeln!(
                out,
                "  Anomalies:     {} (unexplained {})",
                self.anomalies.len(),
                o.unexplained
            );
        }
        if !self.warnings.is_empty() {
            let _ = writeln!(out, "  Skipped rows:  {}", self.warnings.len());
            for warning in &self.warnings {
                let _ = writeln!(out, "    {warning}");
            }
        }
        if let Some(filter) = &self.filter {
            let _ = writeln!(out, "\nFiltered to {filter}");
        }

        for summary in &self.summaries {
            let _ = writeln!(out, "\n{}", summary.category);
            if summary.is_empty() {
                let _ = writeln!(out, "  no transactions");
                continue;
            }
            let _ = writeln!(
                out,
                "  {} transaction(s), total {}",
                summary.transaction_count, summary.total_amount
            );
            if let Some(avg) = summary.average_amount() {
                let _ = writeln!(out, "  average {avg}");
            }
            if summary.charge_count > 0 {
                let _ = writeln!(
                    out,
                    "  charges: {} totalling {}",
                    summary.charge_count, summary.total_charges
                );
            }
            for (rank, cp) in summary.top_counterparties.iter().enumerate() {
                let _ = write!(out, "  {:>2}. {:<32} {:>4}x {:>14}", rank + 1, cp.name, cp.count, cp.total_amount);
                if !cp.accounts.is_empty() {
                    let _ = write!(out, "  [{}]", cp.accounts.join(", "));
                }
                out.push('\n');
            }
        }
        out
    }
}
