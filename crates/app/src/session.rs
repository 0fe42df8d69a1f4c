use pesa_analysis::{Analyzer, CategorySummary};
use pesa_core::{AnalysisConfig, BalanceAnomaly, Ledger, Period, TransactionCategory, YearMonth};
use pesa_import::ParseWarning;
use pesa_pdf::DocumentBackend;

use crate::hash;
use crate::pipeline::{PipelineError, StatementPipeline};

struct LoadedStatement {
    fingerprint: String,
    ledger: Ledger,
    warnings: Vec<ParseWarning>,
}

/// Holds at most one processed statement. Neither the document bytes nor the password are
/// kept; everything derived from them goes away on [`clear`](Self::clear) or drop.
pub struct AnalysisSession {
    analyzer: Analyzer,
    include_unclassified: bool,
    loaded: Option<LoadedStatement>,
}

impl AnalysisSession {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            analyzer: Analyzer::from_config(config),
            include_unclassified: config.include_unclassified,
            loaded: None,
        }
    }

    /// Process a statement and make it the session's current one.
    ///
    /// Every call runs the pipeline, so the password is checked and the current template and
    /// rules apply even when the bytes are unchanged. The previous statement is discarded
    /// first, so a failed load leaves the session empty.
    pub fn load<B: DocumentBackend>(
        &mut self,
        pipeline: &StatementPipeline<B>,
        bytes: &[u8],
        password: &str,
    ) -> Result<&Ledger, PipelineError> {
        let fingerprint = hash::fingerprint(bytes);
        if let Some(previous) = self.loaded.take() {
            if previous.fingerprint == fingerprint {
                tracing::debug!("Reprocessing statement {}", hash::short(&fingerprint));
            }
        }
        let output = pipeline.process_bytes(bytes, password)?;
        tracing::info!("Loaded statement {}", hash::short(&fingerprint));
        let loaded =
            LoadedStatement { fingerprint, ledger: output.ledger, warnings: output.warnings };
        Ok(&self.loaded.insert(loaded).ledger)
    }

    pub fn clear(&mut self) {
        if self.loaded.take().is_some() {
            tracing::debug!("Session cleared");
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.loaded.as_ref().map(|l| l.fingerprint.as_str())
    }

    pub fn ledger(&self) -> Option<&Ledger> {
        self.loaded.as_ref().map(|l| &l.ledger)
    }

    pub fn warnings(&self) -> &[ParseWarning] {
        self.loaded.as_ref().map(|l| l.warnings.as_slice()).unwrap_or_default()
    }

    pub fn anomalies(&self) -> &[BalanceAnomaly] {
        self.loaded.as_ref().map(|l| l.ledger.anomalies()).unwrap_or_default()
    }

    /// Months available to the month filter.
    pub fn months(&self) -> Vec<YearMonth> {
        self.ledger().map(Ledger::months).unwrap_or_default()
    }

    pub fn summarize(
        &self,
        category: TransactionCategory,
        period: Option<&Period>,
    ) -> Option<CategorySummary> {
        self.ledger().map(|ledger| self.analyzer.summarize(ledger, category, period))
    }

    pub fn summarize_all(&self, period: Option<&Period>) -> Vec<CategorySummary> {
        self.ledger()
            .map(|ledger| self.analyzer.summarize_all(ledger, period, self.include_unclassified))
            .unwrap_or_default()
    }
}

impl Drop for AnalysisSession {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pesa_import::Classifier;
    use pesa_pdf::{ExtractError, MockBackend};

    const PAGE: &str = "\
RCL3XYZ001  2024-01-05 10:00:00  Merchant Payment to 123456 - ABC STORES  Completed  -500.00  9,500.00
RCL3XYZ002  2024-02-06 11:00:00  Airtime Purchase  Completed  -50.00  9,450.00
RCL3XYZ003  2024-02-07 11:00:00  FEE  Completed  ??  9,450.00";

    fn pipeline() -> StatementPipeline<MockBackend> {
        StatementPipeline::new(
            MockBackend::from_text(&[PAGE]).with_password("1234"),
            &AnalysisConfig::default(),
        )
    }

    #[test]
    fn load_summarize_and_clear() {
        let mut session = AnalysisSession::new(&AnalysisConfig::default());
        assert!(session.summarize(TransactionCategory::Airtime, None).is_none());

        let len = session.load(&pipeline(), b"%PDF- one", "1234").unwrap().len();
        assert_eq!(len, 2);
        assert_eq!(session.warnings().len(), 1);
        assert_eq!(session.warnings()[0].transaction_id, "RCL3XYZ003");
        assert_eq!(session.months().len(), 2);
        assert_eq!(session.fingerprint().map(str::len), Some(64));

        let airtime = session.summarize(TransactionCategory::Airtime, None).unwrap();
        assert_eq!(airtime.transaction_count, 1);
        assert_eq!(session.summarize_all(None).len(), 6);

        session.clear();
        assert!(!session.is_loaded());
        assert!(session.warnings().is_empty());
        assert!(session.summarize_all(None).is_empty());
    }

    // ── reloading ────────────────────────────────────────────────────────────

    #[test]
    fn reload_checks_the_password_again() {
        let mut session = AnalysisSession::new(&AnalysisConfig::default());
        session.load(&pipeline(), b"%PDF- one", "1234").unwrap();

        let err = session.load(&pipeline(), b"%PDF- one", "0000").unwrap_err();
        assert!(matches!(err, PipelineError::Extract(ExtractError::InvalidPassword)));
        assert!(!session.is_loaded());
        assert!(session.ledger().is_none());
    }

    #[test]
    fn reload_applies_the_new_pipeline() {
        let mut session = AnalysisSession::new(&AnalysisConfig::default());
        session.load(&pipeline(), b"%PDF- one", "1234").unwrap();
        let before = session.fingerprint().map(str::to_string);
        let airtime = session.summarize(TransactionCategory::Airtime, None).unwrap();
        assert_eq!(airtime.transaction_count, 1);

        let rules = Classifier::from_toml(
            r#"
[[rules]]
name = "everything"
priority = 1
pattern = ".+"
match_type = "regex"
category = "pay_bill"
"#,
        )
        .unwrap();
        let reclassifying = pipeline().with_classifier(rules);
        session.load(&reclassifying, b"%PDF- one", "1234").unwrap();

        assert_eq!(session.fingerprint().map(str::to_string), before);
        let airtime = session.summarize(TransactionCategory::Airtime, None).unwrap();
        assert_eq!(airtime.transaction_count, 0);
        let pay_bill = session.summarize(TransactionCategory::PayBill, None).unwrap();
        assert_eq!(pay_bill.transaction_count, 2);
    }

    #[test]
    fn failed_load_discards_previous_statement() {
        let mut session = AnalysisSession::new(&AnalysisConfig::default());
        session.load(&pipeline(), b"%PDF- one", "1234").unwrap();
        let err = session.load(&pipeline(), b"%PDF- two", "0000").unwrap_err();
        assert!(matches!(err, PipelineError::Extract(ExtractError::InvalidPassword)));
        assert!(!session.is_loaded());
        assert!(session.anomalies().is_empty());
    }

    #[test]
    fn unclassified_summary_on_request() {
        let config = AnalysisConfig { include_unclassified: true, ..AnalysisConfig::default() };
        let mut session = AnalysisSession::new(&config);
        session.load(&pipeline(), b"%PDF-", "1234").unwrap();
        assert_eq!(session.summarize_all(None).len(), 7);
    }
}
