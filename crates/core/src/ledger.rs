use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::money::Money;
use crate::period::{DateRange, Period, YearMonth};
use crate::transaction::{Direction, LinePosition, Transaction, TransactionCategory};

/// A running-balance jump that the row amounts do not explain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceAnomaly {
    pub previous_id: String,
    pub transaction_id: String,
    pub position: LinePosition,
    /// `paid_in - paid_out` of the later row.
    pub expected_delta: Money,
    /// Printed balance change between the two rows.
    pub actual_delta: Money,
}

impl BalanceAnomaly {
    pub fn discrepancy(&self) -> Money {
        self.actual_delta - self.expected_delta
    }
}

/// How rows sharing a timestamp are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Keep the order the rows were printed in.
    #[default]
    StatementOrder,
    /// Read newest-first statements bottom-up so same-second rows keep their real order.
    Chronological,
}

#[derive(Debug, Clone)]
pub struct LedgerBuilder {
    pub tolerance: Money,
    pub tie_break: TieBreak,
}

impl Default for LedgerBuilder {
    fn default() -> Self {
        Self { tolerance: Money::from_cents(1), tie_break: TieBreak::StatementOrder }
    }
}

impl LedgerBuilder {
    pub fn new(tolerance: Money) -> Self {
        Self { tolerance: tolerance.abs(), ..Self::default() }
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn build(&self, mut transactions: Vec<Transaction>) -> Ledger {
        if self.tie_break == TieBreak::Chronological && is_newest_first(&transactions) {
            transactions.reverse();
        }
        // Vec::sort_by_key is stable, so equal timestamps keep their input order.
        transactions.sort_by_key(|t| t.timestamp);

        let anomalies: Vec<BalanceAnomaly> = transactions
            .windows(2)
            .filter_map(|pair| self.check_pair(&pair[0], &pair[1]))
            .collect();

        for a in &anomalies {
            tracing::warn!(
                "Balance anomaly between {} and {} ({}): expected change {}, printed {}",
                a.previous_id,
                a.transaction_id,
                a.position,
                a.expected_delta,
                a.actual_delta
            );
        }
        tracing::info!(
            "Built ledger: {} transactions, {} balance anomalies",
            transactions.len(),
            anomalies.len()
        );

        Ledger { transactions, anomalies, tolerance: self.tolerance }
    }

    fn check_pair(&self, prev: &Transaction, curr: &Transaction) -> Option<BalanceAnomaly> {
        let expected_delta = curr.signed_amount();
        let actual_delta = curr.balance - prev.balance;
        if (actual_delta - expected_delta).abs() <= self.tolerance {
            return None;
        }
        Some(BalanceAnomaly {
            previous_id: prev.transaction_id.clone(),
            transaction_id: curr.transaction_id.clone(),
            position: curr.position,
            expected_delta,
            actual_delta,
        })
    }
}

fn is_newest_first(transactions: &[Transaction]) -> bool {
    let (mut down, mut up) = (0usize, 0usize);
    for pair in transactions.windows(2) {
        match pair[0].timestamp.cmp(&pair[1].timestamp) {
            std::cmp::Ordering::Greater => down += 1,
            std::cmp::Ordering::Less => up += 1,
            std::cmp::Ordering::Equal => {}
        }
    }
    down > up
}

/// Builds a ledger with the default one-cent tolerance.
pub fn build(transactions: Vec<Transaction>) -> Ledger {
    LedgerBuilder::default().build(transactions)
}

/// The classified transactions of one statement, oldest first. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    transactions: Vec<Transaction>,
    anomalies: Vec<BalanceAnomaly>,
    tolerance: Money,
}

impl Ledger {
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn anomalies(&self) -> &[BalanceAnomaly] {
        &self.anomalies
    }

    pub fn tolerance(&self) -> Money {
        self.tolerance
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Transaction> {
        self.transactions.iter()
    }

    /// Calendar dates spanned by the statement; `None` for an empty ledger.
    pub fn date_range(&self) -> Option<DateRange> {
        let first = self.transactions.first()?;
        let last = self.transactions.last()?;
        Some(DateRange::new(first.timestamp.date(), last.timestamp.date()))
    }

    /// Balance before the first row.
    pub fn opening_balance(&self) -> Option<Money> {
        self.transactions.first().map(|t| t.balance - t.signed_amount())
    }

    pub fn closing_balance(&self) -> Option<Money> {
        self.transactions.last().map(|t| t.balance)
    }

    pub fn total(&self, direction: Direction) -> Money {
        self.transactions
            .iter()
            .filter(|t| t.direction == direction)
            .map(|t| t.amount)
            .sum()
    }

    /// Sum of all anomaly discrepancies.
    pub fn unexplained(&self) -> Money {
        self.anomalies.iter().map(BalanceAnomaly::discrepancy).sum()
    }

    /// Months with at least one transaction, ascending.
    pub fn months(&self) -> Vec<YearMonth> {
        self.transactions
            .iter()
            .map(|t| YearMonth::of(t.timestamp.date()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn filter<'a>(
        &'a self,
        category: TransactionCategory,
        period: Option<&'a Period>,
    ) -> impl Iterator<Item = &'a Transaction> + 'a {
        self.transactions.iter().filter(move |t| {
            t.category == category && period.map_or(true, |p| p.contains(t.timestamp.date()))
        })
    }
}

impl<'a> IntoIterator for &'a Ledger {
    type Item = &'a Transaction;
    type IntoIter = std::slice::Iter<'a, Transaction>;

    fn into_iter(self) -> Self::IntoIter {
        self.transactions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{Classification, RawStatementLine};
    use chrono::{NaiveDate, NaiveDateTime};

    fn ts(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap().and_hms_opt(hour, 0, 0).unwrap()
    }

    fn tx(id: &str, at: NaiveDateTime, paid_in: i64, paid_out: i64, balance: i64) -> Transaction {
        let raw = RawStatementLine {
            transaction_id: id.to_string(),
            timestamp: at,
            description: String::new(),
            paid_in: Money::from_cents(paid_in),
            paid_out: Money::from_cents(paid_out),
            balance: Money::from_cents(balance),
            position: LinePosition::default(),
        };
        Transaction::new(raw, Classification::unclassified()).unwrap()
    }

    fn ids(ledger: &Ledger) -> Vec<&str> {
        ledger.iter().map(|t| t.transaction_id.as_str()).collect()
    }

    // ── ordering ──────────────────────────────────────────────────────────────

    #[test]
    fn sorts_by_timestamp_ascending() {
        let ledger = build(vec![
            tx("B", ts(6, 0), 0, 20_000, 930_000),
            tx("A", ts(5, 0), 0, 50_000, 950_000),
        ]);
        assert_eq!(ids(&ledger), ["A", "B"]);
        assert!(ledger.anomalies().is_empty());
    }

    #[test]
    fn ties_keep_statement_order() {
        let ledger = build(vec![
            tx("X", ts(5, 9), 0, 100, 9_900),
            tx("Y", ts(5, 9), 0, 100, 9_800),
            tx("W", ts(4, 9), 10_000, 0, 10_000),
        ]);
        assert_eq!(ids(&ledger), ["W", "X", "Y"]);
    }

    #[test]
    fn chronological_tie_break_reads_newest_first_statement_bottom_up() {
        // Printed newest first: the charge row sits above its payment.
        let printed = vec![
            tx("C", ts(6, 9), 0, 1_000, 88_000),
            tx("CHG", ts(5, 9), 0, 1_000, 89_000),
            tx("PAY", ts(5, 9), 0, 10_000, 90_000),
            tx("OPEN", ts(4, 9), 100_000, 0, 100_000),
        ];
        let plain = build(printed.clone());
        assert_eq!(ids(&plain), ["OPEN", "CHG", "PAY", "C"]);
        assert_eq!(plain.anomalies().len(), 3);

        let chrono = LedgerBuilder::default()
            .with_tie_break(TieBreak::Chronological)
            .build(printed);
        assert_eq!(ids(&chrono), ["OPEN", "PAY", "CHG", "C"]);
        assert!(chrono.anomalies().is_empty());
    }

    // ── continuity ────────────────────────────────────────────────────────────

    #[test]
    fn balance_jump_yields_exactly_one_anomaly() {
        let ledger = build(vec![
            tx("TXN001", ts(5, 0), 0, 50_000, 950_000),
            tx("TXN002", ts(6, 0), 0, 20_000, 900_000),
        ]);
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.anomalies().len(), 1);
        let a = &ledger.anomalies()[0];
        assert_eq!(a.previous_id, "TXN001");
        assert_eq!(a.transaction_id, "TXN002");
        assert_eq!(a.expected_delta, Money::from_cents(-20_000));
        assert_eq!(a.actual_delta, Money::from_cents(-50_000));
        assert_eq!(a.discrepancy(), Money::from_cents(-30_000));
    }

    #[test]
    fn mismatch_within_tolerance_is_not_flagged() {
        let txs = vec![
            tx("A", ts(5, 0), 0, 50_000, 950_000),
            tx("B", ts(6, 0), 0, 20_000, 929_999),
        ];
        assert!(build(txs.clone()).anomalies().is_empty());
        let strict = LedgerBuilder::new(Money::zero()).build(txs);
        assert_eq!(strict.anomalies().len(), 1);
    }

    #[test]
    fn reconciliation_identity_holds_with_anomalies() {
        let ledger = build(vec![
            tx("A", ts(1, 0), 100_000, 0, 100_000),
            tx("B", ts(2, 0), 0, 25_000, 75_000),
            tx("C", ts(3, 0), 0, 5_000, 60_000),
            tx("D", ts(4, 0), 40_000, 0, 100_000),
        ]);
        assert_eq!(ledger.anomalies().len(), 1);
        let net = ledger.total(Direction::Credit) - ledger.total(Direction::Debit);
        let printed = ledger.closing_balance().unwrap() - ledger.opening_balance().unwrap();
        assert_eq!(net, printed - ledger.unexplained());
    }

    #[test]
    fn build_is_idempotent() {
        let txs = vec![
            tx("B", ts(6, 0), 0, 20_000, 900_000),
            tx("A", ts(5, 0), 0, 50_000, 950_000),
            tx("C", ts(6, 0), 1_000, 0, 901_000),
        ];
        assert_eq!(build(txs.clone()), build(txs));
    }

    // ── accessors ─────────────────────────────────────────────────────────────

    #[test]
    fn date_range_months_and_balances() {
        let ledger = build(vec![
            tx("A", ts(5, 0), 0, 50_000, 950_000),
            tx("B", ts(28, 0), 0, 20_000, 930_000),
        ]);
        let range = ledger.date_range().unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2024, 1, 28).unwrap());
        assert_eq!(ledger.months(), vec![YearMonth { year: 2024, month: 1 }]);
        assert_eq!(ledger.opening_balance(), Some(Money::from_cents(1_000_000)));
        assert_eq!(ledger.closing_balance(), Some(Money::from_cents(930_000)));
    }

    #[test]
    fn empty_ledger() {
        let ledger = build(Vec::new());
        assert!(ledger.is_empty());
        assert!(ledger.date_range().is_none());
        assert!(ledger.opening_balance().is_none());
        assert_eq!(ledger.total(Direction::Debit), Money::zero());
    }

    #[test]
    fn filter_by_category_and_range() {
        let ledger = build(vec![
            tx("A", ts(5, 0), 0, 50_000, 950_000),
            tx("B", ts(6, 0), 0, 20_000, 930_000),
        ]);
        let day6 = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();
        let range = Period::from(DateRange::new(day6, day6));
        assert_eq!(ledger.filter(TransactionCategory::Unclassified, Some(&range)).count(), 1);
        let february = Period::months(["2024-02".parse::<YearMonth>().unwrap()]);
        assert_eq!(ledger.filter(TransactionCategory::Unclassified, Some(&february)).count(), 0);
        assert_eq!(ledger.filter(TransactionCategory::Unclassified, None).count(), 2);
        assert_eq!(ledger.filter(TransactionCategory::Airtime, None).count(), 0);
    }
}
