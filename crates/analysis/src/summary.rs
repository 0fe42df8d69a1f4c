use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use pesa_core::{
    AnalysisConfig, CounterpartyKind, Granularity, Ledger, Money, Period, Transaction,
    TransactionCategory,
};

use crate::series::{bucket_series, SeriesPoint};

const DEFAULT_TOP_N: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterpartyTotal {
    /// Name as first printed on the statement.
    pub name: String,
    pub kind: CounterpartyKind,
    pub count: usize,
    pub total_amount: Money,
    /// Distinct PayBill account references, in first-seen order.
    pub accounts: Vec<String>,
}

/// Aggregate view of one category over an optional period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: TransactionCategory,
    pub period: Option<Period>,
    pub granularity: Granularity,
    pub transaction_count: usize,
    pub total_amount: Money,
    /// Fee rows attributed to this category; not part of the counts above.
    pub charge_count: usize,
    pub total_charges: Money,
    pub top_counterparties: Vec<CounterpartyTotal>,
    pub time_series: Vec<SeriesPoint>,
}

impl CategorySummary {
    pub fn empty(category: TransactionCategory, granularity: Granularity) -> Self {
        Self {
            category,
            period: None,
            granularity,
            transaction_count: 0,
            total_amount: Money::zero(),
            charge_count: 0,
            total_charges: Money::zero(),
            top_counterparties: Vec::new(),
            time_series: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.transaction_count == 0 && self.charge_count == 0
    }

    /// Mean transaction amount, rounded to cents.
    pub fn average_amount(&self) -> Option<Money> {
        if self.transaction_count == 0 {
            return None;
        }
        let count = self.transaction_count as i64;
        Some(Money::from_decimal(self.total_amount.as_decimal() / Decimal::from(count)))
    }
}

/// Counterparty grouping key: case-insensitive, whitespace collapsed.
pub fn normalize_counterparty(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Per-category aggregation with a fixed ranking length and bucket size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Analyzer {
    top_n: usize,
    granularity: Granularity,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self { top_n: DEFAULT_TOP_N, granularity: Granularity::Month }
    }
}

impl Analyzer {
    pub fn new(top_n: usize, granularity: Granularity) -> Self {
        Self { top_n, granularity }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.top_n, config.granularity)
    }

    pub fn summarize(
        &self,
        ledger: &Ledger,
        category: TransactionCategory,
        period: Option<&Period>,
    ) -> CategorySummary {
        let (charges, rows): (Vec<&Transaction>, Vec<&Transaction>) =
            ledger.filter(category, period).partition(|t| t.charge);

        let mut summary = CategorySummary::empty(category, self.granularity);
        summary.period = period.cloned();
        summary.charge_count = charges.len();
        summary.total_charges = charges.iter().map(|t| t.amount).sum();

        if rows.is_empty() {
            return summary;
        }

        summary.transaction_count = rows.len();
        summary.total_amount = rows.iter().map(|t| t.amount).sum();
        summary.top_counterparties = self.rank(&rows);

        let bounds = match period {
            Some(period) => period.bounds(),
            None => ledger.date_range(),
        };
        if let Some(bounds) = bounds {
            let mut series = bucket_series(rows.iter().copied(), self.granularity, bounds);
            if let Some(period) = period {
                // Buckets lying wholly between two selected months are not part of the period.
                series.retain(|point| {
                    let next = self.granularity.next_bucket(point.period);
                    period.overlaps(point.period, next.pred_opt().unwrap_or(point.period))
                });
            }
            summary.time_series = series;
        }

        tracing::debug!(
            "{category}: {} transaction(s), total {}",
            summary.transaction_count,
            summary.total_amount
        );
        summary
    }

    /// One summary per analysable category, plus Unclassified on request.
    pub fn summarize_all(
        &self,
        ledger: &Ledger,
        period: Option<&Period>,
        include_unclassified: bool,
    ) -> Vec<CategorySummary> {
        let mut categories = TransactionCategory::CLASSIFIED.to_vec();
        if include_unclassified {
            categories.push(TransactionCategory::Unclassified);
        }
        categories
            .into_iter()
            .map(|category| self.summarize(ledger, category, period))
            .collect()
    }

    /// Groups by normalized counterparty, skipping rows without one.
    /// Ordered by total desc, count desc, normalized name asc.
    fn rank(&self, rows: &[&Transaction]) -> Vec<CounterpartyTotal> {
        let mut groups: BTreeMap<String, CounterpartyTotal> = BTreeMap::new();
        for tx in rows {
            let key = normalize_counterparty(&tx.counterparty);
            if key.is_empty() {
                continue;
            }
            let entry = groups.entry(key).or_insert_with(|| CounterpartyTotal {
                name: tx.counterparty.split_whitespace().collect::<Vec<_>>().join(" "),
                kind: CounterpartyKind::Unknown,
                count: 0,
                total_amount: Money::zero(),
                accounts: Vec::new(),
            });
            entry.count += 1;
            entry.total_amount += tx.amount;
            if entry.kind == CounterpartyKind::Unknown {
                entry.kind = tx.counterparty_kind;
            }
            if let Some(account) = &tx.account {
                if !entry.accounts.contains(account) {
                    entry.accounts.push(account.clone());
                }
            }
        }

        // BTreeMap iteration is name-ascending, so the stable sort keeps that as the last key.
        let mut ranked: Vec<CounterpartyTotal> = groups.into_values().collect();
        ranked.sort_by(|a, b| {
            b.total_amount.cmp(&a.total_amount).then(b.count.cmp(&a.count))
        });
        ranked.truncate(self.top_n);
        ranked
    }
}

/// Summarize with ten counterparties and monthly buckets.
pub fn summarize(
    ledger: &Ledger,
    category: TransactionCategory,
    period: Option<&Period>,
) -> CategorySummary {
    Analyzer::default().summarize(ledger, category, period)
}
