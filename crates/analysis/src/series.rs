use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use pesa_core::{DateRange, Granularity, Money, Transaction};

/// One time bucket, keyed by the first day it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub period: NaiveDate,
    pub count: usize,
    pub total_amount: Money,
}

/// Buckets `rows` by `granularity` across `bounds`, emitting empty buckets too.
pub fn bucket_series<'a, I>(rows: I, granularity: Granularity, bounds: DateRange) -> Vec<SeriesPoint>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let mut buckets: BTreeMap<NaiveDate, (usize, Money)> = BTreeMap::new();
    let mut start = granularity.bucket_start(bounds.start);
    while start <= bounds.end {
        buckets.insert(start, (0, Money::zero()));
        start = granularity.next_bucket(start);
    }

    for tx in rows {
        let key = granularity.bucket_start(tx.timestamp.date());
        let entry = buckets.entry(key).or_insert((0, Money::zero()));
        entry.0 += 1;
        entry.1 += tx.amount;
    }

    buckets
        .into_iter()
        .map(|(period, (count, total_amount))| SeriesPoint { period, count, total_amount })
        .collect()
}
