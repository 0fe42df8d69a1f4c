pub mod series;
pub mod summary;

pub use series::{bucket_series, SeriesPoint};
pub use summary::{normalize_counterparty, summarize, Analyzer, CategorySummary, CounterpartyTotal};
