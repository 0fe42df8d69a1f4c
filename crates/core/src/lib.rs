pub mod config;
pub mod ledger;
pub mod money;
pub mod period;
pub mod transaction;

pub use config::{AnalysisConfig, ConfigError, StatementLocale};
pub use ledger::{BalanceAnomaly, Ledger, LedgerBuilder, TieBreak};
pub use money::Money;
pub use period::{DateRange, Granularity, Period, YearMonth};
pub use transaction::{
    AmountConflict, Classification, CounterpartyKind, Direction, LinePosition, RawStatementLine,
    Transaction, TransactionCategory,
};
