pub mod hash;
pub mod pipeline;
pub mod report;
pub mod session;

pub use pipeline::{PipelineError, PipelineOutput, StatementPipeline};
pub use report::{resolve_period, LedgerOverview, RangeError, StatementReport};
pub use session::AnalysisSession;
