pub mod classify;
pub mod parser;
pub mod template;
pub(crate) mod util;

pub use classify::{classify, default_rules, Classifier, ClassifierRule, MatchType, RuleError};
pub use parser::{parse_lines, ParseOutput, ParseWarning, ParseWarningKind, StatementParser};
pub use template::{RowAnchor, StatementTemplate, TemplateConfig, TemplateError};
