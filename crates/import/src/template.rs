use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid pattern in template field '{field}': {source}")]
    Pattern {
        field: &'static str,
        #[source]
        source: regex::Error,
    },
    #[error("Template needs at least one status token")]
    NoStatusTokens,
}

/// Layout description of one statement version: how a row starts and which lines are chrome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    pub version: String,
    /// Receipt number pattern. Matched case-sensitively at the start of a line.
    pub id_pattern: String,
    /// Completion time pattern following the receipt number. It only anchors rows; the
    /// captured text is parsed with the locale's `date_format`, so a custom pattern must match
    /// dates printed that way. The built-in one accepts numeric dates and dates with a month name.
    pub timestamp_pattern: String,
    /// Characters allowed between the anchors and around fields.
    pub separator_pattern: String,
    /// Transaction status words printed between the details and the amount columns.
    pub status_tokens: Vec<String>,
    /// Page headers and footers; matching lines never join a description.
    pub ignore_patterns: Vec<String>,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            version: "mpesa-2024".to_string(),
            id_pattern: r"[A-Z][A-Z0-9]{5,11}".to_string(),
            timestamp_pattern: concat!(
                r"(?:\d{1,4}[-/.]\d{1,2}[-/.]\d{1,4}",
                r"|\d{1,2}[\s-][A-Za-z]{3,9}[\s-]\d{2,4}",
                r"|[A-Za-z]{3,9}\s+\d{1,2},?\s+\d{4})",
                r"(?:\s+\d{1,2}:\d{2}(?::\d{2})?)?",
            )
            .to_string(),
            separator_pattern: r"[\s,|]+".to_string(),
            status_tokens: ["Completed", "Failed", "Pending", "Reversed", "Cancelled"]
                .map(String::from)
                .to_vec(),
            ignore_patterns: [
                r"^Page\s+\d+\s+of\s+\d+",
                r"^Receipt\s+No",
                r"^Disclaimer",
                r"^(?:M-PESA|MPESA)\s+(?:FULL\s+)?STATEMENT",
                r"^(?:DETAILED\s+STATEMENT|SUMMARY)$",
                r"^Customer\s+Name|^Mobile\s+Number|^Email\s+Address|^Statement\s+Period|^Request\s+Date",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

/// A compiled [`TemplateConfig`].
#[derive(Debug, Clone)]
pub struct StatementTemplate {
    version: String,
    anchor: Regex,
    field_separator: Regex,
    status: Vec<String>,
    ignore: Vec<Regex>,
}

/// The anchor pair of a row's first line and whatever follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowAnchor<'a> {
    pub transaction_id: &'a str,
    pub timestamp: &'a str,
    pub rest: &'a str,
}

impl Default for StatementTemplate {
    fn default() -> Self {
        Self::mpesa_2024()
    }
}

impl StatementTemplate {
    pub fn mpesa_2024() -> Self {
        Self::from_config(TemplateConfig::default()).expect("built-in template compiles")
    }

    pub fn from_config(config: TemplateConfig) -> Result<Self, TemplateError> {
        if config.status_tokens.is_empty() {
            return Err(TemplateError::NoStatusTokens);
        }
        let anchor = Regex::new(&format!(
            r"^\s*(?P<id>{id})(?:{sep})(?P<ts>{ts})(?:(?:{sep})(?P<rest>.*))?$",
            id = config.id_pattern,
            ts = config.timestamp_pattern,
            sep = config.separator_pattern,
        ))
        .map_err(|source| TemplateError::Pattern { field: "id_pattern/timestamp_pattern", source })?;
        let field_separator = Regex::new(&config.separator_pattern)
            .map_err(|source| TemplateError::Pattern { field: "separator_pattern", source })?;
        let ignore = config
            .ignore_patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| TemplateError::Pattern { field: "ignore_patterns", source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            version: config.version,
            anchor,
            field_separator,
            status: config.status_tokens.iter().map(|s| s.to_lowercase()).collect(),
            ignore,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, TemplateError> {
        let config: TemplateConfig = toml::from_str(content)?;
        Self::from_config(config)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn anchor<'a>(&self, line: &'a str) -> Option<RowAnchor<'a>> {
        let caps = self.anchor.captures(line)?;
        Some(RowAnchor {
            transaction_id: caps.name("id")?.as_str(),
            timestamp: caps.name("ts")?.as_str(),
            rest: caps.name("rest").map_or("", |m| m.as_str()),
        })
    }

    pub fn is_ignored(&self, line: &str) -> bool {
        let line = line.trim();
        self.ignore.iter().any(|re| re.is_match(line))
    }

    pub fn is_status(&self, token: &str) -> bool {
        let token = token.to_lowercase();
        self.status.iter().any(|s| *s == token)
    }

    /// Separator characters stripped from the ends of a field token.
    pub(crate) fn trim_field<'a>(&self, token: &'a str) -> &'a str {
        let mut token = token;
        while let Some(m) = self.field_separator.find(token) {
            if m.start() == 0 && m.end() > 0 {
                token = &token[m.end()..];
            } else {
                break;
            }
        }
        for m in self.field_separator.find_iter(token) {
            if m.end() == token.len() && m.start() > 0 {
                return &token[..m.start()];
            }
        }
        token
    }
}
