use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::money::Money;
use crate::period::Granularity;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Number and date conventions of the printed statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatementLocale {
    /// chrono format of the date part of a timestamp, e.g. `%Y-%m-%d`.
    pub date_format: String,
    pub decimal_separator: char,
    pub thousands_separator: char,
}

impl Default for StatementLocale {
    fn default() -> Self {
        Self {
            date_format: "%Y-%m-%d".to_string(),
            decimal_separator: '.',
            thousands_separator: ',',
        }
    }
}

impl StatementLocale {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.decimal_separator == self.thousands_separator {
            return Err(ConfigError::Invalid(
                "decimal and thousands separators must differ".to_string(),
            ));
        }
        if self.decimal_separator.is_ascii_digit() || self.thousands_separator.is_ascii_digit() {
            return Err(ConfigError::Invalid("separators cannot be digits".to_string()));
        }
        let specifiers = self.date_specifiers();
        let has = |set: &[char]| specifiers.iter().any(|c| set.contains(c));
        if !has(&['Y', 'y']) {
            return Err(self.bad_date_format("has no year field"));
        }
        if !has(&['m', 'b', 'B', 'h']) || !has(&['d', 'e']) {
            return Err(self.bad_date_format("needs both a day and a month field"));
        }
        // The time is parsed separately from the trailing HH:MM[:SS] word.
        if has(&['H', 'I', 'M', 'S', 'p', 'T', 'R', 'X', 'c', 'r']) {
            return Err(self.bad_date_format("must not contain time fields"));
        }
        Ok(())
    }

    /// Conversion characters of `date_format`, `%%` excluded.
    fn date_specifiers(&self) -> Vec<char> {
        let mut out = Vec::new();
        let mut chars = self.date_format.chars();
        while let Some(c) = chars.next() {
            if c != '%' {
                continue;
            }
            // Skip padding and width modifiers such as `%-d` or `%_m`.
            if let Some(conversion) = chars.by_ref().find(|c: &char| !matches!(*c, '-' | '_' | '0'..='9')) {
                if conversion != '%' {
                    out.push(conversion);
                }
            }
        }
        out
    }

    fn bad_date_format(&self, problem: &str) -> ConfigError {
        ConfigError::Invalid(format!("date_format '{}' {problem}", self.date_format))
    }
}

/// Caller-supplied settings for one analysis session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub locale: StatementLocale,
    /// Length cap of every top-counterparty ranking.
    pub top_n: usize,
    /// Largest balance mismatch that is not reported as an anomaly.
    pub balance_tolerance: Decimal,
    pub granularity: Granularity,
    /// Include the Unclassified bucket in whole-statement overviews.
    pub include_unclassified: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            locale: StatementLocale::default(),
            top_n: 10,
            balance_tolerance: Decimal::new(1, 2),
            granularity: Granularity::Month,
            include_unclassified: false,
        }
    }
}

impl AnalysisConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AnalysisConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!("Loaded analysis config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.locale.validate()?;
        if self.top_n == 0 {
            return Err(ConfigError::Invalid("top_n must be at least 1".to_string()));
        }
        if self.balance_tolerance.is_sign_negative() {
            return Err(ConfigError::Invalid("balance_tolerance cannot be negative".to_string()));
        }
        Ok(())
    }

    pub fn tolerance(&self) -> Money {
        Money::from_decimal(self.balance_tolerance)
    }
}
