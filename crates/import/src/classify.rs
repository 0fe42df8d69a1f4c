use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

use pesa_core::{Classification, CounterpartyKind, RawStatementLine, TransactionCategory};

use crate::util::{collapse_whitespace, levenshtein_distance};

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_short_code, r"^\d{3,8}\s*-\s*");
re!(re_masked_msisdn, r"^\d*\*+\d*\s+");
re!(re_phone, r"\b(?:0|254|\+254)?7\d{8}\b");
re!(re_account, r"(?i)^(.*?)\s+Acc\.\s*(.*)$");

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Rule '{rule}' has an invalid pattern: {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassifierRule {
    pub name: String,
    pub priority: i32,
    pub pattern: String,
    #[serde(default)]
    pub match_type: MatchType,
    pub category: TransactionCategory,
    /// Matching rows are the operator's fee for a `category` transaction.
    #[serde(default)]
    pub charge: bool,
    /// Only rows whose transaction id starts with this prefix.
    #[serde(default)]
    pub id_prefix: Option<String>,
    /// Counterparty kind for every match, overriding the inferred one.
    #[serde(default)]
    pub kind: Option<CounterpartyKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Case-insensitive substring; the counterparty is the text after the match.
    #[default]
    Contains,
    Exact,
    /// Case-insensitive regex; the counterparty is the `cp` capture group.
    Regex,
    Fuzzy {
        threshold: f32,
    },
}

impl std::str::FromStr for MatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contains" => Ok(MatchType::Contains),
            "exact" => Ok(MatchType::Exact),
            "regex" => Ok(MatchType::Regex),
            s if s.starts_with("fuzzy:") => {
                let threshold = s[6..]
                    .parse::<f32>()
                    .map_err(|_| "Invalid fuzzy threshold".to_string())?;
                Ok(MatchType::Fuzzy { threshold })
            }
            other => Err(format!("Unknown match type: '{other}'")),
        }
    }
}

#[derive(Deserialize)]
struct RuleFile {
    rules: Vec<ClassifierRule>,
}

/// Internal pairing of a rule with its precompiled regex (if applicable).
#[derive(Debug)]
struct CompiledRule {
    rule: ClassifierRule,
    compiled_regex: Option<Regex>,
}

/// Ordered rule table: highest priority first, table order within a priority, first match wins.
#[derive(Debug)]
pub struct Classifier {
    rules: Vec<CompiledRule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(default_rules()).expect("built-in rules compile")
    }
}

impl Classifier {
    pub fn new(rules: Vec<ClassifierRule>) -> Result<Self, RuleError> {
        let mut compiled = rules
            .into_iter()
            .map(|rule| {
                let compiled_regex = match rule.match_type {
                    MatchType::Regex => Some(
                        RegexBuilder::new(&rule.pattern)
                            .case_insensitive(true)
                            .build()
                            .map_err(|source| RuleError::InvalidPattern {
                                rule: rule.name.clone(),
                                source,
                            })?,
                    ),
                    _ => None,
                };
                Ok(CompiledRule { rule, compiled_regex })
            })
            .collect::<Result<Vec<_>, RuleError>>()?;
        // Stable: equal priorities keep table order.
        compiled.sort_by(|a, b| b.rule.priority.cmp(&a.rule.priority));
        Ok(Self { rules: compiled })
    }

    pub fn from_toml(toml_content: &str) -> Result<Self, RuleError> {
        let file: RuleFile = toml::from_str(toml_content)?;
        Self::new(file.rules)
    }

    pub fn rules(&self) -> impl Iterator<Item = &ClassifierRule> {
        self.rules.iter().map(|cr| &cr.rule)
    }

    /// Never fails: a row no rule matches is Unclassified, and a matching rule whose
    /// counterparty cannot be extracted still assigns its category.
    pub fn classify(&self, raw: &RawStatementLine) -> Classification {
        let description = collapse_whitespace(&raw.description);
        for cr in &self.rules {
            if let Some(counterparty) = self.rule_matches(cr, &raw.transaction_id, &description) {
                tracing::debug!("{} matched rule '{}'", raw.transaction_id, cr.rule.name);
                return finish(&cr.rule, counterparty);
            }
        }
        Classification::unclassified()
    }

    /// `Some(raw counterparty)` when the rule matches.
    fn rule_matches(&self, cr: &CompiledRule, id: &str, description: &str) -> Option<String> {
        let rule = &cr.rule;

        if let Some(prefix) = &rule.id_prefix {
            if !id.starts_with(prefix.as_str()) {
                return None;
            }
        }

        let text = description.to_ascii_lowercase();
        let pattern = rule.pattern.to_ascii_lowercase();

        match &rule.match_type {
            MatchType::Contains => text
                .find(&pattern)
                .map(|at| description[at + pattern.len()..].to_string()),
            MatchType::Exact => (text == pattern).then(String::new),
            MatchType::Regex => {
                let caps = cr.compiled_regex.as_ref()?.captures(description)?;
                Some(caps.name("cp").map_or_else(String::new, |m| m.as_str().to_string()))
            }
            MatchType::Fuzzy { threshold } => {
                (fuzzy_score(&text, &pattern) >= *threshold).then(String::new)
            }
        }
    }
}

fn fuzzy_score(s1: &str, s2: &str) -> f32 {
    let max_len = s1.chars().count().max(s2.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (levenshtein_distance(s1, s2) as f32 / max_len as f32)
}

/// Clean the raw counterparty and infer what kind of party it is.
fn finish(rule: &ClassifierRule, raw_counterparty: String) -> Classification {
    if rule.charge {
        return Classification {
            category: rule.category,
            charge: true,
            ..Classification::unclassified()
        };
    }

    let mut name = collapse_whitespace(&raw_counterparty);
    let mut inferred = CounterpartyKind::Unknown;

    if let Some(m) = re_short_code().find(&name) {
        name = name[m.end()..].to_string();
        inferred = CounterpartyKind::Business;
    } else if let Some(m) = re_masked_msisdn().find(&name) {
        name = name[m.end()..].to_string();
        inferred = CounterpartyKind::Individual;
    } else if re_phone().is_match(&name) {
        inferred = CounterpartyKind::Individual;
    }

    let mut account = None;
    if rule.category == TransactionCategory::PayBill {
        if let Some(caps) = re_account().captures(&name) {
            let reference = caps[2].trim().to_string();
            account = (!reference.is_empty()).then_some(reference);
            name = caps[1].trim().to_string();
        }
    }

    Classification {
        category: rule.category,
        counterparty: name,
        counterparty_kind: rule.kind.unwrap_or(inferred),
        account,
        charge: false,
    }
}

/// Classify with the built-in rule table.
pub fn classify(raw: &RawStatementLine) -> Classification {
    static DEFAULT: OnceLock<Classifier> = OnceLock::new();
    DEFAULT.get_or_init(Classifier::default).classify(raw)
}

fn rule(
    name: &str,
    priority: i32,
    match_type: MatchType,
    pattern: &str,
    category: TransactionCategory,
) -> ClassifierRule {
    ClassifierRule {
        name: name.to_string(),
        priority,
        pattern: pattern.to_string(),
        match_type,
        category,
        charge: false,
        id_prefix: None,
        kind: None,
    }
}

fn charge(name: &str, pattern: &str, category: TransactionCategory) -> ClassifierRule {
    ClassifierRule { charge: true, ..rule(name, 100, MatchType::Contains, pattern, category) }
}

fn pattern_rule(name: &str, priority: i32, pattern: &str, category: TransactionCategory) -> ClassifierRule {
    rule(name, priority, MatchType::Regex, pattern, category)
}

/// The `mpesa-2024` rule table. Fee rows come first, then PayBill ahead of the looser
/// merchant and transfer wordings.
pub fn default_rules() -> Vec<ClassifierRule> {
    use TransactionCategory::*;

    vec![
        charge("paybill charge", "pay bill charge", PayBill),
        charge("transfer charge", "customer transfer of funds charge", SendMoney),
        charge("withdrawal charge", "withdrawal charge", CashWithdrawal),
        charge("merchant charge", "pay merchant charge", MerchantPayment),
        pattern_rule("paybill", 90, r"pay\s*bill\b(?:(?:\s+\w+)*?\s+to\s+(?P<cp>.+))?", PayBill),
        pattern_rule("agent withdrawal", 80, r"withdrawal\s+at\s+agent\s+till\s+(?P<cp>.+)", CashWithdrawal),
        pattern_rule("cash withdrawal", 80, r"(?:cash|customer)\s+withdrawal(?:\s+(?:from|at)\s+(?P<cp>.+))?", CashWithdrawal),
        pattern_rule("airtime recharge", 70, r"recharge\s+for\s+customer\b(?:\s+(?P<cp>.+))?", Airtime),
        pattern_rule("airtime purchase", 70, r"airtime\s+purchase\b(?:\s+(?:for|to)\b)?(?:\s+(?P<cp>.+))?", Airtime),
        pattern_rule("buy airtime", 70, r"buy\s+(?:airtime|bundles?)\b(?:\s+(?:for|to)\s+(?P<cp>.+))?", Airtime),
        ClassifierRule {
            kind: Some(CounterpartyKind::Business),
            ..pattern_rule("business payment", 60, r"business\s+payment\s+from\s+(?P<cp>.+?)(?:\s+via\s+api.*)?$", ReceiveMoney)
        },
        pattern_rule("funds received", 60, r"(?:funds\s+)?received?\s+(?:money\s+)?from\b(?:\s+(?P<cp>.+))?", ReceiveMoney),
        ClassifierRule {
            kind: Some(CounterpartyKind::Individual),
            ..pattern_rule("customer transfer", 50, r"customer\s+transfer(?:\s+fuliza\s+m-pesa)?\s+to\s+(?P<cp>.+)", SendMoney)
        },
        pattern_rule("send money", 50, r"send\s+money\s+to\b(?:\s+(?P<cp>.+))?", SendMoney),
        pattern_rule("merchant payment", 40, r"merchant\s+payment(?:\s+online)?(?:\s+fuliza\s+m-pesa)?(?:\s+to\b(?:\s+(?P<cp>.+))?)?", MerchantPayment),
        pattern_rule("buy goods", 40, r"buy\s+goods\s+(?:from|to|at)\s+(?P<cp>.+)", MerchantPayment),
        pattern_rule("payment", 30, r"\bpayment\s+to\b(?:\s+(?P<cp>.+))?", MerchantPayment),
    ]
}
