use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use std::str::FromStr;

use pesa_core::StatementLocale;

/// Edit distance in characters: insertions, deletions and substitutions all cost one.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let target: Vec<char> = b.chars().collect();
    // row[j] is the distance from the prefix of `a` seen so far to target[..j].
    let mut row: Vec<usize> = (0..=target.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in target.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == *cb {
                diagonal
            } else {
                1 + diagonal.min(above).min(row[j])
            };
            diagonal = above;
        }
    }
    row[target.len()]
}

/// Parse a printed amount using the statement's separators.
///
/// Accepts an optional `Ksh`/`KES` prefix, a leading minus or parentheses for negatives, and
/// thousands separators anywhere in the integer part. `None` when anything else remains.
pub fn parse_amount(raw: &str, locale: &StatementLocale) -> Option<Decimal> {
    let mut s = raw.trim();
    for prefix in ["KSh", "Ksh", "KSH", "KES"] {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest.trim_start_matches('.').trim_start();
            break;
        }
    }

    let (negative, body) = if let Some(inner) = s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        (true, inner.trim())
    } else if let Some(rest) = s.strip_prefix('-') {
        (true, rest.trim_start())
    } else {
        (false, s)
    };

    let mut normalized = String::with_capacity(body.len());
    for c in body.chars() {
        if c == locale.thousands_separator {
            continue;
        }
        if c == locale.decimal_separator {
            normalized.push('.');
        } else if c.is_ascii_digit() {
            normalized.push(c);
        } else {
            return None;
        }
    }
    if !normalized.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let value = Decimal::from_str(&normalized).ok()?;
    Some(if negative { -value } else { value })
}

/// Why a printed timestamp was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampIssue {
    /// The year field has fewer than four digits.
    AmbiguousYear,
    Invalid,
}

/// Parse `<date> [<time>]`, the date per `locale.date_format`, the time as `HH:MM[:SS]`.
/// A missing time is midnight.
///
/// The date may itself contain spaces (`05 Jan 2024`); only a trailing word with a colon is
/// taken as the time.
pub fn parse_timestamp(raw: &str, locale: &StatementLocale) -> Result<NaiveDateTime, TimestampIssue> {
    let text = collapse_whitespace(raw);
    let (date_text, time_text) = match text.rsplit_once(' ') {
        Some((date, time)) if time.contains(':') => (date, Some(time)),
        _ => (text.as_str(), None),
    };
    if date_text.is_empty() {
        return Err(TimestampIssue::Invalid);
    }

    if year_field_is_short(date_text, &locale.date_format) {
        return Err(TimestampIssue::AmbiguousYear);
    }
    let date = NaiveDate::parse_from_str(date_text, &locale.date_format)
        .map_err(|_| TimestampIssue::Invalid)?;

    let time = match time_text {
        None => NaiveTime::MIN,
        Some(t) => NaiveTime::parse_from_str(t, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M"))
            .map_err(|_| TimestampIssue::Invalid)?,
    };
    Ok(date.and_time(time))
}

/// Locate the year field by the position of `%Y`/`%y` among the format's specifiers and check
/// its digit count in the printed date.
fn year_field_is_short(date_text: &str, format: &str) -> bool {
    let specifiers: Vec<char> = format
        .split('%')
        .skip(1)
        .filter_map(|s| s.chars().next())
        .collect();
    let Some(year_idx) = specifiers.iter().position(|c| *c == 'Y' || *c == 'y') else {
        return false;
    };
    if specifiers[year_idx] == 'y' {
        return true;
    }
    date_text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|s| !s.is_empty())
        .nth(year_idx)
        .is_some_and(|field| field.len() < 4)
}

/// Whitespace-separated words of `s`, each with its byte offset.
pub fn word_spans(s: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, c) in s.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(from)) => {
                out.push((from, &s[from..i]));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(from) = start {
        out.push((from, &s[from..]));
    }
    out
}

/// Trim and collapse internal whitespace runs to one space.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
