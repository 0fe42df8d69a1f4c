use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use pesa_core::{AmountConflict, LinePosition, Money, RawStatementLine, StatementLocale};
use pesa_pdf::PageText;

use crate::template::StatementTemplate;
use crate::util::{collapse_whitespace, parse_amount, parse_timestamp, word_spans, TimestampIssue};

/// Why a row was left out of the parse output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum ParseWarningKind {
    #[error("unparsable {column} amount")]
    InvalidAmount { column: &'static str, value: String },
    #[error("expected 2 or 3 amount columns, found {found}")]
    MissingAmounts { found: usize },
    #[error("two-digit year in timestamp")]
    AmbiguousYear,
    #[error("unparsable timestamp")]
    InvalidTimestamp,
    #[error("{0}")]
    AmountConflict(AmountConflict),
}

/// A statement row that could not be turned into a [`RawStatementLine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseWarning {
    pub transaction_id: String,
    pub position: LinePosition,
    pub kind: ParseWarningKind,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.transaction_id, self.position, self.kind)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutput {
    pub lines: Vec<RawStatementLine>,
    pub warnings: Vec<ParseWarning>,
}

/// A row whose first line has been seen; continuation lines are still being folded in.
#[derive(Debug)]
struct PendingRow {
    transaction_id: String,
    timestamp: String,
    description: Vec<String>,
    amounts: Vec<String>,
    position: LinePosition,
}

enum RowState {
    AwaitingRow,
    InRow(PendingRow),
}

/// Turns laid-out pages into raw statement rows.
pub struct StatementParser {
    template: StatementTemplate,
    locale: StatementLocale,
}

impl StatementParser {
    pub fn new(template: StatementTemplate, locale: StatementLocale) -> Self {
        Self { template, locale }
    }

    pub fn template(&self) -> &StatementTemplate {
        &self.template
    }

    pub fn parse(&self, pages: &[PageText]) -> ParseOutput {
        let mut out = ParseOutput::default();

        for page in pages {
            let mut state = RowState::AwaitingRow;
            for (idx, line) in page.lines.iter().enumerate() {
                let text = line.text();
                let position = LinePosition { page: page.number, line: idx + 1 };

                if self.template.is_ignored(&text) {
                    continue;
                }

                if let Some(pending) = self.start_row(&text, position) {
                    if let RowState::InRow(done) = std::mem::replace(&mut state, RowState::InRow(pending)) {
                        self.finish(done, &mut out);
                    }
                    continue;
                }

                if let RowState::InRow(row) = &mut state {
                    tracing::debug!("Folding continuation line into {}", row.transaction_id);
                    row.description.push(collapse_whitespace(&text));
                }
            }
            // Rows never continue across a page break.
            if let RowState::InRow(done) = state {
                self.finish(done, &mut out);
            }
        }

        tracing::info!(
            "Parsed {} statement row(s) from {} page(s), {} warning(s)",
            out.lines.len(),
            pages.len(),
            out.warnings.len()
        );
        out
    }

    fn start_row(&self, text: &str, position: LinePosition) -> Option<PendingRow> {
        let anchor = self.template.anchor(text)?;
        // Separators are stripped from amount fields only; the details keep their punctuation.
        let fields: Vec<(usize, &str)> = word_spans(anchor.rest)
            .into_iter()
            .map(|(at, word)| (at, self.template.trim_field(word)))
            .filter(|(_, field)| !field.is_empty())
            .collect();

        // Amount columns follow the last status token. Without one, the trailing amount
        // columns are counted from the shape of the row.
        let (details_end, amounts_start) =
            match fields.iter().rposition(|(_, field)| self.template.is_status(field)) {
                Some(i) => (i, i + 1),
                None => {
                    let words: Vec<&str> = fields.iter().map(|(_, field)| *field).collect();
                    let i = fields.len().saturating_sub(self.trailing_amount_columns(&words));
                    (i, i)
                }
            };

        let details = match fields.get(details_end) {
            Some((at, _)) => &anchor.rest[..*at],
            None => anchor.rest,
        };
        let description = collapse_whitespace(self.template.trim_field(details.trim_end()));

        Some(PendingRow {
            transaction_id: anchor.transaction_id.to_string(),
            timestamp: anchor.timestamp.to_string(),
            description: vec![description],
            amounts: fields[amounts_start..].iter().map(|(_, field)| field.to_string()).collect(),
            position,
        })
    }

    /// Three when the last three words read as paid in, withdrawn and balance: all amounts,
    /// and either side is `-` or the first carries a decimal part. Two otherwise, so a phone
    /// number ending the details is not taken for a column. A row printed with both sides
    /// filled is still kept apart by the amount conflict check.
    fn trailing_amount_columns(&self, words: &[&str]) -> usize {
        let [.., paid_in, withdrawn, balance] = words else {
            return 2;
        };
        let is_amount = |w: &str| w == "-" || parse_amount(w, &self.locale).is_some();
        let has_decimals =
            |w: &str| w.contains(self.locale.decimal_separator) && parse_amount(w, &self.locale).is_some();

        let three = [*paid_in, *withdrawn, *balance].into_iter().all(is_amount)
            && (*paid_in == "-" || *withdrawn == "-" || has_decimals(*paid_in));
        if three {
            tracing::debug!("Reading '{paid_in} {withdrawn} {balance}' as three amount columns");
            3
        } else {
            2
        }
    }

    fn finish(&self, row: PendingRow, out: &mut ParseOutput) {
        match self.build_line(&row) {
            Ok(line) => out.lines.push(line),
            Err(kind) => {
                let warning = ParseWarning {
                    transaction_id: row.transaction_id,
                    position: row.position,
                    kind,
                };
                tracing::warn!("Skipping statement row {warning}");
                out.warnings.push(warning);
            }
        }
    }

    fn build_line(&self, row: &PendingRow) -> Result<RawStatementLine, ParseWarningKind> {
        let timestamp = parse_timestamp(&row.timestamp, &self.locale).map_err(|e| match e {
            TimestampIssue::AmbiguousYear => ParseWarningKind::AmbiguousYear,
            TimestampIssue::Invalid => ParseWarningKind::InvalidTimestamp,
        })?;

        let (paid_in, paid_out, balance) = match row.amounts.as_slice() {
            [amount, balance] => {
                let amount = self.amount("transaction", amount)?;
                let balance = self.amount("balance", balance)?;
                if amount.is_sign_negative() {
                    (Decimal::ZERO, -amount, balance)
                } else {
                    (amount, Decimal::ZERO, balance)
                }
            }
            [paid_in, withdrawn, balance] => (
                self.optional_amount("paid in", paid_in)?,
                self.optional_amount("withdrawn", withdrawn)?.abs(),
                self.amount("balance", balance)?,
            ),
            other => return Err(ParseWarningKind::MissingAmounts { found: other.len() }),
        };

        let line = RawStatementLine {
            transaction_id: row.transaction_id.clone(),
            timestamp,
            description: collapse_whitespace(&row.description.join(" ")),
            paid_in: Money::from_decimal(paid_in),
            paid_out: Money::from_decimal(paid_out),
            balance: Money::from_decimal(balance),
            position: row.position,
        };
        line.direction().map_err(ParseWarningKind::AmountConflict)?;
        Ok(line)
    }

    fn amount(&self, column: &'static str, raw: &str) -> Result<Decimal, ParseWarningKind> {
        parse_amount(raw, &self.locale).ok_or_else(|| ParseWarningKind::InvalidAmount {
            column,
            value: raw.to_string(),
        })
    }

    /// Three-column layouts print an empty side as `-` or nothing.
    fn optional_amount(&self, column: &'static str, raw: &str) -> Result<Decimal, ParseWarningKind> {
        if raw == "-" {
            return Ok(Decimal::ZERO);
        }
        self.amount(column, raw)
    }
}

/// Parse with the built-in `mpesa-2024` template.
pub fn parse_lines(pages: &[PageText], locale: &StatementLocale) -> ParseOutput {
    StatementParser::new(StatementTemplate::mpesa_2024(), locale.clone()).parse(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn parse(pages: &[&[&str]]) -> ParseOutput {
        let pages: Vec<PageText> = pages
            .iter()
            .enumerate()
            .map(|(i, lines)| PageText::from_lines(i + 1, *lines))
            .collect();
        parse_lines(&pages, &StatementLocale::default())
    }

    // ── row detection ─────────────────────────────────────────────────────────

    #[test]
    fn parses_two_rows_and_rejects_unparsable_amount() {
        let out = parse(&[&[
            "TXN001, 2024-01-05, PAYMENT TO ABC STORES, -500.00, 9,500.00",
            "TXN002, 2024-01-06, SEND MONEY TO JOHN DOE 0712345678, -200.00, 9,300.00",
            "TXN003, 2024-01-07, FEE, ??, 9,250.00",
        ]]);
        assert_eq!(out.lines.len(), 2);
        assert_eq!(out.lines[0].transaction_id, "TXN001");
        assert_eq!(out.lines[0].description, "PAYMENT TO ABC STORES");
        assert_eq!(out.lines[0].paid_out, Money::from_cents(50_000));
        assert_eq!(out.lines[0].paid_in, Money::zero());
        assert_eq!(out.lines[0].balance, Money::from_cents(950_000));
        assert_eq!(out.lines[1].description, "SEND MONEY TO JOHN DOE 0712345678");

        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].transaction_id, "TXN003");
        assert!(matches!(out.warnings[0].kind, ParseWarningKind::InvalidAmount { .. }));
        assert_eq!(out.warnings[0].position, LinePosition { page: 1, line: 3 });
    }

    #[test]
    fn three_columns_without_status() {
        let out = parse(&[&[
            "TXN001, 2024-01-05, PAYMENT TO ABC STORES, -, 500.00, 9,500.00",
            "TXN002, 2024-01-06, FUNDS RECEIVED FROM JOHN DOE, 1,000.00, -, 10,500.00",
            "TXN003  2024-01-07  SEND MONEY TO JOHN 0712345678  -200.00  10,300.00",
        ]]);
        assert!(out.warnings.is_empty());
        let first = &out.lines[0];
        assert_eq!(first.description, "PAYMENT TO ABC STORES");
        assert_eq!(first.paid_out, Money::from_cents(50_000));
        assert_eq!(first.paid_in, Money::zero());
        assert_eq!(first.balance, Money::from_cents(950_000));

        assert_eq!(out.lines[1].description, "FUNDS RECEIVED FROM JOHN DOE");
        assert_eq!(out.lines[1].paid_in, Money::from_cents(100_000));

        // A trailing phone number is details, not a paid-in column.
        assert_eq!(out.lines[2].description, "SEND MONEY TO JOHN 0712345678");
        assert_eq!(out.lines[2].paid_out, Money::from_cents(20_000));
    }

    #[test]
    fn both_sides_without_status_is_a_conflict() {
        let out = parse(&[&["TXN004  2024-01-07  REVERSAL  50.00  50.00  10,300.00"]]);
        assert!(out.lines.is_empty());
        assert!(matches!(
            out.warnings[0].kind,
            ParseWarningKind::AmountConflict(AmountConflict::BothSides { .. })
        ));
    }

    #[test]
    fn details_keep_their_punctuation() {
        let out = parse(&[&[
            "TXN005  2024-01-08  Pay Bill to 123 - ACME, LTD Acc. 9|1  Completed  -10.00  90.00",
            "TXN006, 2024-01-09, PAYMENT TO ACME, LTD, -5.00, 85.00",
        ]]);
        assert!(out.warnings.is_empty());
        assert_eq!(out.lines[0].description, "Pay Bill to 123 - ACME, LTD Acc. 9|1");
        assert_eq!(out.lines[1].description, "PAYMENT TO ACME, LTD");
    }

    #[test]
    fn status_token_separates_details_from_amounts() {
        let out = parse(&[&[
            "Receipt No.  Completion Time  Details  Transaction Status  Paid In  Withdrawn  Balance",
            "RCL4AB12CD  2024-03-02 14:05:11  Merchant Payment to 123456 - ABC  Completed  -1,200.00  3,800.00",
            "STORES",
            "RCL4AB12CE  2024-03-02 15:00:00  Funds received from 2547******89 JANE DOE  Completed  2,000.00  5,800.00",
        ]]);
        assert!(out.warnings.is_empty());
        assert_eq!(out.lines.len(), 2);
        let first = &out.lines[0];
        assert_eq!(first.description, "Merchant Payment to 123456 - ABC STORES");
        assert_eq!(first.paid_out, Money::from_cents(120_000));
        assert_eq!((first.timestamp.hour(), first.timestamp.minute()), (14, 5));
        assert_eq!(out.lines[1].paid_in, Money::from_cents(200_000));
    }

    #[test]
    fn three_column_layout() {
        let out = parse(&[&[
            "RCL1  2024-01-05 09:00  Airtime Purchase  Completed  -  50.00  950.00",
            "RCL2  2024-01-06 09:00  Funds received from X  Completed  100.00  -  1,050.00",
        ]]);
        assert_eq!(out.lines.len(), 0, "ids shorter than six characters are not anchors");

        let out = parse(&[&[
            "RCL100  2024-01-05 09:00  Airtime Purchase  Completed  -  50.00  950.00",
            "RCL200  2024-01-06 09:00  Funds received from X  Completed  100.00  -  1,050.00",
        ]]);
        assert_eq!(out.lines.len(), 2);
        assert_eq!(out.lines[0].paid_out, Money::from_cents(5_000));
        assert_eq!(out.lines[1].paid_in, Money::from_cents(10_000));
    }

    // ── folding ───────────────────────────────────────────────────────────────

    #[test]
    fn continuation_stops_at_page_end_and_skips_chrome() {
        let out = parse(&[
            &[
                "RCL100A  2024-01-05 09:00  Pay Bill to 888880 - KPLC  Completed  -1,000.00  9,000.00",
                "PREPAID Acc. 1234",
                "Page 1 of 2",
                "Disclaimer: This record is produced for your personal use",
            ],
            &["NOT A CONTINUATION", "RCL100B  2024-01-06 09:00  Airtime Purchase  Completed  -50.00  8,950.00"],
        ]);
        assert_eq!(out.lines.len(), 2);
        assert_eq!(out.lines[0].description, "Pay Bill to 888880 - KPLC PREPAID Acc. 1234");
        assert_eq!(out.lines[1].description, "Airtime Purchase");
        assert_eq!(out.lines[1].position, LinePosition { page: 2, line: 2 });
    }

    #[test]
    fn page_without_rows_yields_nothing() {
        let out = parse(&[&["SUMMARY", "TRANSACTION TYPE  PAID IN  PAID OUT"], &[]]);
        assert_eq!(out, ParseOutput::default());
    }

    // ── warnings ──────────────────────────────────────────────────────────────

    #[test]
    fn two_digit_year_warns() {
        let pages = [PageText::from_lines(1, &["TXN010  05/01/24  FEE  Completed  -5.00  100.00"])];
        let locale = StatementLocale { date_format: "%d/%m/%Y".to_string(), ..StatementLocale::default() };
        let out = parse_lines(&pages, &locale);
        assert_eq!(out.warnings[0].kind, ParseWarningKind::AmbiguousYear);

        let pages = [PageText::from_lines(1, &["TXN010  05/01/2024  FEE  Completed  -5.00  100.00"])];
        let out = parse_lines(&pages, &locale);
        assert_eq!(out.lines[0].timestamp.date().day(), 5);
        assert_eq!(out.lines[0].timestamp.date().month(), 1);
    }

    #[test]
    fn month_name_dates() {
        let pages = [PageText::from_lines(1, &[
            "TXN040  05 Jan 2024 10:00:00  FEE  Completed  -5.00  100.00",
            "TXN041  2024-01-06 10:00:00  FEE  Completed  -5.00  95.00",
        ])];
        let locale = StatementLocale { date_format: "%d %b %Y".to_string(), ..StatementLocale::default() };
        let out = parse_lines(&pages, &locale);
        assert_eq!(out.lines.len(), 1);
        let ts = out.lines[0].timestamp;
        assert_eq!((ts.date().month(), ts.date().day(), ts.hour()), (1, 5, 10));
        assert_eq!(out.lines[0].description, "FEE");
        // A row dated in another format is reported, not folded into the row above.
        assert_eq!(out.warnings[0].transaction_id, "TXN041");
        assert_eq!(out.warnings[0].kind, ParseWarningKind::InvalidTimestamp);
    }

    #[test]
    fn missing_and_conflicting_amounts_warn() {
        let out = parse(&[&[
            "TXN020  2024-01-05  FEE  Completed  100.00",
            "TXN021  2024-01-05  FEE  Completed  10.00  -5.00  100.00",
            "TXN022  2024-01-05  FEE  Completed  0.00  100.00",
            "TXN023  2024-02-30  FEE  Completed  -1.00  100.00",
        ]]);
        assert!(out.lines.is_empty());
        let kinds: Vec<&ParseWarningKind> = out.warnings.iter().map(|w| &w.kind).collect();
        assert_eq!(kinds[0], &ParseWarningKind::MissingAmounts { found: 1 });
        assert!(matches!(kinds[1], ParseWarningKind::AmountConflict(AmountConflict::BothSides { .. })));
        assert_eq!(kinds[2], &ParseWarningKind::AmountConflict(AmountConflict::NoAmount));
        assert_eq!(kinds[3], &ParseWarningKind::InvalidTimestamp);
    }

    #[test]
    fn comma_decimal_locale() {
        let pages = [PageText::from_lines(1, &["TXN030  05.01.2024 10:00  FEE  Completed  -1.250,50  8.749,50"])];
        let locale = StatementLocale {
            date_format: "%d.%m.%Y".to_string(),
            decimal_separator: ',',
            thousands_separator: '.',
        };
        let out = parse_lines(&pages, &locale);
        assert_eq!(out.lines[0].paid_out, Money::from_cents(125_050));
        assert_eq!(out.lines[0].balance, Money::from_cents(874_950));
    }
}
