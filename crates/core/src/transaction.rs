use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::money::Money;

/// Where a row started in the extracted statement text (1-based).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinePosition {
    pub page: usize,
    pub line: usize,
}

impl fmt::Display for LinePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {}, line {}", self.page, self.line)
    }
}

/// One statement row as printed, before classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStatementLine {
    pub transaction_id: String,
    /// Statement-local time; the statement carries no timezone.
    pub timestamp: NaiveDateTime,
    pub description: String,
    pub paid_in: Money,
    pub paid_out: Money,
    pub balance: Money,
    pub position: LinePosition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum AmountConflict {
    #[error("both paid in ({paid_in}) and withdrawn ({paid_out}) are set")]
    BothSides { paid_in: Money, paid_out: Money },
    #[error("neither paid in nor withdrawn is set")]
    NoAmount,
    #[error("negative amount column: {0}")]
    Negative(Money),
}

impl RawStatementLine {
    /// Collapses the paid in / withdrawn columns into a direction and a positive magnitude.
    pub fn direction(&self) -> Result<(Direction, Money), AmountConflict> {
        for side in [self.paid_in, self.paid_out] {
            if side.is_negative() {
                return Err(AmountConflict::Negative(side));
            }
        }
        match (self.paid_in.is_zero(), self.paid_out.is_zero()) {
            (false, true) => Ok((Direction::Credit, self.paid_in)),
            (true, false) => Ok((Direction::Debit, self.paid_out)),
            (true, true) => Err(AmountConflict::NoAmount),
            (false, false) => Err(AmountConflict::BothSides {
                paid_in: self.paid_in,
                paid_out: self.paid_out,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionCategory {
    MerchantPayment,
    PayBill,
    SendMoney,
    ReceiveMoney,
    CashWithdrawal,
    Airtime,
    Unclassified,
}

impl TransactionCategory {
    /// The six analysable categories, in display order.
    pub const CLASSIFIED: [TransactionCategory; 6] = [
        TransactionCategory::MerchantPayment,
        TransactionCategory::PayBill,
        TransactionCategory::SendMoney,
        TransactionCategory::ReceiveMoney,
        TransactionCategory::CashWithdrawal,
        TransactionCategory::Airtime,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TransactionCategory::MerchantPayment => "Merchant Payment",
            TransactionCategory::PayBill => "PayBill",
            TransactionCategory::SendMoney => "Send Money",
            TransactionCategory::ReceiveMoney => "Receive Money",
            TransactionCategory::CashWithdrawal => "Cash Withdrawal",
            TransactionCategory::Airtime => "Airtime",
            TransactionCategory::Unclassified => "Unclassified",
        }
    }
}

impl fmt::Display for TransactionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl std::str::FromStr for TransactionCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match key.as_str() {
            "merchantpayment" | "buygoods" => Ok(TransactionCategory::MerchantPayment),
            "paybill" => Ok(TransactionCategory::PayBill),
            "sendmoney" => Ok(TransactionCategory::SendMoney),
            "receivemoney" => Ok(TransactionCategory::ReceiveMoney),
            "cashwithdrawal" => Ok(TransactionCategory::CashWithdrawal),
            "airtime" => Ok(TransactionCategory::Airtime),
            "unclassified" => Ok(TransactionCategory::Unclassified),
            _ => Err(format!("Unknown transaction category: '{s}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Debit,
    Credit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterpartyKind {
    Individual,
    Business,
    #[default]
    Unknown,
}

/// What the classifier decided about one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: TransactionCategory,
    pub counterparty: String,
    pub counterparty_kind: CounterpartyKind,
    /// PayBill account reference, when the description carries one.
    pub account: Option<String>,
    /// The row is the operator's fee for a transaction of `category`.
    pub charge: bool,
}

impl Classification {
    pub fn unclassified() -> Self {
        Classification {
            category: TransactionCategory::Unclassified,
            counterparty: String::new(),
            counterparty_kind: CounterpartyKind::Unknown,
            account: None,
            charge: false,
        }
    }
}

/// A classified statement row. `amount` is always positive; `direction` carries the sign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub timestamp: NaiveDateTime,
    pub description: String,
    pub paid_in: Money,
    pub paid_out: Money,
    pub balance: Money,
    pub position: LinePosition,
    pub category: TransactionCategory,
    pub counterparty: String,
    pub counterparty_kind: CounterpartyKind,
    pub account: Option<String>,
    pub charge: bool,
    pub direction: Direction,
    pub amount: Money,
}

impl Transaction {
    pub fn new(raw: RawStatementLine, class: Classification) -> Result<Self, AmountConflict> {
        let (direction, amount) = raw.direction()?;
        Ok(Transaction {
            transaction_id: raw.transaction_id,
            timestamp: raw.timestamp,
            description: raw.description,
            paid_in: raw.paid_in,
            paid_out: raw.paid_out,
            balance: raw.balance,
            position: raw.position,
            category: class.category,
            counterparty: class.counterparty,
            counterparty_kind: class.counterparty_kind,
            account: class.account,
            charge: class.charge,
            direction,
            amount,
        })
    }

    /// `paid_in - paid_out`: the change this row makes to the running balance.
    pub fn signed_amount(&self) -> Money {
        self.paid_in - self.paid_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn raw(paid_in: i64, paid_out: i64) -> RawStatementLine {
        RawStatementLine {
            transaction_id: "TXN001".to_string(),
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 5)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            description: "PAYMENT TO ABC STORES".to_string(),
            paid_in: Money::from_cents(paid_in),
            paid_out: Money::from_cents(paid_out),
            balance: Money::from_cents(950_000),
            position: LinePosition { page: 1, line: 3 },
        }
    }

    #[test]
    fn direction_debit_when_paid_out() {
        let (dir, amount) = raw(0, 50_000).direction().unwrap();
        assert_eq!(dir, Direction::Debit);
        assert_eq!(amount, Money::from_cents(50_000));
    }

    #[test]
    fn direction_credit_when_paid_in() {
        let (dir, _) = raw(100, 0).direction().unwrap();
        assert_eq!(dir, Direction::Credit);
    }

    #[test]
    fn direction_rejects_both_or_neither() {
        assert!(matches!(raw(100, 100).direction(), Err(AmountConflict::BothSides { .. })));
        assert_eq!(raw(0, 0).direction(), Err(AmountConflict::NoAmount));
        assert!(matches!(raw(-100, 0).direction(), Err(AmountConflict::Negative(_))));
    }

    #[test]
    fn transaction_new_collapses_amounts() {
        let class = Classification {
            category: TransactionCategory::MerchantPayment,
            counterparty: "ABC STORES".to_string(),
            ..Classification::unclassified()
        };
        let tx = Transaction::new(raw(0, 50_000), class).unwrap();
        assert_eq!(tx.direction, Direction::Debit);
        assert_eq!(tx.amount, Money::from_cents(50_000));
        assert_eq!(tx.signed_amount(), Money::from_cents(-50_000));
        assert_eq!(tx.category, TransactionCategory::MerchantPayment);
    }

    #[test]
    fn category_parse_and_display() {
        use std::str::FromStr;
        for cat in TransactionCategory::CLASSIFIED {
            assert_eq!(TransactionCategory::from_str(cat.label()).unwrap(), cat);
        }
        assert_eq!(
            TransactionCategory::from_str("pay_bill").unwrap(),
            TransactionCategory::PayBill
        );
        assert!(TransactionCategory::from_str("groceries").is_err());
    }
}
