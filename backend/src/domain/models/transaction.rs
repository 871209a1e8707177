//! Transaction models for the deletion path.

use chrono::NaiveDate;

use crate::domain::models::period_balance::{Bucket, PaymentMethod};
use crate::error::LedgerError;

/// What kind of row a deletion targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    Expense,
    Income,
    Bill,
}

impl TransactionKind {
    pub fn parse(value: &str) -> Result<Self, LedgerError> {
        match value.to_ascii_lowercase().as_str() {
            "expense" => Ok(TransactionKind::Expense),
            "income" => Ok(TransactionKind::Income),
            "bill" => Ok(TransactionKind::Bill),
            other => Err(LedgerError::validation(format!(
                "unsupported transaction type: {}",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Expense => "expense",
            TransactionKind::Income => "income",
            TransactionKind::Bill => "bill",
        }
    }

    /// The accumulator bucket this kind of transaction feeds.
    pub fn bucket(self) -> Bucket {
        match self {
            TransactionKind::Expense => Bucket::Expense,
            TransactionKind::Income => Bucket::Income,
            TransactionKind::Bill => Bucket::Bill,
        }
    }
}

/// Everything the reversal logic needs to know about a transaction before
/// the row disappears.
#[derive(Debug, Clone)]
pub struct TransactionDetails {
    pub id: i64,
    pub user_id: String,
    pub amount: f64,
    pub date: NaiveDate,
    pub payment_method: PaymentMethod,
    /// Set for expenses created by a bill payment, and for bill-due items.
    pub bill_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing_is_case_insensitive() {
        assert_eq!(TransactionKind::parse("Expense").unwrap(), TransactionKind::Expense);
        assert_eq!(TransactionKind::parse("INCOME").unwrap(), TransactionKind::Income);
        assert_eq!(TransactionKind::parse("bill").unwrap(), TransactionKind::Bill);
        assert!(TransactionKind::parse("transfer").is_err());
    }
}
