//! The persisted per-period aggregate record and the bucket/method column
//! mapping used to address it.
//!
//! Every mutation picks its accumulator column through the enumerated
//! mappings below; identifiers are never assembled from request data.

use crate::error::LedgerError;

/// How money moved: physical cash or a bank account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    Cash,
    Bank,
}

impl PaymentMethod {
    /// Parse the wire representation, rejecting anything but "cash"/"bank".
    pub fn parse(value: &str) -> Result<Self, LedgerError> {
        match value {
            "cash" => Ok(PaymentMethod::Cash),
            "bank" => Ok(PaymentMethod::Bank),
            other => Err(LedgerError::validation(format!(
                "invalid payment method '{}', expected 'cash' or 'bank'",
                other
            ))),
        }
    }

    /// Lenient variant for stored rows: anything that isn't "cash" is
    /// treated as bank, matching how the tables were historically filled.
    pub fn from_stored(value: &str) -> Self {
        if value == "cash" {
            PaymentMethod::Cash
        } else {
            PaymentMethod::Bank
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Bank => "bank",
        }
    }

    /// Current-period net position column.
    pub fn current_column(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash_amount",
            PaymentMethod::Bank => "bank_amount",
        }
    }

    pub fn balance_column(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "balance_cash_amount",
            PaymentMethod::Bank => "balance_bank_amount",
        }
    }

    /// Carried-forward position column.
    pub fn previous_column(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "previous_cash_amount",
            PaymentMethod::Bank => "previous_bank_amount",
        }
    }
}

/// Which accumulator a movement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Income,
    Expense,
    Bill,
}

impl Bucket {
    /// The accumulator column for this bucket and payment method.
    pub fn column(self, method: PaymentMethod) -> &'static str {
        match (self, method) {
            (Bucket::Income, PaymentMethod::Cash) => "income_cash_amount",
            (Bucket::Income, PaymentMethod::Bank) => "income_bank_amount",
            (Bucket::Expense, PaymentMethod::Cash) => "expense_cash_amount",
            (Bucket::Expense, PaymentMethod::Bank) => "expense_bank_amount",
            (Bucket::Bill, PaymentMethod::Cash) => "bill_cash_amount",
            (Bucket::Bill, PaymentMethod::Bank) => "bill_bank_amount",
        }
    }
}

/// Full balance row for one (user, period), as read back from any of the six
/// granularity tables with the period column aliased to `period_key`.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PeriodBalance {
    pub user_id: String,
    pub period_key: String,
    pub income_cash_amount: f64,
    pub income_bank_amount: f64,
    pub expense_cash_amount: f64,
    pub expense_bank_amount: f64,
    pub bill_cash_amount: f64,
    pub bill_bank_amount: f64,
    pub cash_amount: f64,
    pub bank_amount: f64,
    pub previous_cash_amount: f64,
    pub previous_bank_amount: f64,
    pub balance_cash_amount: f64,
    pub balance_bank_amount: f64,
    pub total_previous_balance: f64,
    pub total_balance: f64,
}

/// Per-period movement totals, the cascade's input.
#[derive(Debug, Clone, Copy, Default, sqlx::FromRow)]
pub struct PeriodFlows {
    pub income_cash_amount: f64,
    pub income_bank_amount: f64,
    pub expense_cash_amount: f64,
    pub expense_bank_amount: f64,
    pub bill_cash_amount: f64,
    pub bill_bank_amount: f64,
}

/// The ending position of a period, carried into its successor.
#[derive(Debug, Clone, Copy, Default, sqlx::FromRow)]
pub struct CarriedBalances {
    pub cash_amount: f64,
    pub bank_amount: f64,
    pub total_balance: f64,
}

/// The eight derived columns the cascade persists for each period.
#[derive(Debug, Clone, Copy, Default)]
pub struct CascadedTotals {
    pub cash_amount: f64,
    pub bank_amount: f64,
    pub balance_cash_amount: f64,
    pub balance_bank_amount: f64,
    pub total_balance: f64,
    pub previous_cash_amount: f64,
    pub previous_bank_amount: f64,
    pub total_previous_balance: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_column_mapping_is_exhaustive() {
        assert_eq!(Bucket::Income.column(PaymentMethod::Cash), "income_cash_amount");
        assert_eq!(Bucket::Income.column(PaymentMethod::Bank), "income_bank_amount");
        assert_eq!(Bucket::Expense.column(PaymentMethod::Cash), "expense_cash_amount");
        assert_eq!(Bucket::Expense.column(PaymentMethod::Bank), "expense_bank_amount");
        assert_eq!(Bucket::Bill.column(PaymentMethod::Cash), "bill_cash_amount");
        assert_eq!(Bucket::Bill.column(PaymentMethod::Bank), "bill_bank_amount");
    }

    #[test]
    fn test_payment_method_parsing() {
        assert_eq!(PaymentMethod::parse("cash").unwrap(), PaymentMethod::Cash);
        assert_eq!(PaymentMethod::parse("bank").unwrap(), PaymentMethod::Bank);
        assert!(PaymentMethod::parse("card").is_err());
        assert_eq!(PaymentMethod::from_stored("cheque"), PaymentMethod::Bank);
    }
}
