//! Bill and bill-payment domain models.

use chrono::NaiveDate;

use crate::domain::models::period_balance::PaymentMethod;
use crate::domain::period::covered_months;

/// A recurring obligation projecting `duration_months` consecutive months
/// into the ledger starting at `start_date`.
#[derive(Debug, Clone, PartialEq)]
pub struct Bill {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub amount: f64,
    pub due_date: String,
    pub start_date: NaiveDate,
    pub payment_day: u32,
    pub duration_months: u32,
    pub regularity: String,
    pub paid: bool,
    pub overdue: bool,
    pub overdue_days: i64,
    pub recurring: bool,
    pub category: String,
    pub icon: String,
    pub payment_method: PaymentMethod,
    pub created_at: String,
    pub updated_at: String,
}

impl Bill {
    /// The `YYYY-MM` keys of every month this bill projects into.
    pub fn covered_months(&self) -> Vec<String> {
        covered_months(self.start_date, self.duration_months)
    }
}

/// Per-month payment-tracking record derived from a bill's duration.
#[derive(Debug, Clone, PartialEq)]
pub struct BillPayment {
    pub bill_id: i64,
    pub year_month: String,
    pub paid: bool,
    pub payment_date: Option<String>,
    pub payment_method: Option<String>,
}

/// Validated input for creating a bill.
#[derive(Debug, Clone)]
pub struct NewBill {
    pub user_id: String,
    pub name: String,
    pub amount: f64,
    pub due_date: String,
    pub start_date: NaiveDate,
    pub payment_day: u32,
    pub duration_months: u32,
    pub regularity: String,
    pub category: String,
    pub icon: String,
    pub payment_method: PaymentMethod,
}

/// Old and new values driving a bill update's ledger reconciliation.
#[derive(Debug, Clone)]
pub struct BillUpdate {
    pub bill_id: i64,
    pub user_id: String,
    pub old_amount: f64,
    pub new_amount: f64,
    pub old_start_date: NaiveDate,
    pub new_start_date: NaiveDate,
    pub old_duration_months: u32,
    pub new_duration_months: u32,
    pub old_payment_method: PaymentMethod,
    pub new_payment_method: PaymentMethod,
}
