//! Wire types shared between the budget-ledger backend and its clients.
//!
//! Every endpoint answers with the same `{success, message, data}` envelope,
//! so clients can always deserialize `ApiResponse<T>` first and inspect the
//! payload second.

use serde::{Deserialize, Serialize};

/// Standard response envelope used by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

/// A bill as returned to clients.
///
/// `paid`/`overdue`/`overdue_days` are period-specific when the bill was
/// fetched for a concrete month, and lifetime flags otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillDto {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub amount: f64,
    pub due_date: String,
    pub start_date: String,
    pub payment_day: u32,
    pub duration_months: u32,
    pub regularity: String,
    pub paid: bool,
    pub overdue: bool,
    pub overdue_days: i64,
    pub recurring: bool,
    pub category: String,
    pub icon: String,
    pub payment_method: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddBillRequest {
    pub user_id: String,
    pub name: String,
    pub amount: f64,
    pub due_date: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub payment_day: Option<u32>,
    #[serde(default)]
    pub duration_months: Option<u32>,
    #[serde(default)]
    pub regularity: Option<String>,
    pub category: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
}

/// Partial update: absent fields keep their stored values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateBillRequest {
    pub user_id: String,
    pub bill_id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub payment_day: Option<u32>,
    #[serde(default)]
    pub duration_months: Option<u32>,
    #[serde(default)]
    pub regularity: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteBillRequest {
    pub user_id: String,
    pub bill_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayBillRequest {
    pub user_id: String,
    pub bill_id: i64,
    /// Month being paid, `YYYY-MM`.
    pub year_month: String,
    /// `YYYY-MM-DD`; defaults to the current date when omitted.
    #[serde(default)]
    pub payment_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayBillResponse {
    pub bill_id: i64,
    pub user_id: String,
    pub year_month: String,
    pub payment_date: String,
    pub amount: f64,
    pub payment_method: String,
    pub bill_fully_paid: bool,
    pub remaining_payments: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillPaymentEntry {
    pub year_month: String,
    pub paid: bool,
    pub payment_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillPaymentStatusResponse {
    pub bill_id: i64,
    pub bill_name: String,
    pub bill_amount: f64,
    pub duration_months: u32,
    pub total_payments: i64,
    pub paid_payments: i64,
    pub remaining_payments: i64,
    pub fully_paid: bool,
    pub payments: Vec<BillPaymentEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteTransactionRequest {
    pub user_id: String,
    pub transaction_id: i64,
    /// One of "expense", "income", "bill".
    pub transaction_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserLocaleData {
    pub user_id: String,
    pub locale: String,
}
