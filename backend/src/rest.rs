//! HTTP surface: thin axum handlers over the domain services.
//!
//! Handlers validate nothing beyond presence — the services own the rules —
//! and translate the domain error taxonomy onto status codes.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::error;

use shared::{
    AddBillRequest, ApiResponse, BillDto, BillPaymentEntry, BillPaymentStatusResponse,
    DeleteBillRequest, DeleteTransactionRequest, PayBillRequest, PayBillResponse,
    UpdateBillRequest, UserLocaleData,
};

use crate::db::DbConnection;
use crate::domain::bill_service::{
    AddBillCommand, BillPaymentStatus, BillService, PayBillCommand, PayBillOutcome,
    UpdateBillCommand,
};
use crate::domain::models::bill::Bill;
use crate::domain::models::transaction::TransactionKind;
use crate::domain::transaction_service::TransactionService;
use crate::error::LedgerError;
use crate::storage::UserRepository;

pub struct AppState {
    pub db: DbConnection,
    pub bills: BillService,
    pub transactions: TransactionService,
    pub users: UserRepository,
}

impl AppState {
    pub fn new(db: DbConnection) -> Self {
        Self {
            bills: BillService::new(db.clone()),
            transactions: TransactionService::new(db.clone()),
            users: UserRepository::new(db.clone()),
            db,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/bills", get(fetch_bills))
        .route("/bills/add", post(add_bill))
        .route("/bills/pay", post(pay_bill))
        .route("/bills/payment-status", get(payment_status))
        .route("/bills/update", post(update_bill))
        .route("/bills/delete", post(delete_bill))
        .route("/transactions/delete", post(delete_transaction))
        .route("/user_locale/get", get(user_locale))
        .with_state(state)
}

/// Domain errors rendered as the standard envelope.
pub struct ApiError(LedgerError);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            LedgerError::Validation(message) => (StatusCode::BAD_REQUEST, message.clone()),
            LedgerError::NotFound(message) => (StatusCode::NOT_FOUND, message.clone()),
            LedgerError::MalformedPeriodKey { .. } => {
                (StatusCode::BAD_REQUEST, self.0.to_string())
            }
            LedgerError::Storage(err) => {
                error!("Database error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
        };
        (status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}

fn bill_to_dto(bill: Bill) -> BillDto {
    BillDto {
        id: bill.id,
        user_id: bill.user_id,
        name: bill.name,
        amount: bill.amount,
        due_date: bill.due_date,
        start_date: bill.start_date.format("%Y-%m-%d").to_string(),
        payment_day: bill.payment_day,
        duration_months: bill.duration_months,
        regularity: bill.regularity,
        paid: bill.paid,
        overdue: bill.overdue,
        overdue_days: bill.overdue_days,
        recurring: bill.recurring,
        category: bill.category,
        icon: bill.icon,
        payment_method: bill.payment_method.as_str().to_string(),
        created_at: bill.created_at,
        updated_at: bill.updated_at,
    }
}

fn outcome_to_dto(outcome: PayBillOutcome) -> PayBillResponse {
    PayBillResponse {
        bill_id: outcome.bill_id,
        user_id: outcome.user_id,
        year_month: outcome.year_month,
        payment_date: outcome.payment_date,
        amount: outcome.amount,
        payment_method: outcome.payment_method.as_str().to_string(),
        bill_fully_paid: outcome.bill_fully_paid,
        remaining_payments: outcome.remaining_payments,
    }
}

fn status_to_dto(status: BillPaymentStatus) -> BillPaymentStatusResponse {
    BillPaymentStatusResponse {
        bill_id: status.bill.id,
        bill_name: status.bill.name.clone(),
        bill_amount: status.bill.amount,
        duration_months: status.bill.duration_months,
        total_payments: status.total_payments,
        paid_payments: status.paid_payments,
        remaining_payments: status.total_payments - status.paid_payments,
        fully_paid: status.total_payments > 0 && status.paid_payments >= status.total_payments,
        payments: status
            .payments
            .into_iter()
            .map(|payment| BillPaymentEntry {
                year_month: payment.year_month,
                paid: payment.paid,
                payment_date: payment.payment_date,
            })
            .collect(),
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    match state.db.ping().await {
        Ok(()) => Json(ApiResponse::ok(
            "budget-ledger backend is healthy",
            serde_json::json!({ "status": "healthy" }),
        ))
        .into_response(),
        Err(err) => {
            error!("Health check failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::error("Database connection failed")),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct FetchBillsQuery {
    user_id: String,
    #[serde(default)]
    period: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

async fn fetch_bills(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FetchBillsQuery>,
) -> Result<Json<ApiResponse<Vec<BillDto>>>, ApiError> {
    let bills = match (&query.period, &query.date) {
        (Some(period), Some(date)) if !period.is_empty() && !date.is_empty() => {
            state.bills.fetch_bills_for_period(&query.user_id, date).await?
        }
        _ => state.bills.fetch_bills(&query.user_id).await?,
    };
    Ok(Json(ApiResponse::ok(
        "Bills fetched successfully",
        bills.into_iter().map(bill_to_dto).collect(),
    )))
}

async fn add_bill(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddBillRequest>,
) -> Result<Json<ApiResponse<BillDto>>, ApiError> {
    let bill = state
        .bills
        .add_bill(AddBillCommand {
            user_id: request.user_id,
            name: request.name,
            amount: request.amount,
            due_date: request.due_date,
            start_date: request.start_date,
            payment_day: request.payment_day,
            duration_months: request.duration_months,
            regularity: request.regularity,
            category: request.category,
            icon: request.icon,
            payment_method: request.payment_method,
        })
        .await?;
    Ok(Json(ApiResponse::ok(
        "Bill added successfully",
        bill_to_dto(bill),
    )))
}

async fn pay_bill(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PayBillRequest>,
) -> Result<Json<ApiResponse<PayBillResponse>>, ApiError> {
    let outcome = state
        .bills
        .pay_bill(PayBillCommand {
            user_id: request.user_id,
            bill_id: request.bill_id,
            year_month: request.year_month,
            payment_date: request.payment_date,
        })
        .await?;
    Ok(Json(ApiResponse::ok(
        "Bill payment processed successfully",
        outcome_to_dto(outcome),
    )))
}

#[derive(Debug, Deserialize)]
struct PaymentStatusQuery {
    bill_id: i64,
    user_id: String,
}

async fn payment_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PaymentStatusQuery>,
) -> Result<Json<ApiResponse<BillPaymentStatusResponse>>, ApiError> {
    let status = state.bills.payment_status(query.bill_id, &query.user_id).await?;
    Ok(Json(ApiResponse::ok(
        "Payment status retrieved successfully",
        status_to_dto(status),
    )))
}

async fn update_bill(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateBillRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    state
        .bills
        .update_bill(UpdateBillCommand {
            user_id: request.user_id.clone(),
            bill_id: request.bill_id,
            name: request.name,
            amount: request.amount,
            start_date: request.start_date,
            payment_day: request.payment_day,
            duration_months: request.duration_months,
            regularity: request.regularity,
            category: request.category,
            icon: request.icon,
            payment_method: request.payment_method,
        })
        .await?;
    Ok(Json(ApiResponse::ok(
        "Bill updated successfully",
        serde_json::json!({
            "bill_id": request.bill_id,
            "user_id": request.user_id,
            "status": "updated",
        }),
    )))
}

async fn delete_bill(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeleteBillRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    state.bills.delete_bill(&request.user_id, request.bill_id).await?;
    Ok(Json(ApiResponse::ok(
        "Bill deleted successfully",
        serde_json::json!({
            "bill_id": request.bill_id,
            "user_id": request.user_id,
            "status": "deleted",
        }),
    )))
}

async fn delete_transaction(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeleteTransactionRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let kind = TransactionKind::parse(&request.transaction_type)?;
    state
        .transactions
        .delete_transaction(&request.user_id, request.transaction_id, kind)
        .await?;
    Ok(Json(ApiResponse {
        success: true,
        message: "Transaction deleted successfully".to_string(),
        data: None,
    }))
}

#[derive(Debug, Deserialize)]
struct LocaleQuery {
    user_id: String,
}

async fn user_locale(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LocaleQuery>,
) -> Result<Json<ApiResponse<UserLocaleData>>, ApiError> {
    if query.user_id.is_empty() || query.user_id == "null" {
        return Err(LedgerError::validation("Valid user ID is required").into());
    }
    if !state.users.exists(&query.user_id).await? {
        return Err(LedgerError::not_found("User not found").into());
    }
    let locale = state
        .users
        .locale(&query.user_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("No locale set for user"))?;
    Ok(Json(ApiResponse::ok(
        "User locale retrieved successfully",
        UserLocaleData {
            user_id: query.user_id,
            locale,
        },
    )))
}
