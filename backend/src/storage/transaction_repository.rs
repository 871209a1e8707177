//! Expense and income rows, and the kind-dispatched lookups the deletion
//! path needs.

use std::collections::HashSet;

use chrono::NaiveDate;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::db::DbConnection;
use crate::domain::models::period_balance::PaymentMethod;
use crate::domain::models::transaction::{TransactionDetails, TransactionKind};
use crate::domain::period::parse_stored_date;
use crate::error::{LedgerError, Result};

#[derive(Clone)]
pub struct TransactionRepository {
    db: DbConnection,
}

impl TransactionRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    fn pool(&self) -> &SqlitePool {
        self.db.pool()
    }

    /// Insert an expense inside the caller's transaction (the pay path).
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_expense_tx(
        &self,
        conn: &mut SqliteConnection,
        user_id: &str,
        amount: f64,
        date: &str,
        category: &str,
        method: PaymentMethod,
        description: &str,
        bill_id: Option<i64>,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO expenses (user_id, amount, date, category, payment_method, description, bill_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(amount)
        .bind(date)
        .bind(category)
        .bind(method.as_str())
        .bind(description)
        .bind(bill_id)
        .execute(conn)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn insert_expense(
        &self,
        user_id: &str,
        amount: f64,
        date: NaiveDate,
        method: PaymentMethod,
        bill_id: Option<i64>,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO expenses (user_id, amount, date, payment_method, bill_id) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(amount)
        .bind(date.format("%Y-%m-%d").to_string())
        .bind(method.as_str())
        .bind(bill_id)
        .execute(self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn insert_income(
        &self,
        user_id: &str,
        amount: f64,
        date: NaiveDate,
        method: PaymentMethod,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO incomes (user_id, amount, date, payment_method) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(amount)
        .bind(date.format("%Y-%m-%d").to_string())
        .bind(method.as_str())
        .execute(self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Distinct `YYYY-MM` months in which a bill has linked expense rows.
    pub async fn months_with_bill_expenses(
        &self,
        bill_id: i64,
        user_id: &str,
    ) -> Result<HashSet<String>> {
        let rows = sqlx::query(
            "SELECT DISTINCT strftime('%Y-%m', date) AS year_month \
             FROM expenses WHERE bill_id = ? AND user_id = ?",
        )
        .bind(bill_id)
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.iter().map(|row| row.get("year_month")).collect())
    }

    /// Adjust the amount of every expense a bill created in one month.
    pub async fn adjust_bill_expense_amounts(
        &self,
        bill_id: i64,
        user_id: &str,
        year_month: &str,
        delta: f64,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE expenses SET amount = amount + ? \
             WHERE bill_id = ? AND user_id = ? AND strftime('%Y-%m', date) = ?",
        )
        .bind(delta)
        .bind(bill_id)
        .bind(user_id)
        .bind(year_month)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    /// Fetch the details the reversal logic needs, dispatched by kind.
    /// Bill-due items read the bill row itself: the due (or start) date and
    /// the bill's own payment method.
    pub async fn fetch_details(
        &self,
        transaction_id: i64,
        kind: TransactionKind,
        user_id: &str,
    ) -> Result<TransactionDetails> {
        let not_found = || {
            LedgerError::not_found(format!(
                "no {} transaction found with ID {} for user {}",
                kind.as_str(),
                transaction_id,
                user_id
            ))
        };

        let row = match kind {
            TransactionKind::Expense => sqlx::query(
                "SELECT id, user_id, amount, date, COALESCE(payment_method, 'cash') AS payment_method, \
                        bill_id \
                 FROM expenses WHERE id = ? AND user_id = ?",
            ),
            TransactionKind::Income => sqlx::query(
                "SELECT id, user_id, amount, date, COALESCE(payment_method, 'cash') AS payment_method, \
                        NULL AS bill_id \
                 FROM incomes WHERE id = ? AND user_id = ?",
            ),
            TransactionKind::Bill => sqlx::query(
                "SELECT id, user_id, amount, COALESCE(due_date, start_date) AS date, \
                        COALESCE(payment_method, 'bank') AS payment_method, id AS bill_id \
                 FROM bills WHERE id = ? AND user_id = ?",
            ),
        }
        .bind(transaction_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(not_found)?;

        Ok(TransactionDetails {
            id: row.get("id"),
            user_id: row.get("user_id"),
            amount: row.get("amount"),
            date: parse_stored_date(row.get::<String, _>("date").as_str())?,
            payment_method: PaymentMethod::from_stored(
                row.get::<String, _>("payment_method").as_str(),
            ),
            bill_id: row.get("bill_id"),
        })
    }

    /// Delete the backing row for a transaction. NotFound when nothing
    /// matched.
    pub async fn delete(
        &self,
        transaction_id: i64,
        kind: TransactionKind,
        user_id: &str,
    ) -> Result<()> {
        let sql = match kind {
            TransactionKind::Expense => "DELETE FROM expenses WHERE id = ? AND user_id = ?",
            TransactionKind::Income => "DELETE FROM incomes WHERE id = ? AND user_id = ?",
            TransactionKind::Bill => "DELETE FROM bills WHERE id = ? AND user_id = ?",
        };
        let result = sqlx::query(sql)
            .bind(transaction_id)
            .bind(user_id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::not_found(format!(
                "no transaction found with ID {} for user {}",
                transaction_id, user_id
            )));
        }
        Ok(())
    }

    pub async fn expense_exists(&self, expense_id: i64, user_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT id FROM expenses WHERE id = ? AND user_id = ?")
            .bind(expense_id)
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.is_some())
    }
}
