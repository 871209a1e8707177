//! Bills and their per-month payment records.

use std::collections::HashMap;

use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};

use crate::db::DbConnection;
use crate::domain::models::bill::{Bill, BillPayment, NewBill};
use crate::domain::models::period_balance::PaymentMethod;
use crate::domain::period::{covered_months, parse_stored_date};
use crate::error::{LedgerError, Result};

const BILL_COLUMNS: &str = "id, user_id, name, amount, \
     COALESCE(due_date, start_date) AS due_date, start_date, payment_day, \
     duration_months, regularity, paid, overdue, overdue_days, recurring, \
     category, icon, COALESCE(payment_method, 'cash') AS payment_method, \
     COALESCE(created_at, '') AS created_at, COALESCE(updated_at, '') AS updated_at";

#[derive(Clone)]
pub struct BillRepository {
    db: DbConnection,
}

impl BillRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    fn pool(&self) -> &SqlitePool {
        self.db.pool()
    }

    fn row_to_bill(row: &SqliteRow) -> Result<Bill> {
        Ok(Bill {
            id: row.get("id"),
            user_id: row.get("user_id"),
            name: row.get("name"),
            amount: row.get("amount"),
            due_date: row.get("due_date"),
            start_date: parse_stored_date(row.get::<String, _>("start_date").as_str())?,
            payment_day: row.get::<i64, _>("payment_day") as u32,
            duration_months: row.get::<i64, _>("duration_months") as u32,
            regularity: row.get("regularity"),
            paid: row.get("paid"),
            overdue: row.get("overdue"),
            overdue_days: row.get("overdue_days"),
            recurring: row.get("recurring"),
            category: row.get("category"),
            icon: row.get("icon"),
            payment_method: PaymentMethod::from_stored(
                row.get::<String, _>("payment_method").as_str(),
            ),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    pub async fn insert(&self, bill: &NewBill) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO bills (user_id, name, amount, due_date, paid, overdue, overdue_days,
                               recurring, category, icon, start_date, payment_day,
                               duration_months, regularity, payment_method)
            VALUES (?, ?, ?, ?, 0, 0, 0, 1, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&bill.user_id)
        .bind(&bill.name)
        .bind(bill.amount)
        .bind(&bill.due_date)
        .bind(&bill.category)
        .bind(&bill.icon)
        .bind(bill.start_date.format("%Y-%m-%d").to_string())
        .bind(bill.payment_day as i64)
        .bind(bill.duration_months as i64)
        .bind(&bill.regularity)
        .bind(bill.payment_method.as_str())
        .execute(self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn fetch(&self, bill_id: i64, user_id: &str) -> Result<Option<Bill>> {
        let sql = format!("SELECT {BILL_COLUMNS} FROM bills WHERE id = ? AND user_id = ?");
        let row = sqlx::query(&sql)
            .bind(bill_id)
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(Self::row_to_bill).transpose()
    }

    pub async fn fetch_all(&self, user_id: &str) -> Result<Vec<Bill>> {
        let sql = format!("SELECT {BILL_COLUMNS} FROM bills WHERE user_id = ? ORDER BY id ASC");
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(Self::row_to_bill).collect()
    }

    /// Persist a merged set of bill fields (the service resolves partial
    /// updates against the stored row before calling this).
    pub async fn update(&self, bill: &Bill) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE bills
            SET name = ?, amount = ?, start_date = ?, payment_day = ?, duration_months = ?,
                regularity = ?, category = ?, icon = ?, payment_method = ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(&bill.name)
        .bind(bill.amount)
        .bind(bill.start_date.format("%Y-%m-%d").to_string())
        .bind(bill.payment_day as i64)
        .bind(bill.duration_months as i64)
        .bind(&bill.regularity)
        .bind(&bill.category)
        .bind(&bill.icon)
        .bind(bill.payment_method.as_str())
        .bind(bill.id)
        .bind(&bill.user_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn delete(&self, bill_id: i64, user_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM bills WHERE id = ? AND user_id = ?")
            .bind(bill_id)
            .bind(user_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn exists(&self, bill_id: i64, user_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT id FROM bills WHERE id = ? AND user_id = ?")
            .bind(bill_id)
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.is_some())
    }

    /// One unpaid payment record per covered month, in a single transaction.
    pub async fn create_payment_records(
        &self,
        bill_id: i64,
        start_date: chrono::NaiveDate,
        duration_months: u32,
        method: PaymentMethod,
    ) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        for month in covered_months(start_date, duration_months) {
            sqlx::query(
                "INSERT INTO bill_payments (bill_id, year_month, paid, payment_date, payment_method) \
                 VALUES (?, ?, 0, NULL, ?)",
            )
            .bind(bill_id)
            .bind(&month)
            .bind(method.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Single unpaid record for a month appended by a duration change.
    pub async fn create_payment_record(
        &self,
        bill_id: i64,
        year_month: &str,
        method: PaymentMethod,
    ) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO bill_payments (bill_id, year_month, paid, payment_date, payment_method) \
             VALUES (?, ?, 0, NULL, ?)",
        )
        .bind(bill_id)
        .bind(year_month)
        .bind(method.as_str())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn payment_count(&self, bill_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM bill_payments WHERE bill_id = ?")
            .bind(bill_id)
            .fetch_one(self.pool())
            .await?;
        Ok(row.get("n"))
    }

    pub async fn payments(&self, bill_id: i64) -> Result<Vec<BillPayment>> {
        let rows = sqlx::query(
            "SELECT bill_id, year_month, paid, payment_date, payment_method \
             FROM bill_payments WHERE bill_id = ? ORDER BY year_month",
        )
        .bind(bill_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows
            .iter()
            .map(|row| BillPayment {
                bill_id: row.get("bill_id"),
                year_month: row.get("year_month"),
                paid: row.get("paid"),
                payment_date: row.get("payment_date"),
                payment_method: row.get("payment_method"),
            })
            .collect())
    }

    /// Paid flags for all of a user's bills in one month, keyed by bill id.
    pub async fn paid_flags_for_month(
        &self,
        user_id: &str,
        year_month: &str,
    ) -> Result<HashMap<i64, bool>> {
        let rows = sqlx::query(
            "SELECT bp.bill_id AS bill_id, bp.paid AS paid \
             FROM bill_payments bp \
             JOIN bills b ON b.id = bp.bill_id \
             WHERE b.user_id = ? AND bp.year_month = ?",
        )
        .bind(user_id)
        .bind(year_month)
        .fetch_all(self.pool())
        .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get::<i64, _>("bill_id"), row.get::<bool, _>("paid")))
            .collect())
    }

    pub async fn delete_payment(&self, bill_id: i64, year_month: &str) -> Result<()> {
        sqlx::query("DELETE FROM bill_payments WHERE bill_id = ? AND year_month = ?")
            .bind(bill_id)
            .bind(year_month)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn delete_payments(&self, bill_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM bill_payments WHERE bill_id = ?")
            .bind(bill_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn mark_payment_unpaid(&self, bill_id: i64, year_month: &str) -> Result<u64> {
        let result =
            sqlx::query("UPDATE bill_payments SET paid = 0 WHERE bill_id = ? AND year_month = ?")
                .bind(bill_id)
                .bind(year_month)
                .execute(self.pool())
                .await?;
        Ok(result.rows_affected())
    }

    // Transaction-scoped payment steps, used by the pay path.

    pub async fn payment_paid_flag(
        &self,
        conn: &mut SqliteConnection,
        bill_id: i64,
        year_month: &str,
    ) -> Result<Option<bool>> {
        let row = sqlx::query("SELECT paid FROM bill_payments WHERE bill_id = ? AND year_month = ?")
            .bind(bill_id)
            .bind(year_month)
            .fetch_optional(conn)
            .await?;
        Ok(row.map(|r| r.get("paid")))
    }

    pub async fn mark_payment_paid(
        &self,
        conn: &mut SqliteConnection,
        bill_id: i64,
        year_month: &str,
        payment_date: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE bill_payments SET paid = 1, payment_date = ? \
             WHERE bill_id = ? AND year_month = ?",
        )
        .bind(payment_date)
        .bind(bill_id)
        .bind(year_month)
        .execute(conn)
        .await?;
        if result.rows_affected() == 0 {
            return Err(LedgerError::not_found(format!(
                "payment record not found for bill {} in month {}",
                bill_id, year_month
            )));
        }
        Ok(())
    }

    /// (total, paid) payment counts for a bill.
    pub async fn payment_counts(
        &self,
        conn: &mut SqliteConnection,
        bill_id: i64,
    ) -> Result<(i64, i64)> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, \
                    COALESCE(SUM(CASE WHEN paid = 1 THEN 1 ELSE 0 END), 0) AS paid_count \
             FROM bill_payments WHERE bill_id = ?",
        )
        .bind(bill_id)
        .fetch_one(conn)
        .await?;
        Ok((row.get("total"), row.get("paid_count")))
    }

    pub async fn set_bill_paid(
        &self,
        conn: &mut SqliteConnection,
        bill_id: i64,
        user_id: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE bills SET paid = 1, updated_at = CURRENT_TIMESTAMP \
             WHERE id = ? AND user_id = ?",
        )
        .bind(bill_id)
        .bind(user_id)
        .execute(conn)
        .await?;
        Ok(())
    }
}
