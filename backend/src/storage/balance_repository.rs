//! Access to the six `{granularity}_cash_bank_balance` tables.
//!
//! Table and column identifiers come exclusively from the enumerated
//! [`Granularity`]/[`Bucket`]/[`PaymentMethod`] mappings; bind parameters
//! carry every value.

use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::warn;

use crate::db::DbConnection;
use crate::domain::models::period_balance::{
    Bucket, CarriedBalances, CascadedTotals, PaymentMethod, PeriodBalance, PeriodFlows,
};
use crate::domain::models::transaction::TransactionKind;
use crate::domain::period::Granularity;
use crate::error::Result;

/// Columns shared by all six balance tables, used when reading full rows.
const BALANCE_COLUMNS: &str = "income_cash_amount, income_bank_amount, \
     expense_cash_amount, expense_bank_amount, bill_cash_amount, bill_bank_amount, \
     cash_amount, bank_amount, previous_cash_amount, previous_bank_amount, \
     balance_cash_amount, balance_bank_amount, total_previous_balance, total_balance";

/// `total_balance` from in-period flows only, used by the single-period
/// reversal recompute.
const TOTAL_FROM_FLOWS: &str = "COALESCE(income_bank_amount, 0) + COALESCE(income_cash_amount, 0) \
     - COALESCE(expense_bank_amount, 0) - COALESCE(expense_cash_amount, 0) \
     - COALESCE(bill_bank_amount, 0) - COALESCE(bill_cash_amount, 0)";

#[derive(Clone)]
pub struct BalanceRepository {
    db: DbConnection,
}

impl BalanceRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    fn pool(&self) -> &SqlitePool {
        self.db.pool()
    }

    /// Lazily create the row for (user, period). Never overwrites an
    /// existing row's fields.
    pub async fn ensure_period_row(
        &self,
        user_id: &str,
        granularity: Granularity,
        period_key: &str,
    ) -> Result<()> {
        let sql = format!(
            "INSERT OR IGNORE INTO {} (user_id, {}) VALUES (?, ?)",
            granularity.table(),
            granularity.period_column()
        );
        sqlx::query(&sql)
            .bind(user_id)
            .bind(period_key)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Add `delta` to one accumulator bucket of one period, creating the row
    /// first if absent. Current/previous/total fields are left alone — they
    /// belong to the cascade.
    pub async fn apply_amount(
        &self,
        user_id: &str,
        granularity: Granularity,
        period_key: &str,
        bucket: Bucket,
        method: PaymentMethod,
        delta: f64,
    ) -> Result<()> {
        self.ensure_period_row(user_id, granularity, period_key)
            .await?;

        let column = bucket.column(method);
        let sql = format!(
            "UPDATE {table} SET {column} = {column} + ?, updated_at = CURRENT_TIMESTAMP \
             WHERE user_id = ? AND {period} = ?",
            table = granularity.table(),
            column = column,
            period = granularity.period_column()
        );
        sqlx::query(&sql)
            .bind(delta)
            .bind(user_id)
            .bind(period_key)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// All period keys ≥ `start_key` for this user, ascending.
    pub async fn period_keys_from(
        &self,
        user_id: &str,
        granularity: Granularity,
        start_key: &str,
    ) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT {period} AS period_key FROM {table} \
             WHERE user_id = ? AND {period} >= ? ORDER BY {period}",
            table = granularity.table(),
            period = granularity.period_column()
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(start_key)
            .fetch_all(self.pool())
            .await?;
        Ok(rows.iter().map(|row| row.get("period_key")).collect())
    }

    /// The latest period key strictly before `period_key`, if any.
    pub async fn latest_period_before(
        &self,
        user_id: &str,
        granularity: Granularity,
        period_key: &str,
    ) -> Result<Option<String>> {
        let sql = format!(
            "SELECT {period} AS period_key FROM {table} \
             WHERE user_id = ? AND {period} < ? ORDER BY {period} DESC LIMIT 1",
            table = granularity.table(),
            period = granularity.period_column()
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(period_key)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(|r| r.get("period_key")))
    }

    /// A period's ending position (current cash/bank and total balance).
    pub async fn carried_balances(
        &self,
        user_id: &str,
        granularity: Granularity,
        period_key: &str,
    ) -> Result<Option<CarriedBalances>> {
        let sql = format!(
            "SELECT cash_amount, bank_amount, total_balance FROM {table} \
             WHERE user_id = ? AND {period} = ?",
            table = granularity.table(),
            period = granularity.period_column()
        );
        let row = sqlx::query_as::<_, CarriedBalances>(&sql)
            .bind(user_id)
            .bind(period_key)
            .fetch_optional(self.pool())
            .await?;
        Ok(row)
    }

    /// A period's movement totals, the cascade's input.
    pub async fn period_flows(
        &self,
        user_id: &str,
        granularity: Granularity,
        period_key: &str,
    ) -> Result<Option<PeriodFlows>> {
        let sql = format!(
            "SELECT income_cash_amount, income_bank_amount, \
                    expense_cash_amount, expense_bank_amount, \
                    bill_cash_amount, bill_bank_amount \
             FROM {table} WHERE user_id = ? AND {period} = ?",
            table = granularity.table(),
            period = granularity.period_column()
        );
        let row = sqlx::query_as::<_, PeriodFlows>(&sql)
            .bind(user_id)
            .bind(period_key)
            .fetch_optional(self.pool())
            .await?;
        Ok(row)
    }

    /// Persist the eight derived columns computed by the cascade.
    pub async fn store_cascaded(
        &self,
        user_id: &str,
        granularity: Granularity,
        period_key: &str,
        totals: &CascadedTotals,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE {table} SET cash_amount = ?, bank_amount = ?, \
                 balance_cash_amount = ?, balance_bank_amount = ?, total_balance = ?, \
                 previous_cash_amount = ?, previous_bank_amount = ?, total_previous_balance = ?, \
                 updated_at = CURRENT_TIMESTAMP \
             WHERE user_id = ? AND {period} = ?",
            table = granularity.table(),
            period = granularity.period_column()
        );
        sqlx::query(&sql)
            .bind(totals.cash_amount)
            .bind(totals.bank_amount)
            .bind(totals.balance_cash_amount)
            .bind(totals.balance_bank_amount)
            .bind(totals.total_balance)
            .bind(totals.previous_cash_amount)
            .bind(totals.previous_bank_amount)
            .bind(totals.total_previous_balance)
            .bind(user_id)
            .bind(period_key)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Read a full balance row, mostly for assertions and diagnostics.
    pub async fn fetch_row(
        &self,
        user_id: &str,
        granularity: Granularity,
        period_key: &str,
    ) -> Result<Option<PeriodBalance>> {
        let sql = format!(
            "SELECT user_id, {period} AS period_key, {columns} \
             FROM {table} WHERE user_id = ? AND {period} = ?",
            table = granularity.table(),
            period = granularity.period_column(),
            columns = BALANCE_COLUMNS
        );
        let row = sqlx::query_as::<_, PeriodBalance>(&sql)
            .bind(user_id)
            .bind(period_key)
            .fetch_optional(self.pool())
            .await?;
        Ok(row)
    }

    async fn period_exists(
        &self,
        user_id: &str,
        granularity: Granularity,
        period_key: &str,
    ) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) AS n FROM {table} WHERE user_id = ? AND {period} = ?",
            table = granularity.table(),
            period = granularity.period_column()
        );
        let n: i64 = sqlx::query(&sql)
            .bind(user_id)
            .bind(period_key)
            .fetch_one(self.pool())
            .await?
            .get("n");
        Ok(n > 0)
    }

    /// Reverse a deleted transaction's contribution to a single period:
    /// subtract its bucket, and adjust the current/balance columns (incomes
    /// had increased them, expenses and bills had decreased them).
    /// `total_balance` is then re-derived from in-period flows alone.
    pub async fn reverse_single_period(
        &self,
        user_id: &str,
        granularity: Granularity,
        period_key: &str,
        kind: TransactionKind,
        method: PaymentMethod,
        amount: f64,
    ) -> Result<()> {
        if !self.period_exists(user_id, granularity, period_key).await? {
            warn!(
                "Period {} not found in {} for user {}",
                period_key,
                granularity.table(),
                user_id
            );
            return Ok(());
        }

        let bucket_column = kind.bucket().column(method);
        let current_column = method.current_column();
        let balance_column = method.balance_column();
        let sign = match kind {
            TransactionKind::Income => "-",
            TransactionKind::Expense | TransactionKind::Bill => "+",
        };

        let sql = format!(
            "UPDATE {table} SET {bucket} = {bucket} - ?, \
                 {current} = {current} {sign} ?, {balance} = {balance} {sign} ?, \
                 updated_at = CURRENT_TIMESTAMP \
             WHERE user_id = ? AND {period} = ?",
            table = granularity.table(),
            bucket = bucket_column,
            current = current_column,
            balance = balance_column,
            sign = sign,
            period = granularity.period_column()
        );
        sqlx::query(&sql)
            .bind(amount)
            .bind(amount)
            .bind(amount)
            .bind(user_id)
            .bind(period_key)
            .execute(self.pool())
            .await?;

        let total_sql = format!(
            "UPDATE {table} SET total_balance = ({formula}) WHERE user_id = ? AND {period} = ?",
            table = granularity.table(),
            formula = TOTAL_FROM_FLOWS,
            period = granularity.period_column()
        );
        sqlx::query(&total_sql)
            .bind(user_id)
            .bind(period_key)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Re-derive a period's `previous_*` columns from its chronological
    /// predecessor's stored position, then recompute `total_balance` as
    /// carried-in plus in-period flows. Missing periods are skipped;
    /// a missing predecessor carries in zero.
    pub async fn rederive_previous(
        &self,
        user_id: &str,
        granularity: Granularity,
        period_key: &str,
    ) -> Result<()> {
        if !self.period_exists(user_id, granularity, period_key).await? {
            return Ok(());
        }

        let current = granularity.parse_period_key(period_key)?;
        let previous_key = match granularity.step_back(current) {
            Some(date) => granularity.period_key(date),
            None => return Ok(()),
        };

        let carried = self
            .carried_balances(user_id, granularity, &previous_key)
            .await?
            .unwrap_or_default();

        let sql = format!(
            "UPDATE {table} SET total_previous_balance = ?, previous_bank_amount = ?, \
                 previous_cash_amount = ?, updated_at = CURRENT_TIMESTAMP \
             WHERE user_id = ? AND {period} = ?",
            table = granularity.table(),
            period = granularity.period_column()
        );
        sqlx::query(&sql)
            .bind(carried.total_balance)
            .bind(carried.bank_amount)
            .bind(carried.cash_amount)
            .bind(user_id)
            .bind(period_key)
            .execute(self.pool())
            .await?;

        let total_sql = format!(
            "UPDATE {table} SET total_balance = total_previous_balance + ({formula}) \
             WHERE user_id = ? AND {period} = ?",
            table = granularity.table(),
            formula = TOTAL_FROM_FLOWS,
            period = granularity.period_column()
        );
        sqlx::query(&total_sql)
            .bind(user_id)
            .bind(period_key)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Additively undo a deleted expense's forward deficit in one period:
    /// the amount flows back into the current, previous and balance columns
    /// for its method plus `total_previous_balance`, and `total_balance` is
    /// re-derived. Missing periods (gaps) are skipped.
    pub async fn shift_period_forward(
        &self,
        user_id: &str,
        granularity: Granularity,
        period_key: &str,
        method: PaymentMethod,
        amount: f64,
    ) -> Result<()> {
        if !self.period_exists(user_id, granularity, period_key).await? {
            return Ok(());
        }

        let current_column = method.current_column();
        let previous_column = method.previous_column();
        let balance_column = method.balance_column();

        let sql = format!(
            "UPDATE {table} SET {current} = {current} + ?, {previous} = {previous} + ?, \
                 {balance} = {balance} + ?, \
                 total_previous_balance = total_previous_balance + ?, \
                 updated_at = CURRENT_TIMESTAMP \
             WHERE user_id = ? AND {period} = ?",
            table = granularity.table(),
            current = current_column,
            previous = previous_column,
            balance = balance_column,
            period = granularity.period_column()
        );
        sqlx::query(&sql)
            .bind(amount)
            .bind(amount)
            .bind(amount)
            .bind(amount)
            .bind(user_id)
            .bind(period_key)
            .execute(self.pool())
            .await?;

        let total_sql = format!(
            "UPDATE {table} SET total_balance = total_previous_balance + ({formula}) \
             WHERE user_id = ? AND {period} = ?",
            table = granularity.table(),
            formula = TOTAL_FROM_FLOWS,
            period = granularity.period_column()
        );
        sqlx::query(&total_sql)
            .bind(user_id)
            .bind(period_key)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Payment path: move a paid month's amount from the bill bucket to the
    /// expense bucket on the monthly table, inside the caller's transaction.
    /// Current-period totals are deliberately untouched.
    pub async fn move_bill_to_expense(
        &self,
        conn: &mut SqliteConnection,
        user_id: &str,
        year_month: &str,
        method: PaymentMethod,
        amount: f64,
    ) -> Result<()> {
        let bill_column = Bucket::Bill.column(method);
        let expense_column = Bucket::Expense.column(method);
        let sql = format!(
            "UPDATE monthly_cash_bank_balance SET {bill} = {bill} - ?, \
                 {expense} = {expense} + ?, updated_at = CURRENT_TIMESTAMP \
             WHERE user_id = ? AND year_month = ?",
            bill = bill_column,
            expense = expense_column
        );
        sqlx::query(&sql)
            .bind(amount)
            .bind(amount)
            .bind(user_id)
            .bind(year_month)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Reversal of the payment path: move the amount back from the expense
    /// bucket to the bill bucket for one month. Returns the number of rows
    /// touched so callers can log a missing month.
    pub async fn move_expense_to_bill(
        &self,
        user_id: &str,
        year_month: &str,
        method: PaymentMethod,
        amount: f64,
    ) -> Result<u64> {
        let expense_column = Bucket::Expense.column(method);
        let bill_column = Bucket::Bill.column(method);
        let sql = format!(
            "UPDATE monthly_cash_bank_balance SET {expense} = {expense} - ?, \
                 {bill} = {bill} + ?, updated_at = CURRENT_TIMESTAMP \
             WHERE user_id = ? AND year_month = ?",
            expense = expense_column,
            bill = bill_column
        );
        let result = sqlx::query(&sql)
            .bind(amount)
            .bind(amount)
            .bind(user_id)
            .bind(year_month)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> BalanceRepository {
        let db = DbConnection::init_test().await.expect("test database");
        BalanceRepository::new(db)
    }

    #[tokio::test]
    async fn test_apply_amount_creates_row_lazily() {
        let repo = setup().await;

        repo.apply_amount(
            "1",
            Granularity::Monthly,
            "2025-01",
            Bucket::Bill,
            PaymentMethod::Cash,
            100.0,
        )
        .await
        .unwrap();

        let row = repo
            .fetch_row("1", Granularity::Monthly, "2025-01")
            .await
            .unwrap()
            .expect("row created");
        assert_eq!(row.bill_cash_amount, 100.0);
        assert_eq!(row.bill_bank_amount, 0.0);
        assert_eq!(row.cash_amount, 0.0);
    }

    #[tokio::test]
    async fn test_apply_amount_does_not_reset_existing_fields() {
        let repo = setup().await;

        repo.apply_amount(
            "1",
            Granularity::Monthly,
            "2025-01",
            Bucket::Income,
            PaymentMethod::Bank,
            200.0,
        )
        .await
        .unwrap();
        repo.apply_amount(
            "1",
            Granularity::Monthly,
            "2025-01",
            Bucket::Expense,
            PaymentMethod::Bank,
            50.0,
        )
        .await
        .unwrap();

        let row = repo
            .fetch_row("1", Granularity::Monthly, "2025-01")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.income_bank_amount, 200.0);
        assert_eq!(row.expense_bank_amount, 50.0);
    }

    #[tokio::test]
    async fn test_period_keys_are_sorted_ascending() {
        let repo = setup().await;
        for key in ["2025-03", "2025-01", "2025-02", "2024-12"] {
            repo.ensure_period_row("1", Granularity::Monthly, key)
                .await
                .unwrap();
        }

        let keys = repo
            .period_keys_from("1", Granularity::Monthly, "2025-01")
            .await
            .unwrap();
        assert_eq!(keys, vec!["2025-01", "2025-02", "2025-03"]);

        let before = repo
            .latest_period_before("1", Granularity::Monthly, "2025-01")
            .await
            .unwrap();
        assert_eq!(before.as_deref(), Some("2024-12"));
    }

    #[tokio::test]
    async fn test_reverse_single_period_income() {
        let repo = setup().await;
        repo.apply_amount(
            "1",
            Granularity::Monthly,
            "2025-01",
            Bucket::Income,
            PaymentMethod::Cash,
            120.0,
        )
        .await
        .unwrap();
        repo.store_cascaded(
            "1",
            Granularity::Monthly,
            "2025-01",
            &CascadedTotals {
                cash_amount: 120.0,
                balance_cash_amount: 120.0,
                total_balance: 120.0,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        repo.reverse_single_period(
            "1",
            Granularity::Monthly,
            "2025-01",
            TransactionKind::Income,
            PaymentMethod::Cash,
            120.0,
        )
        .await
        .unwrap();

        let row = repo
            .fetch_row("1", Granularity::Monthly, "2025-01")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.income_cash_amount, 0.0);
        assert_eq!(row.cash_amount, 0.0);
        assert_eq!(row.balance_cash_amount, 0.0);
        assert_eq!(row.total_balance, 0.0);
    }

    #[tokio::test]
    async fn test_reverse_single_period_skips_missing_row() {
        let repo = setup().await;
        // No row for the period: reversal is a logged no-op, not an error.
        repo.reverse_single_period(
            "1",
            Granularity::Quarterly,
            "2025-Q1",
            TransactionKind::Expense,
            PaymentMethod::Bank,
            10.0,
        )
        .await
        .unwrap();
        assert!(repo
            .fetch_row("1", Granularity::Quarterly, "2025-Q1")
            .await
            .unwrap()
            .is_none());
    }
}
