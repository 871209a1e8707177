//! Database connection and schema management.
//!
//! The schema is applied through an explicit versioned migration step run
//! once at startup: each migration's statements execute in order and the
//! version is recorded in `schema_migrations`, so per-request code never
//! touches DDL.

use anyhow::Result;
use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool};
use std::sync::Arc;
use tracing::info;

const DEFAULT_DATABASE_URL: &str = "sqlite:budget.db";

/// DbConnection manages the shared SQLite pool.
#[derive(Clone)]
pub struct DbConnection {
    pool: Arc<SqlitePool>,
}

impl DbConnection {
    /// Create a new database connection, creating and migrating the
    /// database as needed.
    pub async fn new(url: &str) -> Result<Self> {
        if !Sqlite::database_exists(url).await.unwrap_or(false) {
            Sqlite::create_database(url).await?;
        }

        let pool = SqlitePool::connect(url).await?;
        run_migrations(&pool).await?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Initialize the database from `DATABASE_URL`, falling back to the
    /// local file database.
    pub async fn init() -> Result<Self> {
        let url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
        Self::new(&url).await
    }

    /// Initialize a uniquely named in-memory database for tests.
    pub async fn init_test() -> Result<Self> {
        let test_id = uuid::Uuid::new_v4().to_string();
        let db_url = format!("file:memdb_{}?mode=memory&cache=shared", test_id);

        Self::new(&db_url).await
    }

    /// Get the underlying SQLite pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Cheap connectivity probe for the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&*self.pool).await?;
        Ok(())
    }
}

struct Migration {
    version: i64,
    statements: Vec<String>,
}

/// All six balance tables share this shape; only the period column differs.
fn balance_table_ddl(table: &str, period_column: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            {period_column} TEXT NOT NULL,
            income_cash_amount REAL NOT NULL DEFAULT 0,
            income_bank_amount REAL NOT NULL DEFAULT 0,
            expense_cash_amount REAL NOT NULL DEFAULT 0,
            expense_bank_amount REAL NOT NULL DEFAULT 0,
            bill_cash_amount REAL NOT NULL DEFAULT 0,
            bill_bank_amount REAL NOT NULL DEFAULT 0,
            cash_amount REAL NOT NULL DEFAULT 0,
            bank_amount REAL NOT NULL DEFAULT 0,
            previous_cash_amount REAL NOT NULL DEFAULT 0,
            previous_bank_amount REAL NOT NULL DEFAULT 0,
            balance_cash_amount REAL NOT NULL DEFAULT 0,
            balance_bank_amount REAL NOT NULL DEFAULT 0,
            total_previous_balance REAL NOT NULL DEFAULT 0,
            total_balance REAL NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(user_id, {period_column})
        );
        "#
    )
}

fn migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            statements: vec![
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    email TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    locale TEXT,
                    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
                );
                "#
                .to_string(),
                r#"
                CREATE TABLE IF NOT EXISTS bills (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL,
                    name TEXT NOT NULL,
                    amount REAL NOT NULL,
                    due_date TEXT,
                    start_date TEXT NOT NULL,
                    payment_day INTEGER NOT NULL,
                    duration_months INTEGER NOT NULL,
                    regularity TEXT NOT NULL DEFAULT 'monthly',
                    paid BOOLEAN DEFAULT 0,
                    overdue BOOLEAN DEFAULT 0,
                    overdue_days INTEGER DEFAULT 0,
                    recurring BOOLEAN DEFAULT 1,
                    category TEXT DEFAULT 'general',
                    icon TEXT DEFAULT '💳',
                    payment_method TEXT,
                    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
                );
                "#
                .to_string(),
                r#"
                CREATE TABLE IF NOT EXISTS bill_payments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    bill_id INTEGER NOT NULL,
                    year_month TEXT NOT NULL,
                    paid BOOLEAN DEFAULT 0,
                    payment_date TEXT,
                    payment_method TEXT,
                    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                    FOREIGN KEY (bill_id) REFERENCES bills (id) ON DELETE CASCADE,
                    UNIQUE(bill_id, year_month)
                );
                "#
                .to_string(),
                r#"
                CREATE TABLE IF NOT EXISTS expenses (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL,
                    amount REAL NOT NULL,
                    date TEXT NOT NULL,
                    category TEXT,
                    payment_method TEXT,
                    description TEXT,
                    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
                );
                "#
                .to_string(),
                r#"
                CREATE TABLE IF NOT EXISTS incomes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL,
                    amount REAL NOT NULL,
                    date TEXT NOT NULL,
                    category TEXT,
                    payment_method TEXT,
                    description TEXT,
                    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
                );
                "#
                .to_string(),
            ],
        },
        Migration {
            version: 2,
            statements: vec![
                balance_table_ddl("daily_cash_bank_balance", "date"),
                balance_table_ddl("weekly_cash_bank_balance", "year_week"),
                balance_table_ddl("monthly_cash_bank_balance", "year_month"),
                balance_table_ddl("quarterly_cash_bank_balance", "year_quarter"),
                balance_table_ddl("semiannual_cash_bank_balance", "year_half"),
                balance_table_ddl("annual_cash_bank_balance", "year"),
            ],
        },
        // Expenses created by a bill payment carry the bill they settle.
        Migration {
            version: 3,
            statements: vec!["ALTER TABLE expenses ADD COLUMN bill_id INTEGER;".to_string()],
        },
    ]
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
    .execute(pool)
    .await?;

    for migration in migrations() {
        let applied = sqlx::query("SELECT version FROM schema_migrations WHERE version = ?")
            .bind(migration.version)
            .fetch_optional(pool)
            .await?
            .is_some();
        if applied {
            continue;
        }

        for statement in &migration.statements {
            sqlx::query(statement).execute(pool).await?;
        }
        sqlx::query("INSERT INTO schema_migrations (version) VALUES (?)")
            .bind(migration.version)
            .execute(pool)
            .await?;
        info!("Applied schema migration v{}", migration.version);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    #[tokio::test]
    async fn test_migrations_create_schema() {
        let db = DbConnection::init_test().await.expect("test database");

        // Every table the ledger touches must exist after startup.
        for table in [
            "users",
            "bills",
            "bill_payments",
            "expenses",
            "incomes",
            "daily_cash_bank_balance",
            "weekly_cash_bank_balance",
            "monthly_cash_bank_balance",
            "quarterly_cash_bank_balance",
            "semiannual_cash_bank_balance",
            "annual_cash_bank_balance",
        ] {
            let row =
                sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
                    .bind(table)
                    .fetch_optional(db.pool())
                    .await
                    .expect("query sqlite_master");
            assert!(row.is_some(), "table {} missing", table);
        }
    }

    #[tokio::test]
    async fn test_migrations_are_versioned_and_idempotent() {
        let db = DbConnection::init_test().await.expect("test database");

        let versions: Vec<i64> =
            sqlx::query("SELECT version FROM schema_migrations ORDER BY version")
                .fetch_all(db.pool())
                .await
                .expect("list migrations")
                .iter()
                .map(|row| row.get::<i64, _>("version"))
                .collect();
        assert_eq!(versions, vec![1, 2, 3]);

        // Re-running against the same pool must be a no-op, not an error.
        run_migrations(db.pool()).await.expect("second run");
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM schema_migrations")
            .fetch_one(db.pool())
            .await
            .expect("count")
            .get("n");
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_expenses_have_bill_id_column() {
        let db = DbConnection::init_test().await.expect("test database");

        sqlx::query(
            "INSERT INTO expenses (user_id, amount, date, bill_id) VALUES ('1', 10.0, '2025-01-15', 7)",
        )
        .execute(db.pool())
        .await
        .expect("insert expense with bill_id");

        let bill_id: i64 = sqlx::query("SELECT bill_id FROM expenses LIMIT 1")
            .fetch_one(db.pool())
            .await
            .expect("fetch")
            .get("bill_id");
        assert_eq!(bill_id, 7);
    }
}
