//! User rows. The ledger only ever needs the locale, but tests and the
//! locale endpoint also create users.

use sqlx::{Row, SqlitePool};

use crate::db::DbConnection;
use crate::error::Result;

#[derive(Clone)]
pub struct UserRepository {
    db: DbConnection,
}

impl UserRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    fn pool(&self) -> &SqlitePool {
        self.db.pool()
    }

    pub async fn insert(&self, email: &str, name: &str, locale: Option<&str>) -> Result<i64> {
        let result = sqlx::query("INSERT INTO users (email, name, locale) VALUES (?, ?, ?)")
            .bind(email)
            .bind(name)
            .bind(locale)
            .execute(self.pool())
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// The user's stored locale. `None` when the user does not exist or has
    /// no locale set.
    pub async fn locale(&self, user_id: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT locale FROM users WHERE CAST(id AS TEXT) = ?")
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row
            .and_then(|r| r.get::<Option<String>, _>("locale"))
            .filter(|locale| !locale.is_empty()))
    }

    pub async fn exists(&self, user_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT id FROM users WHERE CAST(id AS TEXT) = ?")
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.is_some())
    }
}
