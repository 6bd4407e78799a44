use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

use super::{duplicate_email, JournalEntry, JournalStore, Result, StorageError, User};

const UNIQUE_VIOLATION: &str = "23505";

/// Statements run at startup; each is idempotent.
/// Existing deployments may have INT4 keys, so reads cast ids to BIGINT.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL
    )",
    "ALTER TABLE users ADD COLUMN IF NOT EXISTS created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()",
    "CREATE TABLE IF NOT EXISTS journals (
        id BIGSERIAL PRIMARY KEY,
        content TEXT NOT NULL,
        user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE
    )",
    "ALTER TABLE journals ADD COLUMN IF NOT EXISTS analysis TEXT",
    "ALTER TABLE journals ADD COLUMN IF NOT EXISTS created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()",
    "CREATE INDEX IF NOT EXISTS journals_user_id_idx ON journals (user_id, id DESC)",
];

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                duplicate_email()
            }
            sqlx::Error::RowNotFound => StorageError::NotFound(err.to_string()),
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => StorageError::Connection(err.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StorageError::InvalidData(err.to_string())
            }
            _ => StorageError::Database(err.to_string()),
        }
    }
}

/// Postgres-backed store; every statement is parameterized
pub struct PgJournalStore {
    pool: PgPool,
}

impl PgJournalStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        info!("Database connected");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Schema verified ({} statements)", SCHEMA.len());
        Ok(())
    }
}

fn user_from_row(row: &PgRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password")?,
        created_at: row.try_get("created_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> Result<JournalEntry> {
    Ok(JournalEntry {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        content: row.try_get("content")?,
        analysis: row.try_get("analysis")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl JournalStore for PgJournalStore {
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User> {
        let row = sqlx::query(
            "INSERT INTO users (email, password) VALUES ($1, $2) \
             RETURNING id::BIGINT AS id, email, password, created_at",
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;

        user_from_row(&row)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id::BIGINT AS id, email, password, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn create_entry(&self, user_id: i64, content: &str) -> Result<JournalEntry> {
        let row = sqlx::query(
            "INSERT INTO journals (content, user_id) VALUES ($1, $2) \
             RETURNING id::BIGINT AS id, user_id::BIGINT AS user_id, content, analysis, created_at",
        )
        .bind(content)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        entry_from_row(&row)
    }

    async fn attach_analysis(&self, entry_id: i64, analysis: &str) -> Result<()> {
        let result = sqlx::query("UPDATE journals SET analysis = $1 WHERE id = $2")
            .bind(analysis)
            .bind(entry_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("journal entry {}", entry_id)));
        }
        Ok(())
    }

    async fn entries_for_user(&self, user_id: i64, limit: u32) -> Result<Vec<JournalEntry>> {
        let rows = sqlx::query(
            "SELECT id::BIGINT AS id, user_id::BIGINT AS user_id, content, analysis, created_at \
             FROM journals WHERE user_id = $1 ORDER BY id DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
