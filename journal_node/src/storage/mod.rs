use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;
pub mod postgres;

pub use memory::MemoryJournalStore;
pub use postgres::PgJournalStore;

// Storage-specific Result type
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Registered account. The password hash never leaves the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: i64,
    pub user_id: i64,
    pub content: String,
    pub analysis: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Persistence for accounts and journal entries
#[async_trait]
pub trait JournalStore: Send + Sync {
    /// Fails with `StorageError::Conflict` when the email is taken
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn create_entry(&self, user_id: i64, content: &str) -> Result<JournalEntry>;
    async fn attach_analysis(&self, entry_id: i64, analysis: &str) -> Result<()>;
    /// Newest entries first
    async fn entries_for_user(&self, user_id: i64, limit: u32) -> Result<Vec<JournalEntry>>;
    async fn ping(&self) -> Result<()>;

    /// Short backend label for health output
    fn backend(&self) -> &'static str;
}

pub(crate) fn duplicate_email() -> StorageError {
    StorageError::Conflict("Email already registered".to_string())
}
