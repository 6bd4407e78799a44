use super::{duplicate_email, JournalEntry, JournalStore, Result, StorageError, User};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    entries: Vec<JournalEntry>,
    next_user_id: i64,
    next_entry_id: i64,
}

/// In-process store used by tests and `--in-memory` runs
#[derive(Default)]
pub struct MemoryJournalStore {
    tables: Mutex<Tables>,
}

impl MemoryJournalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry_count(&self) -> usize {
        self.tables.lock().entries.len()
    }
}

#[async_trait]
impl JournalStore for MemoryJournalStore {
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User> {
        let mut tables = self.tables.lock();
        if tables.users.iter().any(|u| u.email == email) {
            return Err(duplicate_email());
        }

        tables.next_user_id += 1;
        let user = User {
            id: tables.next_user_id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let tables = self.tables.lock();
        Ok(tables.users.iter().find(|u| u.email == email).cloned())
    }

    async fn create_entry(&self, user_id: i64, content: &str) -> Result<JournalEntry> {
        let mut tables = self.tables.lock();
        if !tables.users.iter().any(|u| u.id == user_id) {
            return Err(StorageError::InvalidData(format!("unknown user {}", user_id)));
        }

        tables.next_entry_id += 1;
        let entry = JournalEntry {
            id: tables.next_entry_id,
            user_id,
            content: content.to_string(),
            analysis: None,
            created_at: Utc::now(),
        };
        tables.entries.push(entry.clone());
        Ok(entry)
    }

    async fn attach_analysis(&self, entry_id: i64, analysis: &str) -> Result<()> {
        let mut tables = self.tables.lock();
        let entry = tables
            .entries
            .iter_mut()
            .find(|e| e.id == entry_id)
            .ok_or_else(|| StorageError::NotFound(format!("journal entry {}", entry_id)))?;
        entry.analysis = Some(analysis.to_string());
        Ok(())
    }

    async fn entries_for_user(&self, user_id: i64, limit: u32) -> Result<Vec<JournalEntry>> {
        let tables = self.tables.lock();
        Ok(tables
            .entries
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = MemoryJournalStore::new();
        store.create_user("a@example.com", "hash").await.unwrap();

        let err = store.create_user("a@example.com", "other").await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_entries_are_scoped_and_newest_first() {
        let store = MemoryJournalStore::new();
        let alice = store.create_user("alice@example.com", "h").await.unwrap();
        let bob = store.create_user("bob@example.com", "h").await.unwrap();

        store.create_entry(alice.id, "first").await.unwrap();
        store.create_entry(bob.id, "bob's").await.unwrap();
        store.create_entry(alice.id, "second").await.unwrap();

        let entries = store.entries_for_user(alice.id, 10).await.unwrap();
        let contents: Vec<_> = entries.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["second", "first"]);

        assert_eq!(store.entries_for_user(alice.id, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_attach_analysis() {
        let store = MemoryJournalStore::new();
        let user = store.create_user("a@example.com", "h").await.unwrap();
        let entry = store.create_entry(user.id, "text").await.unwrap();
        assert_eq!(entry.analysis, None);

        store.attach_analysis(entry.id, "calm").await.unwrap();
        let entries = store.entries_for_user(user.id, 10).await.unwrap();
        assert_eq!(entries[0].analysis.as_deref(), Some("calm"));

        assert!(matches!(
            store.attach_analysis(999, "x").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_entry_for_unknown_user_rejected() {
        let store = MemoryJournalStore::new();
        assert!(store.create_entry(1, "orphan").await.is_err());
    }
}
