use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

/// In-process account store for the `memory` backend and tests.
///
/// Writes can be made to fail and reads to stall, to exercise the
/// persist-error and timeout paths of the lifecycle manager.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<HashMap<String, Account>>,
    next_id: AtomicU64,
    fail_writes: AtomicBool,
    read_delay: Mutex<Option<Duration>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_read_delay(&self, delay: Option<Duration>) {
        *self.read_delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    fn update<F>(&self, user_name: &str, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Account),
    {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("simulated write failure".to_string()));
        }
        let mut accounts = self
            .accounts
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let account = accounts.get_mut(user_name).ok_or(StoreError::NotFound)?;
        apply(account);
        Ok(())
    }

    fn update_if_current<F>(
        &self,
        user_name: &str,
        expected_access: Option<&str>,
        apply: F,
    ) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Account),
    {
        let mut result = Ok(());
        self.update(user_name, |account| {
            if account.access_token.as_deref() == expected_access {
                apply(account);
            } else {
                result = Err(StoreError::Conflict);
            }
        })?;
        result
    }
}

#[async_trait::async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_user_name(&self, user_name: &str) -> Result<Account, StoreError> {
        let delay = *self.read_delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let accounts = self
            .accounts
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        accounts.get(user_name).cloned().ok_or(StoreError::NotFound)
    }

    async fn create(&self, account: NewAccount) -> Result<AccountId, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("simulated write failure".to_string()));
        }
        let mut accounts = self
            .accounts
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if accounts.contains_key(&account.user_name) {
            return Err(StoreError::Duplicate);
        }
        let id = AccountId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let row = Account {
            id,
            user_name: account.user_name.clone(),
            nickname: account.nickname,
            email: account.email,
            password_digest: account.password_digest,
            registered_at: account.registered_at,
            access_token: None,
            access_token_issued_at: None,
            previous_access_token: None,
            refresh_token: None,
            refresh_token_issued_at: None,
        };
        accounts.insert(account.user_name, row);
        Ok(id)
    }

    async fn update_refresh_token(
        &self,
        user_name: &str,
        token: Option<&str>,
        issued_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.update(user_name, |account| {
            account.refresh_token = token.map(str::to_string);
            account.refresh_token_issued_at = Some(issued_at);
        })
    }

    async fn update_access_token(
        &self,
        user_name: &str,
        token: Option<&str>,
        issued_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.update(user_name, |account| {
            account.access_token = token.map(str::to_string);
            account.access_token_issued_at = Some(issued_at);
        })
    }

    async fn update_previous_access_token(
        &self,
        user_name: &str,
        token: Option<&str>,
    ) -> Result<(), StoreError> {
        self.update(user_name, |account| {
            account.previous_access_token = token.map(str::to_string);
        })
    }

    async fn issue_tokens(
        &self,
        user_name: &str,
        expected_access: Option<&str>,
        refresh_token: &str,
        access_token: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.update_if_current(user_name, expected_access, |account| {
            account.refresh_token = Some(refresh_token.to_string());
            account.refresh_token_issued_at = Some(issued_at);
            account.access_token = Some(access_token.to_string());
            account.access_token_issued_at = Some(issued_at);
            account.previous_access_token = None;
        })
    }

    async fn rotate_access_token(
        &self,
        user_name: &str,
        expected_access: Option<&str>,
        previous: Option<&str>,
        token: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.update_if_current(user_name, expected_access, |account| {
            account.previous_access_token = previous.map(str::to_string);
            account.access_token = Some(token.to_string());
            account.access_token_issued_at = Some(issued_at);
        })
    }

    async fn clear_tokens(
        &self,
        user_name: &str,
        expected_access: Option<&str>,
        revoked_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.update_if_current(user_name, expected_access, |account| {
            account.access_token = None;
            account.access_token_issued_at = Some(revoked_at);
            account.previous_access_token = None;
            account.refresh_token = None;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_account(user_name: &str) -> NewAccount {
        NewAccount {
            user_name: user_name.to_string(),
            nickname: String::new(),
            email: String::new(),
            password_digest: "digest".to_string(),
            registered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_user_name() {
        let store = MemoryAccountStore::new();
        let first = store.create(new_account("alice")).await.unwrap();
        let second = store.create(new_account("bob")).await.unwrap();
        assert_ne!(first, second);
        assert!(matches!(
            store.create(new_account("alice")).await,
            Err(StoreError::Duplicate)
        ));
    }

    #[tokio::test]
    async fn clear_tokens_marks_row_revoked() {
        let store = MemoryAccountStore::new();
        store.create(new_account("alice")).await.unwrap();
        let now = Utc::now();
        store
            .issue_tokens("alice", None, "r1", "a1", now)
            .await
            .unwrap();
        store
            .rotate_access_token("alice", Some("a1"), Some("a1"), "a2", now)
            .await
            .unwrap();
        let revoked_at = now + chrono::TimeDelta::seconds(1);
        store
            .clear_tokens("alice", Some("a2"), revoked_at)
            .await
            .unwrap();

        let account = store.find_by_user_name("alice").await.unwrap();
        assert_eq!(account.access_token, None);
        assert_eq!(account.previous_access_token, None);
        assert_eq!(account.refresh_token, None);
        assert_eq!(account.access_token_issued_at, Some(revoked_at));
        assert!(account.is_revoked());
    }

    #[tokio::test]
    async fn issue_tokens_clears_previous_in_the_same_write() {
        let store = MemoryAccountStore::new();
        store.create(new_account("alice")).await.unwrap();
        let now = Utc::now();
        store.issue_tokens("alice", None, "r1", "a1", now).await.unwrap();
        store
            .rotate_access_token("alice", Some("a1"), Some("a1"), "a2", now)
            .await
            .unwrap();
        store
            .issue_tokens("alice", Some("a2"), "r2", "a3", now)
            .await
            .unwrap();

        let account = store.find_by_user_name("alice").await.unwrap();
        assert_eq!(account.access_token.as_deref(), Some("a3"));
        assert_eq!(account.refresh_token.as_deref(), Some("r2"));
        assert_eq!(account.previous_access_token, None);
    }

    #[tokio::test]
    async fn conditional_writes_reject_a_moved_row() {
        let store = MemoryAccountStore::new();
        store.create(new_account("alice")).await.unwrap();
        let now = Utc::now();
        store.issue_tokens("alice", None, "r1", "a1", now).await.unwrap();
        store
            .rotate_access_token("alice", Some("a1"), Some("a1"), "a2", now)
            .await
            .unwrap();

        // Both writers checked the row while it still held a1.
        assert!(matches!(
            store
                .rotate_access_token("alice", Some("a1"), Some("a1"), "a3", now)
                .await,
            Err(StoreError::Conflict)
        ));
        assert!(matches!(
            store.clear_tokens("alice", Some("a1"), now).await,
            Err(StoreError::Conflict)
        ));
        assert!(matches!(
            store.issue_tokens("alice", None, "r2", "a4", now).await,
            Err(StoreError::Conflict)
        ));

        let account = store.find_by_user_name("alice").await.unwrap();
        assert_eq!(account.access_token.as_deref(), Some("a2"));
        assert_eq!(account.previous_access_token.as_deref(), Some("a1"));
    }

    #[tokio::test]
    async fn single_column_updates() {
        let store = MemoryAccountStore::new();
        store.create(new_account("alice")).await.unwrap();
        let now = Utc::now();
        store.update_refresh_token("alice", Some("r1"), now).await.unwrap();
        store.update_access_token("alice", Some("a1"), now).await.unwrap();
        store
            .update_previous_access_token("alice", Some("a0"))
            .await
            .unwrap();

        let account = store.find_by_user_name("alice").await.unwrap();
        assert_eq!(account.refresh_token.as_deref(), Some("r1"));
        assert_eq!(account.refresh_token_issued_at, Some(now));
        assert_eq!(account.access_token.as_deref(), Some("a1"));
        assert_eq!(account.previous_access_token.as_deref(), Some("a0"));
    }

    #[tokio::test]
    async fn updates_on_missing_row_fail() {
        let store = MemoryAccountStore::new();
        assert!(matches!(
            store.clear_tokens("ghost", None, Utc::now()).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn failing_writes_leave_row_untouched() {
        let store = MemoryAccountStore::new();
        store.create(new_account("alice")).await.unwrap();
        store.set_fail_writes(true);
        assert!(
            store
                .update_access_token("alice", Some("a1"), Utc::now())
                .await
                .is_err()
        );
        store.set_fail_writes(false);
        let account = store.find_by_user_name("alice").await.unwrap();
        assert_eq!(account.access_token, None);
    }
}
