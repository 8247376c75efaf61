use crate::domain_model::*;
use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("account not found")]
    NotFound,
    #[error("duplicate entry")]
    Duplicate,
    #[error("token columns changed concurrently")]
    Conflict,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store error: {0}")]
    Backend(String),
}

/// Durable account rows, one per user name.
///
/// Each method touches a single row and is atomic with respect to the
/// others for that row.
#[async_trait::async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_user_name(&self, user_name: &str) -> Result<Account, StoreError>;

    /// Insert a row with empty tokens. Fails with `Duplicate` if the user name is taken.
    async fn create(&self, account: NewAccount) -> Result<AccountId, StoreError>;

    async fn update_refresh_token(
        &self,
        user_name: &str,
        token: Option<&str>,
        issued_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn update_access_token(
        &self,
        user_name: &str,
        token: Option<&str>,
        issued_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn update_previous_access_token(
        &self,
        user_name: &str,
        token: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Login in one step: new refresh and access tokens, previous cleared.
    ///
    /// Every conditional write below applies only while the row's access
    /// token still equals `expected_access`, failing with `Conflict`
    /// otherwise. Writers thus form a single chain per account.
    async fn issue_tokens(
        &self,
        user_name: &str,
        expected_access: Option<&str>,
        refresh_token: &str,
        access_token: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Write `previous` and `token` in one step so concurrent rotations never
    /// leave a row mixing two of them.
    async fn rotate_access_token(
        &self,
        user_name: &str,
        expected_access: Option<&str>,
        previous: Option<&str>,
        token: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Clear access, previous and refresh tokens. `revoked_at` is kept as the
    /// access token issue time, which marks the row as revoked.
    async fn clear_tokens(
        &self,
        user_name: &str,
        expected_access: Option<&str>,
        revoked_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}
