use crate::domain_model::*;
use crate::domain_port::StoreError;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("account already exists")]
    AccountExists,
    #[error("account not found")]
    AccountNotFound,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("refresh token invalid")]
    InvalidRefreshToken,
    #[error("token expired")]
    TokenExpired,
    #[error("token revoked")]
    TokenRevoked,
    #[error("token persist error: {0}")]
    TokenPersist(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AccountError {
    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AccountError::StoreUnavailable(_) | AccountError::TokenPersist(_)
        )
    }
}

impl From<StoreError> for AccountError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::NotFound => AccountError::AccountNotFound,
            StoreError::Duplicate => AccountError::AccountExists,
            StoreError::Conflict => AccountError::TokenPersist(err.to_string()),
            StoreError::Unavailable(e) => AccountError::StoreUnavailable(e.clone()),
            StoreError::Backend(e) => AccountError::Store(e.clone()),
        }
    }
}

/// Timing and identity knobs of the lifecycle manager.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    /// Distinguishes this process among peers minting tokens.
    pub node_identity: u16,
    /// Age after which an unrotated access token is expired.
    pub access_token_lifetime: Duration,
    /// Sliding TTL of session entries.
    pub session_lifetime: Duration,
    /// How long the token superseded by a rotation stays usable.
    pub grace_window: Duration,
    /// Upper bound on how long a cached verdict can be stale.
    pub token_cache_ttl: Duration,
    pub store_timeout: Duration,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            node_identity: 0,
            access_token_lifetime: Duration::from_secs(7 * 24 * 60 * 60), // 7 days
            session_lifetime: Duration::from_secs(24 * 60 * 60),          // 1 day
            grace_window: Duration::from_secs(2 * 60 * 60),               // 2 hours
            token_cache_ttl: Duration::from_secs(2 * 60 * 60),            // 2 hours
            store_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegisterInput {
    pub user_name: String,
    pub password: String,
    pub nickname: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct LoginInput {
    pub user_name: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    pub session_token: SessionToken,
}

pub trait TokenGenerator: Send + Sync {
    fn new_token(&self) -> String;
}

#[async_trait::async_trait]
pub trait CredentialHasher: Send + Sync {
    async fn hash_password(&self, password: &str) -> Result<String, AccountError>;
    async fn verify_password(&self, password: &str, password_digest: &str)
    -> Result<bool, AccountError>;
}

#[async_trait::async_trait]
pub trait AccountService: Send + Sync {
    async fn register(&self, request: RegisterInput) -> Result<AccountId, AccountError>;
    async fn login(&self, request: LoginInput) -> Result<LoginResult, AccountError>;
    async fn validate_access_token(
        &self,
        user_name: &str,
        token: &str,
    ) -> Result<TokenState, AccountError>;
    async fn rotate_access_token(
        &self,
        user_name: &str,
        refresh_token: &str,
    ) -> Result<AccessToken, AccountError>;
    async fn validate_session(&self, user_name: &str, session_token: &str) -> bool;
    async fn revoke_account(&self, user_name: &str) -> Result<(), AccountError>;
    async fn get_public_profile(&self, user_name: &str) -> Result<PublicProfile, AccountError>;

    /// Accept/reject form of `validate_access_token`: only `Current` and
    /// `Grace` come back as `Ok`.
    async fn authenticate(&self, user_name: &str, token: &str) -> Result<TokenState, AccountError> {
        match self.validate_access_token(user_name, token).await? {
            TokenState::Expired => Err(AccountError::TokenExpired),
            TokenState::Revoked => Err(AccountError::TokenRevoked),
            state => Ok(state),
        }
    }
}
