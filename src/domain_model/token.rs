use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessToken(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshToken(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionToken(pub String);

/// Why a cache slot holds no usable token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearReason {
    Expired,
    Revoked,
}

/// Value held by the access-token and previous-access-token caches.
///
/// `Cleared` is the negative entry: it short-circuits repeated checks
/// without a store round trip and can never equal an issued token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedToken {
    Live(String),
    Cleared(ClearReason),
}

impl CachedToken {
    pub fn matches(&self, presented: &str) -> bool {
        matches!(self, CachedToken::Live(token) if token == presented)
    }
}

/// Verdict on a presented access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    /// Matches the account's current access token.
    Current,
    /// Matches the token superseded by the last rotation, inside the grace window.
    Grace,
    Expired,
    Revoked,
}

impl TokenState {
    pub fn is_accepted(&self) -> bool {
        matches!(self, TokenState::Current | TokenState::Grace)
    }
}

impl From<ClearReason> for TokenState {
    fn from(reason: ClearReason) -> Self {
        match reason {
            ClearReason::Expired => TokenState::Expired,
            ClearReason::Revoked => TokenState::Revoked,
        }
    }
}
