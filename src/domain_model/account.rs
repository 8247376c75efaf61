use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AccountId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(AccountId)
    }
}

/// One row of the durable account store.
///
/// Token columns are `None` when unset. A row with no access token but an
/// `access_token_issued_at` was revoked; a row with neither never logged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub user_name: String,
    pub nickname: String,
    pub email: String,
    pub password_digest: String,
    pub registered_at: DateTime<Utc>,
    pub access_token: Option<String>,
    pub access_token_issued_at: Option<DateTime<Utc>>,
    pub previous_access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub refresh_token_issued_at: Option<DateTime<Utc>>,
}

impl Account {
    pub fn is_revoked(&self) -> bool {
        self.access_token.is_none() && self.access_token_issued_at.is_some()
    }

    pub fn public_profile(&self) -> PublicProfile {
        PublicProfile {
            id: self.id,
            user_name: self.user_name.clone(),
            nickname: self.nickname.clone(),
            email: self.email.clone(),
            registered_at: self.registered_at,
        }
    }
}

/// Row to insert on registration; every token column starts empty.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub user_name: String,
    pub nickname: String,
    pub email: String,
    pub password_digest: String,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicProfile {
    pub id: AccountId,
    pub user_name: String,
    pub nickname: String,
    pub email: String,
    pub registered_at: DateTime<Utc>,
}
