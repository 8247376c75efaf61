use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::infra_memory::AccountCaches;
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Account lifecycle manager.
///
/// The durable store is the source of truth; the caches only short-circuit
/// repeated checks. Every verdict served from cache is one the store path
/// would also produce, so evicting the caches changes latency, not outcomes.
///
/// Token writes (login, rotation, revocation) are conditional on the access
/// token they were checked against and carry a strictly increasing issue
/// stamp, so the store sees one chain of writes per account and the caches
/// apply them in the same order.
pub struct RealAccountService {
    store: Arc<dyn AccountStore>,
    credential_hasher: Arc<dyn CredentialHasher>,
    token_generator: Arc<dyn TokenGenerator>,
    caches: Arc<AccountCaches>,
    clock: Arc<dyn Clock>,
    config: AccountConfig,
    last_stamp: Mutex<DateTime<Utc>>,
}

impl RealAccountService {
    pub fn new(
        store: Arc<dyn AccountStore>,
        credential_hasher: Arc<dyn CredentialHasher>,
        token_generator: Arc<dyn TokenGenerator>,
        caches: Arc<AccountCaches>,
        clock: Arc<dyn Clock>,
        config: AccountConfig,
    ) -> Self {
        Self {
            store,
            credential_hasher,
            token_generator,
            caches,
            clock,
            config,
            last_stamp: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    pub fn caches(&self) -> &Arc<AccountCaches> {
        &self.caches
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.config.store_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unavailable(format!(
                "no reply within {:?}",
                self.config.store_timeout
            ))),
        }
    }

    async fn load(&self, user_name: &str) -> Result<Account, AccountError> {
        Ok(self
            .bounded(self.store.find_by_user_name(user_name))
            .await?)
    }

    fn persist_error(user_name: &str, err: StoreError) -> AccountError {
        warn!(user_name, error = %err, "failed to persist token");
        AccountError::TokenPersist(err.to_string())
    }

    /// Issue time for the next token write, at the store's microsecond
    /// precision and strictly after every stamp handed out before.
    fn next_stamp(&self) -> DateTime<Utc> {
        let now = self.clock.now().trunc_subsecs(6);
        let mut last = self.last_stamp.lock().unwrap_or_else(|e| e.into_inner());
        let stamp = if now > *last {
            now
        } else {
            *last + TimeDelta::microseconds(1)
        };
        *last = stamp;
        stamp
    }

    fn deadline(at: DateTime<Utc>, after: Duration) -> DateTime<Utc> {
        TimeDelta::from_std(after)
            .ok()
            .and_then(|delta| at.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn cached_verdict(&self, user_name: &str, token: &str) -> Option<TokenState> {
        let verdict = match self.caches.access.get(user_name)? {
            CachedToken::Cleared(reason) => reason.into(),
            CachedToken::Live(current) if current == token => TokenState::Current,
            // No previous entry means its grace may still be open: ask the store.
            CachedToken::Live(_) => match self.caches.previous.get(user_name)? {
                previous if previous.matches(token) => TokenState::Grace,
                _ => TokenState::Revoked,
            },
        };
        Some(verdict)
    }

    // Previous goes in before current so a reader that sees the new current
    // token also sees its grace partner.
    fn clear_cached(caches: &AccountCaches, user_name: &str, reason: ClearReason) {
        caches.previous.set(user_name, CachedToken::Cleared(reason));
        caches.access.set(user_name, CachedToken::Cleared(reason));
    }

    /// Cache a live token pair. Entries end exactly when the store path would
    /// stop answering the same way: the previous token at the end of its
    /// grace window, the current one at the end of its lifetime.
    fn cache_issued(
        &self,
        caches: &AccountCaches,
        user_name: &str,
        current: &str,
        previous: Option<&str>,
        issued_at: DateTime<Utc>,
    ) {
        let now = self.clock.now();
        let fresh_until = Self::deadline(now, self.config.token_cache_ttl);
        let grace_until = Self::deadline(issued_at, self.config.grace_window);
        match previous {
            Some(previous) if now < grace_until => caches.previous.set_until(
                user_name,
                CachedToken::Live(previous.to_string()),
                fresh_until.min(grace_until),
            ),
            _ => caches
                .previous
                .set(user_name, CachedToken::Cleared(ClearReason::Revoked)),
        }
        let lifetime_until = Self::deadline(issued_at, self.config.access_token_lifetime);
        caches.access.set_until(
            user_name,
            CachedToken::Live(current.to_string()),
            fresh_until.min(lifetime_until),
        );
    }

    /// Judge `token` against a store row and refill the caches from it,
    /// unless a newer write has reached them already.
    fn verdict_from_store(&self, account: &Account, token: &str) -> TokenState {
        let user_name = account.user_name.as_str();
        let stamp = account
            .access_token_issued_at
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let clear = |reason: ClearReason| {
            self.caches.publish(user_name, stamp, false, |caches, lanes| {
                if lanes.tokens {
                    Self::clear_cached(caches, user_name, reason);
                }
            });
        };

        if account.is_revoked() {
            clear(ClearReason::Revoked);
            return TokenState::Revoked;
        }

        let (current, issued_at) = match (&account.access_token, account.access_token_issued_at) {
            (Some(current), Some(issued_at)) => (current.as_str(), issued_at),
            _ => {
                clear(ClearReason::Expired);
                return TokenState::Expired;
            }
        };

        let now = self.clock.now();
        if now > Self::deadline(issued_at, self.config.access_token_lifetime) {
            clear(ClearReason::Expired);
            return TokenState::Expired;
        }

        let previous = account.previous_access_token.as_deref();
        let lanes = self.caches.publish(user_name, stamp, false, |caches, lanes| {
            if lanes.tokens {
                self.cache_issued(caches, user_name, current, previous, issued_at);
            }
        });
        if !lanes.tokens {
            debug!(user_name, "stale store read, cache left as is");
        }

        if current == token {
            TokenState::Current
        } else if previous == Some(token)
            && now < Self::deadline(issued_at, self.config.grace_window)
        {
            TokenState::Grace
        } else {
            TokenState::Revoked
        }
    }
}

#[async_trait::async_trait]
impl AccountService for RealAccountService {
    async fn register(&self, request: RegisterInput) -> Result<AccountId, AccountError> {
        let RegisterInput {
            user_name,
            password,
            nickname,
            email,
        } = request;

        if user_name.is_empty() {
            return Err(AccountError::InvalidArgument("user name is empty".to_string()));
        }
        if password.is_empty() {
            return Err(AccountError::InvalidArgument("password is empty".to_string()));
        }

        match self.bounded(self.store.find_by_user_name(&user_name)).await {
            Ok(_) => return Err(AccountError::AccountExists),
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }

        let password_digest = self.credential_hasher.hash_password(&password).await?;
        let id = self
            .bounded(self.store.create(NewAccount {
                user_name: user_name.clone(),
                nickname,
                email,
                password_digest,
                registered_at: self.clock.now(),
            }))
            .await?;

        info!(user_name = user_name.as_str(), %id, "account registered");
        Ok(id)
    }

    async fn login(&self, request: LoginInput) -> Result<LoginResult, AccountError> {
        let LoginInput {
            user_name,
            password,
        } = request;

        if user_name.is_empty() || password.is_empty() {
            return Err(AccountError::InvalidArgument(
                "user name and password are required".to_string(),
            ));
        }

        let account = self.load(&user_name).await?;
        let ok = self
            .credential_hasher
            .verify_password(&password, &account.password_digest)
            .await?;
        if !ok {
            debug!(user_name = user_name.as_str(), "password mismatch");
            return Err(AccountError::InvalidCredentials);
        }

        let stamp = self.next_stamp();
        let refresh_token = self.token_generator.new_token();
        let access_token = self.token_generator.new_token();

        self.bounded(self.store.issue_tokens(
            &user_name,
            account.access_token.as_deref(),
            &refresh_token,
            &access_token,
            stamp,
        ))
        .await
        .map_err(|e| Self::persist_error(&user_name, e))?;

        let session_token = self.token_generator.new_token();
        let lanes = self.caches.publish(&user_name, stamp, true, |caches, lanes| {
            if lanes.tokens {
                self.cache_issued(caches, &user_name, &access_token, None, stamp);
            }
            if lanes.session {
                caches.session.set(&user_name, session_token.clone());
            }
        });
        if !lanes.session {
            debug!(user_name = user_name.as_str(), "session superseded before it was cached");
        }

        info!(user_name = user_name.as_str(), "login succeeded");
        Ok(LoginResult {
            access_token: AccessToken(access_token),
            refresh_token: RefreshToken(refresh_token),
            session_token: SessionToken(session_token),
        })
    }

    async fn validate_access_token(
        &self,
        user_name: &str,
        token: &str,
    ) -> Result<TokenState, AccountError> {
        if let Some(state) = self.cached_verdict(user_name, token) {
            debug!(user_name, ?state, "access token checked against cache");
            return Ok(state);
        }

        let account = self.load(user_name).await?;
        let state = self.verdict_from_store(&account, token);
        debug!(user_name, ?state, "access token checked against store");
        Ok(state)
    }

    async fn rotate_access_token(
        &self,
        user_name: &str,
        refresh_token: &str,
    ) -> Result<AccessToken, AccountError> {
        // Always the store: a cached verdict is never trusted for refresh.
        let account = self.load(user_name).await?;
        match account.refresh_token.as_deref() {
            Some(current) if current == refresh_token => {}
            _ => {
                warn!(user_name, "refresh token rejected");
                return Err(AccountError::InvalidRefreshToken);
            }
        }

        let stamp = self.next_stamp();
        // An already expired token must not come back to life as a grace token.
        let previous = match (&account.access_token, account.access_token_issued_at) {
            (Some(current), Some(issued_at))
                if self.clock.now()
                    <= Self::deadline(issued_at, self.config.access_token_lifetime) =>
            {
                Some(current.as_str())
            }
            _ => None,
        };

        let access_token = self.token_generator.new_token();
        self.bounded(self.store.rotate_access_token(
            user_name,
            account.access_token.as_deref(),
            previous,
            &access_token,
            stamp,
        ))
        .await
        .map_err(|e| Self::persist_error(user_name, e))?;

        self.caches.publish(user_name, stamp, false, |caches, lanes| {
            if lanes.tokens {
                self.cache_issued(caches, user_name, &access_token, previous, stamp);
            }
        });

        info!(user_name, "access token rotated");
        Ok(AccessToken(access_token))
    }

    async fn validate_session(&self, user_name: &str, session_token: &str) -> bool {
        self.caches
            .session
            .touch_if(user_name, |current| current == session_token)
    }

    async fn revoke_account(&self, user_name: &str) -> Result<(), AccountError> {
        let account = self.load(user_name).await?;
        let stamp = self.next_stamp();
        self.bounded(self.store.clear_tokens(
            user_name,
            account.access_token.as_deref(),
            stamp,
        ))
        .await
        .map_err(|e| Self::persist_error(user_name, e))?;

        self.caches.publish(user_name, stamp, true, |caches, lanes| {
            if lanes.tokens {
                Self::clear_cached(caches, user_name, ClearReason::Revoked);
            }
            if lanes.session {
                caches.session.remove(user_name);
            }
        });

        info!(user_name, "account tokens revoked");
        Ok(())
    }

    async fn get_public_profile(&self, user_name: &str) -> Result<PublicProfile, AccountError> {
        let account = self.load(user_name).await?;
        Ok(account.public_profile())
    }
}
