use super::ExpiringCache;
use super::clock_impl::to_delta;
use crate::application_port::AccountConfig;
use crate::domain_model::CachedToken;
use crate::domain_port::Clock;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Issue stamps of the newest write applied to each lane of a user's caches.
#[derive(Debug, Clone, Copy)]
struct Applied {
    tokens: DateTime<Utc>,
    session: DateTime<Utc>,
}

/// Which lanes of a `publish` are new enough to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lanes {
    pub tokens: bool,
    pub session: bool,
}

/// The three per-manager caches, all keyed by user name.
///
/// Every write carries the issue stamp of the store row it reflects and is
/// applied only if no newer stamp was applied before, so writes that race
/// each other out of order (two rotations, a login and a revocation, a
/// slow validation refill) always leave the newest state in place.
pub struct AccountCaches {
    pub access: Arc<ExpiringCache<CachedToken>>,
    pub previous: Arc<ExpiringCache<CachedToken>>,
    pub session: Arc<ExpiringCache<String>>,
    applied: DashMap<String, Applied>,
    stamp_retention: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl AccountCaches {
    pub fn new(config: &AccountConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            access: Arc::new(ExpiringCache::new(
                "access_token",
                config.token_cache_ttl,
                clock.clone(),
            )),
            previous: Arc::new(ExpiringCache::new(
                "previous_access_token",
                config.token_cache_ttl,
                clock.clone(),
            )),
            session: Arc::new(ExpiringCache::new(
                "session",
                config.session_lifetime,
                clock.clone(),
            )),
            applied: DashMap::new(),
            // A stale write lands at most two store timeouts after the newer
            // stamp it lost to.
            stamp_retention: to_delta(config.token_cache_ttl + config.store_timeout * 2),
            clock,
        }
    }

    /// Run `write` for the lanes whose last applied stamp is not newer than
    /// `stamp`. Returns the lanes that were let through.
    pub fn publish(
        &self,
        user_name: &str,
        stamp: DateTime<Utc>,
        touches_session: bool,
        write: impl FnOnce(&Self, Lanes),
    ) -> Lanes {
        let mut applied = self
            .applied
            .entry(user_name.to_string())
            .or_insert(Applied {
                tokens: DateTime::<Utc>::MIN_UTC,
                session: DateTime::<Utc>::MIN_UTC,
            });
        let lanes = Lanes {
            tokens: stamp >= applied.tokens,
            session: touches_session && stamp >= applied.session,
        };
        if lanes.tokens {
            applied.tokens = stamp;
        }
        if lanes.session {
            applied.session = stamp;
        }
        write(self, lanes);
        lanes
    }

    /// Drop every cached token verdict. Sessions live only here and are kept.
    pub fn evict_tokens(&self) {
        self.access.clear();
        self.previous.clear();
    }

    /// Reclaim expired entries and forget stamps too old to order anything.
    pub fn evict_expired(&self) -> usize {
        let cutoff = self.clock.now() - self.stamp_retention;
        let before = self.applied.len();
        self.applied
            .retain(|_, applied| applied.tokens.max(applied.session) > cutoff);
        let mut evicted = before.saturating_sub(self.applied.len());
        for (name, evicted_here) in [
            (self.access.name(), self.access.evict_expired()),
            (self.previous.name(), self.previous.evict_expired()),
            (self.session.name(), self.session.evict_expired()),
        ] {
            if evicted_here > 0 {
                debug!(cache = name, evicted = evicted_here, "swept expired entries");
            }
            evicted += evicted_here;
        }
        evicted
    }

    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let caches = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        caches.evict_expired();
                    }
                }
            }
        })
    }
}
