use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_mysql::*;
use crate::logger::*;
use crate::settings::Settings;
use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A running account core: the lifecycle manager, its caches and the
/// background sweepers that reclaim expired cache entries.
pub struct AuthCore {
    pub account_service: Arc<dyn AccountService>,
    caches: Arc<AccountCaches>,
    sweeper_handles: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    pool: Option<MySqlPool>,
}

impl AuthCore {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let config = settings.account_config();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let (store, pool): (Arc<dyn AccountStore>, Option<MySqlPool>) =
            match settings.store.backend.as_str() {
                "memory" => (Arc::new(MemoryAccountStore::new()), None),
                "mysql" => {
                    if settings.store.connection.is_empty() {
                        return Err(anyhow::anyhow!(
                            "store.connection must be set for the mysql backend"
                        ));
                    }
                    let pool = MySqlPoolOptions::new()
                        .acquire_timeout(config.store_timeout)
                        .connect(&settings.store.connection)
                        .await?;
                    let store = MySqlAccountStore::try_new(pool.clone(), &settings.store.table)?;
                    store.ensure_schema().await?;
                    (Arc::new(store), Some(pool))
                }
                other => return Err(anyhow::anyhow!("Unknown store backend: {}", other)),
            };

        let credential_hasher: Arc<dyn CredentialHasher> = match settings.hasher.kind.as_str() {
            "argon2" => Arc::new(Argon2PasswordHasher),
            "md5" => {
                warn!("legacy unsalted md5 password digests are enabled");
                Arc::new(Md5DigestHasher)
            }
            "sha256" => {
                warn!("unsalted sha256 password digests are enabled");
                Arc::new(Sha256DigestHasher)
            }
            other => return Err(anyhow::anyhow!("Unknown password hasher: {}", other)),
        };

        let token_generator: Arc<dyn TokenGenerator> =
            Arc::new(OpaqueTokenGenerator::new(config.node_identity));
        let caches = Arc::new(AccountCaches::new(&config, clock.clone()));

        let cancel = CancellationToken::new();
        let sweeper_handles = match settings.sweep_interval() {
            Some(every) => vec![caches.spawn_sweeper(every, cancel.clone())],
            None => Vec::new(),
        };

        let account_service: Arc<dyn AccountService> = Arc::new(RealAccountService::new(
            store,
            credential_hasher,
            token_generator,
            caches.clone(),
            clock,
            config,
        ));

        info!(
            backend = settings.store.backend.as_str(),
            node = settings.node.identity,
            "account core started"
        );

        Ok(Self {
            account_service,
            caches,
            sweeper_handles: Mutex::new(sweeper_handles),
            cancel,
            pool,
        })
    }

    pub fn caches(&self) -> &Arc<AccountCaches> {
        &self.caches
    }

    pub async fn shutdown(&self) {
        info!("account core shutting down...");

        self.cancel.cancel();

        let handles = match self.sweeper_handles.lock() {
            Ok(mut lock) => std::mem::take(&mut *lock),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            let r = handle.await;
            debug!("cache sweeper stopped: {:?}", r);
        }

        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_starts_and_stops() {
        let mut settings = Settings::default();
        settings.hasher.kind = "sha256".to_string();
        settings.token.sweep_interval_secs = 1;

        let core = AuthCore::try_new(&settings).await.unwrap();
        core.account_service
            .register(RegisterInput {
                user_name: "alice".to_string(),
                password: "secret".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let profile = core.account_service.get_public_profile("alice").await.unwrap();
        assert_eq!(profile.user_name, "alice");
        assert!(core.caches().session.is_empty());

        core.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_backends_are_rejected() {
        let mut settings = Settings::default();
        settings.store.backend = "redis".to_string();
        assert!(AuthCore::try_new(&settings).await.is_err());

        let mut settings = Settings::default();
        settings.hasher.kind = "bcrypt".to_string();
        assert!(AuthCore::try_new(&settings).await.is_err());
    }

    #[tokio::test]
    async fn legacy_md5_hasher_is_selectable() {
        let mut settings = Settings::default();
        settings.hasher.kind = "md5".to_string();
        let core = AuthCore::try_new(&settings).await.unwrap();
        core.account_service
            .register(RegisterInput {
                user_name: "alice".to_string(),
                password: "secret".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let login = core
            .account_service
            .login(LoginInput {
                user_name: "alice".to_string(),
                password: "secret".to_string(),
            })
            .await;
        assert!(login.is_ok());
        core.shutdown().await;
    }

    #[tokio::test]
    async fn mysql_backend_requires_connection() {
        let mut settings = Settings::default();
        settings.store.backend = "mysql".to_string();
        assert!(AuthCore::try_new(&settings).await.is_err());
    }
}
