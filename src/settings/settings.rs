use crate::application_port::AccountConfig;
use anyhow::{Result, anyhow};
use config::{Config, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub hasher: Hasher,
    pub log: Log,
    pub node: Node,
    pub store: Store,
    pub token: Token,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Hasher {
    pub kind: String, // "argon2", "md5" (legacy rows) or "sha256"
}

impl Default for Hasher {
    fn default() -> Self {
        Self {
            kind: "argon2".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Log {
    pub filter: String,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Node {
    pub identity: u16,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Store {
    pub backend: String, // "memory" or "mysql"
    pub connection: String,
    pub table: String,
    pub timeout_ms: u64,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            connection: String::new(),
            table: "uc_users".to_string(),
            timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Token {
    pub access_token_lifetime_secs: u64,
    pub session_lifetime_secs: u64,
    pub grace_window_secs: u64,
    pub cache_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for Token {
    fn default() -> Self {
        Self {
            access_token_lifetime_secs: 7 * 24 * 60 * 60,
            session_lifetime_secs: 24 * 60 * 60,
            grace_window_secs: 2 * 60 * 60,
            cache_ttl_secs: 2 * 60 * 60,
            sweep_interval_secs: 5 * 60,
        }
    }
}

impl Settings {
    pub fn account_config(&self) -> AccountConfig {
        AccountConfig {
            node_identity: self.node.identity,
            access_token_lifetime: Duration::from_secs(self.token.access_token_lifetime_secs),
            session_lifetime: Duration::from_secs(self.token.session_lifetime_secs),
            grace_window: Duration::from_secs(self.token.grace_window_secs),
            token_cache_ttl: Duration::from_secs(self.token.cache_ttl_secs),
            store_timeout: Duration::from_millis(self.store.timeout_ms),
        }
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        match self.token.sweep_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_settings_parse() {
        let settings = parse_settings(Some("settings/dev.toml")).unwrap();
        assert_eq!(settings.store.backend, "memory");
        assert_eq!(settings.hasher.kind, "sha256");
        let config = settings.account_config();
        assert_eq!(config.grace_window, Duration::from_secs(7_200));
        assert_eq!(config.store_timeout, Duration::from_millis(2_000));
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let path = std::env::temp_dir().join(format!("passgate-{}.toml", std::process::id()));
        std::fs::write(&path, "[node]\nidentity = 7\n").unwrap();
        let settings = parse_settings(path.to_str()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.node.identity, 7);
        assert_eq!(settings.store.table, "uc_users");
        let config = settings.account_config();
        assert_eq!(config.node_identity, 7);
        assert_eq!(config.access_token_lifetime, Duration::from_secs(604_800));
        assert_eq!(settings.sweep_interval(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(parse_settings(Some("settings/does-not-exist.toml")).is_err());
    }
}
