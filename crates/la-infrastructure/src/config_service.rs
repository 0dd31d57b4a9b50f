//! Configuration resolution.
//!
//! Priority, highest first:
//! 1. Configuration keys in the durable store (`API_BASE_URL`, ...)
//! 2. Environment variables (`LA_API_BASE_URL`, ...)
//! 3. `~/.config/learning-assistant/config.toml`
//!
//! Missing values are not an error here; they surface as `ConfigMissing` when
//! a collaborator actually needs them.

use std::path::PathBuf;
use std::sync::Arc;

use la_core::config::{
    API_BASE_URL_KEY, CONFIG_KEYS, ExtensionConfig, SUPABASE_ANON_KEY_KEY, SUPABASE_URL_KEY,
};
use la_core::error::{LaError, Result};
use la_core::scope::HostScope;
use la_core::store::{KeyValueStore, StoreItems, single_item};
use serde::Deserialize;
use serde_json::Value;

use crate::paths::LaPaths;

pub const ENV_API_BASE_URL: &str = "LA_API_BASE_URL";
pub const ENV_SUPABASE_URL: &str = "LA_SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "LA_SUPABASE_ANON_KEY";

/// On-disk shape of `config.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    api_base_url: Option<String>,
    supabase_url: Option<String>,
    supabase_anon_key: Option<String>,
    request_timeout_secs: Option<u64>,
    host_patterns: Option<Vec<String>>,
}

/// Resolves [`ExtensionConfig`] from the store, the environment and a file.
#[derive(Clone)]
pub struct ConfigService {
    store: Arc<dyn KeyValueStore>,
    config_file: Option<PathBuf>,
    read_env: bool,
}

impl ConfigService {
    /// Uses the default config file location and the process environment.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            config_file: LaPaths::config_file().ok(),
            read_env: true,
        }
    }

    pub fn with_config_file(mut self, path: Option<PathBuf>) -> Self {
        self.config_file = path;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.read_env = false;
        self
    }

    pub async fn load(&self) -> Result<ExtensionConfig> {
        let items = self.store.get(&CONFIG_KEYS).await?;
        let mut config = ExtensionConfig {
            api_base_url: string_item(&items, API_BASE_URL_KEY),
            supabase_url: string_item(&items, SUPABASE_URL_KEY),
            supabase_anon_key: string_item(&items, SUPABASE_ANON_KEY_KEY),
            ..Default::default()
        };

        if self.read_env {
            config = config.or(ExtensionConfig {
                api_base_url: env_value(ENV_API_BASE_URL),
                supabase_url: env_value(ENV_SUPABASE_URL),
                supabase_anon_key: env_value(ENV_SUPABASE_ANON_KEY),
                ..Default::default()
            });
        }

        if let Some(file) = self.load_file() {
            if let Some(secs) = file.request_timeout_secs {
                config.request_timeout_secs = secs;
            }
            if let Some(patterns) = file.host_patterns {
                config.host_scope = HostScope::new(patterns);
            }
            config = config.or(ExtensionConfig {
                api_base_url: file.api_base_url,
                supabase_url: file.supabase_url,
                supabase_anon_key: file.supabase_anon_key,
                ..Default::default()
            });
        }

        Ok(config)
    }

    /// Writes one configuration key into the store.
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let key = known_key(key)?;
        self.store
            .set(single_item(key, Value::String(value.trim().to_string())))
            .await
    }

    pub async fn unset(&self, key: &str) -> Result<()> {
        let key = known_key(key)?;
        self.store.remove(&[key]).await
    }

    fn load_file(&self) -> Option<FileConfig> {
        let path = self.config_file.as_ref()?;
        if !path.exists() {
            return None;
        }
        let parsed = std::fs::read_to_string(path)
            .map_err(LaError::from)
            .and_then(|content| toml::from_str::<FileConfig>(&content).map_err(LaError::from));
        match parsed {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::warn!("[ConfigService] Ignoring {}: {}", path.display(), e);
                None
            }
        }
    }
}

fn known_key(key: &str) -> Result<&'static str> {
    CONFIG_KEYS
        .iter()
        .copied()
        .find(|k| *k == key)
        .ok_or_else(|| LaError::internal(format!("Unknown configuration key: {}", key)))
}

fn string_item(items: &StoreItems, key: &str) -> Option<String> {
    match items.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::String(_)) | Some(Value::Null) | None => None,
        Some(other) => {
            tracing::warn!("[ConfigService] Ignoring non-string {}: {}", key, other);
            None
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
