pub mod auth;
pub mod chat;
pub mod config;
pub mod data;
pub mod lifecycle;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use la_core::config::ExtensionConfig;
use la_core::lifecycle::SurfaceOpener;
use la_core::store::KeyValueStore;
use la_execution::{ExtensionHost, HostServices};
use la_infrastructure::paths::LaPaths;
use la_infrastructure::{ConfigService, JsonFileStore};
use la_interaction::{BackendClient, SupabaseAuthClient};

/// Everything a command needs: the host over the durable store and the
/// configuration it was built from.
pub struct Context {
    pub host: ExtensionHost,
    pub config_service: ConfigService,
    pub config: ExtensionConfig,
    pub supabase: SupabaseAuthClient,
}

impl Context {
    pub async fn open(store_path: Option<PathBuf>, config_file: Option<PathBuf>) -> Result<Self> {
        let store_path = match store_path {
            Some(path) => path,
            None => LaPaths::store_file().context("Failed to resolve the store location")?,
        };
        tracing::debug!("Using store {}", store_path.display());
        let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::new(store_path));

        let mut config_service = ConfigService::new(store.clone());
        if config_file.is_some() {
            config_service = config_service.with_config_file(config_file);
        }
        let config = config_service
            .load()
            .await
            .context("Failed to load configuration")?;

        let supabase = SupabaseAuthClient::new(&config)?;
        let services = HostServices {
            store,
            backend: Arc::new(BackendClient::new(&config)?),
            auth: Arc::new(supabase.clone()),
            web_auth: None,
            surface_opener: Some(Arc::new(TerminalHint)),
            config: config.clone(),
        };

        Ok(Self {
            host: ExtensionHost::new(services),
            config_service,
            config,
            supabase,
        })
    }

    pub async fn shutdown(&self) {
        self.host.shutdown().await;
    }
}

/// There is no window to open from a terminal; point at the login command.
struct TerminalHint;

#[async_trait]
impl SurfaceOpener for TerminalHint {
    async fn open_sign_in(&self) -> la_core::error::Result<()> {
        eprintln!("Sign in with `la login --email <email> --password <password>`.");
        Ok(())
    }
}
