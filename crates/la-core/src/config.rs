//! Extension configuration model.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LaError, Result};
use crate::scope::HostScope;

/// Store key for the backend base URL.
pub const API_BASE_URL_KEY: &str = "API_BASE_URL";
/// Store key for the auth provider project URL.
pub const SUPABASE_URL_KEY: &str = "SUPABASE_URL";
/// Store key for the auth provider anonymous key.
pub const SUPABASE_ANON_KEY_KEY: &str = "SUPABASE_ANON_KEY";

pub const CONFIG_KEYS: [&str; 3] = [API_BASE_URL_KEY, SUPABASE_URL_KEY, SUPABASE_ANON_KEY_KEY];

/// Upper bound for any single collaborator call.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Resolved configuration. Missing values are reported when they are needed,
/// not when the configuration is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionConfig {
    pub api_base_url: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub request_timeout_secs: u64,
    pub host_scope: HostScope,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            supabase_url: None,
            supabase_anon_key: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            host_scope: HostScope::default(),
        }
    }
}

impl ExtensionConfig {
    /// Backend base URL without a trailing slash.
    pub fn api_base_url(&self) -> Result<String> {
        required(&self.api_base_url, API_BASE_URL_KEY).map(|url| url.trim_end_matches('/').to_string())
    }

    pub fn supabase_url(&self) -> Result<String> {
        required(&self.supabase_url, SUPABASE_URL_KEY).map(|url| url.trim_end_matches('/').to_string())
    }

    pub fn supabase_anon_key(&self) -> Result<String> {
        required(&self.supabase_anon_key, SUPABASE_ANON_KEY_KEY).map(str::to_string)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Fills every unset field from `other`.
    pub fn or(mut self, other: ExtensionConfig) -> Self {
        self.api_base_url = self.api_base_url.or(other.api_base_url);
        self.supabase_url = self.supabase_url.or(other.supabase_url);
        self.supabase_anon_key = self.supabase_anon_key.or(other.supabase_anon_key);
        self
    }
}

fn required<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| LaError::config_missing(key))
}
