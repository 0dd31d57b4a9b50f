//! Host allow-list deciding which pages get a widget and receive relays.

use serde::{Deserialize, Serialize};
use url::Url;

/// Default allow-list.
pub const DEFAULT_HOST_PATTERNS: [&str; 2] = ["*.skool.com", "skool.com"];

/// A set of host patterns. `*.example.com` matches `example.com` and any
/// subdomain of it; a bare host matches only itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostScope {
    patterns: Vec<String>,
}

impl Default for HostScope {
    fn default() -> Self {
        Self::new(DEFAULT_HOST_PATTERNS)
    }
}

impl HostScope {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.into().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether an https page URL falls inside the scope.
    pub fn matches_url(&self, page_url: &str) -> bool {
        let Ok(url) = Url::parse(page_url) else {
            return false;
        };
        if url.scheme() != "https" {
            return false;
        }
        url.host_str().is_some_and(|host| self.matches_host(host))
    }

    pub fn matches_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.patterns.iter().any(|pattern| match pattern.strip_prefix("*.") {
            Some(base) => host == base || host.ends_with(&format!(".{base}")),
            None => host == *pattern,
        })
    }
}
