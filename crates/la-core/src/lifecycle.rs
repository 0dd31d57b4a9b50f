//! Host lifecycle hooks available to the background context.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Why the install hook fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallReason {
    Install,
    Update,
    BrowserUpdate,
}

/// Opens the sign-in surface without a user gesture.
#[async_trait]
pub trait SurfaceOpener: Send + Sync {
    async fn open_sign_in(&self) -> Result<()>;
}
