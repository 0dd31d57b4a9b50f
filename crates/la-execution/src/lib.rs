//! Runtime for the Learning Assistant contexts.
//!
//! [`ExtensionHost`] plays the browser's part: it starts the background
//! context, mounts page widgets, opens the popup and fires lifecycle hooks.

pub mod host;
pub mod telemetry;

pub use host::{ExtensionHost, HostServices, PageHandle, PageStatus};
pub use telemetry::{LogFormat, init_tracing};
