//! Domain layer for the Learning Assistant.
//!
//! Holds the session model and its validity predicate, the cross-context
//! message union, the durable store trait and the collaborator boundaries.
//! Nothing here performs IO on its own.

pub mod auth;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod message;
pub mod scope;
pub mod session;
pub mod store;

// Re-export common error type
pub use error::LaError;
