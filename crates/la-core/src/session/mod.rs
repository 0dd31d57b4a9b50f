//! Session domain: the shared authentication fact and its validity rules.

mod model;
mod storage;

pub use model::{
    DEFAULT_ROLE, DEFAULT_TIER, MOCK_TOKEN, SESSION_SOURCE_SUPABASE, Session, SessionUser,
    signed_in,
};
pub use storage::{SESSION_KEY, SessionStore, StoredSession};
