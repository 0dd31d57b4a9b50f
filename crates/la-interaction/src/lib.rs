//! HTTP collaborators consumed by the controllers.

pub mod backend_client;
mod http;
pub mod supabase_auth;

pub use backend_client::BackendClient;
pub use supabase_auth::{SupabaseAuthClient, parse_redirect_params};
