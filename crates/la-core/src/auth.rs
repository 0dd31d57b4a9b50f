//! Auth and backend collaborator boundaries.
//!
//! These are consumed, not implemented, by the controllers. HTTP
//! implementations live in `la-interaction`; tests use in-memory fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LaError, Result};
use crate::message::{ChatReply, ChatRequest, StatusInfo};
use crate::session::SessionUser;

/// A user record as returned by the auth provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Value,
}

impl AuthUser {
    /// Organization recorded in the provider-side user metadata, if any.
    pub fn organization_id(&self) -> Option<String> {
        self.user_metadata
            .get("organization_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }

    /// The session-side view of this user, before enrichment.
    pub fn to_session_user(&self) -> SessionUser {
        SessionUser {
            id: self.id.clone(),
            email: self.email.clone().unwrap_or_default(),
            organization_id: self.organization_id(),
            ..Default::default()
        }
    }
}

/// Result of a successful credential exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: AuthUser,
}

/// An organization the student belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Credential, one-time-code and OAuth exchange against the auth provider.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthGrant>;

    async fn send_email_otp(&self, email: &str) -> Result<()>;

    async fn verify_email_otp(&self, email: &str, code: &str) -> Result<AuthGrant>;

    /// The provider URL that starts an implicit OAuth flow returning to `redirect_to`.
    async fn authorize_url(&self, redirect_to: &str) -> Result<String>;

    /// Completes an OAuth flow from the URL the provider redirected to.
    async fn complete_oauth(&self, redirected_to: &str) -> Result<AuthGrant>;

    async fn get_user(&self, access_token: &str) -> Result<AuthUser>;

    async fn sign_out(&self, access_token: &str) -> Result<()>;

    async fn fetch_student_organizations(
        &self,
        user_id: &str,
        access_token: &str,
    ) -> Result<Vec<Organization>>;
}

/// Row-level data a student can read once membership is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentData {
    /// The organization's published content, newest first.
    Content,
    /// The student's own chat threads in the organization, newest first.
    Threads,
}

/// Membership-checked reads from the provider's REST data API.
#[async_trait]
pub trait StudentDataSource: AuthProvider {
    /// Whether `user_id` holds a STUDENT membership in `organization_id`.
    async fn validate_student_access(
        &self,
        user_id: &str,
        organization_id: &str,
        access_token: &str,
    ) -> Result<bool>;

    async fn fetch_organization_content(
        &self,
        organization_id: &str,
        access_token: &str,
    ) -> Result<Vec<Value>>;

    async fn fetch_student_threads(
        &self,
        user_id: &str,
        organization_id: &str,
        access_token: &str,
    ) -> Result<Vec<Value>>;

    /// Resolves the token's user, confirms the membership, then reads `data`.
    ///
    /// An unknown token is `NotAuthenticated`; a missing membership is
    /// `AccessDenied`.
    async fn ensure_secure_access(
        &self,
        organization_id: &str,
        data: StudentData,
        access_token: &str,
    ) -> Result<Vec<Value>> {
        let user = self.get_user(access_token).await.map_err(|e| match e {
            LaError::AuthFailure(_) => LaError::NotAuthenticated,
            other => other,
        })?;
        if !self
            .validate_student_access(&user.id, organization_id, access_token)
            .await?
        {
            return Err(LaError::AccessDenied("Access denied".to_string()));
        }
        match data {
            StudentData::Content => {
                self.fetch_organization_content(organization_id, access_token)
                    .await
            }
            StudentData::Threads => {
                self.fetch_student_threads(&user.id, organization_id, access_token)
                    .await
            }
        }
    }
}

/// The host's interactive browser step of an OAuth flow.
#[async_trait]
pub trait WebAuthFlow: Send + Sync {
    /// Where the provider must send the user back to.
    fn redirect_url(&self) -> String;

    /// Opens `auth_url` and resolves with the final redirected URL.
    async fn launch(&self, auth_url: &str) -> Result<String>;
}

/// Status enrichment and chat endpoints of the backend.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn check_status(&self, token: &str) -> Result<StatusInfo>;

    async fn post_chat(&self, request: &ChatRequest) -> Result<ChatReply>;
}
