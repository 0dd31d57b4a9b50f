//! PopupController - the login surface.
//!
//! Every login path converges on [`PopupController::complete_login`]: persist
//! an unvalidated session, enrich it through the background context, persist
//! the validated result and only then announce it.

use std::sync::Arc;

use la_core::auth::{AuthGrant, AuthProvider, Organization, WebAuthFlow};
use la_core::error::{LaError, Result};
use la_core::message::{ChangeEvent, RuntimeMessage, StatusInfo};
use la_core::session::{Session, SessionStore, StoredSession};
use serde::{Deserialize, Serialize};

use crate::runtime::RuntimeBus;

/// A community tile in the authenticated view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Community {
    pub name: String,
    pub initials: String,
}

impl Community {
    pub fn from_organization(org: &Organization) -> Self {
        let name = org
            .name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("Organization")
            .to_string();
        Self {
            initials: initials(&name),
            name,
        }
    }
}

/// Up to two leading letters of the name's words, upper-cased.
pub fn initials(name: &str) -> String {
    let letters: String = name
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .take(2)
        .collect();
    if letters.is_empty() {
        "OR".to_string()
    } else {
        letters.to_uppercase()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PopupView {
    SignIn {
        /// Whether the one-time code row is shown.
        code_requested: bool,
    },
    Home {
        session: Session,
        communities: Vec<Community>,
    },
}

pub struct PopupController {
    sessions: SessionStore,
    auth: Arc<dyn AuthProvider>,
    bus: RuntimeBus,
    web_auth: Option<Arc<dyn WebAuthFlow>>,
    view: PopupView,
    status: String,
}

impl PopupController {
    pub fn new(sessions: SessionStore, auth: Arc<dyn AuthProvider>, bus: RuntimeBus) -> Self {
        Self {
            sessions,
            auth,
            bus,
            web_auth: None,
            view: PopupView::SignIn {
                code_requested: false,
            },
            status: String::new(),
        }
    }

    pub fn with_web_auth(mut self, flow: Arc<dyn WebAuthFlow>) -> Self {
        self.web_auth = Some(flow);
        self
    }

    pub fn view(&self) -> &PopupView {
        &self.view
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn is_signed_in(&self) -> bool {
        matches!(self.view, PopupView::Home { .. })
    }

    // ============================================================================
    // Login paths
    // ============================================================================

    pub async fn sign_in_with_password(&mut self, email: &str, password: &str) -> Result<Session> {
        self.status = "Signing in...".to_string();
        let grant = self
            .auth
            .sign_in_with_password(email.trim(), password)
            .await;
        self.finish(grant, "Login failed.").await
    }

    /// Requests a one-time code by email.
    pub async fn request_code(&mut self, email: &str) -> Result<()> {
        let email = email.trim();
        if email.is_empty() {
            self.status = "Enter your email first.".to_string();
            return Err(LaError::auth("Enter your email first."));
        }

        self.status = "Sending code...".to_string();
        match self.auth.send_email_otp(email).await {
            Ok(()) => {
                self.status = "Code sent. Check your email.".to_string();
                self.view = PopupView::SignIn {
                    code_requested: true,
                };
                Ok(())
            }
            Err(e) => {
                self.status = status_message(&e, "Failed to send code");
                Err(e)
            }
        }
    }

    pub async fn verify_code(&mut self, email: &str, code: &str) -> Result<Session> {
        let (email, code) = (email.trim(), code.trim());
        if email.is_empty() || code.is_empty() {
            self.status = "Enter email and code.".to_string();
            return Err(LaError::auth("Enter email and code."));
        }

        self.status = "Verifying code...".to_string();
        let grant = self.auth.verify_email_otp(email, code).await;
        self.finish(grant, "Invalid code").await
    }

    /// Runs the interactive OAuth redirect through the host's web auth flow.
    pub async fn sign_in_with_oauth(&mut self) -> Result<Session> {
        self.status = "Signing in with Google...".to_string();
        let grant = self.oauth_grant().await;
        self.finish(grant, "Google sign-in failed").await
    }

    async fn oauth_grant(&self) -> Result<AuthGrant> {
        let flow = self
            .web_auth
            .as_ref()
            .ok_or_else(|| LaError::auth("Browser sign-in is not available"))?;
        let auth_url = self.auth.authorize_url(&flow.redirect_url()).await?;
        let redirected_to = flow.launch(&auth_url).await?;
        self.auth.complete_oauth(&redirected_to).await
    }

    async fn finish(&mut self, grant: Result<AuthGrant>, fallback: &str) -> Result<Session> {
        let result = match grant {
            Ok(grant) => self.complete_login(grant).await,
            Err(e) => Err(e),
        };
        match &result {
            Ok(session) => {
                tracing::info!("[Popup] Signed in as {}", session.user.email);
            }
            Err(e) => {
                tracing::info!("[Popup] Login failed: {}", e);
                self.status = status_message(e, fallback);
            }
        }
        result
    }

    /// Shared tail of every login path.
    ///
    /// If enrichment fails the unvalidated record stays persisted, nothing is
    /// announced and the form stays up; the next sweep or re-validation
    /// resolves it.
    pub async fn complete_login(&mut self, grant: AuthGrant) -> Result<Session> {
        let mut session = Session::unvalidated(grant.user.to_session_user(), grant.access_token);
        self.sessions.save(&session).await?;

        let status = self.enrich(&session.token).await?;
        session.apply_status(&status);
        self.sessions.save(&session).await?;

        self.announce(&session).await;
        self.show_home(session.clone()).await;
        Ok(session)
    }

    // ============================================================================
    // Load / sign-out
    // ============================================================================

    /// Silent re-validation when the popup opens.
    ///
    /// Exactly one status check for a stored session; any failure clears the
    /// store and shows the form. Returns whether the user is signed in.
    pub async fn load(&mut self) -> bool {
        let stored = match self.sessions.load().await {
            Ok(StoredSession::Present(session)) if !session.token.is_empty() => session,
            Ok(_) => {
                self.reset_to_form().await;
                return false;
            }
            Err(e) => {
                tracing::warn!("[Popup] Could not read session: {}", e);
                self.reset_to_form().await;
                return false;
            }
        };

        let mut session = stored;
        match self.enrich(&session.token).await {
            Ok(status) => {
                session.apply_status(&status);
                if let Err(e) = self.sessions.save(&session).await {
                    tracing::warn!("[Popup] Could not persist re-validated session: {}", e);
                }
                self.show_home(session).await;
                true
            }
            Err(e) => {
                tracing::info!("[Popup] Stored session failed re-validation: {}", e);
                self.reset_to_form().await;
                false
            }
        }
    }

    /// Revokes the token, clears the store and reverts to the form. Pages
    /// are not notified.
    ///
    /// The token comes from the home view, or from the stored record when the
    /// popup never left the form.
    pub async fn sign_out(&mut self) -> Result<()> {
        let token = match &self.view {
            PopupView::Home { session, .. } => Some(session.token.clone()),
            PopupView::SignIn { .. } => match self.sessions.load().await {
                Ok(StoredSession::Present(session)) => Some(session.token),
                _ => None,
            },
        };
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            if let Err(e) = self.auth.sign_out(&token).await {
                tracing::debug!("[Popup] Provider sign-out failed: {}", e);
            }
        }
        let cleared = self.sessions.clear().await;
        self.view = PopupView::SignIn {
            code_requested: false,
        };
        self.status.clear();
        tracing::info!("[Popup] Signed out");
        cleared
    }

    // ============================================================================
    // Helpers
    // ============================================================================

    async fn enrich(&self, token: &str) -> Result<StatusInfo> {
        let message = RuntimeMessage::CheckStatus {
            token: token.to_string(),
        };
        match self.bus.send_message(message).await {
            Some(response) => response.into_result(),
            None => Err(LaError::network(None, "Background is not responding")),
        }
    }

    async fn announce(&self, session: &Session) {
        let event = ChangeEvent::updated(session.clone());
        self.bus
            .send_message(RuntimeMessage::SessionUpdated(event))
            .await;
    }

    async fn show_home(&mut self, session: Session) {
        self.status = format!("Signed in as {}", session.user.email);
        let communities = self.load_communities(&session).await;
        self.view = PopupView::Home {
            session,
            communities,
        };
    }

    /// The student's organizations; a failed fetch yields an empty list.
    pub async fn load_communities(&self, session: &Session) -> Vec<Community> {
        match self
            .auth
            .fetch_student_organizations(&session.user.id, &session.token)
            .await
        {
            Ok(orgs) => orgs.iter().map(Community::from_organization).collect(),
            Err(e) => {
                tracing::debug!("[Popup] Could not load communities: {}", e);
                Vec::new()
            }
        }
    }

    async fn reset_to_form(&mut self) {
        if let Err(e) = self.sessions.clear().await {
            tracing::warn!("[Popup] Could not clear session: {}", e);
        }
        self.view = PopupView::SignIn {
            code_requested: false,
        };
        self.status.clear();
    }
}

fn status_message(err: &LaError, fallback: &str) -> String {
    let message = err.to_string();
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}
