//! BackgroundController - the long-lived coordinating context.
//!
//! Sweeps stale sessions, relays session changes to page instances and
//! proxies status and chat calls to the backend on behalf of other contexts.

use std::sync::Arc;
use std::time::Duration;

use la_core::auth::BackendApi;
use la_core::error::{LaError, Result};
use la_core::lifecycle::{InstallReason, SurfaceOpener};
use la_core::message::{ChangeEvent, ChatRequest, RuntimeMessage, RuntimeResponse};
use la_core::scope::HostScope;
use la_core::session::{SessionStore, StoredSession};

use crate::runtime::RuntimeBus;

/// What a sweep found in the session slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Nothing was stored.
    Empty,
    /// A valid session was left in place.
    Kept,
    /// An invalid or malformed record was removed.
    Removed,
    /// The store could not be read or written; nothing changed.
    Failed,
}

/// Per-broadcast delivery tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct BackgroundController {
    sessions: SessionStore,
    backend: Arc<dyn BackendApi>,
    bus: RuntimeBus,
    scope: HostScope,
    opener: Option<Arc<dyn SurfaceOpener>>,
    call_timeout: Duration,
}

impl BackgroundController {
    pub fn new(
        sessions: SessionStore,
        backend: Arc<dyn BackendApi>,
        bus: RuntimeBus,
        scope: HostScope,
        call_timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            backend,
            bus,
            scope,
            opener: None,
            call_timeout,
        }
    }

    /// Sets the surface opened on first install.
    pub fn with_surface_opener(mut self, opener: Arc<dyn SurfaceOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    pub fn bus(&self) -> &RuntimeBus {
        &self.bus
    }

    // ============================================================================
    // Lifecycle
    // ============================================================================

    /// Install / update hook.
    ///
    /// Only a fresh install opens the sign-in surface. The sweep always runs,
    /// even when opening the surface fails.
    pub async fn on_installed(&self, reason: InstallReason) -> SweepOutcome {
        tracing::info!("[Background] Installed ({:?})", reason);
        if reason == InstallReason::Install {
            if let Some(opener) = &self.opener {
                if let Err(e) = opener.open_sign_in().await {
                    tracing::warn!("[Background] Failed to open sign-in surface: {}", e);
                }
            }
        }
        self.sweep().await
    }

    /// Browser startup hook.
    pub async fn on_startup(&self) -> SweepOutcome {
        tracing::info!("[Background] Startup");
        self.sweep().await
    }

    /// Removes the persisted session unless it is valid.
    ///
    /// Never fails outward; store errors are logged.
    pub async fn sweep(&self) -> SweepOutcome {
        let stored = match self.sessions.load().await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("[Background] Sweep could not read the store: {}", e);
                return SweepOutcome::Failed;
            }
        };

        if !stored.needs_sweep() {
            return match stored {
                StoredSession::Empty => SweepOutcome::Empty,
                _ => SweepOutcome::Kept,
            };
        }

        match self.sessions.clear().await {
            Ok(()) => {
                tracing::info!("[Background] Removed stale session");
                SweepOutcome::Removed
            }
            Err(e) => {
                tracing::warn!("[Background] Sweep could not remove the session: {}", e);
                SweepOutcome::Failed
            }
        }
    }

    // ============================================================================
    // Relay
    // ============================================================================

    /// Handles a `SESSION_UPDATED` notification from another context.
    ///
    /// A payload that is mock, unvalidated or token-less is never relayed:
    /// the store is cleared and every page receives a sign-out instead.
    pub async fn on_session_updated(&self, event: ChangeEvent) -> RelayReport {
        match &event.payload {
            Some(session) if session.is_rejected_for_relay() => {
                tracing::warn!("[Background] Rejected session update; broadcasting sign-out");
                if let Err(e) = self.sessions.clear().await {
                    tracing::warn!("[Background] Failed to clear rejected session: {}", e);
                }
                self.relay(&ChangeEvent::signed_out())
            }
            _ => self.relay(&event),
        }
    }

    /// Fans an event out to every page in scope. Per-target failures are
    /// swallowed and never abort the fan-out.
    pub fn relay(&self, event: &ChangeEvent) -> RelayReport {
        let mut report = RelayReport::default();
        for tab in self.bus.query_tabs(&self.scope) {
            match self.bus.send_to_tab(tab, event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::debug!("[Background] Relay skipped: {}", e);
                    report.failed += 1;
                }
            }
        }
        tracing::debug!(
            "[Background] Relayed {} (delivered={}, failed={})",
            if event.payload.is_some() { "session" } else { "sign-out" },
            report.delivered,
            report.failed
        );
        report
    }

    // ============================================================================
    // Request handlers
    // ============================================================================

    /// `CHECK_STATUS`: enrichment lookup for a freshly exchanged token.
    pub async fn check_status(&self, token: &str) -> RuntimeResponse {
        let result = if token.is_empty() {
            Err(LaError::NotAuthenticated)
        } else {
            self.bounded("check-status", self.backend.check_status(token))
                .await
        };
        if let Err(e) = &result {
            tracing::info!("[Background] check-status failed: {}", e);
        }
        RuntimeResponse::from_result(&result)
    }

    /// `CHAT_REQUEST`: proxies one chat turn.
    pub async fn chat(&self, request: ChatRequest) -> RuntimeResponse {
        let result = if request.token.is_empty() {
            Err(LaError::NotAuthenticated)
        } else {
            self.bounded("chat", self.backend.post_chat(&request))
                .await
        };
        if let Err(e) = &result {
            tracing::info!("[Background] chat failed: {}", e);
        }
        RuntimeResponse::from_result(&result)
    }

    /// Dispatches one inbound message. Returns the answer for requests.
    pub async fn handle(&self, message: RuntimeMessage) -> Option<RuntimeResponse> {
        tracing::debug!("[Background] Handling {}", message.kind());
        match message {
            RuntimeMessage::SessionUpdated(event) => {
                self.on_session_updated(event).await;
                None
            }
            RuntimeMessage::CheckStatus { token } => Some(self.check_status(&token).await),
            RuntimeMessage::ChatRequest(request) => Some(self.chat(request).await),
        }
    }

    async fn bounded<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| LaError::Timeout {
                operation: operation.to_string(),
                after_secs: self.call_timeout.as_secs(),
            })?
    }
}
