//! PageInstance - the assistant widget injected into one in-scope page.
//!
//! Owns a local copy of the session and derives the gate state from it. The
//! local copy is replaced by every [`ChangeEvent`] the instance receives; the
//! persisted store is read exactly once, at bootstrap.

use chrono::{DateTime, Utc};
use la_core::error::{LaError, Result};
use la_core::message::{ChangeEvent, ChatReply, ChatRequest, RuntimeMessage};
use la_core::session::{Session, SessionStore, signed_in};
use serde::{Deserialize, Serialize};

use crate::runtime::{RuntimeBus, TabId};

pub const GREETING: &str = "Hi! I'm your AI learning assistant. Select a module to get started, or ask me any questions about your course content.";
pub const MESSAGE_QUOTA: u32 = 10;
pub const DEFAULT_MODULE: &str = "Introduction to Digital Marketing";

/// Whether the widget's content is usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Unauthenticated,
    Authenticated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    Assistant,
    User,
    Error,
}

/// One line of the widget transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptLine {
    pub role: MessageRole,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Read-only view of a widget, as rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub tab_id: TabId,
    pub url: String,
    pub gate: GateState,
    pub signed_in_as: Option<String>,
    pub input_enabled: bool,
    pub overlay_visible: bool,
    pub panel_open: bool,
    pub selected_module: String,
    pub quota: String,
    pub transcript: Vec<TranscriptLine>,
}

pub struct PageInstance {
    tab_id: TabId,
    url: String,
    bus: RuntimeBus,
    session: Option<Session>,
    gate: GateState,
    bootstrapped: bool,
    event_seen: bool,
    greeting_shown: bool,
    panel_open: bool,
    selected_module: String,
    thread_id: String,
    message_count: u32,
    transcript: Vec<TranscriptLine>,
}

impl PageInstance {
    /// Creates an instance in its initial, signed-out state.
    pub fn new(tab_id: TabId, url: impl Into<String>, bus: RuntimeBus) -> Self {
        Self {
            tab_id,
            url: url.into(),
            bus,
            session: None,
            gate: GateState::Unauthenticated,
            bootstrapped: false,
            event_seen: false,
            greeting_shown: false,
            panel_open: false,
            selected_module: DEFAULT_MODULE.to_string(),
            thread_id: format!("thread-{}", uuid::Uuid::new_v4()),
            message_count: 0,
            transcript: Vec::new(),
        }
    }

    // ============================================================================
    // Session and gate
    // ============================================================================

    /// One-time read of the persisted session.
    ///
    /// The stored record is adopted only if it is valid. A change event that
    /// arrived first always wins; calling this twice is a no-op.
    pub async fn bootstrap(&mut self, sessions: &SessionStore) -> GateState {
        if self.bootstrapped {
            return self.gate;
        }
        self.bootstrapped = true;

        let stored = match sessions.load().await {
            Ok(stored) => stored.into_valid(),
            Err(e) => {
                tracing::warn!("[Page {}] Bootstrap read failed: {}", self.tab_id, e);
                None
            }
        };

        if self.event_seen {
            tracing::debug!("[Page {}] Bootstrap superseded by a change event", self.tab_id);
        } else {
            self.session = stored;
        }
        self.recompute_gate()
    }

    /// Replaces the local session with the event payload, unconditionally.
    pub fn apply_change_event(&mut self, event: ChangeEvent) -> GateState {
        self.event_seen = true;
        self.session = event.payload;
        self.recompute_gate()
    }

    /// Derives the gate from the local session and shows the greeting on the
    /// first transition into the authenticated state.
    pub fn recompute_gate(&mut self) -> GateState {
        let previous = self.gate;
        self.gate = if signed_in(self.session.as_ref()) {
            GateState::Authenticated
        } else {
            GateState::Unauthenticated
        };

        if previous != self.gate {
            tracing::debug!("[Page {}] Gate {:?} -> {:?}", self.tab_id, previous, self.gate);
        }
        if self.gate == GateState::Authenticated && !self.greeting_shown {
            self.greeting_shown = true;
            self.push(MessageRole::Assistant, GREETING);
        }
        self.gate
    }

    // ============================================================================
    // Chat
    // ============================================================================

    /// Sends one chat message through the background context.
    ///
    /// Blank input is ignored (`Ok(None)`). Without a valid session the
    /// request never leaves the page. Any failure is also appended to the
    /// transcript as an error line; the gate is never changed here.
    pub async fn send_message(&mut self, text: &str) -> Result<Option<String>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let token = match &self.session {
            Some(session) if session.is_valid() => session.token.clone(),
            _ => return Err(LaError::NotAuthenticated),
        };
        let organization_id = self
            .session
            .as_ref()
            .and_then(|s| s.user.organization_id.clone());

        self.push(MessageRole::User, text);
        self.message_count += 1;

        let request = ChatRequest {
            token,
            organization_id,
            text: text.to_string(),
            thread_id: self.thread_id.clone(),
        };
        let result = match self
            .bus
            .send_message(RuntimeMessage::ChatRequest(request))
            .await
        {
            Some(response) => response.into_result::<ChatReply>(),
            None => Err(LaError::network(None, "Assistant is unavailable")),
        };

        match result {
            Ok(ChatReply { reply }) => {
                self.push(MessageRole::Assistant, &reply);
                Ok(Some(reply))
            }
            Err(e) => {
                tracing::info!("[Page {}] Chat failed: {}", self.tab_id, e);
                self.push(MessageRole::Error, &format!("Error: {e}"));
                Err(e)
            }
        }
    }

    // ============================================================================
    // Widget chrome
    // ============================================================================

    pub fn toggle_panel(&mut self) -> bool {
        self.panel_open = !self.panel_open;
        self.panel_open
    }

    pub fn select_module(&mut self, module: impl Into<String>) {
        self.selected_module = module.into();
    }

    /// `"{remaining}/10 messages"`.
    pub fn quota_label(&self) -> String {
        format!("{}/{} messages", self.remaining_messages(), MESSAGE_QUOTA)
    }

    pub fn remaining_messages(&self) -> u32 {
        MESSAGE_QUOTA.saturating_sub(self.message_count)
    }

    pub fn is_input_enabled(&self) -> bool {
        self.gate == GateState::Authenticated
    }

    pub fn is_overlay_visible(&self) -> bool {
        self.gate == GateState::Unauthenticated
    }

    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn gate(&self) -> GateState {
        self.gate
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn transcript(&self) -> &[TranscriptLine] {
        &self.transcript
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn selected_module(&self) -> &str {
        &self.selected_module
    }

    pub fn is_panel_open(&self) -> bool {
        self.panel_open
    }

    pub fn snapshot(&self) -> PageSnapshot {
        PageSnapshot {
            tab_id: self.tab_id,
            url: self.url.clone(),
            gate: self.gate,
            signed_in_as: self
                .session
                .as_ref()
                .filter(|s| s.is_valid())
                .map(|s| s.user.email.clone()),
            input_enabled: self.is_input_enabled(),
            overlay_visible: self.is_overlay_visible(),
            panel_open: self.panel_open,
            selected_module: self.selected_module.clone(),
            quota: self.quota_label(),
            transcript: self.transcript.clone(),
        }
    }

    fn push(&mut self, role: MessageRole, text: &str) {
        self.transcript.push(TranscriptLine {
            role,
            text: text.to_string(),
            at: Utc::now(),
        });
    }
}
