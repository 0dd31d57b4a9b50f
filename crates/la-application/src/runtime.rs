//! Runtime message bus between contexts.
//!
//! Models the host's messaging primitive: at-most-once, unordered,
//! best-effort. A message to a context that is not listening is a silent
//! no-op for the sender. Requests that expect an answer carry a oneshot
//! continuation that the receiver resolves whenever its work completes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use la_core::error::{LaError, Result};
use la_core::message::{ChangeEvent, RuntimeMessage, RuntimeResponse};
use la_core::scope::HostScope;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

/// Identifier of one open page.
pub type TabId = u64;

/// A message routed to the background context.
#[derive(Debug)]
pub struct Envelope {
    pub message: RuntimeMessage,
    /// Present iff the sender is waiting for a [`RuntimeResponse`].
    pub reply: Option<oneshot::Sender<RuntimeResponse>>,
}

impl Envelope {
    /// Resolves the sender's continuation. A sender that went away is ignored.
    pub fn respond(self, response: Option<RuntimeResponse>) {
        if let (Some(reply), Some(response)) = (self.reply, response) {
            let _ = reply.send(response);
        }
    }
}

struct TabEntry {
    url: String,
    sender: mpsc::UnboundedSender<ChangeEvent>,
}

#[derive(Default)]
struct BusInner {
    background: Mutex<Option<mpsc::UnboundedSender<Envelope>>>,
    tabs: Mutex<HashMap<TabId, TabEntry>>,
    next_tab_id: AtomicU64,
}

/// Shared handle to the message bus. Cheap to clone.
#[derive(Clone, Default)]
pub struct RuntimeBus {
    inner: Arc<BusInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RuntimeBus {
    pub fn new() -> Self {
        Self::default()
    }

    // ============================================================================
    // Background side
    // ============================================================================

    /// Starts a new background listener, replacing any previous one.
    pub fn attach_background(&self) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.inner.background) = Some(tx);
        rx
    }

    /// Tears the background listener down. Pending replies are dropped.
    pub fn detach_background(&self) {
        lock(&self.inner.background).take();
    }

    // ============================================================================
    // Sender side
    // ============================================================================

    /// Sends a message to the background context.
    ///
    /// Returns `None` when nobody is listening, when the message expects no
    /// answer, or when the receiver went away before answering. Never errors.
    pub async fn send_message(&self, message: RuntimeMessage) -> Option<RuntimeResponse> {
        let sender = lock(&self.inner.background).clone();
        let Some(sender) = sender else {
            tracing::debug!("[RuntimeBus] No background listener for {}", message.kind());
            return None;
        };

        if !message.expects_reply() {
            if sender.send(Envelope { message, reply: None }).is_err() {
                tracing::debug!("[RuntimeBus] Background listener is gone");
            }
            return None;
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let kind = message.kind();
        if sender
            .send(Envelope {
                message,
                reply: Some(reply_tx),
            })
            .is_err()
        {
            tracing::debug!("[RuntimeBus] Background listener is gone ({})", kind);
            return None;
        }
        reply_rx.await.ok()
    }

    /// Parses an untyped message at the boundary and sends it.
    pub async fn send_value(&self, value: Value) -> Result<Option<RuntimeResponse>> {
        let message = RuntimeMessage::from_value(value)?;
        Ok(self.send_message(message).await)
    }

    // ============================================================================
    // Page side
    // ============================================================================

    /// Registers a page and returns its mailbox.
    pub fn open_tab(&self, url: impl Into<String>) -> (TabId, mpsc::UnboundedReceiver<ChangeEvent>) {
        let id = self.inner.next_tab_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.inner.tabs).insert(
            id,
            TabEntry {
                url: url.into(),
                sender: tx,
            },
        );
        (id, rx)
    }

    /// Forgets a page. Later deliveries to it fail softly.
    pub fn close_tab(&self, id: TabId) {
        lock(&self.inner.tabs).remove(&id);
    }

    /// Pages whose URL falls inside `scope`.
    pub fn query_tabs(&self, scope: &HostScope) -> Vec<TabId> {
        let mut ids: Vec<TabId> = lock(&self.inner.tabs)
            .iter()
            .filter(|(_, tab)| scope.matches_url(&tab.url))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Delivers an event to one page.
    ///
    /// Fails with `DeliveryFailure` when the page is unknown or its mailbox
    /// has no live receiver.
    pub fn send_to_tab(&self, id: TabId, event: ChangeEvent) -> Result<()> {
        let tabs = lock(&self.inner.tabs);
        let tab = tabs
            .get(&id)
            .ok_or_else(|| LaError::delivery(format!("tab {id}")))?;
        tab.sender
            .send(event)
            .map_err(|_| LaError::delivery(format!("tab {id} ({})", tab.url)))
    }
}
