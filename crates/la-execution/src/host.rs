//! ExtensionHost - runs every context as its own task.
//!
//! The background controller and each page instance own their state inside
//! a dedicated event loop. Nothing is shared between contexts except the
//! store and the [`RuntimeBus`].

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use la_application::background::{BackgroundController, SweepOutcome};
use la_application::page::{GateState, PageInstance, PageSnapshot};
use la_application::popup::PopupController;
use la_application::runtime::{Envelope, RuntimeBus, TabId};
use la_core::auth::{AuthProvider, BackendApi, WebAuthFlow};
use la_core::config::ExtensionConfig;
use la_core::error::{LaError, Result};
use la_core::lifecycle::{InstallReason, SurfaceOpener};
use la_core::message::ChangeEvent;
use la_core::session::SessionStore;
use la_core::store::KeyValueStore;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Collaborators and capabilities the host wires into the controllers.
#[derive(Clone)]
pub struct HostServices {
    pub store: Arc<dyn KeyValueStore>,
    pub backend: Arc<dyn BackendApi>,
    pub auth: Arc<dyn AuthProvider>,
    pub web_auth: Option<Arc<dyn WebAuthFlow>>,
    pub surface_opener: Option<Arc<dyn SurfaceOpener>>,
    pub config: ExtensionConfig,
}

struct BackgroundSlot {
    controller: Arc<BackgroundController>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct ExtensionHost {
    services: HostServices,
    bus: RuntimeBus,
    sessions: SessionStore,
    shutdown: CancellationToken,
    background: Mutex<Option<BackgroundSlot>>,
    pages: Mutex<Vec<JoinHandle<()>>>,
}

impl ExtensionHost {
    pub fn new(services: HostServices) -> Self {
        let sessions = SessionStore::new(services.store.clone());
        Self {
            services,
            bus: RuntimeBus::new(),
            sessions,
            shutdown: CancellationToken::new(),
            background: Mutex::new(None),
            pages: Mutex::new(Vec::new()),
        }
    }

    pub fn bus(&self) -> &RuntimeBus {
        &self.bus
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    // ============================================================================
    // Background context
    // ============================================================================

    /// Fires the install hook, starting the background context if needed.
    pub async fn install(&self, reason: InstallReason) -> SweepOutcome {
        self.ensure_background().await.on_installed(reason).await
    }

    /// Fires the browser-startup hook, starting the background context if needed.
    pub async fn startup(&self) -> SweepOutcome {
        self.ensure_background().await.on_startup().await
    }

    /// Starts the background context without firing a lifecycle hook.
    pub async fn start_background(&self) {
        self.ensure_background().await;
    }

    /// Tears the background context down and brings up a fresh one, as the
    /// host does when it suspends an idle worker. Only the store survives.
    pub async fn restart_background(&self) {
        self.stop_background().await;
        self.ensure_background().await;
    }

    async fn ensure_background(&self) -> Arc<BackgroundController> {
        let mut slot = self.background.lock().await;
        if let Some(running) = slot.as_ref() {
            return running.controller.clone();
        }

        let mut controller = BackgroundController::new(
            self.sessions.clone(),
            self.services.backend.clone(),
            self.bus.clone(),
            self.services.config.host_scope.clone(),
            self.services.config.request_timeout(),
        );
        if let Some(opener) = &self.services.surface_opener {
            controller = controller.with_surface_opener(opener.clone());
        }
        let controller = Arc::new(controller);

        let inbox = self.bus.attach_background();
        let cancel = self.shutdown.child_token();
        let task = tokio::spawn(run_background(controller.clone(), inbox, cancel.clone()));
        tracing::debug!("[Host] Background context started");

        *slot = Some(BackgroundSlot {
            controller: controller.clone(),
            cancel,
            task,
        });
        controller
    }

    async fn stop_background(&self) {
        let Some(slot) = self.background.lock().await.take() else {
            return;
        };
        self.bus.detach_background();
        slot.cancel.cancel();
        if let Err(e) = slot.task.await {
            tracing::warn!("[Host] Background task ended abnormally: {}", e);
        }
        tracing::debug!("[Host] Background context stopped");
    }

    // ============================================================================
    // Page instances
    // ============================================================================

    /// Injects a widget into a page. Pages outside the host scope get none.
    pub async fn open_page(&self, url: &str) -> Option<PageHandle> {
        if !self.services.config.host_scope.matches_url(url) {
            tracing::debug!("[Host] {} is outside the host scope", url);
            return None;
        }

        let (tab_id, mailbox) = self.bus.open_tab(url);
        let page = PageInstance::new(tab_id, url, self.bus.clone());
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(PageStatus::default());
        let cancel = self.shutdown.child_token();

        let task = tokio::spawn(run_page(PageLoop {
            page,
            sessions: self.sessions.clone(),
            bus: self.bus.clone(),
            mailbox,
            commands: commands_rx,
            status: status_tx,
            cancel: cancel.clone(),
        }));
        {
            let mut pages = self.pages.lock().await;
            pages.retain(|handle| !handle.is_finished());
            pages.push(task);
        }
        tracing::debug!("[Host] Mounted widget in tab {} ({})", tab_id, url);

        Some(PageHandle {
            tab_id,
            commands: commands_tx,
            status: status_rx,
            cancel,
        })
    }

    // ============================================================================
    // Popup
    // ============================================================================

    /// Opens a popup surface. Its state lives as long as the returned value.
    pub fn popup(&self) -> PopupController {
        let popup = PopupController::new(
            self.sessions.clone(),
            self.services.auth.clone(),
            self.bus.clone(),
        );
        match &self.services.web_auth {
            Some(flow) => popup.with_web_auth(flow.clone()),
            None => popup,
        }
    }

    /// Page loops still running.
    pub async fn live_pages(&self) -> usize {
        let mut pages = self.pages.lock().await;
        pages.retain(|handle| !handle.is_finished());
        pages.len()
    }

    /// Stops every context and waits for their loops to finish.
    pub async fn shutdown(&self) {
        self.stop_background().await;
        self.shutdown.cancel();
        let pages: Vec<_> = self.pages.lock().await.drain(..).collect();
        for result in join_all(pages).await {
            if let Err(e) = result {
                tracing::warn!("[Host] Page task ended abnormally: {}", e);
            }
        }
        tracing::info!("[Host] Shut down");
    }
}

// ============================================================================
// Background loop
// ============================================================================

async fn run_background(
    controller: Arc<BackgroundController>,
    mut inbox: mpsc::UnboundedReceiver<Envelope>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            envelope = inbox.recv() => {
                let Some(envelope) = envelope else { break };
                // Each request runs on its own task so a slow collaborator
                // call keeps its reply channel open without stalling the inbox.
                let controller = controller.clone();
                tokio::spawn(async move {
                    let Envelope { message, reply } = envelope;
                    let response = controller.handle(message).await;
                    if let (Some(reply), Some(response)) = (reply, response) {
                        let _ = reply.send(response);
                    }
                });
            }
        }
    }
}

// ============================================================================
// Page loop
// ============================================================================

/// Published after every state change of a page loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageStatus {
    pub gate: GateState,
    pub bootstrapped: bool,
    pub events_applied: u64,
}

impl Default for PageStatus {
    fn default() -> Self {
        Self {
            gate: GateState::Unauthenticated,
            bootstrapped: false,
            events_applied: 0,
        }
    }
}

enum PageCommand {
    Send {
        text: String,
        reply: oneshot::Sender<Result<Option<String>>>,
    },
    TogglePanel {
        reply: oneshot::Sender<bool>,
    },
    SelectModule(String),
    Snapshot {
        reply: oneshot::Sender<PageSnapshot>,
    },
}

struct PageLoop {
    page: PageInstance,
    sessions: SessionStore,
    bus: RuntimeBus,
    mailbox: mpsc::UnboundedReceiver<ChangeEvent>,
    commands: mpsc::UnboundedReceiver<PageCommand>,
    status: watch::Sender<PageStatus>,
    cancel: CancellationToken,
}

async fn run_page(mut state: PageLoop) {
    let tab_id = state.page.tab_id();

    // Events that arrive while the store is read queue up in the mailbox and
    // are applied afterwards, so they win over the bootstrap result.
    let gate = state.page.bootstrap(&state.sessions).await;
    state.status.send_modify(|s| {
        s.gate = gate;
        s.bootstrapped = true;
    });

    loop {
        tokio::select! {
            _ = state.cancel.cancelled() => break,
            event = state.mailbox.recv() => {
                let Some(event) = event else { break };
                let gate = state.page.apply_change_event(event);
                state.status.send_modify(|s| {
                    s.gate = gate;
                    s.events_applied += 1;
                });
            }
            command = state.commands.recv() => {
                let Some(command) = command else { break };
                match command {
                    PageCommand::Send { text, reply } => {
                        let result = state.page.send_message(&text).await;
                        let _ = reply.send(result);
                    }
                    PageCommand::TogglePanel { reply } => {
                        let _ = reply.send(state.page.toggle_panel());
                    }
                    PageCommand::SelectModule(module) => state.page.select_module(module),
                    PageCommand::Snapshot { reply } => {
                        let _ = reply.send(state.page.snapshot());
                    }
                }
            }
        }
    }

    state.bus.close_tab(tab_id);
    tracing::debug!("[Host] Page {} unmounted", tab_id);
}

/// Handle to a mounted widget. Dropping it unmounts the widget.
pub struct PageHandle {
    tab_id: TabId,
    commands: mpsc::UnboundedSender<PageCommand>,
    status: watch::Receiver<PageStatus>,
    cancel: CancellationToken,
}

impl PageHandle {
    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    pub fn status(&self) -> PageStatus {
        *self.status.borrow()
    }

    pub async fn snapshot(&self) -> Result<PageSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.command(PageCommand::Snapshot { reply })?;
        rx.await.map_err(|_| self.gone())
    }

    pub async fn send_message(&self, text: impl Into<String>) -> Result<Option<String>> {
        let (reply, rx) = oneshot::channel();
        self.command(PageCommand::Send {
            text: text.into(),
            reply,
        })?;
        rx.await.map_err(|_| self.gone())?
    }

    pub async fn toggle_panel(&self) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.command(PageCommand::TogglePanel { reply })?;
        rx.await.map_err(|_| self.gone())
    }

    pub fn select_module(&self, module: impl Into<String>) -> Result<()> {
        self.command(PageCommand::SelectModule(module.into()))
    }

    /// Waits until the page loop publishes a status matching `predicate`.
    pub async fn wait_until<F>(&self, timeout: Duration, mut predicate: F) -> Result<PageStatus>
    where
        F: FnMut(&PageStatus) -> bool,
    {
        let mut status = self.status.clone();
        let waited = tokio::time::timeout(timeout, status.wait_for(|s| predicate(s))).await;
        match waited {
            Ok(Ok(current)) => Ok(*current),
            Ok(Err(_)) => Err(self.gone()),
            Err(_) => Err(LaError::Timeout {
                operation: format!("waiting on page {}", self.tab_id),
                after_secs: timeout.as_secs(),
            }),
        }
    }

    /// Waits for bootstrap and then for `gate`.
    pub async fn wait_for_gate(&self, gate: GateState, timeout: Duration) -> Result<PageStatus> {
        self.wait_until(timeout, |s| s.bootstrapped && s.gate == gate)
            .await
    }

    /// Unmounts the widget.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    fn command(&self, command: PageCommand) -> Result<()> {
        self.commands.send(command).map_err(|_| self.gone())
    }

    fn gone(&self) -> LaError {
        LaError::delivery(format!("tab {}", self.tab_id))
    }
}

impl Drop for PageHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
