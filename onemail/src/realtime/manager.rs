//! Realtime connection manager
//!
//! Owns at most one websocket to the oneMail server:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected (retry) -> ... -> Disconnected (terminal)
//! ```
//!
//! An unexpected close schedules a reopen after a fixed delay, up to
//! `max_reconnect_attempts` times. The counter resets on a successful open
//! or on an explicit `connect`. `disconnect` is the only way to stop the
//! cycle early and also cancels a reopen that is waiting out its delay.
//!
//! Handlers are called from the session task, never while the manager's
//! state lock is held, so they may call back into the manager.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};
use tracing::{debug, error, info, warn};

use super::connector::{connection_url, Connector, Frame, WsConnector};
use super::probe::{HttpStatusProbe, StatusProbe};
use super::{ConnectionPhase, RealtimeHandlers};
use crate::config::RealtimeConfig;
use crate::credentials::TokenStorage;
use crate::types::email::{parse_realtime_message, InboundFrame, RealtimeMessage};
use crate::types::error::OneMailError;

struct SessionHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

struct ConnectionState {
    phase: ConnectionPhase,
    reconnect_attempts: u32,
    manually_closed: bool,
    handlers: Option<Arc<dyn RealtimeHandlers>>,
    /// Bumped on every `connect`; a session task whose generation is stale
    /// no longer touches state or handlers
    generation: u64,
    session: Option<SessionHandle>,
    liveness: Option<JoinHandle<()>>,
}

struct Inner {
    config: RealtimeConfig,
    tokens: TokenStorage,
    connector: Arc<dyn Connector>,
    probe: Arc<dyn StatusProbe>,
    state: Mutex<ConnectionState>,
}

/// What to do after a connection closed
enum AfterClose {
    Reconnect { attempt: u32, delay: Duration },
    Stop,
}

#[derive(Clone)]
pub struct RealtimeManager {
    inner: Arc<Inner>,
}

impl RealtimeManager {
    pub fn new(
        config: RealtimeConfig,
        tokens: TokenStorage,
        connector: Arc<dyn Connector>,
        probe: Arc<dyn StatusProbe>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                tokens,
                connector,
                probe,
                state: Mutex::new(ConnectionState {
                    phase: ConnectionPhase::Disconnected,
                    reconnect_attempts: 0,
                    manually_closed: false,
                    handlers: None,
                    generation: 0,
                    session: None,
                    liveness: None,
                }),
            }),
        }
    }

    /// Manager over tokio-tungstenite with the HTTP status probe
    pub fn websocket(config: RealtimeConfig, tokens: TokenStorage) -> Self {
        let probe = Arc::new(HttpStatusProbe::new(config.status_url.clone()));
        Self::new(config, tokens, Arc::new(WsConnector), probe)
    }

    /// Start the connection with `handlers`
    ///
    /// No-op while connected. A session that is still connecting or
    /// waiting to reconnect is replaced. Must be called within a Tokio
    /// runtime.
    pub fn connect(&self, handlers: Arc<dyn RealtimeHandlers>) {
        let mut state = self.inner.lock();

        if state.phase == ConnectionPhase::Connected {
            info!("Realtime connection already open");
            return;
        }

        if let Some(previous) = state.session.take() {
            debug!("Replacing pending realtime session");
            previous.task.abort();
        }
        if let Some(liveness) = state.liveness.take() {
            liveness.abort();
        }

        state.handlers = Some(handlers);
        state.manually_closed = false;
        state.reconnect_attempts = 0;
        state.generation += 1;
        let generation = state.generation;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_session(self.inner.clone(), generation, shutdown_rx));
        state.session = Some(SessionHandle { shutdown, task });
        state.liveness = Some(tokio::spawn(run_liveness(self.inner.clone())));
    }

    /// Close the connection for good; no reconnect follows
    pub fn disconnect(&self) {
        let (session, liveness) = {
            let mut state = self.inner.lock();
            state.manually_closed = true;
            if state.phase != ConnectionPhase::Disconnected {
                info!("Closing realtime connection");
            }
            state.phase = ConnectionPhase::Disconnected;
            (state.session.take(), state.liveness.take())
        };

        if let Some(liveness) = liveness {
            liveness.abort();
        }
        if let Some(session) = session {
            // The session task closes the socket and reports on_disconnect
            let _ = session.shutdown.send(true);
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.inner.lock().phase
    }

    pub fn is_connected(&self) -> bool {
        self.phase() == ConnectionPhase::Connected
    }

    /// Reconnect attempts made since the last successful open
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.lock().reconnect_attempts
    }

    pub fn is_manually_closed(&self) -> bool {
        self.inner.lock().manually_closed
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        // State stays consistent across a panicking handler: handlers never
        // run under this lock.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Handlers for `generation`, if it is still the current session
    fn handlers(&self, generation: u64) -> Option<Arc<dyn RealtimeHandlers>> {
        let state = self.lock();
        if state.generation != generation {
            return None;
        }
        state.handlers.clone()
    }

    fn set_phase(&self, generation: u64, phase: ConnectionPhase) -> bool {
        let mut state = self.lock();
        if state.generation != generation || state.manually_closed {
            return false;
        }
        state.phase = phase;
        true
    }

    fn mark_open(&self, generation: u64) -> Option<Arc<dyn RealtimeHandlers>> {
        let mut state = self.lock();
        if state.generation != generation || state.manually_closed {
            return None;
        }
        state.phase = ConnectionPhase::Connected;
        state.reconnect_attempts = 0;
        state.handlers.clone()
    }

    fn report_error(&self, generation: u64, error: &OneMailError) {
        if let Some(handlers) = self.handlers(generation) {
            handlers.on_error(error);
        }
    }

    /// Close event: notify, then decide whether to reopen
    fn on_closed(&self, generation: u64) -> AfterClose {
        let handlers = {
            let mut state = self.lock();
            if state.generation != generation {
                return AfterClose::Stop;
            }
            state.phase = ConnectionPhase::Disconnected;
            state.handlers.clone()
        };

        info!("Realtime connection closed");
        if let Some(handlers) = handlers {
            handlers.on_disconnect();
        }

        let mut state = self.lock();
        if state.generation != generation || state.manually_closed {
            return AfterClose::Stop;
        }

        let max = self.config.max_reconnect_attempts;
        if state.reconnect_attempts >= max {
            warn!(
                "Realtime connection lost, giving up after {} reconnect attempts",
                max
            );
            return AfterClose::Stop;
        }

        state.reconnect_attempts += 1;
        let attempt = state.reconnect_attempts;
        info!("Attempting to reconnect... ({}/{})", attempt, max);
        AfterClose::Reconnect {
            attempt,
            delay: self.config.reconnect_delay(),
        }
    }

    fn dispatch(&self, generation: u64, text: &str) {
        let message = match parse_realtime_message(text) {
            Ok(InboundFrame::Message(message)) => message,
            Ok(InboundFrame::Unknown(kind)) => {
                warn!("Unknown realtime message type: {}", kind);
                return;
            }
            Err(e) => {
                error!("Error parsing realtime message: {}", e);
                return;
            }
        };

        let active_user = self.tokens.user().map(|user| user.id);
        if active_user.as_deref() != Some(message.user_id()) {
            debug!(
                "Ignoring realtime message for user {} (active: {:?})",
                message.user_id(),
                active_user
            );
            return;
        }

        let Some(handlers) = self.handlers(generation) else {
            return;
        };

        match message {
            RealtimeMessage::NewEmail(data) => {
                debug!("New email {} for user {}", data.email.id, data.user_id);
                handlers.on_new_email(&data.email, &data.user_id, data.timestamp);
            }
            RealtimeMessage::SyncStatus(data) => {
                debug!("Sync status {} for user {}", data.status, data.user_id);
                handlers.on_sync_status(
                    data.status,
                    &data.user_id,
                    data.email.as_deref(),
                    data.error.as_deref(),
                    data.timestamp,
                );
            }
        }
    }
}

/// Session task; the liveness ticker stops with it
async fn run_session(inner: Arc<Inner>, generation: u64, shutdown: watch::Receiver<bool>) {
    session_loop(&inner, generation, shutdown).await;

    let liveness = {
        let mut state = inner.lock();
        if state.generation != generation {
            return;
        }
        state.liveness.take()
    };
    if let Some(liveness) = liveness {
        debug!("Realtime session ended, stopping status checks");
        liveness.abort();
    }
}

/// Open, read until close, reopen with fixed delay while allowed
async fn session_loop(inner: &Inner, generation: u64, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }

        let Some(token) = inner.tokens.access_token() else {
            error!("No access token available for realtime connection");
            inner.set_phase(generation, ConnectionPhase::Disconnected);
            inner.report_error(
                generation,
                &OneMailError::Auth("Authentication required".to_string()),
            );
            return;
        };

        let url = match connection_url(&inner.config.ws_url, &token) {
            Ok(url) => url,
            Err(e) => {
                error!("Invalid realtime endpoint {}: {}", inner.config.ws_url, e);
                inner.set_phase(generation, ConnectionPhase::Disconnected);
                inner.report_error(generation, &e);
                return;
            }
        };

        if !inner.set_phase(generation, ConnectionPhase::Connecting) {
            return;
        }

        let opened = tokio::select! {
            opened = inner.connector.open(&url) => Some(opened),
            _ = shutdown.changed() => None,
        };

        match opened {
            Some(Ok(mut connection)) => match inner.mark_open(generation) {
                Some(handlers) => {
                    info!("Realtime connected");
                    handlers.on_connect();

                    loop {
                        tokio::select! {
                            frame = connection.next_frame() => match frame {
                                Some(Ok(Frame::Text(text))) => inner.dispatch(generation, &text),
                                Some(Ok(Frame::Binary(bytes))) => match String::from_utf8(bytes) {
                                    Ok(text) => inner.dispatch(generation, &text),
                                    Err(_) => error!("Error parsing realtime message: binary frame is not UTF-8"),
                                },
                                Some(Err(e)) => {
                                    error!("Realtime connection error: {}", e);
                                    inner.report_error(generation, &e);
                                    break;
                                }
                                None => break,
                            },
                            _ = shutdown.changed() => {
                                connection.close().await;
                                break;
                            }
                        }
                    }
                }
                None => {
                    connection.close().await;
                    return;
                }
            },
            Some(Err(e)) => {
                error!("Realtime connection error: {}", e);
                inner.report_error(generation, &e);
            }
            // Shut down while the handshake was in flight
            None => {}
        }

        match inner.on_closed(generation) {
            AfterClose::Stop => return,
            AfterClose::Reconnect { attempt, delay } => {
                tokio::select! {
                    _ = sleep(delay) => debug!("Reconnect attempt {} starting", attempt),
                    _ = shutdown.changed() => return,
                }
            }
        }
    }
}

/// Periodic status probe; failures are logged only
async fn run_liveness(inner: Arc<Inner>) {
    let period = inner.config.liveness_interval();
    let mut ticker = interval_at(Instant::now() + period, period);

    loop {
        ticker.tick().await;

        {
            let state = inner.lock();
            if state.manually_closed || state.phase != ConnectionPhase::Connected {
                continue;
            }
        }

        let Some(token) = inner.tokens.access_token() else {
            continue;
        };

        if let Err(e) = inner.probe.probe(&token).await {
            error!("Realtime status check failed: {}", e);
        }
    }
}
