//! Connection manager: socket lifecycle, auth handshake, reconnect backoff.
//!
//! The manager owns the single live socket handle. No other component may
//! write to it directly; outbound frames go through [`ConnectionManager::send`],
//! which refuses anything while not fully connected. Inbound text frames are
//! forwarded untouched to the channel handed out at construction — the
//! message router consumes them.
//!
//! Lifecycle: `Disconnected → Connecting → Authenticating → Connected`.
//! The socket opening is not enough: an `auth` frame is transmitted
//! immediately, and only the router observing `connection_established`
//! promotes the state to `Connected` (via [`ConnectionManager::mark_established`]).
//!
//! On abnormal close the manager retries with exponential backoff, up to a
//! configured attempt cap. The attempt counter and delay reset to base on
//! every successful socket open. A close during the `Authenticating` window
//! is treated as an auth rejection and is never retried — a credential that
//! just failed would keep failing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use vigil_core::{BackoffPolicy, ClientFrame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot types
// ─────────────────────────────────────────────────────────────────────────────

/// Connectivity state. Exactly one is authoritative at any instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket; either never connected, or a session ended.
    #[default]
    Disconnected,
    /// Opening the socket.
    Connecting,
    /// Socket open, `auth` sent, awaiting `connection_established`.
    Authenticating,
    /// Handshake confirmed; sends are accepted.
    Connected,
}

/// Why the last session (or attempt) ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionFailure {
    /// Socket-level failure; recovered by the reconnect policy.
    Transport(String),
    /// The peer rejected authentication. Never blind-retried.
    AuthRejected(String),
    /// The reconnect attempt cap was reached. Terminal until an explicit
    /// `connect` call starts a fresh counter.
    RetriesExhausted,
}

impl std::fmt::Display for ConnectionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(reason) => write!(f, "transport: {reason}"),
            Self::AuthRejected(reason) => write!(f, "auth rejected: {reason}"),
            Self::RetriesExhausted => f.write_str("reconnect attempts exhausted"),
        }
    }
}

/// Published connection snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Consecutive failed attempts in the current reconnect run.
    pub attempt: u32,
    /// Delay before the next scheduled retry, when one is pending.
    pub retry_delay: Option<Duration>,
    /// Why the last attempt or session ended.
    pub last_error: Option<ConnectionFailure>,
}

/// How one connection epoch ended.
enum EpochEnd {
    /// `disconnect()` or teardown.
    Cancelled,
    /// Closed while still authenticating, or the router saw an auth error.
    AuthRejected(String),
    /// Any other close or transport error.
    Closed(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// ConnectionManager
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the socket lifecycle and the reconnect policy.
pub struct ConnectionManager {
    url: String,
    policy: BackoffPolicy,
    info_tx: watch::Sender<ConnectionInfo>,
    /// Writer handle for the current epoch, if a socket is up.
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    /// Cancelled on `disconnect()`; also ends any scheduled retry sleep.
    session: Mutex<CancellationToken>,
    /// Consecutive failed attempts. Reset on every successful open;
    /// pinned to the cap by `disconnect()` so the retry check
    /// short-circuits.
    attempts: AtomicU32,
    /// Set when the router reports an in-band auth error.
    auth_rejected: AtomicBool,
    auth_reason: Mutex<Option<String>>,
    /// Raw inbound text frames, consumed by the router.
    inbound_tx: mpsc::UnboundedSender<String>,
}

impl ConnectionManager {
    /// Create a manager for `url`. Returns the manager plus the receiver
    /// of raw inbound frames (the router pump consumes it).
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        policy: BackoffPolicy,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (info_tx, _) = watch::channel(ConnectionInfo::default());
        let manager = Arc::new(Self {
            url: url.into(),
            policy,
            info_tx,
            outbound: Mutex::new(None),
            session: Mutex::new(CancellationToken::new()),
            attempts: AtomicU32::new(0),
            auth_rejected: AtomicBool::new(false),
            auth_reason: Mutex::new(None),
            inbound_tx,
        });
        (manager, inbound_rx)
    }

    /// Subscribe to connection snapshots.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<ConnectionInfo> {
        self.info_tx.subscribe()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.info_tx.borrow().state
    }

    /// Start a session with the given credential.
    ///
    /// Idempotent: a no-op while already connecting, authenticating, or
    /// connected. A fresh call after a terminal failure starts a new
    /// attempt counter.
    pub fn connect(self: &Arc<Self>, token: impl Into<String>) {
        let mut started = false;
        self.info_tx.send_modify(|info| {
            if info.state == ConnectionState::Disconnected {
                info.state = ConnectionState::Connecting;
                info.attempt = 0;
                info.retry_delay = None;
                info.last_error = None;
                started = true;
            }
        });
        if !started {
            debug!("connect ignored: session already active");
            return;
        }

        self.attempts.store(0, Ordering::SeqCst);
        self.auth_rejected.store(false, Ordering::SeqCst);
        *self.auth_reason.lock() = None;
        let cancel = CancellationToken::new();
        {
            // A previous session task may still be sleeping out a retry
            // delay; end it so two loops never run at once.
            let mut session = self.session.lock();
            session.cancel();
            *session = cancel.clone();
        }

        let manager = Arc::clone(self);
        let token = token.into();
        drop(tokio::spawn(async move {
            manager.run(token, cancel).await;
        }));
    }

    /// End the session. Terminal: suppresses any scheduled retry and
    /// closes the live socket. Never automatically retried.
    pub fn disconnect(&self) {
        info!("disconnect requested");
        self.attempts.store(self.policy.max_attempts, Ordering::SeqCst);
        self.session.lock().cancel();
    }

    /// Transmit an in-band frame. Returns `false` (with a log) unless the
    /// state is `Connected`.
    pub fn send(&self, frame: &ClientFrame) -> bool {
        if self.state() != ConnectionState::Connected {
            warn!("send dropped: not connected");
            return false;
        }
        let json = match serde_json::to_string(frame) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "send dropped: frame failed to serialize");
                return false;
            }
        };
        match self.outbound.lock().as_ref() {
            Some(tx) => tx.send(Message::text(json)).is_ok(),
            None => false,
        }
    }

    /// Called by the router when the peer confirms the handshake. Promotes
    /// the state to `Connected` and resets the backoff run.
    pub fn mark_established(&self) {
        self.attempts.store(0, Ordering::SeqCst);
        self.info_tx.send_modify(|info| {
            info.state = ConnectionState::Connected;
            info.attempt = 0;
            info.retry_delay = None;
            info.last_error = None;
        });
        info!("connection established");
    }

    /// Called by the router when an in-band error arrives during the
    /// `Authenticating` window. Ends the epoch without a retry.
    pub fn auth_failed(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(%reason, "authentication failed");
        self.auth_rejected.store(true, Ordering::SeqCst);
        *self.auth_reason.lock() = Some(reason);
        self.session.lock().cancel();
    }

    // ─── connection task ─────────────────────────────────────────────────

    async fn run(&self, token: String, cancel: CancellationToken) {
        loop {
            self.info_tx.send_modify(|info| {
                info.state = ConnectionState::Connecting;
                info.retry_delay = None;
            });
            info!(url = %self.url, "connecting");

            let connected = tokio::select! {
                result = connect_async(&self.url) => result,
                () = cancel.cancelled() => {
                    self.enter_disconnected(None);
                    return;
                }
            };

            match connected {
                Ok((stream, _response)) => {
                    // Successful open: attempt counter and delay reset to base.
                    self.attempts.store(0, Ordering::SeqCst);
                    self.info_tx.send_modify(|info| {
                        info.state = ConnectionState::Authenticating;
                        info.attempt = 0;
                        info.retry_delay = None;
                    });
                    debug!("socket open, authenticating");

                    let outcome = self.drive(stream, &token, &cancel).await;
                    let _ = self.outbound.lock().take();

                    match outcome {
                        EpochEnd::Cancelled => {
                            if self.auth_rejected.load(Ordering::SeqCst) {
                                let reason = self
                                    .auth_reason
                                    .lock()
                                    .take()
                                    .unwrap_or_else(|| "closed during authentication".into());
                                error!(%reason, "authentication rejected; not retrying");
                                self.enter_disconnected(Some(ConnectionFailure::AuthRejected(
                                    reason,
                                )));
                            } else {
                                self.enter_disconnected(None);
                                info!("disconnected");
                            }
                            return;
                        }
                        EpochEnd::AuthRejected(reason) => {
                            error!(%reason, "authentication rejected; not retrying");
                            self.enter_disconnected(Some(ConnectionFailure::AuthRejected(reason)));
                            return;
                        }
                        EpochEnd::Closed(reason) => {
                            warn!(%reason, "connection lost");
                            self.enter_disconnected(Some(ConnectionFailure::Transport(reason)));
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "connect failed");
                    self.enter_disconnected(Some(ConnectionFailure::Transport(e.to_string())));
                }
            }

            // Reconnect policy. `disconnect()` pins the counter to the cap,
            // so this check also short-circuits a session that was ended
            // while we were failing.
            let failures = self.attempts.fetch_add(1, Ordering::SeqCst).saturating_add(1);
            if failures >= self.policy.max_attempts {
                error!(attempts = failures, "reconnect attempts exhausted");
                self.info_tx.send_modify(|info| {
                    info.attempt = failures;
                    info.last_error = Some(ConnectionFailure::RetriesExhausted);
                });
                return;
            }

            let delay = self.policy.delay_for_attempt(failures);
            self.info_tx.send_modify(|info| {
                info.attempt = failures;
                info.retry_delay = Some(delay);
            });
            info!(attempt = failures, ?delay, "scheduling reconnect");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => {
                    debug!("scheduled reconnect cancelled");
                    return;
                }
            }
        }
    }

    /// Drive one connection epoch: send the auth frame, then pump frames
    /// both ways until the socket closes or the session is cancelled.
    async fn drive(&self, stream: WsStream, token: &str, cancel: &CancellationToken) -> EpochEnd {
        let (mut sink, mut source) = stream.split();

        // The handshake bypasses `send`, which refuses frames until the
        // peer confirms.
        let auth = ClientFrame::Auth {
            token: token.to_owned(),
        };
        let auth_json = match serde_json::to_string(&auth) {
            Ok(json) => json,
            Err(e) => return EpochEnd::Closed(format!("auth frame serialization: {e}")),
        };
        if let Err(e) = sink.send(Message::text(auth_json)).await {
            return self.close_outcome(e.to_string());
        }

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        *self.outbound.lock() = Some(out_tx);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return EpochEnd::Cancelled;
                }
                outbound = out_rx.recv() => {
                    let Some(message) = outbound else {
                        return self.close_outcome("writer channel closed".into());
                    };
                    if let Err(e) = sink.send(message).await {
                        return self.close_outcome(e.to_string());
                    }
                }
                inbound = source.next() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => {
                            if self.inbound_tx.send(text.to_string()).is_err() {
                                // Router pump is gone; the client is being
                                // torn down.
                                return EpochEnd::Cancelled;
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            return self.close_outcome("closed by peer".into());
                        }
                        Some(Ok(_)) => {} // ping/pong/binary: nothing to route
                        Some(Err(e)) => return self.close_outcome(e.to_string()),
                        None => return self.close_outcome("socket ended".into()),
                    }
                }
            }
        }
    }

    /// A close while still `Authenticating` is an auth rejection, which is
    /// surfaced distinctly and never blind-retried.
    fn close_outcome(&self, reason: String) -> EpochEnd {
        if self.state() == ConnectionState::Authenticating
            || self.auth_rejected.load(Ordering::SeqCst)
        {
            EpochEnd::AuthRejected(reason)
        } else {
            EpochEnd::Closed(reason)
        }
    }

    /// Test hook: pin the lifecycle state without a socket.
    #[cfg(test)]
    pub(crate) fn force_state(&self, state: ConnectionState) {
        self.info_tx.send_modify(|info| info.state = state);
    }

    fn enter_disconnected(&self, failure: Option<ConnectionFailure>) {
        self.info_tx.send_modify(|info| {
            info.state = ConnectionState::Disconnected;
            info.retry_delay = None;
            if let Some(failure) = failure {
                info.last_error = Some(failure);
            }
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
