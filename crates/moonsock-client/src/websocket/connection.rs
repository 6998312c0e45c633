//! The reconnecting WebSocket connection manager.
//!
//! One background task owns the physical socket and runs the state machine
//!
//! ```text
//! Connecting ──success──▶ Open ──socket lost──▶ Retrying ──delay──▶ Connecting
//!     │                    │                        │
//!     │ handshake failed   │ close()                │ retries exhausted / close()
//!     ▼                    ▼                        ▼
//!  Retrying             Closing ───────────────▶ Closed (terminal)
//! ```
//!
//! Applications hold a cheap [`Websocket`] handle.  `send` is
//! fire-and-forget: while the socket is open the payload goes to the
//! writer, otherwise it lands in the bounded buffer and is flushed — in
//! its original order, ahead of later sends — when the connection comes
//! back.  Everything the manager does is reported through the event
//! registry; no failure escapes as a panic or an error return from the
//! task's own control flow.

use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use moonsock_core::{
    Backoff, BoundedQueue, EnqueueOutcome, EventKind, EventListener, EventRegistry, ListenerId,
    ListenerOptions, ReconnectDetail, RetryDetail, WsEvent, WsMessage,
};

use crate::error::SendError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The connection manager's current state.  Exactly one state is current
/// at a time; all transitions happen on the background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket handshake in progress.
    Connecting,
    /// Socket usable; sends are written directly.
    Open,
    /// Explicit close requested; graceful shutdown in progress.
    Closing,
    /// Terminal: explicit close or exhausted retries.
    Closed,
    /// No live socket; sends are buffered while the retry timer runs.
    Retrying,
}

/// Retry bookkeeping, owned exclusively by the background task.
#[derive(Debug, Default, Clone, Copy)]
struct RetryContext {
    /// Attempts made since the connection was last open.
    retries: u32,
    /// When the state last left `Open`; `None` until a connection has
    /// been established and lost.
    last_connection: Option<SystemTime>,
}

/// State and buffer live under one lock so that a reconnect flush and a
/// concurrent `send` can never interleave: `send` either sees the old
/// state and buffers (the flush picks the item up) or sees `Open` and
/// writes behind everything already flushed.
struct Inner {
    state: ConnectionState,
    buffer: BoundedQueue<WsMessage>,
}

pub(crate) struct Shared {
    inner: Mutex<Inner>,
    registry: EventRegistry,
    /// Writer channel into the background task; unbounded so `send`
    /// never blocks an application call site.
    out_tx: mpsc::UnboundedSender<WsMessage>,
    /// Close signal; flips to `true` exactly once.
    close_tx: watch::Sender<bool>,
}

impl Shared {
    fn set_state(&self, next: ConnectionState) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        // Closed is terminal; nothing may transition out of it.
        if inner.state != ConnectionState::Closed {
            inner.state = next;
        }
    }
}

/// Handle to a reconnecting WebSocket connection.
///
/// Clones share the same underlying connection.  The contract surface is
/// `send`, `add_listener`, `remove_listener`, and `close`; `state` and
/// `buffered` exist for observability.
#[derive(Clone)]
pub struct Websocket {
    shared: Arc<Shared>,
}

impl Websocket {
    /// Sends a payload, fire-and-forget.
    ///
    /// The queue-vs-socket decision consults the current state under a
    /// single lock: open connections write directly, connecting/retrying
    /// connections buffer, and a closing or closed connection reports
    /// [`SendError::Closed`].  Buffer overflow displaces an item per the
    /// configured policy and is logged, never raised.
    pub fn send(&self, message: impl Into<WsMessage>) -> Result<(), SendError> {
        let message = message.into();
        let mut inner = self.shared.inner.lock().unwrap_or_else(|p| p.into_inner());
        match inner.state {
            ConnectionState::Open => self
                .shared
                .out_tx
                .send(message)
                .map_err(|_| SendError::Closed),
            ConnectionState::Connecting | ConnectionState::Retrying => {
                match inner.buffer.enqueue(message) {
                    EnqueueOutcome::Stored => {}
                    EnqueueOutcome::Evicted(_) => {
                        warn!("outbound buffer full; evicted the oldest buffered message");
                    }
                    EnqueueOutcome::Rejected(_) => {
                        warn!("outbound buffer full; rejected the new message");
                    }
                }
                Ok(())
            }
            ConnectionState::Closing | ConnectionState::Closed => Err(SendError::Closed),
        }
    }

    /// Registers a listener for an event kind.  Duplicates are retained;
    /// `once` listeners fire a single time.
    pub fn add_listener(
        &self,
        kind: EventKind,
        listener: EventListener,
        options: ListenerOptions,
    ) -> ListenerId {
        self.shared.registry.add_listener(kind, listener, options)
    }

    /// Removes a previously registered listener by its identity token.
    pub fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        self.shared.registry.remove_listener(kind, id)
    }

    /// Requests shutdown.  Synchronous and idempotent: cancels a pending
    /// retry timer, aborts an in-flight connect, and suppresses any
    /// further `retry` events.  The terminal state is `Closed`; an open
    /// socket is shut down gracefully (best effort) first.
    pub fn close(&self) {
        {
            let mut inner = self.shared.inner.lock().unwrap_or_else(|p| p.into_inner());
            inner.state = match inner.state {
                // An established socket gets a graceful shutdown pass.
                ConnectionState::Open => ConnectionState::Closing,
                // No live socket: nothing to shut down, jump straight to
                // the terminal state.
                _ => ConnectionState::Closed,
            };
        }
        let _ = self.shared.close_tx.send(true);
    }

    /// The current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .state
    }

    /// Number of payloads currently waiting in the outbound buffer.
    pub fn buffered(&self) -> usize {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .buffer
            .len()
    }
}

/// Creates the shared half of a connection and spawns the background
/// task.  Called by the builder.
pub(crate) fn spawn(
    url: String,
    buffer: BoundedQueue<WsMessage>,
    backoff: Arc<dyn Backoff>,
    registry: EventRegistry,
) -> Websocket {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (close_tx, close_rx) = watch::channel(false);
    let shared = Arc::new(Shared {
        inner: Mutex::new(Inner {
            state: ConnectionState::Connecting,
            buffer,
        }),
        registry,
        out_tx,
        close_tx,
    });

    tokio::spawn(run(Arc::clone(&shared), url, backoff, out_rx, close_rx));

    Websocket { shared }
}

/// Resolves once the close signal is raised.
async fn wait_closed(close_rx: &mut watch::Receiver<bool>) {
    // `wait_for` checks the current value first, so a close requested
    // before this call still resolves immediately.  An error means the
    // sender is gone, which only happens on teardown; treat it as closed.
    let _ = close_rx.wait_for(|closed| *closed).await;
}

fn close_requested(close_rx: &watch::Receiver<bool>) -> bool {
    *close_rx.borrow()
}

/// How a live session ended.
enum SessionEnd {
    /// The application called `close()`.
    Local,
    /// The socket was lost: remote close frame, EOF, or an I/O error.
    Lost,
}

/// The connection manager state machine.  Runs until the state is
/// terminally `Closed`; every outcome is reported through events and
/// nothing propagates out of this task.
async fn run(
    shared: Arc<Shared>,
    url: String,
    backoff: Arc<dyn Backoff>,
    mut out_rx: mpsc::UnboundedReceiver<WsMessage>,
    mut close_rx: watch::Receiver<bool>,
) {
    let mut retry = RetryContext::default();

    loop {
        if close_requested(&close_rx) {
            shared.set_state(ConnectionState::Closed);
            return;
        }
        shared.set_state(ConnectionState::Connecting);
        debug!(%url, attempt = retry.retries, "connecting");

        // Race the handshake against the close signal so an explicit
        // close aborts an in-flight connect.
        let handshake = tokio::select! {
            biased;
            _ = wait_closed(&mut close_rx) => {
                shared.set_state(ConnectionState::Closed);
                return;
            }
            result = connect_async(url.as_str()) => result,
        };

        match handshake {
            Ok((stream, _response)) => {
                let recovered = retry.retries;
                let lost_at = retry.last_connection;

                // Flush and open atomically with respect to `send`: every
                // buffered payload reaches the writer channel before any
                // call site can observe `Open`.
                {
                    let mut inner = shared.inner.lock().unwrap_or_else(|p| p.into_inner());
                    if inner.state == ConnectionState::Closed {
                        // Closed raced the handshake; drop the socket.
                        return;
                    }
                    for message in inner.buffer.drain() {
                        let _ = shared.out_tx.send(message);
                    }
                    inner.state = ConnectionState::Open;
                }
                retry = RetryContext::default();
                info!(%url, "connection open");

                shared.registry.dispatch(&WsEvent::Open);
                if recovered > 0 {
                    shared.registry.dispatch(&WsEvent::Reconnect(ReconnectDetail {
                        retries: recovered,
                        last_connection: lost_at,
                    }));
                }

                let ended = drive_session(&shared, stream, &mut out_rx, &mut close_rx).await;
                retry.last_connection = Some(SystemTime::now());

                match ended {
                    SessionEnd::Local => {
                        shared.set_state(ConnectionState::Closed);
                        shared.registry.dispatch(&WsEvent::Close);
                        return;
                    }
                    SessionEnd::Lost => {
                        // Fall through to the retry path.
                    }
                }
            }
            Err(error) => {
                debug!(%url, %error, "handshake failed");
                shared
                    .registry
                    .dispatch(&WsEvent::Error(error.to_string()));
            }
        }

        // ── Retrying ─────────────────────────────────────────────────────
        shared.set_state(ConnectionState::Retrying);

        if !backoff.has_next_attempt(retry.retries) {
            info!(%url, retries = retry.retries, "retries exhausted; giving up");
            shared.set_state(ConnectionState::Closed);
            shared.registry.dispatch(&WsEvent::Close);
            return;
        }

        let delay = backoff.next_delay(retry.retries);
        // Dispatched before the wait so observers can show progress.
        shared.registry.dispatch(&WsEvent::Retry(RetryDetail {
            retries: retry.retries,
            backoff: delay,
            last_connection: retry.last_connection,
        }));

        tokio::select! {
            biased;
            _ = wait_closed(&mut close_rx) => {
                // Timer cancelled; no further retry events.
                shared.set_state(ConnectionState::Closed);
                return;
            }
            _ = tokio::time::sleep(delay) => {
                retry.retries += 1;
            }
        }
    }
}

/// Drives one live socket session: outbound writes, inbound dispatch, and
/// the close signal.  Returns how the session ended.
async fn drive_session(
    shared: &Shared,
    stream: WsStream,
    out_rx: &mut mpsc::UnboundedReceiver<WsMessage>,
    close_rx: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let (mut sink, mut inbound): (SplitSink<WsStream, Message>, SplitStream<WsStream>) =
        stream.split();

    loop {
        tokio::select! {
            biased;
            _ = wait_closed(close_rx) => {
                shared.set_state(ConnectionState::Closing);
                // Best effort: the peer may already be gone.
                let _ = sink.send(Message::Close(None)).await;
                let _ = sink.close().await;
                return SessionEnd::Local;
            }
            outbound = out_rx.recv() => {
                // The sender half lives in `Shared`, which this task keeps
                // alive, so `None` cannot occur while the session runs.
                let Some(message) = outbound else {
                    return SessionEnd::Local;
                };
                if let Err(error) = sink.send(to_wire(message)).await {
                    shared.registry.dispatch(&WsEvent::Error(error.to_string()));
                    return SessionEnd::Lost;
                }
            }
            frame = inbound.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    shared.registry.dispatch(&WsEvent::Message(WsMessage::Text(text)));
                }
                Some(Ok(Message::Binary(data))) => {
                    shared.registry.dispatch(&WsEvent::Message(WsMessage::Binary(data)));
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = sink.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) | None => {
                    debug!("socket closed by peer");
                    shared.registry.dispatch(&WsEvent::Close);
                    return SessionEnd::Lost;
                }
                Some(Err(error)) => {
                    warn!(%error, "socket read failed");
                    shared.registry.dispatch(&WsEvent::Error(error.to_string()));
                    return SessionEnd::Lost;
                }
            }
        }
    }
}

fn to_wire(message: WsMessage) -> Message {
    match message {
        WsMessage::Text(text) => Message::Text(text),
        WsMessage::Binary(data) => Message::Binary(data),
    }
}
