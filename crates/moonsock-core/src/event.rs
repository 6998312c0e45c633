//! Lifecycle/message event registry.
//!
//! The connection manager reports everything it does through six event
//! kinds; applications subscribe callbacks per kind.  The registry is an
//! ordered dispatch table:
//!
//! - duplicate registrations of the same callback are all retained and all
//!   invoked (a list, not a set);
//! - listeners fire in registration order, synchronously with respect to
//!   each other;
//! - `once` listeners observe exactly one invocation, even if that
//!   invocation panics;
//! - a panicking listener is isolated: it is logged and the remaining
//!   listeners for the same dispatch still run.
//!
//! Removal is by identity.  Rust closures have no usable structural
//! equality, so [`add_listener`](EventRegistry::add_listener) returns a
//! [`ListenerId`] token that stands in for the callback's identity.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tracing::warn;

/// An outbound or inbound payload.  The transport treats both shapes as
/// opaque; framing and reassembly belong to the socket layer underneath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
}

impl WsMessage {
    /// Returns the payload as text, if it is a text frame.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WsMessage::Text(text) => Some(text),
            WsMessage::Binary(_) => None,
        }
    }
}

impl From<String> for WsMessage {
    fn from(text: String) -> Self {
        WsMessage::Text(text)
    }
}

impl From<&str> for WsMessage {
    fn from(text: &str) -> Self {
        WsMessage::Text(text.to_owned())
    }
}

/// The six recognised event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The socket was established.
    Open,
    /// The socket closed (gracefully or not), or retries were exhausted.
    Close,
    /// A socket-level failure, non-fatal to the manager.
    Error,
    /// An inbound payload arrived.
    Message,
    /// A reconnection attempt is about to begin.
    Retry,
    /// A reconnection attempt just succeeded.
    Reconnect,
}

/// Payload of a [`WsEvent::Retry`] dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryDetail {
    /// Number of retries made since the connection was lost.
    pub retries: u32,
    /// The delay scheduled before the upcoming attempt.
    pub backoff: Duration,
    /// When the connection was lost, or `None` if it was never established.
    pub last_connection: Option<SystemTime>,
}

/// Payload of a [`WsEvent::Reconnect`] dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectDetail {
    /// Number of retries it took to get back.
    pub retries: u32,
    /// When the connection was lost.
    pub last_connection: Option<SystemTime>,
}

/// An event delivered to listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum WsEvent {
    Open,
    Close,
    Error(String),
    Message(WsMessage),
    Retry(RetryDetail),
    Reconnect(ReconnectDetail),
}

impl WsEvent {
    /// The kind listeners register under for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            WsEvent::Open => EventKind::Open,
            WsEvent::Close => EventKind::Close,
            WsEvent::Error(_) => EventKind::Error,
            WsEvent::Message(_) => EventKind::Message,
            WsEvent::Retry(_) => EventKind::Retry,
            WsEvent::Reconnect(_) => EventKind::Reconnect,
        }
    }
}

/// A registered callback.
pub type EventListener = Arc<dyn Fn(&WsEvent) + Send + Sync>;

/// Per-registration options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListenerOptions {
    /// Remove the listener after its first invocation.
    pub once: bool,
}

impl ListenerOptions {
    /// Options for a one-shot listener.
    pub fn once() -> Self {
        Self { once: true }
    }
}

/// Identity token for a registered listener, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct ListenerEntry {
    id: ListenerId,
    listener: EventListener,
    once: bool,
}

struct RegistryInner {
    next_id: u64,
    lists: HashMap<EventKind, Vec<ListenerEntry>>,
}

/// Ordered pub/sub table mapping event kinds to listener lists.
///
/// Thread-safe; the lock is never held while listeners run, so a listener
/// may re-enter the registry (e.g. register another listener) without
/// deadlocking.
pub struct EventRegistry {
    inner: Mutex<RegistryInner>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                next_id: 0,
                lists: HashMap::new(),
            }),
        }
    }

    /// Registers `listener` for `kind` and returns its identity token.
    ///
    /// Registering the same closure twice yields two independent entries;
    /// both are invoked on dispatch.
    pub fn add_listener(
        &self,
        kind: EventKind,
        listener: EventListener,
        options: ListenerOptions,
    ) -> ListenerId {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let id = ListenerId(inner.next_id);
        inner.next_id += 1;
        inner.lists.entry(kind).or_default().push(ListenerEntry {
            id,
            listener,
            once: options.once,
        });
        id
    }

    /// Removes the first entry under `kind` with the given identity.
    ///
    /// Returns `false` if no such entry exists (already removed, wrong
    /// kind, or a spent `once` listener).
    pub fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let Some(entries) = inner.lists.get_mut(&kind) else {
            return false;
        };
        match entries.iter().position(|entry| entry.id == id) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Number of listeners currently registered for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.lists.get(&kind).map_or(0, Vec::len)
    }

    /// Invokes every listener registered for the event's kind, in
    /// registration order.
    ///
    /// `once` entries are unregistered before their callback runs, so they
    /// fire at most once even if the callback panics.  Panics are caught,
    /// logged, and do not stop the remaining listeners.
    pub fn dispatch(&self, event: &WsEvent) {
        let to_invoke: Vec<EventListener> = {
            let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            let Some(entries) = inner.lists.get_mut(&event.kind()) else {
                return;
            };
            let snapshot = entries
                .iter()
                .map(|entry| Arc::clone(&entry.listener))
                .collect();
            entries.retain(|entry| !entry.once);
            snapshot
        };

        for listener in to_invoke {
            let result = catch_unwind(AssertUnwindSafe(|| listener(event)));
            if result.is_err() {
                warn!(kind = ?event.kind(), "event listener panicked; continuing dispatch");
            }
        }
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}
