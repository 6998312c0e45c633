//! # moonsock-core
//!
//! Pure building blocks for the moonsock Moonraker client: backoff
//! strategies, the bounded outbound-message buffer, the event registry,
//! the JSON-RPC 2.0 envelope, and the printer data model.
//!
//! This crate deliberately owns no sockets and spawns no tasks.  Everything
//! here is deterministic and testable without a runtime; the
//! `moonsock-client` crate wires these pieces to a real WebSocket.
//!
//! - **`backoff`** – how long to wait between reconnection attempts, and
//!   when to give up.
//! - **`buffer`** – where outbound payloads go while the socket is down.
//! - **`event`** – how lifecycle and message events fan out to subscribers.
//! - **`rpc`** – the JSON-RPC envelope Moonraker speaks, plus the monotonic
//!   request-id source.
//! - **`model`** – serde shapes for printer state and status notifications.

pub mod backoff;
pub mod buffer;
pub mod event;
pub mod model;
pub mod rpc;

// Re-export the most-used types at the crate root so callers can write
// `moonsock_core::ExponentialBackoff` instead of the full path.
pub use backoff::{Backoff, ConstantBackoff, ExponentialBackoff};
pub use buffer::{BoundedQueue, EnqueueOutcome, OverflowPolicy};
pub use event::{
    EventKind, EventListener, EventRegistry, ListenerId, ListenerOptions, ReconnectDetail,
    RetryDetail, WsEvent, WsMessage,
};
pub use rpc::{RequestIdCounter, RpcEnvelope, RpcError, RpcRequest};
