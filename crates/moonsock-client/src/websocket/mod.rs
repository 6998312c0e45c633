//! Resilient WebSocket transport.
//!
//! - [`connection`] – the reconnecting connection manager and its
//!   [`Websocket`](connection::Websocket) handle.
//! - [`builder`] – assembles a manager from a URL plus optional buffer,
//!   backoff, and listener seeds.

pub mod builder;
pub mod connection;

pub use builder::{WebsocketBuilder, DEFAULT_QUEUE_CAPACITY};
pub use connection::{ConnectionState, Websocket};
