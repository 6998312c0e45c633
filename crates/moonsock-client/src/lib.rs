//! # moonsock-client
//!
//! A resilient Moonraker (Klipper) client.  Two layers:
//!
//! - **`websocket`** – the reconnecting transport.  A background task owns
//!   the socket, retries with exponential backoff after disconnects,
//!   buffers outbound traffic while offline, and fans lifecycle/message
//!   events out to subscribers.
//! - **`client`** – [`MoonrakerClient`], the JSON-RPC 2.0 printer API on
//!   top of the transport: gcode, print control, heater targets, object
//!   queries, and status subscriptions.
//!
//! ```no_run
//! use moonsock_client::{MoonrakerClient, MoonrakerConfig};
//!
//! # async fn example() {
//! let client = MoonrakerClient::new(MoonrakerConfig::new("ws://voron.local:7125"));
//! if client.send_gcode("G28").await {
//!     println!("homed");
//! }
//! # }
//! ```

pub mod client;
pub mod error;
pub mod websocket;

pub use client::{MoonrakerClient, MoonrakerConfig};
pub use error::{ClientError, SendError};
pub use websocket::{ConnectionState, Websocket, WebsocketBuilder, DEFAULT_QUEUE_CAPACITY};
