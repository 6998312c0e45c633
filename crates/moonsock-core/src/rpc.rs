//! JSON-RPC 2.0 envelope for the Moonraker wire protocol.
//!
//! Moonraker speaks JSON-RPC 2.0 over its WebSocket: requests carry an
//! integer `id`, responses echo it, and server pushes (`notify_*`) carry a
//! `method` but no `id`.  This module owns the outbound request shape, a
//! lenient inbound envelope for routing, and the monotonic request-id
//! source.
//!
//! One wire quirk is preserved from the protocol: absent fields are
//! serialized as `null` rather than omitted, so `params` is always present
//! in outbound frames.
//!
//! Per the transport contract, nothing here validates payloads beyond the
//! envelope — `params` and `result` stay opaque [`Value`]s.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The protocol version stamped on every request.
pub const JSONRPC_VERSION: &str = "2.0";

/// An outbound JSON-RPC request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub method: String,
    /// `None` serializes as `null`; the field is never omitted.
    pub params: Option<Value>,
    pub id: u64,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Option<Value>, id: u64) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
            id,
        }
    }

    /// Serializes the request into an outbound text frame.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A JSON-RPC error object, as returned in a failed response.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// A lenient inbound envelope: every field optional, so one shape covers
/// responses, notifications, and anything malformed in between.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RpcEnvelope {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
    #[serde(default)]
    pub id: Option<u64>,
}

impl RpcEnvelope {
    /// Parses an inbound text frame.  Returns `None` for anything that is
    /// not a JSON object — routing ignores such frames rather than failing.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    /// A response answers a request: it carries an `id` plus a `result` or
    /// an `error`.
    pub fn is_response(&self) -> bool {
        self.id.is_some() && (self.result.is_some() || self.error.is_some())
    }

    /// A notification is a server push: a `method` with no `id`.
    pub fn is_notification(&self) -> bool {
        self.id.is_none() && self.method.is_some()
    }
}

/// Thread-safe monotonic source of request ids.
///
/// Ids only need to be unique within the window of in-flight requests, so
/// a relaxed atomic counter is sufficient — no randomness required.
pub struct RequestIdCounter {
    inner: AtomicU64,
}

impl RequestIdCounter {
    /// Creates a counter whose first id is 1 (0 is reserved so a default
    /// `id` field never collides with a real request).
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(1),
        }
    }

    /// Returns the next id and advances the counter.  Wraps at `u64::MAX`.
    pub fn next(&self) -> u64 {
        self.inner.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for RequestIdCounter {
    fn default() -> Self {
        Self::new()
    }
}
