//! Moonraker printer client.
//!
//! [`MoonrakerClient`] layers the JSON-RPC 2.0 printer API on top of the
//! resilient [`Websocket`] transport.  Commands are requests correlated to
//! responses by a monotonic id; `notify_status_update` pushes route to
//! status subscribers.  The transport owns all reconnection concerns — a
//! command issued while the printer host is briefly unreachable is
//! buffered and delivered when the connection recovers (or times out).
//!
//! Boolean commands report success or failure and never raise; query
//! commands return `None` when the data is missing or malformed, matching
//! how printer frontends consume them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::debug;

use moonsock_core::model::PrinterObjectNotification;
use moonsock_core::{
    BoundedQueue, EventKind, EventListener, ListenerId, ListenerOptions, RequestIdCounter,
    RpcEnvelope, RpcError, RpcRequest, WsEvent,
};

use crate::error::ClientError;
use crate::websocket::{Websocket, WebsocketBuilder, DEFAULT_QUEUE_CAPACITY};

/// The Moonraker push method carrying printer-object status changes.
const NOTIFY_STATUS_UPDATE: &str = "notify_status_update";

/// Configuration for a [`MoonrakerClient`].
#[derive(Debug, Clone)]
pub struct MoonrakerConfig {
    /// Base URL of the Moonraker host (e.g. `ws://voron.local:7125`).
    /// A single trailing `/` is stripped; the client subscribes to
    /// `<url>/websocket`.
    pub url: String,
    /// Capacity of the outbound buffer used while disconnected.
    /// Defaults to 10,000 messages.
    pub websocket_message_queue_size: Option<usize>,
    /// How long a request/response call waits before giving up.
    pub request_timeout: Duration,
}

impl MoonrakerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            websocket_message_queue_size: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Completion side of an in-flight request, resolved by the router when a
/// response with the matching id arrives.
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, RpcError>>>>>;

/// A Moonraker JSON-RPC client over a reconnecting WebSocket.
pub struct MoonrakerClient {
    websocket: Websocket,
    pending: PendingMap,
    ids: Arc<RequestIdCounter>,
    request_timeout: Duration,
}

impl MoonrakerClient {
    /// Creates a client and starts connecting to
    /// `<config.url>/websocket`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: MoonrakerConfig) -> Self {
        let endpoint = websocket_endpoint(&config.url);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        // Response router: registered before the first connect so no
        // response can slip past it.
        let router: EventListener = {
            let pending = Arc::clone(&pending);
            Arc::new(move |event: &WsEvent| route_response(&pending, event))
        };

        let capacity = config
            .websocket_message_queue_size
            .unwrap_or(DEFAULT_QUEUE_CAPACITY);
        let websocket = WebsocketBuilder::new(endpoint)
            .with_buffer(BoundedQueue::new(capacity))
            .with_listener(EventKind::Message, router, ListenerOptions::default())
            .build();

        Self {
            websocket,
            pending,
            ids: Arc::new(RequestIdCounter::new()),
            request_timeout: config.request_timeout,
        }
    }

    /// The underlying transport handle, for lifecycle subscriptions
    /// (`open`, `close`, `error`, `retry`, `reconnect`) and raw sends.
    pub fn websocket(&self) -> &Websocket {
        &self.websocket
    }

    /// Registers a listener on the underlying transport.
    pub fn add_websocket_listener(
        &self,
        kind: EventKind,
        listener: EventListener,
        options: ListenerOptions,
    ) -> ListenerId {
        self.websocket.add_listener(kind, listener, options)
    }

    /// Closes the underlying transport.  Terminal; build a new client to
    /// resume.
    pub fn close(&self) {
        self.websocket.close();
    }

    /// Issues a JSON-RPC request and awaits its response.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, ClientError> {
        let id = self.ids.next();
        let text = RpcRequest::new(method, params, id).to_text()?;

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(id, tx);

        if let Err(error) = self.websocket.send(text.as_str()) {
            self.forget(id);
            return Err(error.into());
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(rpc))) => Err(ClientError::Rpc {
                code: rpc.code,
                message: rpc.message,
            }),
            // The router can only drop the sender by being dropped itself,
            // which means the connection is gone for good.
            Ok(Err(_)) => {
                self.forget(id);
                Err(ClientError::Closed)
            }
            Err(_) => {
                self.forget(id);
                Err(ClientError::Timeout(self.request_timeout))
            }
        }
    }

    /// Sends a JSON-RPC request without awaiting the response.
    pub fn send_websocket_message(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), ClientError> {
        let text = RpcRequest::new(method, params, self.ids.next()).to_text()?;
        self.websocket.send(text.as_str()).map_err(Into::into)
    }

    // ── Printer commands ─────────────────────────────────────────────────

    /// Executes a gcode script on the connected printer.  Returns whether
    /// the command succeeded.
    pub async fn send_gcode(&self, gcode: &str) -> bool {
        self.call("printer.gcode.script", Some(json!({ "script": gcode })))
            .await
            .is_ok()
    }

    /// Excludes a named object from the running print.
    pub async fn exclude_object(&self, object_name: &str) -> bool {
        self.send_gcode(&format!("EXCLUDE_OBJECT NAME={object_name}"))
            .await
    }

    /// Starts printing the given file.
    pub async fn print_file(&self, filename: &str) -> bool {
        self.call("printer.print.start", Some(json!({ "filename": filename })))
            .await
            .is_ok()
    }

    /// Pauses the running print.
    pub async fn pause_print(&self) -> bool {
        self.call("printer.print.pause", None).await.is_ok()
    }

    /// Resumes a paused print.
    pub async fn resume_print(&self) -> bool {
        self.call("printer.print.resume", None).await.is_ok()
    }

    /// Cancels the running print.
    pub async fn cancel_print(&self) -> bool {
        self.call("printer.print.cancel", None).await.is_ok()
    }

    /// Sets the heated-bed target temperature.
    pub async fn set_bed_temperature(&self, temperature: f64) -> bool {
        self.send_gcode(&format!(
            "SET_HEATER_TEMPERATURE HEATER=heater_bed TARGET={temperature}"
        ))
        .await
    }

    /// Sets the extruder target temperature.
    pub async fn set_extruder_temperature(&self, temperature: f64) -> bool {
        self.send_gcode(&format!(
            "SET_HEATER_TEMPERATURE HEATER=extruder TARGET={temperature}"
        ))
        .await
    }

    /// Returns print progress in `0.0..=1.0`, or `None` when unavailable.
    pub async fn get_print_progress(&self) -> Option<f64> {
        let result = self
            .call(
                "printer.objects.query",
                Some(json!({ "objects": { "display_status": ["progress"] } })),
            )
            .await
            .ok()?;
        result["status"]["display_status"]["progress"].as_f64()
    }

    /// Returns the reading of a named `temperature_sensor`, or `None`
    /// when the sensor is unknown or the query failed.
    pub async fn get_temperature_for_sensor(&self, sensor_name: &str) -> Option<f64> {
        let sensor = format!("temperature_sensor {sensor_name}");
        let result = self
            .call(
                "printer.objects.query",
                Some(json!({ "objects": { (sensor.clone()): ["temperature"] } })),
            )
            .await
            .ok()?;
        result["status"][&sensor]["temperature"].as_f64()
    }

    // ── Status subscriptions ─────────────────────────────────────────────

    /// Asks Moonraker to push status updates for the given printer
    /// objects.  Keys are object names; a value lists the fields of
    /// interest, `None` meaning all fields.
    pub fn subscribe_to_printer_objects(
        &self,
        objects: &HashMap<String, Option<Vec<String>>>,
    ) -> Result<(), ClientError> {
        self.send_websocket_message(
            "printer.objects.subscribe",
            Some(json!({ "objects": objects })),
        )
    }

    /// Subscribes to status updates and invokes `listener` for every
    /// `notify_status_update` that mentions at least one requested object.
    ///
    /// Returns the id of the underlying message listener so the caller
    /// can unsubscribe via
    /// [`remove_listener`](Websocket::remove_listener).
    pub fn subscribe_to_printer_objects_with_listener(
        &self,
        objects: &HashMap<String, Option<Vec<String>>>,
        listener: impl Fn(PrinterObjectNotification) + Send + Sync + 'static,
    ) -> Result<ListenerId, ClientError> {
        self.subscribe_to_printer_objects(objects)?;

        let requested: Vec<String> = objects.keys().cloned().collect();
        let filter: EventListener = Arc::new(move |event: &WsEvent| {
            let WsEvent::Message(message) = event else {
                return;
            };
            let Some(text) = message.as_text() else {
                return;
            };
            let Some(notification) = status_notification(text) else {
                return;
            };
            if mentions_any(&notification.objects, &requested) {
                listener(notification);
            } else {
                debug!("status update mentions no subscribed object; skipping");
            }
        });

        Ok(self
            .websocket
            .add_listener(EventKind::Message, filter, ListenerOptions::default()))
    }

    fn forget(&self, id: u64) {
        self.pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&id);
    }
}

/// Derives the WebSocket endpoint from a Moonraker base URL, stripping a
/// single trailing path separator first.
fn websocket_endpoint(base_url: &str) -> String {
    let base = base_url.strip_suffix('/').unwrap_or(base_url);
    format!("{base}/websocket")
}

/// Routes an inbound frame to the pending request it answers, if any.
/// Frames that are not responses (notifications, other traffic) are left
/// for the other message listeners.
fn route_response(pending: &PendingMap, event: &WsEvent) {
    let WsEvent::Message(message) = event else {
        return;
    };
    let Some(text) = message.as_text() else {
        return;
    };
    let Some(envelope) = RpcEnvelope::parse(text) else {
        return;
    };
    if !envelope.is_response() {
        return;
    }
    let Some(id) = envelope.id else {
        return;
    };
    let Some(tx) = pending
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .remove(&id)
    else {
        // Late response to a timed-out request; nothing waits for it.
        return;
    };
    let outcome = match envelope.error {
        Some(error) => Err(error),
        None => Ok(envelope.result.unwrap_or(Value::Null)),
    };
    let _ = tx.send(outcome);
}

/// Parses a `notify_status_update` push out of an inbound text frame.
/// Params arrive as a two-element array `[changed_objects, event_time]`.
fn status_notification(text: &str) -> Option<PrinterObjectNotification> {
    let envelope = RpcEnvelope::parse(text)?;
    if !envelope.is_notification() || envelope.method.as_deref() != Some(NOTIFY_STATUS_UPDATE) {
        return None;
    }
    let params = envelope.params?;
    let entries = params.as_array()?;
    let objects = entries.first()?.clone();
    let event_time = entries.get(1).and_then(Value::as_f64).unwrap_or(0.0);
    Some(PrinterObjectNotification {
        event_time,
        objects,
    })
}

/// Whether the changed-objects map mentions any requested object name.
fn mentions_any(objects: &Value, requested: &[String]) -> bool {
    objects
        .as_object()
        .is_some_and(|map| map.keys().any(|key| requested.iter().any(|name| name == key)))
}
