//! Builder for [`Websocket`] connections.
//!
//! Assembles a connection manager from a target URL plus optional buffer,
//! backoff strategy, and initial listeners, then spawns it on the ambient
//! tokio runtime.

use std::sync::Arc;

use moonsock_core::{
    Backoff, BoundedQueue, EventKind, EventListener, EventRegistry, ExponentialBackoff,
    ListenerOptions, WsMessage,
};

use crate::websocket::connection::{spawn, Websocket};

/// Default capacity of the outbound message buffer.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Configures and spawns a [`Websocket`].
///
/// ```no_run
/// use moonsock_client::WebsocketBuilder;
/// use moonsock_core::{ConstantBackoff, EventKind, ListenerOptions};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() {
/// let socket = WebsocketBuilder::new("ws://printer.local:7125/websocket")
///     .with_backoff(ConstantBackoff::new(Duration::from_secs(2), 5))
///     .with_listener(
///         EventKind::Open,
///         Arc::new(|_| println!("connected")),
///         ListenerOptions::default(),
///     )
///     .build();
/// socket.send(r#"{"jsonrpc":"2.0","method":"server.info","params":null,"id":1}"#).unwrap();
/// # }
/// ```
pub struct WebsocketBuilder {
    url: String,
    buffer: Option<BoundedQueue<WsMessage>>,
    backoff: Option<Arc<dyn Backoff>>,
    listeners: Vec<(EventKind, EventListener, ListenerOptions)>,
}

impl WebsocketBuilder {
    /// Starts a builder for the given WebSocket endpoint URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            buffer: None,
            backoff: None,
            listeners: Vec::new(),
        }
    }

    /// Uses the given buffer for payloads sent while disconnected.
    /// Defaults to an evict-oldest queue of [`DEFAULT_QUEUE_CAPACITY`].
    pub fn with_buffer(mut self, buffer: BoundedQueue<WsMessage>) -> Self {
        self.buffer = Some(buffer);
        self
    }

    /// Uses the given backoff strategy.  Defaults to
    /// [`ExponentialBackoff::default`] (1000 ms base, 3 retries).
    pub fn with_backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Some(Arc::new(backoff));
        self
    }

    /// Seeds a listener so it is registered before the first connection
    /// attempt and cannot miss the initial `open` event.
    pub fn with_listener(
        mut self,
        kind: EventKind,
        listener: EventListener,
        options: ListenerOptions,
    ) -> Self {
        self.listeners.push((kind, listener, options));
        self
    }

    /// Spawns the connection manager and returns its handle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Websocket {
        let buffer = self
            .buffer
            .unwrap_or_else(|| BoundedQueue::new(DEFAULT_QUEUE_CAPACITY));
        let backoff: Arc<dyn Backoff> = self
            .backoff
            .unwrap_or_else(|| Arc::new(ExponentialBackoff::default()));

        let registry = EventRegistry::new();
        for (kind, listener, options) in self.listeners {
            registry.add_listener(kind, listener, options);
        }

        spawn(self.url, buffer, backoff, registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moonsock_core::ConstantBackoff;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_seeded_listener_receives_events_from_the_first_attempt() {
        let errors = Arc::new(AtomicUsize::new(0));
        let errors_clone = Arc::clone(&errors);

        // Port 1 refuses the connection, so the first attempt must produce
        // an error event that the seeded listener observes.
        let socket = WebsocketBuilder::new("ws://127.0.0.1:1")
            .with_backoff(ConstantBackoff::new(Duration::from_secs(60), 1))
            .with_listener(
                EventKind::Error,
                Arc::new(move |_| {
                    errors_clone.fetch_add(1, Ordering::SeqCst);
                }),
                ListenerOptions::default(),
            )
            .build();

        tokio::time::timeout(Duration::from_secs(5), async {
            while errors.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("seeded error listener must fire");

        socket.close();
    }

    #[tokio::test]
    async fn test_default_buffer_capacity() {
        let socket = WebsocketBuilder::new("ws://127.0.0.1:1")
            .with_backoff(ConstantBackoff::new(Duration::from_secs(60), 3))
            .build();

        // Fill beyond nothing: the default buffer accepts sends while
        // disconnected without erroring.
        for i in 0..100 {
            socket.send(format!("{i}")).unwrap();
        }
        assert_eq!(socket.buffered(), 100);

        socket.close();
    }
}
