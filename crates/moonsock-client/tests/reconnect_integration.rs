//! Integration tests for the reconnecting transport.
//!
//! These tests exercise the `Websocket` through its public API the way an
//! application would, against either an unreachable address or a real
//! in-process tokio-tungstenite server.  They verify the load-bearing
//! properties of the state machine:
//!
//! - retry exhaustion dispatches exactly `max_retries` retry events and
//!   then exactly one close event, terminally;
//! - payloads sent while disconnected flush in their original order ahead
//!   of anything sent after the reconnect;
//! - a `once` listener survives across reconnects for a single invocation;
//! - an explicit `close()` cancels a pending retry timer.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;

use moonsock_client::{ConnectionState, WebsocketBuilder};
use moonsock_core::{ConstantBackoff, EventKind, ListenerOptions, WsEvent};

/// Installs the tracing subscriber once so `RUST_LOG` controls test output.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Listener that forwards a tag into a channel every time its kind fires.
fn tagging_listener(
    tag: &'static str,
    tx: mpsc::UnboundedSender<&'static str>,
) -> moonsock_core::EventListener {
    Arc::new(move |_event: &WsEvent| {
        let _ = tx.send(tag);
    })
}

#[tokio::test]
async fn test_retry_exhaustion_dispatches_three_retries_then_one_close() {
    init_tracing();
    let (tx, mut rx) = mpsc::unbounded_channel();

    // Port 1 refuses every connection attempt.
    let socket = WebsocketBuilder::new("ws://127.0.0.1:1")
        .with_backoff(ConstantBackoff::new(Duration::from_millis(20), 3))
        .with_listener(EventKind::Retry, tagging_listener("retry", tx.clone()), ListenerOptions::default())
        .with_listener(EventKind::Close, tagging_listener("close", tx.clone()), ListenerOptions::default())
        .build();

    let mut log = Vec::new();
    timeout(Duration::from_secs(5), async {
        loop {
            let tag = rx.recv().await.expect("event channel open");
            log.push(tag);
            if tag == "close" {
                break;
            }
        }
    })
    .await
    .expect("exhaustion must dispatch a close event");

    // Nothing may fire after the terminal close.
    tokio::time::sleep(Duration::from_millis(200)).await;
    while let Ok(tag) = rx.try_recv() {
        log.push(tag);
    }

    assert_eq!(log, vec!["retry", "retry", "retry", "close"]);
    assert_eq!(socket.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_buffered_sends_flush_in_order_ahead_of_later_sends() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (received_tx, mut received_rx) = mpsc::unbounded_channel::<String>();
    let server = tokio::spawn(async move {
        // First attempt: accept the TCP connection and drop it before the
        // upgrade completes, forcing the client into its retry path.
        let (first, _) = listener.accept().await.unwrap();
        drop(first);

        // Second attempt: complete the handshake and collect frames.
        let (second, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(second).await.unwrap();
        while let Some(Ok(frame)) = ws.next().await {
            if let Message::Text(text) = frame {
                let done = text == "third";
                received_tx.send(text).unwrap();
                if done {
                    break;
                }
            }
        }
    });

    let (retry_tx, mut retry_rx) = mpsc::unbounded_channel();
    let (open_tx, mut open_rx) = mpsc::unbounded_channel();
    let socket = WebsocketBuilder::new(format!("ws://127.0.0.1:{port}"))
        .with_backoff(ConstantBackoff::new(Duration::from_millis(200), 5))
        .with_listener(EventKind::Retry, tagging_listener("retry", retry_tx), ListenerOptions::default())
        .with_listener(EventKind::Open, tagging_listener("open", open_tx), ListenerOptions::default())
        .build();

    // Wait until the first attempt has failed; the manager is now in its
    // retry delay and sends must buffer.
    timeout(Duration::from_secs(5), retry_rx.recv())
        .await
        .expect("first attempt must fail")
        .unwrap();
    socket.send("first").unwrap();
    socket.send("second").unwrap();

    // Wait for the reconnect, then send one more.
    timeout(Duration::from_secs(5), open_rx.recv())
        .await
        .expect("reconnect must succeed")
        .unwrap();
    socket.send("third").unwrap();

    let mut observed = Vec::new();
    timeout(Duration::from_secs(5), async {
        while observed.len() < 3 {
            observed.push(received_rx.recv().await.expect("server running"));
        }
    })
    .await
    .expect("server must observe all three frames");

    assert_eq!(observed, vec!["first", "second", "third"]);

    socket.close();
    let _ = timeout(Duration::from_secs(5), server).await;
}

#[tokio::test]
async fn test_once_open_listener_fires_once_across_two_connects() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        // First session: close immediately so the client reconnects.
        let (first, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(first).await.unwrap();
        let _ = ws.close(None).await;

        // Second session: stay open until the client goes away.
        let (second, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(second).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let (open_tx, mut open_rx) = mpsc::unbounded_channel();
    let (once_tx, mut once_rx) = mpsc::unbounded_channel();
    let socket = WebsocketBuilder::new(format!("ws://127.0.0.1:{port}"))
        .with_backoff(ConstantBackoff::new(Duration::from_millis(100), 5))
        .with_listener(EventKind::Open, tagging_listener("open", open_tx), ListenerOptions::default())
        .with_listener(EventKind::Open, tagging_listener("once", once_tx), ListenerOptions::once())
        .build();

    // Two successful connects observed by the persistent listener.
    timeout(Duration::from_secs(5), async {
        open_rx.recv().await.unwrap();
        open_rx.recv().await.unwrap();
    })
    .await
    .expect("two connects expected");

    assert_eq!(once_rx.recv().await, Some("once"));
    assert!(once_rx.try_recv().is_err(), "once listener must not fire twice");

    socket.close();
    let _ = timeout(Duration::from_secs(5), server).await;
}

#[tokio::test]
async fn test_close_cancels_a_pending_retry_timer() {
    init_tracing();
    let (retry_tx, mut retry_rx) = mpsc::unbounded_channel();

    // A short first failure, then a long timer we expect to cancel.
    let socket = WebsocketBuilder::new("ws://127.0.0.1:1")
        .with_backoff(ConstantBackoff::new(Duration::from_secs(60), 3))
        .with_listener(EventKind::Retry, tagging_listener("retry", retry_tx), ListenerOptions::default())
        .build();

    timeout(Duration::from_secs(5), retry_rx.recv())
        .await
        .expect("first retry must be scheduled")
        .unwrap();

    socket.close();
    assert_eq!(socket.state(), ConnectionState::Closed);

    // The cancelled timer must not produce further retry events.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(retry_rx.try_recv().is_err(), "no retry after close()");
}

#[tokio::test]
async fn test_reconnect_event_carries_retry_count() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (first, _) = listener.accept().await.unwrap();
        drop(first);
        let (second, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(second).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let (reconnect_tx, mut reconnect_rx) = mpsc::unbounded_channel::<u32>();
    let socket = WebsocketBuilder::new(format!("ws://127.0.0.1:{port}"))
        .with_backoff(ConstantBackoff::new(Duration::from_millis(100), 5))
        .with_listener(
            EventKind::Reconnect,
            Arc::new(move |event: &WsEvent| {
                if let WsEvent::Reconnect(detail) = event {
                    let _ = reconnect_tx.send(detail.retries);
                }
            }),
            ListenerOptions::default(),
        )
        .build();

    let retries = timeout(Duration::from_secs(5), reconnect_rx.recv())
        .await
        .expect("reconnect event expected")
        .unwrap();

    assert!(retries >= 1, "a recovered connection took at least one retry");

    socket.close();
    let _ = timeout(Duration::from_secs(5), server).await;
}
