//! WebSocket Connection Layer
//!
//! Single responsibility: own the transport, report its liveness, and let
//! other components wait for it to become usable without polling.
//!
//! # The Readiness Gate
//!
//! `open()` starts establishing the transport and returns immediately; it is
//! not awaitable. Anything that wants to transmit first awaits `until_ready()`,
//! which parks the caller on a FIFO queue and releases every waiter exactly
//! once when the transport reaches `Open`. Nothing is buffered below the gate:
//! until `Open` fires, not a single frame goes out.
//!
//! # State Machine
//!
//! ```text
//! Connecting ──(transport open)──► Open ──(close / error)──► Closed
//!     │                                                        ▲
//!     └───────────────(connect failed)────────────────────────┘
//! ```
//!
//! `Closed` is terminal for a connection instance. When it is reached, queued
//! waiters are dropped (their receivers resolve to a transport error) and the
//! incoming channel ends, which lets the dispatcher fail every outstanding
//! call instead of leaving it to hang.

use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};

use crate::error::ClientError;

/// Liveness of the transport, as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// The transport is gone: it either never connected or has since dropped.
    Closed,
    /// `open()` has been called and the handshake is in flight.
    Connecting,
    /// The transport is usable; `send()` will transmit.
    Open,
}

/// Receiving half of the connection: raw text frames in receipt order.
///
/// Exactly one consumer (the dispatcher) reads from this. The channel ends
/// when the transport closes.
pub type Incoming = mpsc::UnboundedReceiver<String>;

struct Shared {
    state: ConnectionState,
    /// Queued `until_ready()` waiters, released FIFO on `Open`.
    waiters: VecDeque<oneshot::Sender<()>>,
    /// Handle to the write loop while the transport is open.
    write_tx: Option<mpsc::UnboundedSender<String>>,
}

/// A handle to one WebSocket transport.
pub struct Connection {
    shared: Arc<Mutex<Shared>>,
}

impl Connection {
    /// Begin establishing the transport.
    ///
    /// Returns immediately with the connection handle and the incoming frame
    /// channel; the handshake runs in a spawned task. Establishment failure is
    /// observable through `until_ready()` and `send()`, which fail instead of
    /// hanging.
    pub fn open(url: &str) -> (Self, Incoming) {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Mutex::new(Shared {
            state: ConnectionState::Connecting,
            waiters: VecDeque::new(),
            write_tx: None,
        }));

        tokio::spawn(run_transport(url.to_string(), Arc::clone(&shared), incoming_tx));

        (Self { shared }, incoming_rx)
    }

    /// Current transport state.
    pub async fn state(&self) -> ConnectionState {
        self.shared.lock().await.state
    }

    /// Wait until the transport is usable.
    ///
    /// Resolves immediately if already `Open`. Otherwise the caller is queued
    /// and released, in FIFO order, exactly once when `Open` fires. If the
    /// transport never gets there, this resolves to a transport error.
    pub async fn until_ready(&self) -> Result<(), ClientError> {
        let ready_rx = {
            let mut shared = self.shared.lock().await;
            match shared.state {
                ConnectionState::Open => return Ok(()),
                ConnectionState::Closed => {
                    return Err(ClientError::Transport("connection is closed".to_string()))
                }
                ConnectionState::Connecting => {
                    let (tx, rx) = oneshot::channel();
                    shared.waiters.push_back(tx);
                    rx
                }
            }
        };

        ready_rx.await.map_err(|_| {
            ClientError::Transport("connection closed before becoming ready".to_string())
        })
    }

    /// Transmit one text frame, fire-and-forget.
    ///
    /// The caller must have awaited `until_ready()` first; frames are never
    /// buffered for a not-yet-open transport.
    pub async fn send(&self, frame: String) -> Result<(), ClientError> {
        let shared = self.shared.lock().await;
        let write_tx = shared
            .write_tx
            .as_ref()
            .ok_or_else(|| ClientError::Transport("connection is not open".to_string()))?;

        write_tx
            .send(frame)
            .map_err(|_| ClientError::Transport("write loop has ended".to_string()))
    }
}

/// Owns the transport for its whole lifetime: connect, pump frames, tear down.
async fn run_transport(
    url: String,
    shared: Arc<Mutex<Shared>>,
    incoming_tx: mpsc::UnboundedSender<String>,
) {
    match connect_async(&url).await {
        Ok((ws, _response)) => {
            let (sink, stream) = ws.split();
            let (write_tx, write_rx) = mpsc::unbounded_channel::<String>();

            {
                let mut s = shared.lock().await;
                s.write_tx = Some(write_tx);
                s.state = ConnectionState::Open;
                // FIFO release; a waiter that gave up is simply gone.
                for waiter in s.waiters.drain(..) {
                    let _ = waiter.send(());
                }
            }
            info!(url = %url, "transport open");

            let write_task = tokio::spawn(run_write_loop(sink, write_rx));
            run_read_loop(stream, &incoming_tx).await;
            write_task.abort();
        }
        Err(e) => {
            warn!(url = %url, error = %e, "transport connect failed");
        }
    }

    // Terminal close: drop the waiters so queued until_ready() calls resolve
    // to an error, and drop incoming_tx so the dispatcher drains its table.
    let mut s = shared.lock().await;
    s.state = ConnectionState::Closed;
    s.write_tx = None;
    s.waiters.clear();
    debug!(url = %url, "transport closed");
}

/// Write loop: drains queued frames into the sink.
async fn run_write_loop(
    mut sink: futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        Message,
    >,
    mut write_rx: mpsc::UnboundedReceiver<String>,
) {
    while let Some(frame) = write_rx.recv().await {
        if sink.send(Message::Text(frame)).await.is_err() {
            warn!("transport write failed, closing write loop");
            break;
        }
    }
}

/// Read loop: forwards text frames, in receipt order, to the single consumer.
async fn run_read_loop(
    mut stream: futures_util::stream::SplitStream<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    >,
    incoming_tx: &mpsc::UnboundedSender<String>,
) {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(frame)) => {
                if incoming_tx.send(frame).is_err() {
                    // Consumer dropped; no reason to keep reading.
                    break;
                }
            }
            Ok(Message::Ping(_)) => {
                // Pong is handled automatically by tungstenite.
            }
            Ok(Message::Close(frame)) => {
                info!(frame = ?frame, "server closed connection");
                break;
            }
            Ok(_) => {
                // Binary and pong frames are not part of the protocol.
            }
            Err(e) => {
                warn!(error = %e, "transport read error");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_failure_is_surfaced_not_hung() {
        // Nothing listens on this port; the handshake fails fast.
        let (connection, _incoming) = Connection::open("ws://127.0.0.1:1/rpc");

        let result = connection.until_ready().await;
        assert!(matches!(result, Err(ClientError::Transport(_))));
        assert_eq!(connection.state().await, ConnectionState::Closed);
    }

    #[tokio::test]
    async fn send_requires_open_transport() {
        let (connection, _incoming) = Connection::open("ws://127.0.0.1:1/rpc");
        let result = connection.send("{}".to_string()).await;
        assert!(matches!(result, Err(ClientError::Transport(_))));
    }
}
