//! Call Dispatcher
//!
//! Single responsibility: turn "send this call, give me its eventual result"
//! into a future, and demultiplex responses back to their originating calls.
//!
//! # Correlation
//!
//! Every call gets a correlation id from a monotonically increasing counter
//! (seeded at 1, never reused for the lifetime of the dispatcher). The pending
//! table maps id → response channel; an entry is removed the instant it is
//! settled. Responses may arrive in any order relative to requests —
//! correctness depends only on id uniqueness, never on ordering.
//!
//! # Routing Policy
//!
//! - Malformed envelope: log and discard. The routing loop never panics.
//! - Unknown (or non-numeric) id: silent discard. A response may legitimately
//!   match nothing — it was addressed elsewhere, or arrived after its caller
//!   timed out — so this must not raise.
//! - Known id: the entry is removed, then settled exactly once, with the
//!   server's error value verbatim when an `error` field is present.
//!
//! When the incoming channel ends the transport is gone, and every resident
//! entry is failed with a transport error rather than left to hang.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::connection::{Connection, Incoming};
use crate::error::ClientError;
use crate::protocol;

type PendingTable = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, ClientError>>>>>;

/// Issues calls over one connection and routes their responses back.
pub struct Dispatcher {
    connection: Arc<Connection>,
    /// Correlation id counter. Process-lifetime, strictly increasing.
    next_id: AtomicU64,
    /// Outstanding calls, keyed by correlation id.
    pending: PendingTable,
    request_timeout: Duration,
    route_task: tokio::task::JoinHandle<()>,
}

impl Dispatcher {
    /// Wire a dispatcher to a connection's incoming channel.
    ///
    /// Spawns the routing loop; it runs until the transport closes.
    pub fn new(connection: Arc<Connection>, incoming: Incoming, request_timeout: Duration) -> Self {
        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));

        let route_task = tokio::spawn(route_loop(incoming, Arc::clone(&pending)));

        Self {
            connection,
            next_id: AtomicU64::new(1),
            pending,
            request_timeout,
            route_task,
        }
    }

    /// Issue one call and wait for its response.
    ///
    /// Suspends on the connection's readiness gate first, so nothing is
    /// transmitted before the transport is open. Concurrent calls are fine;
    /// two calls issued in order A, B may resolve in order B, A.
    ///
    /// # Errors
    /// - The transport never opened, or dropped while the call was outstanding
    /// - No response within the request timeout
    /// - The server answered with an error value
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, ClientError> {
        self.connection.until_ready().await?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = protocol::encode_request(id, method, params)?;

        let (response_tx, response_rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id, response_tx);
        }

        debug!(id = id, method = %method, "sending call");

        if let Err(e) = self.connection.send(frame).await {
            // Never transmitted; the entry must not linger.
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match timeout(self.request_timeout, response_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ClientError::Transport(
                "connection closed while awaiting response".to_string(),
            )),
            Err(_) => {
                // Timed out: reclaim the entry so the table stays bounded.
                // A response that still shows up later hits the unknown-id
                // path and is discarded.
                self.pending.lock().await.remove(&id);
                Err(ClientError::Timeout(self.request_timeout))
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.route_task.abort();
    }
}

/// Routing loop: consumes incoming frames and settles pending calls.
async fn route_loop(mut incoming: Incoming, pending: PendingTable) {
    debug!("routing loop started");

    while let Some(frame) = incoming.recv().await {
        let response = match protocol::decode_response(&frame) {
            Ok(response) => response,
            Err(e) => {
                // Fail closed: a frame we cannot parse is dropped, the loop
                // keeps running for everyone else.
                warn!(error = %e, "discarding malformed response");
                continue;
            }
        };

        let id: u64 = match response.id.parse() {
            Ok(id) => id,
            Err(_) => {
                debug!(id = %response.id, "response id not issued here, discarding");
                continue;
            }
        };

        let entry = pending.lock().await.remove(&id);
        match entry {
            Some(response_tx) => {
                let outcome = response.outcome.map_err(ClientError::Remote);
                // A caller that timed out dropped its receiver; that is fine.
                let _ = response_tx.send(outcome);
            }
            None => {
                debug!(id = id, "no pending call for response, discarding");
            }
        }
    }

    debug!("routing loop ended");

    // Transport is gone. Fail whatever is still outstanding.
    let mut pending = pending.lock().await;
    for (id, response_tx) in pending.drain() {
        debug!(id = id, "failing pending call, transport closed");
        let _ = response_tx.send(Err(ClientError::Transport(
            "connection closed with call outstanding".to_string(),
        )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn pending_with(
        ids: &[u64],
    ) -> (
        PendingTable,
        Vec<oneshot::Receiver<Result<Value, ClientError>>>,
    ) {
        let mut table = HashMap::new();
        let mut receivers = Vec::new();
        for &id in ids {
            let (tx, rx) = oneshot::channel();
            table.insert(id, tx);
            receivers.push(rx);
        }
        (Arc::new(Mutex::new(table)), receivers)
    }

    #[tokio::test]
    async fn responses_resolve_in_arrival_order_not_request_order() {
        let (pending, mut receivers) = pending_with(&[1, 2]);
        let (tx, rx) = mpsc::unbounded_channel();

        let route = tokio::spawn(route_loop(rx, Arc::clone(&pending)));

        // B's response first.
        tx.send(r#"{"id":"2","result":"b"}"#.to_string()).unwrap();
        let b = receivers.pop().unwrap().await.unwrap().unwrap();
        assert_eq!(b, json!("b"));

        // A is still unsettled until its own response arrives.
        let mut a_rx = receivers.pop().unwrap();
        assert!(a_rx.try_recv().is_err());

        tx.send(r#"{"id":"1","result":"a"}"#.to_string()).unwrap();
        let a = a_rx.await.unwrap().unwrap();
        assert_eq!(a, json!("a"));

        drop(tx);
        route.await.unwrap();
    }

    #[tokio::test]
    async fn unknown_and_malformed_frames_leave_table_intact() {
        let (pending, mut receivers) = pending_with(&[7]);
        let (tx, rx) = mpsc::unbounded_channel();

        let route = tokio::spawn(route_loop(rx, Arc::clone(&pending)));

        tx.send(r#"{"id":"999","result":"stray"}"#.to_string())
            .unwrap();
        tx.send(r#"{"id":"not-a-number","result":1}"#.to_string())
            .unwrap();
        tx.send("this is not json".to_string()).unwrap();

        // The real response still routes correctly afterwards.
        tx.send(r#"{"id":"7","result":"mine"}"#.to_string()).unwrap();
        let outcome = receivers.pop().unwrap().await.unwrap().unwrap();
        assert_eq!(outcome, json!("mine"));

        drop(tx);
        route.await.unwrap();
        assert!(pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn error_field_settles_the_failure_continuation() {
        let (pending, mut receivers) = pending_with(&[3]);
        let (tx, rx) = mpsc::unbounded_channel();

        let route = tokio::spawn(route_loop(rx, Arc::clone(&pending)));

        tx.send(r#"{"id":"3","error":"bad credentials"}"#.to_string())
            .unwrap();
        let outcome = receivers.pop().unwrap().await.unwrap();
        assert!(matches!(outcome, Err(ClientError::Remote(v)) if v == json!("bad credentials")));

        drop(tx);
        route.await.unwrap();
    }

    #[tokio::test]
    async fn closing_the_channel_fails_resident_calls() {
        let (pending, mut receivers) = pending_with(&[1]);
        let (tx, rx) = mpsc::unbounded_channel::<String>();

        let route = tokio::spawn(route_loop(rx, Arc::clone(&pending)));

        drop(tx);
        route.await.unwrap();

        let outcome = receivers.pop().unwrap().await.unwrap();
        assert!(matches!(outcome, Err(ClientError::Transport(_))));
        assert!(pending.lock().await.is_empty());
    }
}
