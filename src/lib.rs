//! Wirecall - multiplexing RPC client core
//!
//! Many logically independent async calls share one long-lived WebSocket
//! connection to a remote data service. Responses arrive in any order and are
//! correlated back to their originating call by id; outgoing calls are gated
//! on connection readiness; the authentication token is observable by any
//! number of independent consumers.
//!
//! # Architecture
//!
//! The crate is organized by concern, with each module having a single
//! responsibility:
//!
//! | Module       | Responsibility                                        |
//! |--------------|-------------------------------------------------------|
//! | `connection` | Transport ownership, readiness gate, liveness         |
//! | `protocol`   | JSON wire envelopes, encode/decode                    |
//! | `dispatch`   | Correlation ids, pending-call table, response routing |
//! | `session`    | Token state, observer subscriptions                   |
//! | `client`     | The named remote operations the application calls     |
//!
//! # Usage
//!
//! ```no_run
//! use wirecall::{Client, ClientConfig, Credentials};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), wirecall::ClientError> {
//!     // Begins connecting in the background; calls wait for readiness.
//!     let client = Client::open(ClientConfig::default());
//!
//!     // React to token changes from any number of places.
//!     let watch = client.session().subscribe(|token| {
//!         println!("authenticated: {}", token.is_some());
//!     });
//!
//!     client.connect().await?;
//!     client
//!         .signin(&Credentials {
//!             email: "a@b.com".to_string(),
//!             pass: "longenough".to_string(),
//!         })
//!         .await?;
//!
//!     let rows = client.query("SELECT * FROM thing").await?;
//!     println!("{rows}");
//!
//!     watch.cancel();
//!     Ok(())
//! }
//! ```
//!
//! # What This Crate Does Not Do
//!
//! Call payloads are opaque: no query language, no result interpretation, no
//! authorization decisions. There is no automatic retry and no reconnection —
//! a closed transport fails every outstanding and future call explicitly, and
//! the owner decides whether to open a fresh client.

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod session;

// Re-export the public API
pub use client::{Client, Credentials};
pub use config::ClientConfig;
pub use connection::ConnectionState;
pub use error::ClientError;
pub use session::{Session, TokenWatch};
