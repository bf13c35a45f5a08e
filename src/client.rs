//! Remote Data Service Client
//!
//! The facade the application actually calls. Composes the connection, the
//! dispatcher, and the session into the handful of named remote operations:
//!
//! | Operation           | Wire call  | Session effect                         |
//! |---------------------|------------|----------------------------------------|
//! | `connect`           | `use`      | none                                   |
//! | `signup` / `signin` | `signup` / `signin` | token set on success          |
//! | `signin_with_token` | `ping`     | optimistic set, rolled back on failure |
//! | `signout`           | none       | token cleared, purely local            |
//! | `query`             | `query`    | none                                   |
//!
//! There is no implicit auth gating: `query` before `signin` is permitted and
//! is governed purely by connection readiness. Call parameters and results are
//! opaque here — callers hand in already-parameterized payload text; this
//! layer never builds query strings from user input.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionState};
use crate::dispatch::Dispatcher;
use crate::error::ClientError;
use crate::session::Session;

/// Credentials for `signup` and `signin`.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub pass: String,
}

/// A client instance bound to one connection.
///
/// Construct as many as you need; nothing is global. Thread-safe: wrap in an
/// `Arc` to share across tasks.
pub struct Client {
    config: ClientConfig,
    connection: Arc<Connection>,
    dispatcher: Dispatcher,
    session: Session,
}

impl Client {
    /// Create a client and begin opening its connection.
    ///
    /// Returns immediately; establishment runs in the background. Every
    /// operation waits on the readiness gate itself, so calls issued before
    /// the transport is open are queued, not lost — and fail explicitly if
    /// the transport never gets there.
    pub fn open(config: ClientConfig) -> Self {
        info!(url = %config.url, "opening client");

        let (connection, incoming) = Connection::open(&config.url);
        let connection = Arc::new(connection);
        let dispatcher = Dispatcher::new(Arc::clone(&connection), incoming, config.request_timeout);

        Self {
            config,
            connection,
            dispatcher,
            session: Session::new(),
        }
    }

    /// The session holding the current token; subscribe to it for changes.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Current transport state.
    pub async fn state(&self) -> ConnectionState {
        self.connection.state().await
    }

    /// Select the configured namespace and database on the server.
    ///
    /// Does not touch the session. Returns the server's acknowledgement,
    /// opaque to this layer.
    pub async fn connect(&self) -> Result<Value, ClientError> {
        self.dispatcher
            .call(
                "use",
                vec![json!(self.config.namespace), json!(self.config.database)],
            )
            .await
    }

    /// Register a new account and store the issued token.
    pub async fn signup(&self, credentials: &Credentials) -> Result<(), ClientError> {
        self.authenticate("signup", credentials).await
    }

    /// Authenticate with credentials and store the issued token.
    ///
    /// On failure the session is left untouched and the server's rejection
    /// value is surfaced verbatim as [`ClientError::Auth`].
    pub async fn signin(&self, credentials: &Credentials) -> Result<(), ClientError> {
        self.authenticate("signin", credentials).await
    }

    async fn authenticate(
        &self,
        method: &str,
        credentials: &Credentials,
    ) -> Result<(), ClientError> {
        let params = json!({
            "email": credentials.email,
            "pass": credentials.pass,
            "NS": self.config.namespace,
            "DB": self.config.database,
            "SC": self.config.auth_scope,
        });

        let result = self
            .dispatcher
            .call(method, vec![params])
            .await
            .map_err(ClientError::into_auth)?;

        let token = result.as_str().ok_or_else(|| {
            ClientError::Protocol(format!("{} result was not a token string", method))
        })?;

        debug!(method = %method, "authenticated, storing token");
        self.session.set_token(Some(token.to_string()));
        Ok(())
    }

    /// Resume an existing session from a stored token.
    ///
    /// The token is set optimistically — observers see it before validation
    /// completes — then validated with a `ping`. If validation fails, the
    /// session is rolled back to its previous token and the failure surfaces
    /// as [`ClientError::Auth`].
    pub async fn signin_with_token(&self, token: &str) -> Result<(), ClientError> {
        let previous = self.session.token();
        self.session.set_token(Some(token.to_string()));

        match self.dispatcher.call("ping", Vec::new()).await {
            Ok(_ack) => Ok(()),
            Err(e) => {
                debug!("token validation failed, rolling back session");
                self.session.set_token(previous);
                Err(e.into_auth())
            }
        }
    }

    /// Forget the token locally and notify observers.
    ///
    /// Transmits nothing: the credential is not invalidated server-side.
    pub fn signout(&self) {
        self.session.set_token(None);
    }

    /// Run an opaque query and return its raw result.
    ///
    /// The statement must already be parameterized/escaped by the caller;
    /// this layer sends it as-is and does not interpret the result shape.
    pub async fn query(&self, statement: &str) -> Result<Value, ClientError> {
        self.dispatcher.call("query", vec![json!(statement)]).await
    }
}
