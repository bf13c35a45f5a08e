//! Error types for wirecall

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// The transport never became usable, or dropped while a call was
    /// outstanding. Calls never hang on a dead connection; they fail with this.
    #[error("Transport unavailable: {0}")]
    Transport(String),

    /// A message violated the wire contract (malformed envelope, or a result
    /// that does not have the shape the operation requires).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server answered with an `error` field. The value is propagated
    /// verbatim, the client does not reinterpret it.
    #[error("Remote error: {0}")]
    Remote(serde_json::Value),

    /// A remote error raised by signup, signin, or token validation.
    /// Carries the server's rejection value verbatim.
    #[error("Authentication rejected: {0}")]
    Auth(serde_json::Value),

    /// No response arrived within the configured request timeout. The pending
    /// entry has been dropped; a late response is silently discarded.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// Reclassify a remote rejection as an authentication failure.
    ///
    /// Used by the facade for signup/signin/ping-validation, where a remote
    /// `error` means the credentials were refused. Other variants pass through.
    pub(crate) fn into_auth(self) -> Self {
        match self {
            ClientError::Remote(value) => ClientError::Auth(value),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn remote_becomes_auth() {
        let err = ClientError::Remote(json!("bad credentials")).into_auth();
        assert!(matches!(err, ClientError::Auth(v) if v == json!("bad credentials")));
    }

    #[test]
    fn non_remote_passes_through() {
        let err = ClientError::Transport("gone".into()).into_auth();
        assert!(matches!(err, ClientError::Transport(_)));
    }
}
