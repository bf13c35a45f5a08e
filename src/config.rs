//! Configuration for a wirecall client
//!
//! There is no global client instance. Every `Client` is constructed from an
//! explicit `ClientConfig`, so tests and multi-tenant callers can run any
//! number of independent clients side by side.

use std::time::Duration;

/// Configuration for a client instance.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket RPC endpoint URL
    pub url: String,
    /// Namespace sent with `use` and merged into authentication calls as `NS`
    pub namespace: String,
    /// Database sent with `use` and merged into authentication calls as `DB`
    pub database: String,
    /// Authentication scope merged into authentication calls as `SC`
    pub auth_scope: String,
    /// How long a single call may wait for its response before failing
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/rpc".to_string(),
            namespace: "testns".to_string(),
            database: "testdb".to_string(),
            auth_scope: "account".to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.url, "ws://localhost:8000/rpc");
        assert_eq!(config.namespace, "testns");
        assert_eq!(config.database, "testdb");
        assert_eq!(config.auth_scope, "account");
        assert_eq!(config.request_timeout, Duration::from_secs(60));
    }
}
