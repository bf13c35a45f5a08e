//! RPC Wire Protocol
//!
//! Single responsibility: encode and decode the JSON text envelopes exchanged
//! with the data service. No knowledge of connections, correlation tables, or
//! sessions.
//!
//! # Wire Format
//!
//! ## Request
//! ```text
//! {
//!     "id": "<decimal string>",   // Correlation id, strictly increasing
//!     "method": "<string>",       // use | signup | signin | ping | query
//!     "params": [ ... ],          // Opaque values, shape depends on method
//! }
//! ```
//!
//! ## Response
//! ```text
//! { "id": "<matches a request>", "result": <opaque> }   // success
//! { "id": "<matches a request>", "error": <opaque> }    // failure
//! ```
//!
//! Parameters and results are carried as `serde_json::Value`; this layer never
//! interprets them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientError;

/// An outgoing call envelope.
#[derive(Debug, Serialize)]
pub struct Request {
    pub id: String,
    pub method: String,
    pub params: Vec<Value>,
}

/// An incoming response envelope, before correlation.
#[derive(Debug, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

/// A decoded response, reduced to its correlation id and outcome.
#[derive(Debug)]
pub struct DecodedResponse {
    /// The echoed correlation id, still in wire form. A non-numeric or unknown
    /// id is a routing concern, not a decode failure.
    pub id: String,
    /// `Err` carries the server's error value verbatim.
    pub outcome: Result<Value, Value>,
}

/// Encode a call into a wire frame.
pub fn encode_request(id: u64, method: &str, params: Vec<Value>) -> Result<String, ClientError> {
    let request = Request {
        id: id.to_string(),
        method: method.to_string(),
        params,
    };
    serde_json::to_string(&request).map_err(ClientError::from)
}

/// Decode a response frame.
///
/// A frame that is not a `{id, result|error}` envelope is a protocol error.
/// An `error` field that is present and non-null wins over `result`; an absent
/// `result` decodes as JSON null, matching the opaque-value contract.
pub fn decode_response(frame: &str) -> Result<DecodedResponse, ClientError> {
    let response: Response = serde_json::from_str(frame)
        .map_err(|e| ClientError::Protocol(format!("Malformed response envelope: {}", e)))?;

    let outcome = match response.error {
        Some(error) if !error.is_null() => Err(error),
        _ => Ok(response.result.unwrap_or(Value::Null)),
    };

    Ok(DecodedResponse {
        id: response.id,
        outcome,
    })
}
