//! Envelope model and JSON codec for the socket RPC wire protocol.
//!
//! This crate owns the wire representation only. Outgoing calls are
//! `{"jsonrpc":"2.0","method":..,"params":..,"id":..}` text frames. Inbound
//! text is parsed into an [`InboundFrame`], which is either a response that
//! echoes a correlation id or an unsolicited event payload.
//!
//! DESIGN
//! ======
//! Payloads stay flexible (`serde_json::Value`). Classification is shallow:
//! any object with a non-negative integer `id` is treated as a response
//! candidate, and the caller decides whether that id still matches a
//! pending call. The raw frame is kept so unmatched responses can be
//! forwarded untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version stamped on every outgoing request.
pub const JSONRPC_VERSION: &str = "2.0";

/// Error returned by [`encode_request`] and [`decode_frame`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text is not valid JSON.
    #[error("failed to parse frame: {0}")]
    Parse(#[source] serde_json::Error),
    /// A request could not be serialized.
    #[error("failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),
}

// =============================================================================
// OUTGOING
// =============================================================================

/// A single outgoing call on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Always [`JSONRPC_VERSION`].
    pub jsonrpc: String,
    /// Remote method name.
    pub method: String,
    /// Method parameters, usually an object.
    pub params: Value,
    /// Correlation identifier echoed by the response.
    pub id: u64,
}

impl Request {
    /// Build a request stamped with the protocol version.
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION.to_owned(), method: method.into(), params, id }
    }
}

/// Serialize a request into its text frame.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
pub fn encode_request(request: &Request) -> Result<String, CodecError> {
    serde_json::to_string(request).map_err(CodecError::Encode)
}

// =============================================================================
// INCOMING
// =============================================================================

/// Outcome carried by a response frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// Success; `Value::Null` when the frame has no `result` field.
    Result(Value),
    /// Protocol-level error object as sent by the server.
    Error(Value),
}

/// A frame that echoes a correlation id.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub id: u64,
    pub reply: Reply,
    /// The frame exactly as parsed.
    pub raw: Value,
}

/// A parsed inbound text frame.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundFrame {
    /// Carries an `id` and may match a pending call.
    Response(Response),
    /// Anything else: server push keyed by the application.
    Event(Value),
}

impl InboundFrame {
    /// Correlation id, if the frame carries one.
    #[must_use]
    pub fn id(&self) -> Option<u64> {
        match self {
            Self::Response(response) => Some(response.id),
            Self::Event(_) => None,
        }
    }

    /// The frame exactly as it arrived.
    #[must_use]
    pub fn into_raw(self) -> Value {
        match self {
            Self::Response(response) => response.raw,
            Self::Event(raw) => raw,
        }
    }
}

/// Parse an inbound text frame.
///
/// # Errors
///
/// Returns [`CodecError::Parse`] when the text is not JSON.
pub fn decode_frame(text: &str) -> Result<InboundFrame, CodecError> {
    let raw: Value = serde_json::from_str(text).map_err(CodecError::Parse)?;
    Ok(classify(raw))
}

fn classify(raw: Value) -> InboundFrame {
    let Some(id) = raw.get("id").and_then(Value::as_u64) else {
        return InboundFrame::Event(raw);
    };

    let reply = match raw.get("error") {
        Some(error) if !error.is_null() => Reply::Error(error.clone()),
        _ => Reply::Result(raw.get("result").cloned().unwrap_or(Value::Null)),
    };

    InboundFrame::Response(Response { id, reply, raw })
}

/// Human-readable message of an error object, if it has one.
#[must_use]
pub fn error_message(error: &Value) -> Option<&str> {
    error.get("message").and_then(Value::as_str)
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
