//! Routing of inbound frames to sink events.
//!
//! DESIGN
//! ======
//! A response whose id matches a pending call is dispatched under that
//! call's event name, with a payload built in layers:
//!
//! 1. the call's own payload (base)
//! 2. `requestParams`: the original call parameters
//! 3. the normalized result, or `error` for error responses
//!
//! Layers are deep-merged and later layers win. The pending call is removed
//! after dispatch, so a duplicate response for the same id falls through to
//! the generic message event like any other unmatched frame.
//!
//! ERROR HANDLING
//! ==============
//! Malformed text is logged and dropped. Nothing here can fail the
//! connection.

use frames::{InboundFrame, Reply};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::correlator::{CallCorrelator, PendingCall};
use crate::sink::{EVENT_MESSAGE, EventSink};

/// Key under which the original call parameters are echoed.
pub const REQUEST_PARAMS: &str = "requestParams";

/// Key wrapping scalar results and carrying error objects.
pub const RESULT_KEY: &str = "result";
pub const ERROR_KEY: &str = "error";

/// Parse one text frame and route it.
pub fn route_text(text: &str, calls: &mut CallCorrelator, sink: &dyn EventSink) {
    match frames::decode_frame(text) {
        Ok(frame) => route_frame(frame, calls, sink),
        Err(e) => warn!(error = %e, len = text.len(), "socket: dropping malformed frame"),
    }
}

/// Route a parsed frame to its pending call or to [`EVENT_MESSAGE`].
pub fn route_frame(frame: InboundFrame, calls: &mut CallCorrelator, sink: &dyn EventSink) {
    let response = match frame {
        InboundFrame::Response(response) => response,
        InboundFrame::Event(raw) => {
            sink.dispatch(EVENT_MESSAGE, raw);
            return;
        }
    };

    let Some(call) = calls.resolve(response.id).filter(|call| !call.event.is_empty()) else {
        debug!(id = response.id, "socket: no pending call for response");
        sink.dispatch(EVENT_MESSAGE, response.raw);
        return;
    };

    let payload = match response.reply {
        Reply::Error(error) => {
            warn!(
                id = call.id,
                event = %call.event,
                message = frames::error_message(&error).unwrap_or("unknown error"),
                params = %call.params,
                "socket: response error"
            );
            error_payload(call, error)
        }
        Reply::Result(result) => success_payload(call, result),
    };

    sink.dispatch(&call.event, payload);
    calls.remove(response.id);
}

/// Resolve a call whose deadline passed without a response.
pub fn dispatch_timeout(call: &PendingCall, sink: &dyn EventSink) {
    warn!(id = call.id, event = %call.event, params = %call.params, "socket: call timed out");
    let error = json!({ "message": "request timed out", "code": "timeout" });
    sink.dispatch(&call.event, error_payload(call, error));
}

// =============================================================================
// PAYLOAD ASSEMBLY
// =============================================================================

fn success_payload(call: &PendingCall, result: Value) -> Value {
    let mut payload = base_payload(call);
    if let Some(normalized) = normalize_result(result) {
        merge_into(&mut payload, normalized);
    }
    Value::Object(payload)
}

fn error_payload(call: &PendingCall, error: Value) -> Value {
    let mut payload = call.payload.clone().unwrap_or_default();
    let mut layer = Map::new();
    layer.insert(ERROR_KEY.to_owned(), error);
    layer.insert(REQUEST_PARAMS.to_owned(), call.params.clone());
    merge_into(&mut payload, layer);
    Value::Object(payload)
}

fn base_payload(call: &PendingCall) -> Map<String, Value> {
    let mut payload = call.payload.clone().unwrap_or_default();
    let mut layer = Map::new();
    layer.insert(REQUEST_PARAMS.to_owned(), call.params.clone());
    merge_into(&mut payload, layer);
    payload
}

/// Objects pass through, null contributes nothing, everything else
/// (strings, `"ok"`, numbers, arrays) is wrapped as `{"result": value}`.
pub(crate) fn normalize_result(result: Value) -> Option<Map<String, Value>> {
    match result {
        Value::Object(map) => Some(map),
        Value::Null => None,
        other => {
            let mut map = Map::new();
            map.insert(RESULT_KEY.to_owned(), other);
            Some(map)
        }
    }
}

/// Deep merge: nested objects combine key by key, anything else is replaced.
pub(crate) fn merge_into(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, value) in overlay {
        let Value::Object(incoming) = value else {
            base.insert(key, value);
            continue;
        };
        if let Some(Value::Object(existing)) = base.get_mut(&key) {
            merge_into(existing, incoming);
            continue;
        }
        base.insert(key, Value::Object(incoming));
    }
}

#[cfg(test)]
#[path = "router_test.rs"]
mod tests;
