//! Event sink: where every outcome of the client ends up.
//!
//! DESIGN
//! ======
//! The client never returns results through futures. Responses, protocol
//! errors, server pushes and lifecycle changes are all delivered as
//! `(event name, JSON payload)` pairs to one `EventSink`. Dispatch is
//! fire-and-forget: the client never waits on or inspects the sink.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

// =============================================================================
// EVENT NAMES
// =============================================================================

/// Prefix shared by the built-in lifecycle events.
pub const EVENT_PREFIX: &str = "socket/";

/// Dispatched with `{"isConnecting": true}` before each open attempt.
pub const EVENT_CONNECTING: &str = "socket/setData";

/// Dispatched with `{"url": ..}` once the handshake completes.
pub const EVENT_OPEN: &str = "socket/onOpen";

/// Dispatched with `{"wasClean", "code", "reason"}` when the client stops.
pub const EVENT_CLOSE: &str = "socket/onClose";

/// Dispatched with the raw frame for anything no pending call claims.
pub const EVENT_MESSAGE: &str = "socket/onMessage";

// =============================================================================
// SINK TRAIT
// =============================================================================

/// Consumer of named events.
pub trait EventSink: Send + Sync {
    fn dispatch(&self, event: &str, payload: Value);
}

impl<F> EventSink for F
where
    F: Fn(&str, Value) + Send + Sync,
{
    fn dispatch(&self, event: &str, payload: Value) {
        self(event, payload);
    }
}

// =============================================================================
// CHANNEL SINK
// =============================================================================

/// One dispatched event, as seen by a [`ChannelSink`] receiver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SinkEvent {
    pub name: String,
    pub payload: Value,
}

/// Forwards events into an unbounded channel.
///
/// Events dispatched after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn dispatch(&self, event: &str, payload: Value) {
        let _ = self.tx.send(SinkEvent { name: event.to_owned(), payload });
    }
}

// =============================================================================
// PREFIX FILTER
// =============================================================================

/// Passes through only event names that start with `prefix`.
pub struct PrefixFilter<S> {
    prefix: String,
    inner: S,
}

impl<S: EventSink> PrefixFilter<S> {
    pub fn new(prefix: impl Into<String>, inner: S) -> Self {
        Self { prefix: prefix.into(), inner }
    }

    /// Filter on [`EVENT_PREFIX`].
    pub fn socket(inner: S) -> Self {
        Self::new(EVENT_PREFIX, inner)
    }
}

impl<S: EventSink> EventSink for PrefixFilter<S> {
    fn dispatch(&self, event: &str, payload: Value) {
        if !event.starts_with(&self.prefix) {
            tracing::trace!(%event, "socket: event filtered by prefix");
            return;
        }
        self.inner.dispatch(event, payload);
    }
}

#[cfg(test)]
#[path = "sink_test.rs"]
mod tests;
