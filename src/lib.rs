//! Persistent JSON-RPC client over a single websocket.
//!
//! DESIGN
//! ======
//! One connection, many calls. Callers `emit` a method plus params and name
//! the event that should carry the answer. Every outcome (responses, server
//! pushes, lifecycle changes, timeouts) is delivered to an [`EventSink`] as
//! a named JSON payload instead of being returned to the caller.
//!
//! - `connection`: lifecycle state machine and fixed-interval reconnect policy
//! - `correlator`: id allocation and the pending-call table
//! - `router`: inbound frame classification and payload assembly
//! - `client`: the actor task that owns the socket and ties the above together
//! - `sink`: event names and ready-made sinks
//!
//! Wire encoding lives in the `frames` crate.

pub mod client;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod error;
pub mod router;
pub mod sink;

pub use client::{Call, SocketClient};
pub use config::{ClientConfig, ConfigError};
pub use connection::ConnectionState;
pub use error::ClientError;
pub use sink::{
    ChannelSink, EVENT_CLOSE, EVENT_CONNECTING, EVENT_MESSAGE, EVENT_OPEN, EventSink, PrefixFilter, SinkEvent,
};
