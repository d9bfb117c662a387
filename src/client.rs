//! Auto-reconnecting JSON-RPC client over a single websocket.
//!
//! DESIGN
//! ======
//! `SocketClient` is a cheap, cloneable handle. All real work happens in one
//! spawned actor task that owns the socket, the lifecycle, the pending-call
//! table and every timer. The actor consumes its inputs from a single
//! `select!` loop:
//!
//! - commands from handles (connect / close / set url / emit)
//! - handshake completion
//! - inbound websocket messages
//! - reconnect timer, call deadlines, close grace period
//!
//! so no two inputs are ever handled at the same time and no locking is
//! needed.
//!
//! LIFECYCLE
//! =========
//! 1. `connect()` → dispatch `socket/setData` → start handshake
//! 2. Handshake ok → reset attempts → dispatch `socket/onOpen`
//! 3. Handshake failure, transport error or dropped stream → unclean close
//! 4. Unclean close with attempts left → wait the fixed interval → step 1
//! 5. Otherwise → dispatch `socket/onClose` and stay down
//!
//! ERROR HANDLING
//! ==============
//! Transport faults never reach callers. They are logged and funneled into
//! the close path. `emit` is the only operation that returns an error, and
//! only for local conditions (not open, encode failure, write failure).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use frames::Request;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Map, Value, json};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message, Utf8Bytes};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::connection::{CloseDecision, ConnectionState, Lifecycle, ReconnectPolicy};
use crate::correlator::CallCorrelator;
use crate::error::ClientError;
use crate::router;
use crate::sink::{EVENT_CLOSE, EVENT_CONNECTING, EVENT_OPEN, EventSink};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Handshake = Pin<Box<dyn Future<Output = Result<WsStream, WsError>> + Send>>;

/// How long a deliberate close waits for the peer's close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

const CLOSE_NORMAL: u16 = 1000;
const CLOSE_NO_STATUS: u16 = 1005;
const CLOSE_ABNORMAL: u16 = 1006;

// =============================================================================
// CALL
// =============================================================================

/// An outgoing call, built fluently and handed to [`SocketClient::emit`].
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    method: String,
    params: Value,
    event: String,
    payload: Option<Map<String, Value>>,
}

impl Call {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self { method: method.into(), params, event: String::new(), payload: None }
    }

    /// Event dispatched with the response. Without one the call is
    /// fire-and-forget and its response arrives as `socket/onMessage`.
    #[must_use]
    pub fn on_response(mut self, event: impl Into<String>) -> Self {
        self.event = event.into();
        self
    }

    /// Fields merged underneath the response payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = Some(payload);
        self
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }
}

// =============================================================================
// HANDLE
// =============================================================================

enum Command {
    Connect,
    Close,
    SetUrl(String),
    Emit { call: Call, reply: oneshot::Sender<Result<u64, ClientError>> },
}

/// Handle to a running client. Clones share one connection.
///
/// The actor stops, closing its socket, once every handle is dropped.
#[derive(Clone)]
pub struct SocketClient {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl SocketClient {
    /// Spawn the client actor on the current tokio runtime. Does not connect.
    pub fn spawn(config: ClientConfig, sink: Arc<dyn EventSink>) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Idle);

        let actor = ClientActor {
            url: config.url,
            lifecycle: Lifecycle::new(ReconnectPolicy {
                max_attempts: config.max_reconnects,
                delay: config.reconnect_interval,
            }),
            calls: CallCorrelator::new(config.call_timeout),
            sink,
            commands: rx,
            state_tx,
            handshake: None,
            socket: None,
            peer_close: None,
            reconnect_at: None,
            close_deadline: None,
        };
        tokio::spawn(actor.run());

        Self { commands, state }
    }

    /// Open the socket unless one is already opening or open.
    pub fn connect(&self) {
        self.send(Command::Connect);
    }

    /// Deliberately close the socket. Never triggers a reconnect.
    pub fn close(&self) {
        self.send(Command::Close);
    }

    /// Change the address used by the next connect.
    pub fn set_url(&self, url: impl Into<String>) {
        self.send(Command::SetUrl(url.into()));
    }

    /// Send a call if the socket is open and return its correlation id.
    ///
    /// The outcome arrives later through the event sink.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] when the socket is not open,
    /// [`ClientError::Send`] when the write fails, and
    /// [`ClientError::Stopped`] when the client task is gone.
    pub async fn emit(&self, call: Call) -> Result<u64, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Emit { call, reply })
            .map_err(|_| ClientError::Stopped)?;
        rx.await.map_err(|_| ClientError::Stopped)?
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to lifecycle state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait until the lifecycle reaches `target`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Stopped`] if the client task ends first.
    pub async fn wait_for_state(&self, target: ConnectionState) -> Result<(), ClientError> {
        let mut rx = self.state.clone();
        rx.wait_for(|state| *state == target)
            .await
            .map(|_| ())
            .map_err(|_| ClientError::Stopped)
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("socket: client task has stopped; command dropped");
        }
    }
}

// =============================================================================
// ACTOR
// =============================================================================

struct ClientActor {
    url: String,
    lifecycle: Lifecycle,
    calls: CallCorrelator,
    sink: Arc<dyn EventSink>,
    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    handshake: Option<Handshake>,
    socket: Option<WsStream>,
    /// Close code and reason received from the peer, if any.
    peer_close: Option<(u16, String)>,
    reconnect_at: Option<Instant>,
    close_deadline: Option<Instant>,
}

impl ClientActor {
    async fn run(mut self) {
        loop {
            let reconnect_at = self.reconnect_at;
            let call_deadline = self.calls.next_deadline();
            let close_deadline = self.close_deadline;

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                result = poll_handshake(&mut self.handshake) => self.on_handshake(result),
                message = next_message(&mut self.socket) => self.on_message(message),
                () = sleep_until_some(reconnect_at) => self.on_reconnect_timer(),
                () = sleep_until_some(call_deadline) => self.expire_calls(),
                () = sleep_until_some(close_deadline) => self.on_close_grace_elapsed(),
            }
        }

        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None).await;
        }
        debug!(pending = self.calls.len(), "socket: client task stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.open_socket(true),
            Command::Close => self.begin_shutdown().await,
            Command::SetUrl(url) => {
                info!(%url, "socket: url updated");
                self.url = url;
            }
            Command::Emit { call, reply } => {
                let result = self.emit(call).await;
                let _ = reply.send(result);
            }
        }
    }

    // -------------------------------------------------------------------------
    // CONNECT
    // -------------------------------------------------------------------------

    fn open_socket(&mut self, explicit: bool) {
        if !self.lifecycle.start_connect(explicit) {
            debug!(state = %self.lifecycle.state(), "socket: connect ignored");
            return;
        }
        self.reconnect_at = None;
        self.publish_state();

        info!(url = %self.url, attempt = self.lifecycle.attempts(), "socket: connecting");
        self.sink.dispatch(EVENT_CONNECTING, json!({ "isConnecting": true }));
        self.handshake = Some(Box::pin(open_stream(self.url.clone())));
    }

    fn on_handshake(&mut self, result: Result<WsStream, WsError>) {
        self.handshake = None;
        match result {
            Ok(stream) => {
                self.socket = Some(stream);
                self.peer_close = None;
                self.lifecycle.opened();
                self.publish_state();
                info!(url = %self.url, "socket: open");
                self.sink.dispatch(EVENT_OPEN, json!({ "url": self.url }));
            }
            Err(e) => {
                warn!(url = %self.url, error = %e, "socket: connect failed");
                self.on_closed(false, CLOSE_ABNORMAL, e.to_string());
            }
        }
    }

    fn on_reconnect_timer(&mut self) {
        self.reconnect_at = None;
        if !self.lifecycle.reconnect_due() {
            debug!("socket: stale reconnect ignored");
            return;
        }
        self.open_socket(false);
    }

    // -------------------------------------------------------------------------
    // INBOUND
    // -------------------------------------------------------------------------

    fn on_message(&mut self, message: Option<Result<Message, WsError>>) {
        match message {
            Some(Ok(Message::Text(text))) => {
                router::route_text(text.as_str(), &mut self.calls, self.sink.as_ref());
            }
            Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                Ok(text) => router::route_text(text, &mut self.calls, self.sink.as_ref()),
                Err(e) => warn!(error = %e, len = bytes.len(), "socket: dropping non-utf8 binary frame"),
            },
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = frame.map_or((CLOSE_NO_STATUS, String::new()), |f| {
                    (u16::from(f.code), f.reason.as_str().to_owned())
                });
                debug!(code, %reason, "socket: close frame received");
                self.peer_close = Some((code, reason));
            }
            Some(Ok(_)) => {}
            Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => self.on_stream_end(),
            Some(Err(e)) => {
                warn!(error = %e, "socket: transport error");
                self.on_closed(false, CLOSE_ABNORMAL, e.to_string());
            }
        }
    }

    fn on_stream_end(&mut self) {
        match self.peer_close.take() {
            Some((code, reason)) => self.on_closed(true, code, reason),
            None if self.lifecycle.is_deliberate() => self.on_closed(true, CLOSE_NORMAL, String::new()),
            None => self.on_closed(false, CLOSE_ABNORMAL, "connection lost".to_owned()),
        }
    }

    // -------------------------------------------------------------------------
    // CLOSE
    // -------------------------------------------------------------------------

    /// Single exit for every socket ending: drop transport state, then let
    /// the lifecycle decide between reconnect and stop.
    fn on_closed(&mut self, clean: bool, code: u16, reason: String) {
        self.socket = None;
        self.handshake = None;
        self.peer_close = None;
        self.close_deadline = None;

        let clean = clean || self.lifecycle.is_deliberate();
        let decision = self.lifecycle.closed(clean);
        self.publish_state();
        match decision {
            CloseDecision::Reconnect { attempt, delay } => {
                info!(attempt, ?delay, code, %reason, "socket: scheduling reconnect");
                self.reconnect_at = Some(Instant::now() + delay);
            }
            CloseDecision::Stop => {
                info!(clean, code, %reason, "socket: closed");
                self.sink.dispatch(EVENT_CLOSE, json!({ "wasClean": clean, "code": code, "reason": reason }));
            }
        }
    }

    async fn begin_shutdown(&mut self) {
        let was_waiting = self.reconnect_at.take().is_some();

        match self.lifecycle.begin_close() {
            ConnectionState::Connecting => {
                info!("socket: close requested during handshake");
                self.on_closed(true, CLOSE_NORMAL, String::new());
            }
            ConnectionState::Open => {
                self.publish_state();
                let Some(socket) = self.socket.as_mut() else {
                    self.on_closed(true, CLOSE_NORMAL, String::new());
                    return;
                };
                let frame = CloseFrame { code: CloseCode::Normal, reason: Utf8Bytes::from_static("") };
                match socket.close(Some(frame)).await {
                    Ok(()) => self.close_deadline = Some(Instant::now() + CLOSE_GRACE),
                    Err(e) => {
                        debug!(error = %e, "socket: close frame not sent");
                        self.on_closed(true, CLOSE_NORMAL, String::new());
                    }
                }
            }
            ConnectionState::Closed if was_waiting => {
                info!("socket: pending reconnect cancelled");
                self.on_closed(true, CLOSE_NORMAL, String::new());
            }
            ConnectionState::Idle | ConnectionState::Closing | ConnectionState::Closed => {}
        }
    }

    fn on_close_grace_elapsed(&mut self) {
        self.close_deadline = None;
        if self.socket.is_some() {
            warn!("socket: peer did not answer close; dropping socket");
            self.on_closed(true, CLOSE_NORMAL, String::new());
        }
    }

    // -------------------------------------------------------------------------
    // OUTBOUND
    // -------------------------------------------------------------------------

    async fn emit(&mut self, call: Call) -> Result<u64, ClientError> {
        if self.lifecycle.state() != ConnectionState::Open || self.socket.is_none() {
            debug!(method = %call.method, state = %self.lifecycle.state(), "socket: call rejected, not open");
            return Err(ClientError::NotConnected);
        }

        let Call { method, params, event, payload } = call;
        let id = if event.is_empty() {
            self.calls.next_id()
        } else {
            self.calls.register(event, params.clone(), payload)
        };

        let text = match frames::encode_request(&Request::new(id, method.as_str(), params)) {
            Ok(text) => text,
            Err(e) => {
                self.calls.remove(id);
                return Err(e.into());
            }
        };

        let Some(socket) = self.socket.as_mut() else {
            self.calls.remove(id);
            return Err(ClientError::NotConnected);
        };
        let sent = socket.send(Message::text(text)).await;

        if let Err(e) = sent {
            self.calls.remove(id);
            warn!(id, %method, error = %e, "socket: send failed");
            let reason = e.to_string();
            self.on_closed(false, CLOSE_ABNORMAL, reason);
            return Err(ClientError::Send(Box::new(e)));
        }

        debug!(id, %method, "socket: call sent");
        Ok(id)
    }

    fn expire_calls(&mut self) {
        for call in self.calls.expire(Instant::now()) {
            router::dispatch_timeout(&call, self.sink.as_ref());
        }
    }

    fn publish_state(&self) {
        self.state_tx.send_replace(self.lifecycle.state());
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn open_stream(url: String) -> Result<WsStream, WsError> {
    let (stream, _response) = connect_async(url).await?;
    Ok(stream)
}

async fn poll_handshake(handshake: &mut Option<Handshake>) -> Result<WsStream, WsError> {
    match handshake {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn next_message(socket: &mut Option<WsStream>) -> Option<Result<Message, WsError>> {
    match socket {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
