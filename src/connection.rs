//! Connection lifecycle and reconnect policy.
//!
//! DESIGN
//! ======
//! `Lifecycle` is the bookkeeping half of the connection manager. It holds
//! the state machine and the attempt counter, and decides what happens
//! after every close; the client actor owns the socket and the timers and
//! just follows those decisions.
//!
//! ```text
//! Idle → Connecting → Open → Closing → Closed
//!            ↑                           │
//!            └── reconnect / connect() ──┘
//! ```
//!
//! An unclean close with attempts left schedules exactly one reconnect
//! after the fixed interval. A clean close, a deliberate shutdown, or an
//! exhausted counter stops for good. A successful open resets the counter.

use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    /// Fixed, not exponential.
    pub delay: Duration,
}

/// What to do after a socket closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    /// Wait `delay`, then connect again. `attempt` is 1-based.
    Reconnect { attempt: u32, delay: Duration },
    /// Report the close and stay down.
    Stop,
}

#[derive(Debug)]
pub struct Lifecycle {
    state: ConnectionState,
    attempts: u32,
    policy: ReconnectPolicy,
    /// Set by `close()`, cleared by an explicit `connect()`.
    deliberate: bool,
}

impl Lifecycle {
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { state: ConnectionState::Idle, attempts: 0, policy, deliberate: false }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn is_deliberate(&self) -> bool {
        self.deliberate
    }

    /// Enter `Connecting`. Returns `false` when a socket is already opening,
    /// open, or closing, in which case nothing changes.
    ///
    /// An explicit connect clears a previous deliberate shutdown; a timer
    /// driven reconnect does not.
    pub fn start_connect(&mut self, explicit: bool) -> bool {
        if matches!(self.state, ConnectionState::Connecting | ConnectionState::Open | ConnectionState::Closing) {
            return false;
        }
        if explicit {
            self.deliberate = false;
        } else if self.deliberate {
            return false;
        }
        self.state = ConnectionState::Connecting;
        true
    }

    pub fn opened(&mut self) {
        self.state = ConnectionState::Open;
        self.attempts = 0;
    }

    /// Mark the shutdown as deliberate. Returns the state before the call.
    pub fn begin_close(&mut self) -> ConnectionState {
        let previous = self.state;
        self.deliberate = true;
        if previous == ConnectionState::Open {
            self.state = ConnectionState::Closing;
        }
        previous
    }

    /// Record a close and decide whether to reconnect.
    pub fn closed(&mut self, clean: bool) -> CloseDecision {
        self.state = ConnectionState::Closed;
        if clean || self.deliberate || self.attempts >= self.policy.max_attempts {
            return CloseDecision::Stop;
        }
        self.attempts += 1;
        CloseDecision::Reconnect { attempt: self.attempts, delay: self.policy.delay }
    }

    /// Whether a reconnect timer firing now should still open a socket.
    #[must_use]
    pub fn reconnect_due(&self) -> bool {
        !self.deliberate && self.state == ConnectionState::Closed
    }
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;
