// src/types.rs

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque session handle. Never zero, unique within the process.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SessionId(NonZeroU64);

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

impl SessionId {
    /// Create a session ID from a raw value. Returns None if id == 0.
    pub fn new(id: u64) -> Option<Self> {
        NonZeroU64::new(id).map(SessionId)
    }

    /// Allocate the next process-wide session ID.
    pub fn next() -> Self {
        let raw = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        // The counter starts at 1 and would need 2^64 sessions to wrap.
        SessionId(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Shape of a call's message flow, fixed when the session opens.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Pattern {
    /// One request, one response.
    Unary,
    /// One request, zero or more responses.
    ServerStream,
    /// Zero or more requests, one response after close-of-send.
    ClientStream,
    /// Independent request and response streams.
    BidiStream,
}

impl Pattern {
    /// True if the caller may send more than one message.
    pub fn client_streams(self) -> bool {
        matches!(self, Pattern::ClientStream | Pattern::BidiStream)
    }

    /// True if the serving side may send more than one message.
    pub fn server_streams(self) -> bool {
        matches!(self, Pattern::ServerStream | Pattern::BidiStream)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Pattern::Unary => "unary",
            Pattern::ServerStream => "server-stream",
            Pattern::ClientStream => "client-stream",
            Pattern::BidiStream => "bidi-stream",
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One direction of a session, seen from the serving side.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Direction {
    /// Caller to handler.
    Inbound,
    /// Handler to caller.
    Outbound,
}
