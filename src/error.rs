// src/error.rs

use std::fmt;

/// Status codes carried by a session's terminal status.
///
/// The numbering follows the gRPC-aligned scheme used on the wire: 0 is
/// success, everything else is a failure kind.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Code {
    /// Success (not an error)
    Ok = 0,

    // Cancellation & timeouts
    /// Cooperative cancellation was observed
    Cancelled = 1,
    /// Expiry was observed before completion
    DeadlineExceeded = 2,

    // Request errors
    /// Malformed or semantically invalid inbound message
    InvalidArgument = 3,
    /// Referenced entity does not exist
    NotFound = 4,

    // Channel errors
    /// Channel I/O failed mid-call
    Aborted = 9,

    // System errors
    /// Unexpected failure in business logic
    Internal = 12,
    /// Peer or backing service unreachable
    Unavailable = 13,
}

impl Code {
    /// Convert from a u32 wire value.
    /// Returns None if the value doesn't match a known code.
    pub fn from_u32(val: u32) -> Option<Self> {
        Some(match val {
            0 => Code::Ok,
            1 => Code::Cancelled,
            2 => Code::DeadlineExceeded,
            3 => Code::InvalidArgument,
            4 => Code::NotFound,
            9 => Code::Aborted,
            12 => Code::Internal,
            13 => Code::Unavailable,
            _ => return None,
        })
    }

    /// Convert to u32 for wire transmission.
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Check if a call failing with this code may succeed on retry.
    ///
    /// The core never retries by itself; this is advice for callers.
    pub fn is_retryable(self) -> bool {
        matches!(self, Code::Cancelled | Code::Unavailable | Code::Aborted)
    }

    /// Check if this code blames the caller (bad input or missing entity).
    pub fn is_client_error(self) -> bool {
        matches!(self, Code::InvalidArgument | Code::NotFound)
    }

    /// Check if this code reports a termination by the deadline monitor.
    pub fn is_termination(self) -> bool {
        matches!(self, Code::Cancelled | Code::DeadlineExceeded)
    }

    /// Get a human-readable description of this code.
    pub fn description(self) -> &'static str {
        match self {
            Code::Ok => "success",
            Code::Cancelled => "operation was cancelled",
            Code::DeadlineExceeded => "deadline exceeded",
            Code::InvalidArgument => "invalid argument",
            Code::NotFound => "not found",
            Code::Aborted => "operation aborted",
            Code::Internal => "internal error",
            Code::Unavailable => "service unavailable",
        }
    }
}

impl TryFrom<u32> for Code {
    type Error = UnknownCode;

    fn try_from(val: u32) -> std::result::Result<Self, Self::Error> {
        Code::from_u32(val).ok_or(UnknownCode(val))
    }
}

impl From<Code> for u32 {
    fn from(code: Code) -> u32 {
        code.as_u32()
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_u32())
    }
}

/// Error when converting from an unknown u32 code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownCode(pub u32);

impl fmt::Display for UnknownCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown status code: {}", self.0)
    }
}

impl std::error::Error for UnknownCode {}

/// Terminal status of a session, also used as the error type of every
/// fallible operation in the crate.
///
/// Both ends of a channel observe the same status: the serving side sends it
/// as the last frame and the caller surfaces it from `recv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    /// Create a new status with the given code and detail message.
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Status {
            code,
            message: message.into(),
        }
    }

    /// The successful terminal status.
    pub fn ok() -> Self {
        Status::new(Code::Ok, "")
    }

    pub fn code(&self) -> Code {
        self.code
    }

    /// Human-readable detail, possibly empty.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    pub fn is_client_error(&self) -> bool {
        self.code.is_client_error()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for Status {}

// Convenience constructors for common failure kinds

impl Status {
    pub fn cancelled(message: impl Into<String>) -> Self {
        Status::new(Code::Cancelled, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Status::new(Code::DeadlineExceeded, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Status::new(Code::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Status::new(Code::NotFound, message)
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Status::new(Code::Aborted, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Status::new(Code::Internal, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Status::new(Code::Unavailable, message)
    }
}

/// Transport-level failure reported by a message channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The peer hung up; nothing more can be sent or received.
    Closed,
    /// The channel failed mid-flight.
    Reset(String),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::Closed => write!(f, "channel closed by peer"),
            ChannelError::Reset(detail) => write!(f, "channel reset: {detail}"),
        }
    }
}

impl std::error::Error for ChannelError {}

impl From<ChannelError> for Status {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Closed => Status::unavailable(err.to_string()),
            ChannelError::Reset(_) => Status::aborted(err.to_string()),
        }
    }
}

/// Result type alias for call operations.
pub type Result<T> = std::result::Result<T, Status>;
