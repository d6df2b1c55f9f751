//! Streaming call sessions over message-framed channels.
//!
//! A call is one [`Session`] bound to one [`MessageChannel`]. The session's
//! [`Pattern`] fixes the shape of the message flow: unary, server stream,
//! client stream, or bidirectional stream. A [`Handler`] of the matching
//! pattern consumes decoded requests and produces responses, while a
//! [`DeadlineContext`] can end the call at any suspension point. Both ends
//! observe the same terminal [`Status`].
//!
//! [`connect_local`] wires a handler to a [`Call`] over an in-process
//! channel, which is how the demo services in [`services`] are exercised.

pub mod call;
pub mod channel;
pub mod codec;
pub mod compute;
pub mod config;
pub mod deadline;
pub mod dispatch;
pub mod error;
pub mod local;
pub mod services;
pub mod session;
pub mod store;
pub mod types;

pub use call::{Call, CallReceiver, CallSender};
pub use channel::{
    Frame, FrameRx, FrameTx, MemoryChannel, MemoryRx, MemoryTx, MessageChannel,
    memory_channel_pair,
};
pub use compute::{AggregateError, AggregateMode, DeadlineGate, MaxTracker, PrimeFactors, RunningSum};
pub use config::{PacingConfig, SessionConfig};
pub use deadline::{Deadline, DeadlineContext, DeadlineMonitor};
pub use dispatch::{CallContext, Handler, Inbound, Outbound};
pub use error::{ChannelError, Code, Result, Status};
pub use local::connect_local;
pub use session::{Session, SessionState, StateCell};
pub use store::{BlogDocument, BlogPatch, DocumentId, DocumentStore, MemoryStore, StoreError};
pub use types::{Direction, Pattern, SessionId};
