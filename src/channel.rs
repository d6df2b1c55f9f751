// src/channel.rs

//! Message channel contract and the in-process implementation.
//!
//! A channel is an ordered, reliable, bidirectional pipe of [`Frame`]s between
//! two parties. Real transports live outside this crate; they plug in by
//! implementing [`MessageChannel`]. [`MemoryChannel`] is the in-process
//! reference implementation used by the loopback transport and tests.

use std::collections::VecDeque;
use std::future::Future;

use tokio::sync::mpsc;

use crate::error::{ChannelError, Status};

/// One framed unit on a channel direction.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// One encoded message.
    Data(Vec<u8>),
    /// Close-of-send: no further `Data` follows on this direction.
    End,
    /// Terminal status, sent once by the serving side as its last frame.
    Status(Status),
    /// Caller-initiated cancellation.
    Cancel,
}

impl Frame {
    /// Short frame kind for trace output.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Data(_) => "data",
            Frame::End => "end",
            Frame::Status(_) => "status",
            Frame::Cancel => "cancel",
        }
    }
}

/// A bidirectional message channel, split into independently owned halves.
pub trait MessageChannel: Send + 'static {
    type Tx: FrameTx;
    type Rx: FrameRx;

    fn split(self) -> (Self::Tx, Self::Rx);
}

/// Sending half of a [`MessageChannel`].
///
/// `send` is the backpressure point: it may wait for channel capacity.
pub trait FrameTx: Send + Sync + 'static {
    fn send(&self, frame: Frame) -> impl Future<Output = Result<(), ChannelError>> + Send + '_;

    /// Signal close-of-send to the peer.
    fn close_send(&self) -> impl Future<Output = Result<(), ChannelError>> + Send + '_ {
        self.send(Frame::End)
    }

    /// Release the outbound direction entirely.
    fn close(self) -> impl Future<Output = ()> + Send
    where
        Self: Sized;
}

/// Receiving half of a [`MessageChannel`].
pub trait FrameRx: Send + 'static {
    /// Receive the next frame.
    ///
    /// Returns `Ok(None)` once the peer has released its sending half.
    fn recv(&mut self) -> impl Future<Output = Result<Option<Frame>, ChannelError>> + Send + '_;

    /// Wait for a `Cancel` frame, or for the peer to go away, without taking
    /// any `Data` off the channel.
    ///
    /// A receiver holding a message it cannot hand on yet uses this to keep
    /// seeing cancellation. Transports that carry every frame on one ordered
    /// lane leave the default, which never resolves; a `Cancel` then waits
    /// behind the data sent before it.
    fn recv_control(
        &mut self,
    ) -> impl Future<Output = Result<Option<Frame>, ChannelError>> + Send + '_ {
        std::future::pending()
    }
}

/// In-process [`MessageChannel`] backed by tokio mpsc queues.
///
/// Frames are moved, never serialized. `Data` and `End` share a bounded lane
/// that holds at most `capacity` frames; senders wait when it is full.
/// `Cancel` and `Status` travel on an unbounded control lane, so neither
/// waits on a peer that stopped reading. A `Status` is still delivered after
/// every frame sent before it.
pub struct MemoryChannel {
    tx: MemoryTx,
    rx: MemoryRx,
}

/// Create a pair of connected [`MemoryChannel`]s.
///
/// Returns `(a, b)` where sending on `a` delivers to `b` and vice versa.
pub fn memory_channel_pair(capacity: usize) -> (MemoryChannel, MemoryChannel) {
    let capacity = capacity.max(1);
    let (tx_a, rx_b) = lane(capacity);
    let (tx_b, rx_a) = lane(capacity);

    (
        MemoryChannel { tx: tx_a, rx: rx_a },
        MemoryChannel { tx: tx_b, rx: rx_b },
    )
}

fn lane(capacity: usize) -> (MemoryTx, MemoryRx) {
    let (data_tx, data_rx) = mpsc::channel(capacity);
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    (
        MemoryTx {
            data: data_tx,
            control: control_tx,
        },
        MemoryRx {
            data: data_rx,
            control: Some(control_rx),
            held: VecDeque::new(),
        },
    )
}

impl MessageChannel for MemoryChannel {
    type Tx = MemoryTx;
    type Rx = MemoryRx;

    fn split(self) -> (Self::Tx, Self::Rx) {
        (self.tx, self.rx)
    }
}

/// Sending half of a [`MemoryChannel`].
pub struct MemoryTx {
    data: mpsc::Sender<Frame>,
    control: mpsc::UnboundedSender<Frame>,
}

impl FrameTx for MemoryTx {
    async fn send(&self, frame: Frame) -> Result<(), ChannelError> {
        match frame {
            Frame::Cancel | Frame::Status(_) => {
                self.control.send(frame).map_err(|_| ChannelError::Closed)
            }
            frame => self.data.send(frame).await.map_err(|_| ChannelError::Closed),
        }
    }

    async fn close(self) {
        // Dropping both senders closes the direction.
        drop(self);
    }
}

/// Receiving half of a [`MemoryChannel`].
pub struct MemoryRx {
    data: mpsc::Receiver<Frame>,
    /// `None` once the peer's control sender is gone.
    control: Option<mpsc::UnboundedReceiver<Frame>>,
    /// Status frames waiting for the data sent ahead of them.
    held: VecDeque<Frame>,
}

impl FrameRx for MemoryRx {
    async fn recv(&mut self) -> Result<Option<Frame>, ChannelError> {
        loop {
            if !self.held.is_empty() {
                // Everything sent before a held frame is already queued.
                if let Ok(frame) = self.data.try_recv() {
                    return Ok(Some(frame));
                }
                return Ok(self.held.pop_front());
            }

            let Some(control) = self.control.as_mut() else {
                return Ok(self.data.recv().await);
            };
            tokio::select! {
                biased;
                frame = control.recv() => match frame {
                    Some(Frame::Cancel) => return Ok(Some(Frame::Cancel)),
                    Some(frame) => self.held.push_back(frame),
                    None => self.control = None,
                },
                frame = self.data.recv() => return Ok(frame),
            }
        }
    }

    async fn recv_control(&mut self) -> Result<Option<Frame>, ChannelError> {
        loop {
            let Some(control) = self.control.as_mut() else {
                return Ok(None);
            };
            match control.recv().await {
                Some(Frame::Cancel) => return Ok(Some(Frame::Cancel)),
                Some(frame) => self.held.push_back(frame),
                None => {
                    self.control = None;
                    return Ok(None);
                }
            }
        }
    }
}
