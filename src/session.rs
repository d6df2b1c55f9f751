// src/session.rs

use std::sync::Arc;

use facet::Facet;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::channel::{Frame, FrameRx, FrameTx, MessageChannel};
use crate::config::SessionConfig;
use crate::deadline::{Deadline, DeadlineContext, DeadlineMonitor};
use crate::dispatch::{self, CallContext, Handler, Inbound, Outbound};
use crate::error::{ChannelError, Code, Result, Status};
use crate::types::{Direction, Pattern, SessionId};

/// Lifecycle of a session, seen from the serving side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Both directions may carry messages.
    Open,
    /// The given direction has delivered its last message.
    HalfClosed(Direction),
    /// Both directions are done and the terminal status is final.
    Closed(Status),
}

#[derive(Debug, Default)]
struct StateInner {
    inbound_done: bool,
    outbound_done: bool,
    status: Option<Status>,
}

/// Shared view of a session's [`SessionState`].
///
/// Transitions only move forward; `Closed` is terminal.
#[derive(Debug, Clone, Default)]
pub struct StateCell {
    inner: Arc<Mutex<StateInner>>,
}

impl StateCell {
    pub fn get(&self) -> SessionState {
        let inner = self.inner.lock();
        match (&inner.status, inner.inbound_done, inner.outbound_done) {
            (Some(status), _, _) => SessionState::Closed(status.clone()),
            (None, true, _) => SessionState::HalfClosed(Direction::Inbound),
            (None, false, true) => SessionState::HalfClosed(Direction::Outbound),
            (None, false, false) => SessionState::Open,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().status.is_some()
    }

    /// Whether close-of-send from the caller has been seen.
    pub fn inbound_done(&self) -> bool {
        self.inner.lock().inbound_done
    }

    fn half_close(&self, direction: Direction) {
        let mut inner = self.inner.lock();
        if inner.status.is_some() {
            return;
        }
        match direction {
            Direction::Inbound => inner.inbound_done = true,
            Direction::Outbound => inner.outbound_done = true,
        }
    }

    /// Finalize the session. Returns false if it was already closed.
    fn close(&self, status: Status) -> bool {
        let mut inner = self.inner.lock();
        if inner.status.is_some() {
            return false;
        }
        inner.inbound_done = true;
        inner.outbound_done = true;
        inner.status = Some(status);
        true
    }
}

/// The serving side of one call, bound to one channel for its lifetime.
///
/// A session is opened with its pattern, channel, and deadline context, and
/// then consumed by [`Session::serve`], which drives a [`Handler`] until the
/// call reaches a terminal status. The status is sent to the caller as the
/// last frame and returned.
///
/// # Example
///
/// ```ignore
/// let session = Session::open(Pattern::Unary, channel, DeadlineContext::unbounded());
/// let status = session
///     .serve(Handler::unary(|_, n: u64| async move { Ok(n * 2) }))
///     .await;
/// ```
pub struct Session<C: MessageChannel> {
    id: SessionId,
    pattern: Pattern,
    channel: C,
    ctx: DeadlineContext,
    config: SessionConfig,
    state: StateCell,
}

impl<C: MessageChannel> Session<C> {
    pub fn open(pattern: Pattern, channel: C, ctx: DeadlineContext) -> Self {
        Self {
            id: SessionId::next(),
            pattern,
            channel,
            ctx,
            config: SessionConfig::default(),
            state: StateCell::default(),
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn pattern(&self) -> Pattern {
        self.pattern
    }

    pub fn state(&self) -> StateCell {
        self.state.clone()
    }

    /// Handle for cancelling the session from the serving side.
    pub fn context(&self) -> &DeadlineContext {
        &self.ctx
    }

    /// Drive `handler` until the call terminates and return its status.
    pub async fn serve<Req, Resp>(self, handler: Handler<Req, Resp>) -> Status
    where
        Req: Facet<'static> + Send + 'static,
        Resp: Facet<'static> + Send + Sync + 'static,
    {
        let Session {
            id,
            pattern,
            channel,
            ctx,
            config,
            state,
        } = self;
        let (tx, rx) = channel.split();

        if handler.pattern() != pattern {
            let status = Status::internal(format!(
                "{} handler cannot serve a {pattern} session",
                handler.pattern()
            ));
            return finish(id, tx, &state, status).await;
        }

        debug!(session = %id, %pattern, expiry = ?ctx.expiry(), "session open");
        let _monitor = DeadlineMonitor::spawn(&ctx);
        let deadline = ctx.deadline();

        let (in_tx, in_rx) = mpsc::channel(config.inbound_buffer.max(1));
        let (out_tx, out_rx) = mpsc::channel(config.outbound_buffer.max(1));

        let pump = tokio::spawn(pump_inbound(
            id,
            pattern,
            rx,
            in_tx,
            ctx.clone(),
            state.clone(),
        ));
        let writer = tokio::spawn(write_outbound(
            id,
            pattern,
            tx,
            out_rx,
            ctx.clone(),
            state.clone(),
        ));

        let cx = CallContext::new(id, pattern, deadline.clone());
        let inbound = Inbound::new(in_rx, deadline.clone());
        let outbound = Outbound::new(out_tx, deadline.clone());
        let handler_task = tokio::spawn(async move {
            tokio::select! {
                biased;
                status = deadline.done() => Err(status),
                outcome = dispatch::dispatch(handler, cx, inbound, outbound) => outcome,
            }
        });

        let outcome = match handler_task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(session = %id, "handler task failed: {e}");
                let status = Status::internal(format!("handler failed: {e}"));
                ctx.abort(status.clone());
                Err(status)
            }
        };

        let (tx, written) = match writer.await {
            Ok(parts) => parts,
            Err(e) => {
                // The writer owned the sending half; without it no status
                // frame can be sent.
                pump.abort();
                let status = Status::internal(format!("outbound writer failed: {e}"));
                state.close(status.clone());
                warn!(session = %id, %status, "session closed without status frame");
                return status;
            }
        };
        state.half_close(Direction::Outbound);
        pump.abort();

        let status = match (outcome, written) {
            (Err(status), _) => status,
            (Ok(()), Err(status)) => status,
            (Ok(()), Ok(())) => Status::ok(),
        };
        finish(id, tx, &state, status).await
    }
}

/// Send the terminal status, release the channel, and close the state.
async fn finish<T: FrameTx>(id: SessionId, tx: T, state: &StateCell, status: Status) -> Status {
    if let Err(e) = tx.send(Frame::Status(status.clone())).await {
        debug!(session = %id, "status frame not delivered: {e}");
    }
    tx.close().await;
    state.close(status.clone());

    if status.is_ok() || status.is_client_error() || status.code().is_termination() {
        debug!(session = %id, %status, "session closed");
    } else {
        warn!(session = %id, %status, "session failed");
    }
    status
}

/// Move inbound frames into the handler's queue until close-of-send.
///
/// Control frames terminate the call through `ctx`: `Cancel` cancels it, a
/// channel error aborts it, and protocol violations abort it with
/// `InvalidArgument`.
async fn pump_inbound<R: FrameRx>(
    id: SessionId,
    pattern: Pattern,
    mut rx: R,
    data: mpsc::Sender<Vec<u8>>,
    ctx: DeadlineContext,
    state: StateCell,
) {
    let deadline = ctx.deadline();
    let mut data = Some(data);
    let mut discarded = 0u64;

    loop {
        let frame = tokio::select! {
            biased;
            _ = deadline.done() => return,
            frame = rx.recv() => frame,
        };

        match frame {
            Ok(Some(Frame::Data(bytes))) => {
                let Some(queue) = data.as_ref() else {
                    ctx.abort(Status::invalid_argument("message received after close-of-send"));
                    return;
                };
                trace!(session = %id, len = bytes.len(), "inbound data");
                match deliver(queue, bytes, &mut rx, &deadline).await {
                    Delivery::Queued => {}
                    Delivery::Discarded => {
                        discarded += 1;
                        if discarded == 1 {
                            debug!(session = %id, "handler dropped its inbound stream; discarding requests");
                        }
                        trace!(session = %id, discarded, "inbound data discarded");
                    }
                    Delivery::Interrupted(frame) => {
                        terminate(id, pattern, frame, &ctx, &state);
                        return;
                    }
                    Delivery::Stopped => return,
                }
            }
            Ok(Some(Frame::End)) => {
                let Some(queue) = data.take() else {
                    ctx.abort(Status::invalid_argument("duplicate close-of-send"));
                    return;
                };
                trace!(session = %id, discarded, "inbound close-of-send");
                state.half_close(Direction::Inbound);
                drop(queue);
            }
            frame => {
                terminate(id, pattern, frame, &ctx, &state);
                return;
            }
        }
    }
}

/// Act on an inbound frame that ends the call.
fn terminate(
    id: SessionId,
    pattern: Pattern,
    frame: std::result::Result<Option<Frame>, ChannelError>,
    ctx: &DeadlineContext,
    state: &StateCell,
) {
    match frame {
        Ok(Some(Frame::Cancel)) => {
            debug!(session = %id, "caller cancelled");
            ctx.cancel();
        }
        Ok(Some(Frame::Status(_))) => {
            ctx.abort(Status::invalid_argument("caller sent a status frame"));
        }
        Ok(Some(frame @ (Frame::Data(_) | Frame::End))) => {
            ctx.abort(Status::internal(format!(
                "{} frame delivered on the control lane",
                frame.kind()
            )));
        }
        Ok(None) => {
            debug!(session = %id, "caller closed the channel");
            ctx.abort(hang_up(pattern, state));
        }
        Err(e) => {
            warn!(session = %id, "inbound channel failed: {e}");
            ctx.abort(Status::from(e));
        }
    }
}

/// Status for a caller that released its end of the channel.
///
/// Leaving a stream whose request is complete ends it cleanly; leaving
/// mid-request abandons the call.
fn hang_up(pattern: Pattern, state: &StateCell) -> Status {
    if state.inbound_done() && pattern.server_streams() {
        Status::new(Code::Ok, "caller closed the channel")
    } else {
        Status::cancelled("caller closed the channel")
    }
}

enum Delivery {
    Queued,
    /// The handler dropped its inbound stream.
    Discarded,
    /// A control frame arrived while the message waited for queue space.
    Interrupted(std::result::Result<Option<Frame>, ChannelError>),
    /// The call ended.
    Stopped,
}

/// Queue one inbound message for the handler.
///
/// A full queue only holds back data; cancellation and the caller leaving
/// are still seen through the channel's control lane.
async fn deliver<R: FrameRx>(
    queue: &mpsc::Sender<Vec<u8>>,
    bytes: Vec<u8>,
    rx: &mut R,
    deadline: &Deadline,
) -> Delivery {
    tokio::select! {
        biased;
        _ = deadline.done() => Delivery::Stopped,
        frame = rx.recv_control() => Delivery::Interrupted(frame),
        permit = queue.reserve() => match permit {
            Ok(permit) => {
                permit.send(bytes);
                Delivery::Queued
            }
            Err(_) => Delivery::Discarded,
        },
    }
}

/// Forward handler responses to the channel in order.
///
/// Returns the sending half so the session can send the terminal status, plus
/// the reason the writer stopped early, if it did.
async fn write_outbound<T: FrameTx>(
    id: SessionId,
    pattern: Pattern,
    tx: T,
    mut data: mpsc::Receiver<Vec<u8>>,
    ctx: DeadlineContext,
    state: StateCell,
) -> (T, Result<()>) {
    let deadline = ctx.deadline();
    loop {
        let bytes = tokio::select! {
            biased;
            status = deadline.done() => return (tx, Err(status)),
            bytes = data.recv() => bytes,
        };
        let Some(bytes) = bytes else {
            return (tx, Ok(()));
        };

        trace!(session = %id, len = bytes.len(), "outbound data");
        let sent = tokio::select! {
            biased;
            status = deadline.done() => return (tx, Err(status)),
            sent = tx.send(Frame::Data(bytes)) => sent,
        };
        if let Err(e) = sent {
            let status = match e {
                ChannelError::Closed => {
                    debug!(session = %id, "caller closed the channel");
                    hang_up(pattern, &state)
                }
                e => {
                    warn!(session = %id, "outbound channel failed: {e}");
                    Status::from(e)
                }
            };
            // The pump may have seen the same hang-up first.
            ctx.abort(status.clone());
            return (tx, Err(deadline.status().unwrap_or(status)));
        }
    }
}
