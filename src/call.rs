// src/call.rs

//! Calling side of a session.
//!
//! A [`Call`] owns the caller's end of the channel. It encodes requests,
//! decodes responses, and surfaces the serving side's terminal status. The
//! caller keeps its own [`DeadlineContext`]: when it fires, a `Cancel` frame
//! tells the serving side to stop.

use std::sync::Arc;

use facet::Facet;
use tokio::task::JoinHandle;

use crate::channel::{Frame, FrameRx, FrameTx, MessageChannel};
use crate::codec;
use crate::deadline::{DeadlineContext, DeadlineMonitor};
use crate::error::{Code, Result, Status};
use crate::types::Pattern;

/// A call in progress, seen from the caller.
pub struct Call<C: MessageChannel> {
    sender: CallSender<C::Tx>,
    receiver: CallReceiver<C::Rx>,
}

impl<C: MessageChannel> Call<C> {
    /// Start a call over `channel`. Must run inside a tokio runtime.
    pub fn open(pattern: Pattern, channel: C, ctx: DeadlineContext) -> Self {
        let (tx, rx) = channel.split();
        let tx = Arc::new(tx);

        let monitor = DeadlineMonitor::spawn(&ctx);
        let relay = tokio::spawn(relay_cancel(Arc::clone(&tx), ctx.clone()));

        Call {
            sender: CallSender {
                tx,
                ctx: ctx.clone(),
                pattern,
                sent: 0,
                closed: false,
            },
            receiver: CallReceiver {
                rx,
                ctx,
                finished: None,
                relay: Some(relay),
                monitor: Some(monitor),
            },
        }
    }

    pub fn pattern(&self) -> Pattern {
        self.sender.pattern
    }

    pub fn context(&self) -> &DeadlineContext {
        &self.sender.ctx
    }

    pub async fn send<Req: Facet<'static>>(&mut self, msg: &Req) -> Result<()> {
        self.sender.send(msg).await
    }

    pub async fn close_send(&mut self) -> Result<()> {
        self.sender.close_send().await
    }

    pub async fn recv<Resp: Facet<'static>>(&mut self) -> Result<Option<Resp>> {
        self.receiver.recv().await
    }

    /// Cancel the call. The serving side is told with a `Cancel` frame.
    pub fn cancel(&self) {
        self.sender.ctx.cancel();
    }

    /// Separate the directions so they can run on different tasks.
    pub fn split(self) -> (CallSender<C::Tx>, CallReceiver<C::Rx>) {
        (self.sender, self.receiver)
    }

    /// Send one request and wait for the single response.
    pub async fn unary<Req, Resp>(mut self, req: &Req) -> Result<Resp>
    where
        Req: Facet<'static>,
        Resp: Facet<'static>,
    {
        self.send(req).await?;
        self.close_send().await?;
        self.receiver.single().await
    }

    /// Send the one request of a server stream; responses follow from `recv`.
    pub async fn server_stream<Req: Facet<'static>>(&mut self, req: &Req) -> Result<()> {
        self.send(req).await?;
        self.close_send().await
    }

    /// Close the request stream and wait for the single response.
    pub async fn close_and_recv<Resp: Facet<'static>>(mut self) -> Result<Resp> {
        self.close_send().await?;
        self.receiver.single().await
    }

    /// Receive every remaining response until the terminal status.
    pub async fn recv_all<Resp: Facet<'static>>(&mut self) -> Result<Vec<Resp>> {
        self.receiver.recv_all().await
    }
}

/// Request direction of a [`Call`].
pub struct CallSender<T: FrameTx> {
    tx: Arc<T>,
    ctx: DeadlineContext,
    pattern: Pattern,
    sent: usize,
    closed: bool,
}

impl<T: FrameTx> CallSender<T> {
    pub async fn send<Req: Facet<'static>>(&mut self, msg: &Req) -> Result<()> {
        let deadline = self.ctx.deadline();
        deadline.check()?;
        if self.closed {
            return Err(Status::internal("send after close-of-send"));
        }
        if !self.pattern.client_streams() && self.sent > 0 {
            return Err(Status::internal(format!(
                "{} call takes a single request",
                self.pattern
            )));
        }

        let bytes = codec::encode(msg)?;
        tokio::select! {
            biased;
            status = deadline.done() => Err(status),
            sent = self.tx.send(Frame::Data(bytes)) => {
                sent?;
                self.sent += 1;
                Ok(())
            }
        }
    }

    /// Signal that no further requests follow. Idempotent.
    pub async fn close_send(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let deadline = self.ctx.deadline();
        deadline.check()?;
        tokio::select! {
            biased;
            status = deadline.done() => Err(status),
            sent = self.tx.close_send() => {
                sent?;
                self.closed = true;
                Ok(())
            }
        }
    }

    pub fn cancel(&self) {
        self.ctx.cancel();
    }
}

/// Response direction of a [`Call`].
///
/// Dropping it before the call finishes releases the caller's hold on the
/// channel, which the serving side observes as the caller hanging up.
pub struct CallReceiver<R: FrameRx> {
    rx: R,
    ctx: DeadlineContext,
    finished: Option<Status>,
    relay: Option<JoinHandle<()>>,
    monitor: Option<DeadlineMonitor>,
}

impl<R: FrameRx> CallReceiver<R> {
    /// Next response, or `None` after a successful terminal status.
    ///
    /// A failure status from the serving side, or this side's own
    /// cancellation or expiry, is returned as `Err`. The terminal outcome
    /// repeats on every later call.
    pub async fn recv<Resp: Facet<'static>>(&mut self) -> Result<Option<Resp>> {
        if let Some(status) = &self.finished {
            return terminal(status);
        }
        let deadline = self.ctx.deadline();

        loop {
            let frame = tokio::select! {
                biased;
                status = deadline.done() => return self.finish(status, false),
                frame = self.rx.recv() => frame,
            };
            match frame {
                Ok(Some(Frame::Data(bytes))) => {
                    return codec::decode_response(&bytes).map(Some);
                }
                Ok(Some(Frame::Status(status))) => return self.finish(status, true),
                Ok(Some(frame @ (Frame::End | Frame::Cancel))) => {
                    tracing::trace!(kind = frame.kind(), "ignoring control frame from server");
                }
                Ok(None) => {
                    return self.finish(
                        Status::unavailable("serving side closed the channel without a status"),
                        true,
                    );
                }
                Err(e) => return self.finish(Status::from(e), true),
            }
        }
    }

    pub async fn recv_all<Resp: Facet<'static>>(&mut self) -> Result<Vec<Resp>> {
        let mut all = Vec::new();
        while let Some(resp) = self.recv().await? {
            all.push(resp);
        }
        Ok(all)
    }

    /// Exactly one response followed by a successful status.
    async fn single<Resp: Facet<'static>>(&mut self) -> Result<Resp> {
        let Some(resp) = self.recv().await? else {
            return Err(Status::internal("call finished without a response"));
        };
        match self.recv::<Resp>().await? {
            None => Ok(resp),
            Some(_) => Err(Status::internal("call sent more than one response")),
        }
    }

    /// Terminal status, once the call has finished.
    pub fn status(&self) -> Option<&Status> {
        self.finished.as_ref()
    }

    pub fn cancel(&self) {
        self.ctx.cancel();
    }

    /// Record the terminal status. A status decided by the serving side
    /// leaves nothing to relay; a local one still owes it a `Cancel` frame.
    fn finish<T>(&mut self, status: Status, remote: bool) -> Result<Option<T>> {
        if remote {
            if let Some(relay) = self.relay.take() {
                relay.abort();
            }
        }
        self.monitor = None;
        let outcome = terminal(&status);
        self.finished = Some(status);
        outcome
    }
}

impl<R: FrameRx> Drop for CallReceiver<R> {
    fn drop(&mut self) {
        // A terminated call still owes the serving side its Cancel frame; the
        // relay sends it and exits. Otherwise this is a hang-up.
        if !self.ctx.is_terminated() {
            if let Some(relay) = self.relay.take() {
                relay.abort();
            }
        }
    }
}

fn terminal<T>(status: &Status) -> Result<Option<T>> {
    if status.code() == Code::Ok {
        Ok(None)
    } else {
        Err(status.clone())
    }
}

/// Tell the serving side when this side cancels or expires.
async fn relay_cancel<T: FrameTx>(tx: Arc<T>, ctx: DeadlineContext) {
    let status = ctx.deadline().done().await;
    if status.code().is_termination() {
        if let Err(e) = tx.send(Frame::Cancel).await {
            tracing::debug!("cancel frame not delivered: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::memory_channel_pair;

    #[tokio::test]
    async fn recv_surfaces_failure_status_repeatedly() {
        let (client, server) = memory_channel_pair(4);
        let (server_tx, _server_rx) = server.split();
        let mut call = Call::open(Pattern::Unary, client, DeadlineContext::unbounded());

        server_tx
            .send(Frame::Status(Status::not_found("no such blog")))
            .await
            .unwrap();

        let err = call.recv::<u32>().await.unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
        let again = call.recv::<u32>().await.unwrap_err();
        assert_eq!(again, err);
    }

    #[tokio::test]
    async fn single_request_patterns_reject_a_second_send() {
        let (client, _server) = memory_channel_pair(4);
        let mut call = Call::open(Pattern::ServerStream, client, DeadlineContext::unbounded());

        call.send(&1u32).await.unwrap();
        let err = call.send(&2u32).await.unwrap_err();
        assert_eq!(err.code(), Code::Internal);

        call.close_send().await.unwrap();
        call.close_send().await.unwrap();
    }

    #[tokio::test]
    async fn cancel_sends_cancel_frame() {
        let (client, server) = memory_channel_pair(4);
        let (_server_tx, mut server_rx) = server.split();
        let mut call = Call::open(Pattern::BidiStream, client, DeadlineContext::unbounded());

        call.send(&5u32).await.unwrap();
        call.cancel();

        assert!(matches!(server_rx.recv().await.unwrap(), Some(Frame::Data(_))));
        assert_eq!(server_rx.recv().await.unwrap(), Some(Frame::Cancel));
        assert_eq!(call.recv::<u32>().await.unwrap_err().code(), Code::Cancelled);
    }

    #[tokio::test]
    async fn missing_status_is_unavailable() {
        let (client, server) = memory_channel_pair(4);
        let mut call = Call::open(Pattern::Unary, client, DeadlineContext::unbounded());
        drop(server);

        let err = call.recv::<u32>().await.unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
    }
}
