// src/dispatch.rs

//! Interaction pattern dispatch.
//!
//! A [`Handler`] is a tagged variant over the four call shapes. The session
//! picks the variant once when it starts serving and drives it with an
//! [`Inbound`] stream of decoded requests and an [`Outbound`] sink of
//! responses. Both ends select on the call's [`Deadline`], so a handler
//! blocked on either one is released as soon as the call terminates.

use std::future::Future;
use std::marker::PhantomData;

use facet::Facet;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::codec;
use crate::deadline::Deadline;
use crate::error::{Result, Status};
use crate::types::{Pattern, SessionId};

type UnaryFn<Req, Resp> = Box<dyn FnOnce(CallContext, Req) -> BoxFuture<'static, Result<Resp>> + Send>;
type ServerStreamFn<Req, Resp> =
    Box<dyn FnOnce(CallContext, Req, Outbound<Resp>) -> BoxFuture<'static, Result<()>> + Send>;
type ClientStreamFn<Req, Resp> =
    Box<dyn FnOnce(CallContext, Inbound<Req>) -> BoxFuture<'static, Result<Resp>> + Send>;
type BidiStreamFn<Req, Resp> = Box<
    dyn FnOnce(CallContext, Inbound<Req>, Outbound<Resp>) -> BoxFuture<'static, Result<()>> + Send,
>;

/// Handler for one call, tagged with the pattern it implements.
pub enum Handler<Req, Resp> {
    Unary(UnaryFn<Req, Resp>),
    ServerStream(ServerStreamFn<Req, Resp>),
    ClientStream(ClientStreamFn<Req, Resp>),
    BidiStream(BidiStreamFn<Req, Resp>),
}

impl<Req, Resp> Handler<Req, Resp>
where
    Req: Facet<'static> + Send + 'static,
    Resp: Facet<'static> + Send + Sync + 'static,
{
    /// One request in, one response out.
    pub fn unary<F, Fut>(f: F) -> Self
    where
        F: FnOnce(CallContext, Req) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Resp>> + Send + 'static,
    {
        Handler::Unary(Box::new(move |cx, req| f(cx, req).boxed()))
    }

    /// One request in, any number of responses out through the sink.
    pub fn server_stream<F, Fut>(f: F) -> Self
    where
        F: FnOnce(CallContext, Req, Outbound<Resp>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Handler::ServerStream(Box::new(move |cx, req, out| f(cx, req, out).boxed()))
    }

    /// Any number of requests in, one response out after close-of-send.
    pub fn client_stream<F, Fut>(f: F) -> Self
    where
        F: FnOnce(CallContext, Inbound<Req>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Resp>> + Send + 'static,
    {
        Handler::ClientStream(Box::new(move |cx, inbound| f(cx, inbound).boxed()))
    }

    /// Independent request and response streams.
    pub fn bidi_stream<F, Fut>(f: F) -> Self
    where
        F: FnOnce(CallContext, Inbound<Req>, Outbound<Resp>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Handler::BidiStream(Box::new(move |cx, inbound, out| f(cx, inbound, out).boxed()))
    }
}

impl<Req, Resp> Handler<Req, Resp> {
    pub fn pattern(&self) -> Pattern {
        match self {
            Handler::Unary(_) => Pattern::Unary,
            Handler::ServerStream(_) => Pattern::ServerStream,
            Handler::ClientStream(_) => Pattern::ClientStream,
            Handler::BidiStream(_) => Pattern::BidiStream,
        }
    }
}

impl<Req, Resp> std::fmt::Debug for Handler<Req, Resp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Handler").field(&self.pattern()).finish()
    }
}

/// What a handler knows about the call it serves.
#[derive(Debug, Clone)]
pub struct CallContext {
    session: SessionId,
    pattern: Pattern,
    deadline: Deadline,
}

impl CallContext {
    pub(crate) fn new(session: SessionId, pattern: Pattern, deadline: Deadline) -> Self {
        Self {
            session,
            pattern,
            deadline,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session
    }

    pub fn pattern(&self) -> Pattern {
        self.pattern
    }

    /// Read access to the call's expiry and cancellation state.
    pub fn deadline(&self) -> &Deadline {
        &self.deadline
    }
}

/// Decoded inbound messages of one call.
pub struct Inbound<Req> {
    rx: mpsc::Receiver<Vec<u8>>,
    deadline: Deadline,
    _marker: PhantomData<fn() -> Req>,
}

impl<Req: Facet<'static>> Inbound<Req> {
    pub(crate) fn new(rx: mpsc::Receiver<Vec<u8>>, deadline: Deadline) -> Self {
        Self {
            rx,
            deadline,
            _marker: PhantomData,
        }
    }

    /// Next request, or `None` once the caller has closed its side.
    ///
    /// A message that fails to decode ends the call with `InvalidArgument`.
    pub async fn recv(&mut self) -> Result<Option<Req>> {
        let bytes = tokio::select! {
            biased;
            status = self.deadline.done() => return Err(status),
            bytes = self.rx.recv() => bytes,
        };
        match bytes {
            Some(bytes) => codec::decode_request(&bytes).map(Some),
            // The pump drops its sender on close-of-send, and also when it
            // terminates the call; the termination reason takes precedence.
            None => match self.deadline.status() {
                Some(status) => Err(status),
                None => Ok(None),
            },
        }
    }

    /// Exactly one request followed by close-of-send.
    pub async fn single(&mut self) -> Result<Req> {
        let Some(req) = self.recv().await? else {
            return Err(Status::invalid_argument(
                "expected one request message, got none",
            ));
        };
        if self.recv().await?.is_some() {
            return Err(Status::invalid_argument(
                "expected one request message, got more",
            ));
        }
        Ok(req)
    }
}

/// Response sink of one call.
///
/// Every `send` reports whether the message was accepted. Once the call has
/// terminated or the outbound direction failed, it returns the terminal
/// status; handlers propagate it with `?` and stop.
pub struct Outbound<Resp> {
    tx: mpsc::Sender<Vec<u8>>,
    deadline: Deadline,
    _marker: PhantomData<fn(&Resp)>,
}

impl<Resp: Facet<'static>> Outbound<Resp> {
    pub(crate) fn new(tx: mpsc::Sender<Vec<u8>>, deadline: Deadline) -> Self {
        Self {
            tx,
            deadline,
            _marker: PhantomData,
        }
    }

    pub async fn send(&self, msg: &Resp) -> Result<()> {
        self.deadline.check()?;
        let bytes = codec::encode(msg)?;
        tokio::select! {
            biased;
            status = self.deadline.done() => Err(status),
            sent = self.tx.send(bytes) => sent.map_err(|_| {
                self.deadline
                    .status()
                    .unwrap_or_else(|| Status::unavailable("outbound direction closed"))
            }),
        }
    }
}

/// Drive `handler` to completion over the given streams.
pub(crate) async fn dispatch<Req, Resp>(
    handler: Handler<Req, Resp>,
    cx: CallContext,
    mut inbound: Inbound<Req>,
    outbound: Outbound<Resp>,
) -> Result<()>
where
    Req: Facet<'static> + Send + 'static,
    Resp: Facet<'static> + Send + Sync + 'static,
{
    match handler {
        Handler::Unary(f) => {
            let req = inbound.single().await?;
            let resp = f(cx, req).await?;
            outbound.send(&resp).await
        }
        Handler::ServerStream(f) => {
            let req = inbound.single().await?;
            f(cx, req, outbound).await
        }
        Handler::ClientStream(f) => {
            let resp = f(cx, inbound).await?;
            outbound.send(&resp).await
        }
        Handler::BidiStream(f) => f(cx, inbound, outbound).await,
    }
}
