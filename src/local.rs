// src/local.rs

//! In-process loopback transport.

use std::time::Duration;

use facet::Facet;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

use crate::call::Call;
use crate::channel::{MemoryChannel, memory_channel_pair};
use crate::config::SessionConfig;
use crate::deadline::DeadlineContext;
use crate::dispatch::Handler;
use crate::error::Status;
use crate::session::Session;

/// Serve `handler` on a fresh in-process session and return the caller's end.
///
/// The serving session runs on its own task; its join handle yields the
/// terminal status it sent. `timeout` falls back to the config's default and
/// is applied to both ends, the way a deadline travels with a request.
pub fn connect_local<Req, Resp>(
    handler: Handler<Req, Resp>,
    timeout: Option<Duration>,
    config: &SessionConfig,
) -> (Call<MemoryChannel>, JoinHandle<Status>)
where
    Req: Facet<'static> + Send + 'static,
    Resp: Facet<'static> + Send + Sync + 'static,
{
    let pattern = handler.pattern();
    let expiry = timeout
        .or(config.default_timeout)
        .map(|timeout| Instant::now() + timeout);
    let (client_end, server_end) = memory_channel_pair(config.channel_capacity);

    let session = Session::open(pattern, server_end, DeadlineContext::with_expiry(expiry))
        .with_config(config.clone());
    let span = tracing::debug_span!("session", id = %session.id(), %pattern);
    let serving = tokio::spawn(session.serve(handler).instrument(span));

    let call = Call::open(pattern, client_end, DeadlineContext::with_expiry(expiry));
    (call, serving)
}
