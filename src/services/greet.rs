// src/services/greet.rs

use facet::Facet;
use tracing::debug;

use crate::compute::DeadlineGate;
use crate::config::PacingConfig;
use crate::dispatch::{Handler, Inbound, Outbound};

const GREET_MANY_TIMES_COUNT: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct Greeting {
    pub first_name: String,
    pub last_name: String,
}

impl Greeting {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct GreetRequest {
    pub greeting: Greeting,
}

impl From<Greeting> for GreetRequest {
    fn from(greeting: Greeting) -> Self {
        Self { greeting }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct GreetResponse {
    pub result: String,
}

/// Greetings over the four call patterns, with configurable latency.
#[derive(Debug, Clone, Default)]
pub struct GreetService {
    pacing: PacingConfig,
}

impl GreetService {
    pub fn new(pacing: PacingConfig) -> Self {
        Self { pacing }
    }

    pub fn greet(&self) -> Handler<GreetRequest, GreetResponse> {
        Handler::unary(|cx, req: GreetRequest| async move {
            debug!(session = %cx.session_id(), ?req, "greet");
            let Greeting {
                first_name,
                last_name,
            } = req.greeting;
            Ok(GreetResponse {
                result: format!("Hello, {first_name} {last_name}"),
            })
        })
    }

    /// Ten numbered greetings, one per `stream_interval`.
    pub fn greet_many_times(&self) -> Handler<GreetRequest, GreetResponse> {
        let interval = self.pacing.stream_interval;
        Handler::server_stream(
            move |cx, req: GreetRequest, out: Outbound<GreetResponse>| async move {
                debug!(session = %cx.session_id(), ?req, "greet many times");
                for i in 1..=GREET_MANY_TIMES_COUNT {
                    if i > 1 {
                        cx.deadline().sleep(interval).await?;
                    }
                    let result = format!("Hello {} number {i}", req.greeting.first_name);
                    out.send(&GreetResponse { result }).await?;
                }
                Ok(())
            },
        )
    }

    /// One greeting for everyone named on the stream.
    pub fn long_greet(&self) -> Handler<GreetRequest, GreetResponse> {
        Handler::client_stream(|cx, mut inbound: Inbound<GreetRequest>| async move {
            let mut result = String::from("Hello ");
            while let Some(req) = inbound.recv().await? {
                result.push_str(&req.greeting.first_name);
                result.push_str("! \n");
            }
            debug!(session = %cx.session_id(), "long greet");
            Ok(GreetResponse { result })
        })
    }

    pub fn greet_everyone(&self) -> Handler<GreetRequest, GreetResponse> {
        Handler::bidi_stream(
            |cx, mut inbound: Inbound<GreetRequest>, out: Outbound<GreetResponse>| async move {
                while let Some(req) = inbound.recv().await? {
                    debug!(session = %cx.session_id(), first_name = %req.greeting.first_name, "greet everyone");
                    let result = format!("Hello, {}!", req.greeting.first_name);
                    out.send(&GreetResponse { result }).await?;
                }
                Ok(())
            },
        )
    }

    /// A greeting that takes `gate_steps * gate_interval` to produce and gives
    /// way to cancellation or expiry at every step.
    pub fn greet_with_deadline(&self) -> Handler<GreetRequest, GreetResponse> {
        let gate = DeadlineGate::new(self.pacing.gate_steps, self.pacing.gate_interval);
        Handler::unary(move |cx, req: GreetRequest| async move {
            debug!(session = %cx.session_id(), remaining = ?cx.deadline().remaining(), "greet with deadline");
            let Greeting {
                first_name,
                last_name,
            } = req.greeting;
            gate.respond(cx.deadline(), || GreetResponse {
                result: format!("Hello, {first_name} {last_name}"),
            })
            .await
        })
    }
}
