// src/services/calculator.rs

use facet::Facet;
use tracing::debug;

use crate::compute::{MaxTracker, PrimeFactors, RunningSum};
use crate::dispatch::{Handler, Inbound, Outbound};
use crate::error::Status;

#[derive(Debug, Clone, PartialEq, Facet)]
pub struct SumRequest {
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Facet)]
pub struct SumResponse {
    pub result: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct PrimeNumberDecompositionRequest {
    pub number: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct PrimeNumberDecompositionResponse {
    pub prime_number: u64,
}

#[derive(Debug, Clone, PartialEq, Facet)]
pub struct ComputeAverageRequest {
    pub number: f64,
}

#[derive(Debug, Clone, PartialEq, Facet)]
pub struct ComputeAverageResponse {
    pub result: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct FindMaximumRequest {
    pub number: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct FindMaximumResponse {
    pub result: i32,
}

#[derive(Debug, Clone, PartialEq, Facet)]
pub struct SquareRootRequest {
    pub number: f64,
}

#[derive(Debug, Clone, PartialEq, Facet)]
pub struct SquareRootResponse {
    pub square_root: f64,
}

/// Arithmetic over the four call patterns.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalculatorService;

impl CalculatorService {
    pub fn new() -> Self {
        CalculatorService
    }

    /// Unary sum of a list of numbers.
    pub fn sum(&self) -> Handler<SumRequest, SumResponse> {
        Handler::unary(|cx, req: SumRequest| async move {
            debug!(session = %cx.session_id(), count = req.values.len(), "sum");
            let mut sum = RunningSum::sum();
            sum.extend(req.values);
            Ok(SumResponse {
                result: sum.finalize()?,
            })
        })
    }

    /// Streams the prime factors of a positive number, smallest first.
    pub fn prime_number_decomposition(
        &self,
    ) -> Handler<PrimeNumberDecompositionRequest, PrimeNumberDecompositionResponse> {
        Handler::server_stream(
            |cx, req: PrimeNumberDecompositionRequest, out: Outbound<_>| async move {
                debug!(session = %cx.session_id(), number = req.number, "prime number decomposition");
                let factors = u64::try_from(req.number)
                    .ok()
                    .and_then(PrimeFactors::new)
                    .ok_or_else(|| {
                        Status::invalid_argument(format!(
                            "expected a positive number, got {}",
                            req.number
                        ))
                    })?;
                for prime_number in factors {
                    out.send(&PrimeNumberDecompositionResponse { prime_number })
                        .await?;
                }
                Ok(())
            },
        )
    }

    /// Average of a client stream of numbers, answered after close-of-send.
    pub fn compute_average(&self) -> Handler<ComputeAverageRequest, ComputeAverageResponse> {
        Handler::client_stream(
            |cx, mut inbound: Inbound<ComputeAverageRequest>| async move {
                let mut average = RunningSum::average();
                while let Some(req) = inbound.recv().await? {
                    average.consume(req.number);
                }
                debug!(session = %cx.session_id(), count = average.count(), "compute average");
                Ok(ComputeAverageResponse {
                    result: average.finalize()?,
                })
            },
        )
    }

    /// Answers every number with the largest one seen so far.
    pub fn find_maximum(&self) -> Handler<FindMaximumRequest, FindMaximumResponse> {
        Handler::bidi_stream(
            |cx, mut inbound: Inbound<FindMaximumRequest>, out: Outbound<_>| async move {
                let mut max = MaxTracker::new();
                while let Some(req) = inbound.recv().await? {
                    let result = max.consume(req.number);
                    debug!(session = %cx.session_id(), number = req.number, result, "find maximum");
                    out.send(&FindMaximumResponse { result }).await?;
                }
                Ok(())
            },
        )
    }

    pub fn square_root(&self) -> Handler<SquareRootRequest, SquareRootResponse> {
        Handler::unary(|_, req: SquareRootRequest| async move {
            if req.number < 0.0 {
                return Err(Status::invalid_argument(format!(
                    "received a negative number: {}",
                    req.number
                )));
            }
            Ok(SquareRootResponse {
                square_root: req.number.sqrt(),
            })
        })
    }
}
