// src/compute.rs

//! Per-session computation state machines.
//!
//! Each value here is owned by exactly one handler future and fed one inbound
//! message at a time. Nothing is shared between sessions and nothing locks.

use std::fmt;
use std::time::Duration;

use crate::deadline::Deadline;
use crate::error::{Result, Status};

/// How a [`RunningSum`] turns its state into a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateMode {
    Sum,
    Average,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateError {
    /// An average was requested over zero values.
    DivisionUndefined,
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateError::DivisionUndefined => {
                write!(f, "division undefined: no values were received")
            }
        }
    }
}

impl std::error::Error for AggregateError {}

impl From<AggregateError> for Status {
    fn from(err: AggregateError) -> Self {
        Status::invalid_argument(err.to_string())
    }
}

/// Running aggregation over a stream of numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningSum {
    accumulator: f64,
    count: u64,
    mode: AggregateMode,
}

impl RunningSum {
    pub fn new(mode: AggregateMode) -> Self {
        Self {
            accumulator: 0.0,
            count: 0,
            mode,
        }
    }

    pub fn sum() -> Self {
        Self::new(AggregateMode::Sum)
    }

    pub fn average() -> Self {
        Self::new(AggregateMode::Average)
    }

    pub fn consume(&mut self, value: f64) {
        self.accumulator += value;
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn finalize(&self) -> std::result::Result<f64, AggregateError> {
        match self.mode {
            AggregateMode::Sum => Ok(self.accumulator),
            AggregateMode::Average if self.count == 0 => Err(AggregateError::DivisionUndefined),
            AggregateMode::Average => Ok(self.accumulator / self.count as f64),
        }
    }
}

impl Extend<f64> for RunningSum {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        for value in iter {
            self.consume(value);
        }
    }
}

/// Ordered types with a least value to start a maximum from.
pub trait Lowest: Ord + Copy {
    const LOWEST: Self;
}

macro_rules! impl_lowest {
    ($($t:ty),*) => {
        $(impl Lowest for $t {
            const LOWEST: Self = <$t>::MIN;
        })*
    };
}

impl_lowest!(i8, i16, i32, i64, u8, u16, u32, u64);

/// Running maximum; every consumed value yields the updated maximum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaxTracker<T> {
    current: T,
}

impl<T: Lowest> MaxTracker<T> {
    pub fn new() -> Self {
        Self { current: T::LOWEST }
    }

    pub fn consume(&mut self, value: T) -> T {
        self.current = self.current.max(value);
        self.current
    }

    pub fn current(&self) -> T {
        self.current
    }
}

impl<T: Lowest> Default for MaxTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy prime factorization by trial division, smallest factor first.
///
/// Yields each prime factor with multiplicity. `remaining` only shrinks, and
/// the iterator is exhausted once it reaches 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimeFactors {
    remaining: u64,
    candidate: u64,
}

impl PrimeFactors {
    /// Factor `n`. Returns `None` for zero, which has no factorization.
    pub fn new(n: u64) -> Option<Self> {
        (n >= 1).then_some(Self {
            remaining: n,
            candidate: 2,
        })
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl Iterator for PrimeFactors {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        while self.remaining > 1 {
            // No factor at or below sqrt(remaining) means remaining is prime.
            let past_root = self
                .candidate
                .checked_mul(self.candidate)
                .is_none_or(|square| square > self.remaining);
            if past_root {
                let prime = self.remaining;
                self.remaining = 1;
                return Some(prime);
            }
            if self.remaining % self.candidate == 0 {
                self.remaining /= self.candidate;
                return Some(self.candidate);
            }
            self.candidate += 1;
        }
        None
    }
}

/// Simulated latency that gives way to cancellation.
///
/// Waits `steps` times for `interval`, re-checking the call's deadline before
/// and after each wait, and only then produces its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineGate {
    steps: u32,
    interval: Duration,
}

impl DeadlineGate {
    pub fn new(steps: u32, interval: Duration) -> Self {
        Self { steps, interval }
    }

    pub async fn wait(&self, deadline: &Deadline) -> Result<()> {
        for step in 0..self.steps {
            if let Err(status) = deadline.check() {
                tracing::debug!(step, %status, "gate interrupted");
                return Err(status);
            }
            deadline.sleep(self.interval).await?;
        }
        deadline.check()
    }

    /// Produce `respond()` after the gate opens, or the termination status.
    pub async fn respond<T>(&self, deadline: &Deadline, respond: impl FnOnce() -> T) -> Result<T> {
        self.wait(deadline).await?;
        Ok(respond())
    }
}
