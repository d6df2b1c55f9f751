// src/config.rs

use std::time::Duration;

const DEFAULT_BUFFER: usize = 64;
const DEFAULT_STREAM_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_GATE_STEPS: u32 = 3;
const DEFAULT_GATE_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for a session and its in-process transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Decoded-side queue between the inbound pump and the handler.
    /// Default: 64 messages
    pub inbound_buffer: usize,

    /// Queue between the handler and the outbound writer.
    /// Default: 64 messages
    pub outbound_buffer: usize,

    /// Per-direction capacity of a `MemoryChannel`.
    /// Default: 64 frames
    pub channel_capacity: usize,

    /// Deadline applied when a call is opened without one.
    /// Default: none
    pub default_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inbound_buffer: DEFAULT_BUFFER,
            outbound_buffer: DEFAULT_BUFFER,
            channel_capacity: DEFAULT_BUFFER,
            default_timeout: None,
        }
    }
}

impl SessionConfig {
    /// Defaults overridden by `ROAM_CALLS_*` environment variables.
    ///
    /// Missing, unparsable, or zero values keep the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            inbound_buffer: env_usize("ROAM_CALLS_INBOUND_BUFFER")
                .unwrap_or(defaults.inbound_buffer),
            outbound_buffer: env_usize("ROAM_CALLS_OUTBOUND_BUFFER")
                .unwrap_or(defaults.outbound_buffer),
            channel_capacity: env_usize("ROAM_CALLS_CHANNEL_CAPACITY")
                .unwrap_or(defaults.channel_capacity),
            default_timeout: env_millis("ROAM_CALLS_DEFAULT_TIMEOUT_MS")
                .or(defaults.default_timeout),
        }
    }

    pub fn with_inbound_buffer(mut self, inbound_buffer: usize) -> Self {
        self.inbound_buffer = inbound_buffer.max(1);
        self
    }

    pub fn with_outbound_buffer(mut self, outbound_buffer: usize) -> Self {
        self.outbound_buffer = outbound_buffer.max(1);
        self
    }

    pub fn with_channel_capacity(mut self, channel_capacity: usize) -> Self {
        self.channel_capacity = channel_capacity.max(1);
        self
    }

    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }
}

/// Latency injected by the demo services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacingConfig {
    /// Pause between messages of a paced server stream.
    /// Default: 1s
    pub stream_interval: Duration,

    /// Number of waits before a deadline-gated response.
    /// Default: 3
    pub gate_steps: u32,

    /// Length of each deadline-gated wait.
    /// Default: 1s
    pub gate_interval: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            stream_interval: DEFAULT_STREAM_INTERVAL,
            gate_steps: DEFAULT_GATE_STEPS,
            gate_interval: DEFAULT_GATE_INTERVAL,
        }
    }
}

impl PacingConfig {
    /// No pauses at all; used by tests that don't exercise timing.
    pub fn immediate() -> Self {
        Self {
            stream_interval: Duration::ZERO,
            gate_steps: 0,
            gate_interval: Duration::ZERO,
        }
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            stream_interval: env_millis("ROAM_CALLS_STREAM_INTERVAL_MS")
                .unwrap_or(defaults.stream_interval),
            gate_steps: env_usize("ROAM_CALLS_GATE_STEPS")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(defaults.gate_steps),
            gate_interval: env_millis("ROAM_CALLS_GATE_INTERVAL_MS")
                .unwrap_or(defaults.gate_interval),
        }
    }

    /// Total latency of a deadline-gated response.
    pub fn gate_total(&self) -> Duration {
        self.gate_interval * self.gate_steps
    }
}

fn env_usize(key: &str) -> Option<usize> {
    parse_positive(std::env::var(key).ok()?.as_str())
}

fn env_millis(key: &str) -> Option<Duration> {
    env_usize(key).map(|ms| Duration::from_millis(ms as u64))
}

fn parse_positive(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().filter(|v| *v > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.inbound_buffer, 64);
        assert_eq!(config.outbound_buffer, 64);
        assert_eq!(config.channel_capacity, 64);
        assert_eq!(config.default_timeout, None);

        let pacing = PacingConfig::default();
        assert_eq!(pacing.gate_total(), Duration::from_secs(3));
    }

    #[test]
    fn positive_values_only() {
        assert_eq!(parse_positive("16"), Some(16));
        assert_eq!(parse_positive(" 250 "), Some(250));
        assert_eq!(parse_positive("0"), None);
        assert_eq!(parse_positive("-3"), None);
        assert_eq!(parse_positive("lots"), None);
    }

    #[test]
    fn builders_clamp_buffers() {
        let config = SessionConfig::default()
            .with_inbound_buffer(0)
            .with_outbound_buffer(8)
            .with_default_timeout(Some(Duration::from_millis(500)));
        assert_eq!(config.inbound_buffer, 1);
        assert_eq!(config.outbound_buffer, 8);
        assert_eq!(config.default_timeout, Some(Duration::from_millis(500)));
    }
}
