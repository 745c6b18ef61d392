#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::backoff::{Backoff, Constant};
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};

const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);
const DEFAULT_HEARTBEAT_INTERVAL_DURATION: Duration = Duration::from_secs(5);
const DEFAULT_HEARTBEAT_TIMEOUT_DURATION: Duration = Duration::from_secs(15);
const MIN_HEARTBEAT_DURATION: Duration = Duration::from_millis(10);
const DEFAULT_INITIAL_BACKOFF_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_MAX_BACKOFF_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Configuration for WebSocket client behavior.
#[non_exhaustive]
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Reconnection strategy configuration
    pub reconnect: ReconnectConfig,
    /// Ping/pong liveness check; `None` relies on the transport alone
    pub heartbeat: Option<HeartbeatConfig>,
    /// Upper bound on a single connection attempt; `None` uses transport defaults
    pub connect_timeout: Option<Duration>,
}

impl Config {
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    #[must_use]
    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = Some(heartbeat);
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = Some(connect_timeout);
        self
    }
}

/// Liveness check using WebSocket ping control frames.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval for sending PING frames
    pub interval: Duration,
    /// Maximum time to wait for a PONG before considering the connection dead
    pub timeout: Duration,
}

impl HeartbeatConfig {
    /// Durations shorter than 10ms, including zero, are raised to 10ms.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }.clamped()
    }

    /// Copy with both durations raised to the supported minimum.
    ///
    /// The fields are public, so the connection applies this again before use.
    #[must_use]
    pub(crate) const fn clamped(self) -> Self {
        Self {
            interval: at_least(self.interval, MIN_HEARTBEAT_DURATION),
            timeout: at_least(self.timeout, MIN_HEARTBEAT_DURATION),
        }
    }
}

const fn at_least(duration: Duration, min: Duration) -> Duration {
    if duration.as_nanos() < min.as_nanos() {
        min
    } else {
        duration
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_HEARTBEAT_INTERVAL_DURATION,
            DEFAULT_HEARTBEAT_TIMEOUT_DURATION,
        )
    }
}

/// How long to wait between a close and the next connection attempt.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectStrategy {
    /// The same delay every time.
    Fixed {
        /// Delay before each new attempt
        delay: Duration,
    },
    /// Exponentially growing, jittered delay, capped at `max`.
    Exponential {
        /// Backoff duration for the first reconnection attempt
        initial: Duration,
        /// Maximum backoff duration
        max: Duration,
        /// Multiplier for exponential backoff
        multiplier: f64,
    },
}

impl ReconnectStrategy {
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self::Fixed { delay }
    }

    /// Capped exponential backoff with the default bounds (1s doubling up to 60s).
    #[must_use]
    pub const fn exponential() -> Self {
        Self::Exponential {
            initial: DEFAULT_INITIAL_BACKOFF_DURATION,
            max: DEFAULT_MAX_BACKOFF_DURATION,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

/// Configuration for automatic reconnection behavior.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive failed attempts before giving up.
    /// `None` means infinite retries.
    pub max_attempts: Option<u32>,
    /// Delay policy between attempts
    pub strategy: ReconnectStrategy,
}

impl ReconnectConfig {
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            max_attempts: None,
            strategy: ReconnectStrategy::fixed(delay),
        }
    }

    #[must_use]
    pub const fn exponential() -> Self {
        Self {
            max_attempts: None,
            strategy: ReconnectStrategy::exponential(),
        }
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Build the stateful delay sequence for one connection loop.
    pub(crate) fn backoff(&self) -> Box<dyn Backoff + Send> {
        match self.strategy {
            ReconnectStrategy::Fixed { delay } => Box::new(Constant::new(delay)),
            ReconnectStrategy::Exponential {
                initial,
                max,
                multiplier,
            } => Box::new(exponential_backoff(initial, max, multiplier)),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        // Infinite reconnection at a fixed interval by default
        Self::fixed(DEFAULT_RECONNECT_DELAY)
    }
}

fn exponential_backoff(initial: Duration, max: Duration, multiplier: f64) -> ExponentialBackoff {
    ExponentialBackoffBuilder::default()
        .with_initial_interval(initial)
        .with_max_interval(max)
        .with_multiplier(multiplier)
        .with_max_elapsed_time(None) // We handle max attempts separately
        .build()
}
