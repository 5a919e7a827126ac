//! Connection tuning
//!
//! Deadlines and reconnection backoff. Durations accept humantime strings
//! such as `"10s"` or `"1500ms"`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Deadlines applied by the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Opening the transport
    #[serde(default = "default_connect", with = "humantime_serde")]
    pub connect: Duration,
    /// Waiting for `connect.challenge` after the transport opens
    #[serde(default = "default_challenge", with = "humantime_serde")]
    pub challenge: Duration,
    /// Waiting for the response to any request
    #[serde(default = "default_request", with = "humantime_serde")]
    pub request: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig {
            connect: default_connect(),
            challenge: default_challenge(),
            request: default_request(),
        }
    }
}

fn default_connect() -> Duration {
    Duration::from_secs(10)
}

fn default_challenge() -> Duration {
    Duration::from_secs(10)
}

fn default_request() -> Duration {
    Duration::from_secs(30)
}

/// Reconnection backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first retry
    #[serde(default = "default_base_delay", with = "humantime_serde")]
    pub base_delay: Duration,
    /// Upper bound of the exponential delay
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,
    /// Give up after this many failed cycles (unbounded when absent)
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Fixed delay when the socket drops while pairing is pending
    #[serde(default = "default_pairing_poll", with = "humantime_serde")]
    pub pairing_poll_interval: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ReconnectConfig {
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            max_attempts: None,
            pairing_poll_interval: default_pairing_poll(),
        }
    }
}

fn default_base_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_max_delay() -> Duration {
    Duration::from_millis(30_000)
}

fn default_pairing_poll() -> Duration {
    Duration::from_secs(5)
}
