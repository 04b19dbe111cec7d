//! Session configuration.
//!
//! Every field has a sensible default, and `#[serde(default)]` lets a
//! config file override only the fields it cares about:
//!
//! ```json
//! { "reconnect": { "max_attempts": 10 }, "keepalive_interval_ms": 0 }
//! ```

use std::time::Duration;

use mobcast_protocol::BinaryEncoding;
use mobcast_transport::DEFAULT_MESSAGE_PATH;
use serde::{Deserialize, Serialize};
use tracing::warn;

// ---------------------------------------------------------------------------
// ReconnectConfig
// ---------------------------------------------------------------------------

/// Bounds on the automatic reconnection window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Timer expiries allowed per window; the window gives up when this
    /// many have elapsed. 0 disables automatic reconnection.
    pub max_attempts: u32,
    /// Time between attempts. The first attempt fires after half of it.
    pub interval_ms: u64,
    /// Overall budget for one reconnection window.
    pub timeout_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            interval_ms: 3_000,
            timeout_ms: 15_000,
        }
    }
}

impl ReconnectConfig {
    /// A config that never reconnects automatically.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    pub fn enabled(&self) -> bool {
        self.max_attempts > 0
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Full configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub reconnect: ReconnectConfig,
    /// `PING` cadence while connected. 0 disables keepalive.
    pub keepalive_interval_ms: u64,
    /// Minimum dwell between accepted state changes on backends whose
    /// state is polled.
    pub state_debounce_ms: u64,
    /// How long to wait for `PLAYERID`/`RECONNECT_ACCEPTED` after the
    /// transport opens before announcing the connection anyway.
    pub identity_grace_ms: u64,
    /// Request path used by `connect(host, port)` on the message backend.
    pub message_path: String,
    /// Payload encoding for binary frames in both directions.
    pub binary_encoding: BinaryEncoding,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            keepalive_interval_ms: 5_000,
            state_debounce_ms: 1_000,
            identity_grace_ms: 2_000,
            message_path: DEFAULT_MESSAGE_PATH.to_owned(),
            binary_encoding: BinaryEncoding::default(),
        }
    }
}

impl SessionConfig {
    /// Fix any out-of-range values so the config is safe to use.
    ///
    /// Called by [`Session::new`](crate::Session::new). Rules:
    /// - an enabled reconnect window with a zero timeout gets the default timeout;
    /// - `message_path` gets a leading `/`, and an empty one becomes `/mobile`.
    pub fn validated(mut self) -> Self {
        if self.reconnect.enabled() && self.reconnect.timeout_ms == 0 {
            let fallback = ReconnectConfig::default().timeout_ms;
            warn!(timeout_ms = fallback, "reconnect timeout of 0 would give up instantly, using default");
            self.reconnect.timeout_ms = fallback;
        }
        let path = self.message_path.trim();
        self.message_path = if path.is_empty() {
            DEFAULT_MESSAGE_PATH.to_owned()
        } else if path.starts_with('/') {
            path.to_owned()
        } else {
            format!("/{path}")
        };
        self
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn state_debounce(&self) -> Duration {
        Duration::from_millis(self.state_debounce_ms)
    }

    pub fn identity_grace(&self) -> Duration {
        Duration::from_millis(self.identity_grace_ms)
    }
}
