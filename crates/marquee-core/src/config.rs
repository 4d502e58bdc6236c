//! Engine configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Mime type probed on the surface for native adaptive playback
pub const HLS_MIME_TYPE: &str = "application/vnd.apple.mpegurl";

/// Bounded retry policy for recoverable pipeline faults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts per fault category before escalating to fatal
    pub max_attempts: u32,
    /// Delay before the first attempt in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound for the exponential backoff in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 8000,
        }
    }
}

impl RetryPolicy {
    /// Retry immediately, for hosts that already pace their own reloads
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Delay before attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Playback engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Played seconds between threshold checkpoints
    pub checkpoint_threshold_secs: u64,
    /// Step used by the skip forward/backward controls
    pub skip_interval_secs: f64,
    /// Queued seeks are re-clamped when the real duration differs from the hint by more than this
    pub seek_reconcile_tolerance_secs: f64,
    /// Recovery policy for network and decode faults
    pub retry: RetryPolicy,
    /// Playback progress that clears the recovery counters
    pub recovery_reset_secs: f64,
    /// Request timeout for bundled HTTP collaborators
    pub request_timeout_ms: u64,
    /// Mime type probed for native adaptive support
    pub adaptive_mime_type: String,
    /// Volume of a freshly created engine
    pub initial_volume: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            checkpoint_threshold_secs: 5,
            skip_interval_secs: 10.0,
            seek_reconcile_tolerance_secs: 1.0,
            retry: RetryPolicy::default(),
            recovery_reset_secs: 10.0,
            request_timeout_ms: 10000,
            adaptive_mime_type: HLS_MIME_TYPE.to_string(),
            initial_volume: 1.0,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON config document, filling gaps with defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Check invariants the engine relies on
    pub fn validate(&self) -> Result<()> {
        if self.checkpoint_threshold_secs == 0 {
            return Err(Error::InvalidConfig(
                "checkpoint_threshold_secs must be positive".into(),
            ));
        }
        if !(self.skip_interval_secs > 0.0) {
            return Err(Error::InvalidConfig("skip_interval_secs must be positive".into()));
        }
        if !(self.seek_reconcile_tolerance_secs >= 0.0) {
            return Err(Error::InvalidConfig(
                "seek_reconcile_tolerance_secs must not be negative".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::InvalidConfig("retry.max_attempts must be positive".into()));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(Error::InvalidConfig(
                "retry.base_delay_ms exceeds retry.max_delay_ms".into(),
            ));
        }
        if self.adaptive_mime_type.trim().is_empty() {
            return Err(Error::InvalidConfig("adaptive_mime_type is empty".into()));
        }
        if !(0.0..=1.0).contains(&self.initial_volume) {
            return Err(Error::InvalidConfig("initial_volume must be within [0, 1]".into()));
        }
        Ok(())
    }
}
