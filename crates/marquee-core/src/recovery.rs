//! Error Recovery Supervisor
//!
//! Classifies pipeline faults and decides what the engine does about them:
//! - non-fatal network faults reload the stream at the current position
//! - non-fatal decode faults recover the decode path without a manifest fetch
//! - fatal faults, and recoverable ones past the retry bound, abort the session
//!
//! The supervisor only decides. Issuing the command, scheduling the backoff
//! timer and tearing the pipeline down are the engine's job.

use crate::config::RetryPolicy;
use crate::error::Error;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Command issued to the adaptive pipeline to recover from a fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Reload manifest/segments from the current position
    Reload { attempt: u32 },
    /// Rebuild the decode path, keeping loaded data
    RecoverDecode { attempt: u32 },
}

impl RecoveryAction {
    pub fn attempt(&self) -> u32 {
        match self {
            RecoveryAction::Reload { attempt } | RecoveryAction::RecoverDecode { attempt } => *attempt,
        }
    }

    pub fn advisory(&self) -> Advisory {
        match *self {
            RecoveryAction::Reload { attempt } => Advisory::Reconnecting { attempt },
            RecoveryAction::RecoverDecode { attempt } => Advisory::RecoveringDecode { attempt },
        }
    }
}

/// Outcome of classifying one fault
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryDecision {
    /// Issue `action` after `delay`
    Retry { action: RecoveryAction, delay: Duration },
    /// Tear down and fail the session
    Abort(FatalError),
    /// Nothing to do
    Ignore,
}

/// Per-session recovery bookkeeping
#[derive(Debug, Clone)]
pub struct RecoverySupervisor {
    policy: RetryPolicy,
    /// Progress past the last fault that clears the counters
    reset_after: f64,
    network_attempts: u32,
    decode_attempts: u32,
    last_fault_position: Option<f64>,
    outstanding: Option<Advisory>,
}

impl RecoverySupervisor {
    pub fn new(policy: RetryPolicy, reset_after: f64) -> Self {
        Self {
            policy,
            reset_after,
            network_attempts: 0,
            decode_attempts: 0,
            last_fault_position: None,
            outstanding: None,
        }
    }

    /// Classify a fault observed at `position`
    pub fn classify(&mut self, event: &ErrorEvent, position: f64) -> RecoveryDecision {
        if event.fatal {
            return RecoveryDecision::Abort(FatalError {
                category: event.category,
                message: event.detail.clone(),
            });
        }

        let (counter, make): (&mut u32, fn(u32) -> RecoveryAction) = match event.category {
            ErrorCategory::Network => (&mut self.network_attempts, |attempt| RecoveryAction::Reload { attempt }),
            ErrorCategory::Decode => (&mut self.decode_attempts, |attempt| RecoveryAction::RecoverDecode { attempt }),
            ErrorCategory::Other => {
                debug!(detail = %event.detail, "Ignoring non-fatal pipeline fault");
                return RecoveryDecision::Ignore;
            }
        };

        *counter += 1;
        let attempt = *counter;

        if attempt > self.policy.max_attempts {
            let exhausted = Error::RetriesExhausted {
                attempts: self.policy.max_attempts,
            };
            warn!(category = %event.category, attempts = self.policy.max_attempts, "Escalating fault to fatal");
            self.outstanding = None;
            return RecoveryDecision::Abort(FatalError {
                category: event.category,
                message: format!("{}: {}", exhausted, event.detail),
            });
        }

        let action = make(attempt);
        self.last_fault_position = Some(position);
        self.outstanding = Some(action.advisory());

        RecoveryDecision::Retry {
            action,
            delay: self.policy.delay_for(attempt),
        }
    }

    /// Feed a playhead update; clears the advisory once playback moves past
    /// the fault and the counters once it moved far enough
    pub fn note_progress(&mut self, position: f64) {
        let Some(fault_position) = self.last_fault_position else {
            return;
        };

        if self.outstanding.is_some() && position > fault_position {
            self.outstanding = None;
        }

        if position - fault_position >= self.reset_after {
            debug!(position, "Playback recovered, clearing recovery counters");
            self.network_attempts = 0;
            self.decode_attempts = 0;
            self.last_fault_position = None;
        }
    }

    /// Advisory to show while a recovery is outstanding
    pub fn advisory(&self) -> Option<Advisory> {
        self.outstanding
    }

    pub fn attempts(&self, category: ErrorCategory) -> u32 {
        match category {
            ErrorCategory::Network => self.network_attempts,
            ErrorCategory::Decode => self.decode_attempts,
            ErrorCategory::Other => 0,
        }
    }
}
