//! Checkpoint Service
//!
//! Keeps the remote progress store roughly in step with the playhead:
//! - threshold saves while playing, at most one per `threshold` seconds of content
//! - unconditional saves on pause and end
//! - at most one save in flight; requests arriving meanwhile are coalesced
//! - failed saves are never retried, the next eligible save supersedes them
//!
//! [`CheckpointTracker`] is the pure accumulator deciding *when* to save.
//! [`CheckpointService`] wraps it with the store and the bus.

use crate::events::{EngineEvent, EventSender};
use crate::store::ProgressStore;
use crate::types::{Checkpoint, SessionId};
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Why a save was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveReason {
    Threshold,
    Paused,
    Ended,
}

/// A save the tracker wants issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveRequest {
    pub seq: u64,
    pub position_seconds: u64,
    pub reason: SaveReason,
}

/// Truncate a playhead position to whole seconds
pub fn whole_seconds(position: f64) -> u64 {
    if position.is_finite() && position > 0.0 {
        position.floor() as u64
    } else {
        0
    }
}

/// Save scheduling accumulator, free of timers and I/O
#[derive(Debug, Clone)]
pub struct CheckpointTracker {
    threshold: u64,
    last_saved: u64,
    latest: u64,
    in_flight: Option<u64>,
    deferred: Option<(u64, SaveReason)>,
    next_seq: u64,
    closed: bool,
}

impl CheckpointTracker {
    /// `resume_position` counts as already saved
    pub fn new(threshold: u64, resume_position: u64) -> Self {
        Self {
            threshold,
            last_saved: resume_position,
            latest: resume_position,
            in_flight: None,
            deferred: None,
            next_seq: 0,
            closed: false,
        }
    }

    /// Timing tick while playing
    pub fn on_tick(&mut self, position: f64) -> Option<SaveRequest> {
        self.latest = whole_seconds(position);
        if self.closed || self.in_flight.is_some() || !self.threshold_reached() {
            return None;
        }
        Some(self.issue(self.latest, SaveReason::Threshold))
    }

    /// Transition to paused or ended; bypasses the threshold
    pub fn on_terminal(&mut self, position: f64, reason: SaveReason) -> Option<SaveRequest> {
        if self.closed {
            return None;
        }
        let position = whole_seconds(position);
        self.latest = position;
        if self.in_flight.is_some() {
            self.deferred = Some((position, reason));
            return None;
        }
        Some(self.issue(position, reason))
    }

    /// Save `seq` finished; returns the coalesced follow-up, if any
    pub fn on_complete(&mut self, seq: u64) -> Option<SaveRequest> {
        if self.in_flight != Some(seq) {
            return None;
        }
        self.in_flight = None;

        if self.closed {
            return None;
        }
        if let Some((position, reason)) = self.deferred.take() {
            return Some(self.issue(position, reason));
        }
        if self.threshold_reached() {
            return Some(self.issue(self.latest, SaveReason::Threshold));
        }
        None
    }

    /// Stop scheduling; an in-flight save may still complete
    pub fn close(&mut self) {
        self.closed = true;
        self.deferred = None;
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn has_deferred(&self) -> bool {
        self.deferred.is_some()
    }

    pub fn last_saved(&self) -> u64 {
        self.last_saved
    }

    fn threshold_reached(&self) -> bool {
        self.latest.abs_diff(self.last_saved) >= self.threshold
    }

    fn issue(&mut self, position_seconds: u64, reason: SaveReason) -> SaveRequest {
        self.next_seq += 1;
        self.last_saved = position_seconds;
        self.in_flight = Some(self.next_seq);
        SaveRequest {
            seq: self.next_seq,
            position_seconds,
            reason,
        }
    }
}

/// Where a session's checkpoints go
#[derive(Clone)]
pub struct CheckpointTarget {
    pub store: Arc<dyn ProgressStore>,
    pub owner_id: String,
}

/// Per-session checkpoint scheduling and dispatch
pub struct CheckpointService {
    session_id: SessionId,
    tracker: CheckpointTracker,
    target: Option<CheckpointTarget>,
    events: EventSender,
    confirmed: Option<Checkpoint>,
    task: Option<JoinHandle<()>>,
}

impl CheckpointService {
    /// Without a target the service tracks nothing and never saves
    pub fn new(
        session_id: SessionId,
        threshold: u64,
        resume_position: u64,
        target: Option<CheckpointTarget>,
        events: EventSender,
    ) -> Self {
        Self {
            session_id,
            tracker: CheckpointTracker::new(threshold, resume_position),
            target,
            events,
            confirmed: None,
            task: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    pub fn on_tick(&mut self, position: f64) {
        if self.target.is_none() {
            return;
        }
        if let Some(request) = self.tracker.on_tick(position) {
            self.dispatch(request);
        }
    }

    pub fn on_terminal(&mut self, position: f64, reason: SaveReason) {
        if self.target.is_none() {
            return;
        }
        if let Some(request) = self.tracker.on_terminal(position, reason) {
            self.dispatch(request);
        }
    }

    /// Save-completion callback, delivered through the bus
    pub fn on_complete(&mut self, seq: u64, position_seconds: u64, outcome: std::result::Result<(), String>) {
        match outcome {
            Ok(()) => {
                debug!(session_id = %self.session_id, position_seconds, "Checkpoint confirmed");
                self.confirmed = Some(Checkpoint {
                    session_id: self.session_id,
                    position_seconds,
                    saved_at: Utc::now(),
                });
            }
            Err(e) => {
                warn!(session_id = %self.session_id, position_seconds, error = %e, "Checkpoint save failed");
            }
        }

        if let Some(request) = self.tracker.on_complete(seq) {
            self.dispatch(request);
        }
    }

    /// Stop scheduling; lets an in-flight save finish on its own
    pub fn close(&mut self) {
        self.tracker.close();
        if self.task.take().is_some() && self.tracker.in_flight() {
            debug!(session_id = %self.session_id, "Leaving in-flight checkpoint to complete");
        }
    }

    pub fn last_confirmed(&self) -> Option<&Checkpoint> {
        self.confirmed.as_ref()
    }

    pub fn tracker(&self) -> &CheckpointTracker {
        &self.tracker
    }

    fn dispatch(&mut self, request: SaveRequest) {
        let Some(target) = self.target.clone() else {
            return;
        };

        debug!(
            session_id = %self.session_id,
            position_seconds = request.position_seconds,
            reason = ?request.reason,
            "Issuing checkpoint"
        );

        let events = self.events.clone();
        self.task = Some(tokio::spawn(async move {
            let outcome = target
                .store
                .save(&target.owner_id, request.position_seconds)
                .await
                .map(|_| ())
                .map_err(|e| e.to_string());

            events.send(EngineEvent::CheckpointCompleted {
                seq: request.seq,
                position_seconds: request.position_seconds,
                outcome,
            });
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_gate() {
        let mut tracker = CheckpointTracker::new(5, 0);

        assert_eq!(tracker.on_tick(0.2), None);
        assert_eq!(tracker.on_tick(4.9), None);

        let save = tracker.on_tick(5.1).unwrap();
        assert_eq!(save.position_seconds, 5);
        assert_eq!(save.reason, SaveReason::Threshold);
    }

    #[test]
    fn test_resume_position_counts_as_saved() {
        let mut tracker = CheckpointTracker::new(5, 42);
        assert_eq!(tracker.on_tick(43.0), None);
        assert_eq!(tracker.on_tick(47.0).map(|s| s.position_seconds), Some(47));
    }

    #[test]
    fn test_in_flight_ticks_coalesce() {
        let mut tracker = CheckpointTracker::new(5, 0);
        let first = tracker.on_tick(5.0).unwrap();

        // Eligible but blocked by the in-flight save
        assert_eq!(tracker.on_tick(10.5), None);
        assert_eq!(tracker.on_tick(11.0), None);

        let follow_up = tracker.on_complete(first.seq).unwrap();
        assert_eq!(follow_up.position_seconds, 11);
        assert_eq!(follow_up.reason, SaveReason::Threshold);
    }

    #[test]
    fn test_terminal_bypasses_threshold() {
        let mut tracker = CheckpointTracker::new(5, 0);
        tracker.on_tick(1.0);

        let save = tracker.on_terminal(2.7, SaveReason::Paused).unwrap();
        assert_eq!(save.position_seconds, 2);
        assert_eq!(save.reason, SaveReason::Paused);
    }

    #[test]
    fn test_terminal_during_flight_is_deferred() {
        let mut tracker = CheckpointTracker::new(5, 0);
        let first = tracker.on_tick(6.0).unwrap();

        assert_eq!(tracker.on_terminal(7.0, SaveReason::Paused), None);
        assert!(tracker.has_deferred());

        let deferred = tracker.on_complete(first.seq).unwrap();
        assert_eq!(deferred.position_seconds, 7);
        assert_eq!(deferred.reason, SaveReason::Paused);
    }

    #[test]
    fn test_stale_completion_ignored() {
        let mut tracker = CheckpointTracker::new(5, 0);
        let first = tracker.on_tick(5.0).unwrap();
        assert_eq!(tracker.on_complete(first.seq + 10), None);
        assert!(tracker.in_flight());
    }

    #[test]
    fn test_close_drops_deferred_and_blocks_new_saves() {
        let mut tracker = CheckpointTracker::new(5, 0);
        let first = tracker.on_tick(5.0).unwrap();
        tracker.on_terminal(6.0, SaveReason::Paused);

        tracker.close();
        assert!(!tracker.has_deferred());
        assert_eq!(tracker.on_complete(first.seq), None);
        assert_eq!(tracker.on_tick(60.0), None);
        assert_eq!(tracker.on_terminal(61.0, SaveReason::Ended), None);
    }

    #[test]
    fn test_failed_save_is_not_retried() {
        let mut tracker = CheckpointTracker::new(5, 0);
        let first = tracker.on_tick(5.0).unwrap();

        // Completion (failed or not) only frees the slot
        assert_eq!(tracker.on_complete(first.seq), None);
        assert_eq!(tracker.on_tick(6.0), None);
        assert_eq!(tracker.on_tick(10.0).map(|s| s.position_seconds), Some(10));
    }

    #[test]
    fn test_save_frequency_bound() {
        let mut tracker = CheckpointTracker::new(5, 0);
        let mut saves = 0;
        let mut position = 0.0;
        let seconds = 93.0;

        // 25 ticks per second, each save completing immediately
        while position <= seconds {
            if let Some(save) = tracker.on_tick(position) {
                saves += 1;
                tracker.on_complete(save.seq);
            }
            position += 0.04;
        }

        let bound = (seconds / 5.0_f64).ceil() as usize + 1;
        assert!(saves <= bound, "{} saves exceeds bound {}", saves, bound);
        assert!(saves >= 18);
    }

    #[test]
    fn test_whole_seconds() {
        assert_eq!(whole_seconds(599.99), 599);
        assert_eq!(whole_seconds(-3.0), 0);
        assert_eq!(whole_seconds(f64::NAN), 0);
    }
}
