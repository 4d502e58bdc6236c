//! Transport State Machine
//!
//! Owns play/pause/seek/volume/mute/fullscreen state for one session, the same
//! way for direct and adaptive sources. The machine performs no I/O: every
//! operation queues [`TransportOutput`]s (surface commands and state
//! transitions) which the engine drains with [`Transport::take_outputs`].
//!
//! ```text
//!   idle ─► loading ─► ready ─► playing ⇄ paused
//!                        │         │        ▲
//!                        └─► paused│        │ seek
//!                                  ▼        │
//!                                ended ─────┘
//! ```
//!
//! Any non-idle state may fail; teardown returns to idle from anywhere.

use crate::surface::SurfaceCommand;
use crate::types::TransportState;
use tracing::{debug, warn};

/// How close to the duration a surface pause counts as running out of media
const END_OF_MEDIA_TOLERANCE_SECS: f64 = 0.05;

/// Effect produced by a transport operation
#[derive(Debug, Clone, PartialEq)]
pub enum TransportOutput {
    /// Command for the surface
    Command(SurfaceCommand),
    /// State changed; `position` is the playhead at the time
    Transition {
        from: TransportState,
        to: TransportState,
        position: f64,
    },
}

/// Seek requested before the real duration was known
#[derive(Debug, Clone, Copy, PartialEq)]
struct QueuedSeek {
    requested: f64,
    clamped: f64,
    /// Duration hint the request was clamped against
    hint: Option<f64>,
}

#[derive(Debug, Clone, Default)]
struct PendingIntents {
    play: bool,
    seek: Option<QueuedSeek>,
}

/// Per-session transport state
#[derive(Debug, Clone)]
pub struct Transport {
    state: TransportState,
    position: f64,
    duration: Option<f64>,
    duration_hint: Option<f64>,
    volume: f64,
    last_audible_volume: f64,
    muted: bool,
    fullscreen: bool,
    pending: PendingIntents,
    reconcile_tolerance: f64,
    outputs: Vec<TransportOutput>,
}

impl Transport {
    pub fn new(volume: f64, reconcile_tolerance: f64) -> Self {
        let volume = if volume.is_nan() { 1.0 } else { volume.clamp(0.0, 1.0) };
        Self {
            state: TransportState::Idle,
            position: 0.0,
            duration: None,
            duration_hint: None,
            volume,
            last_audible_volume: if volume > 0.0 { volume } else { 1.0 },
            muted: volume == 0.0,
            fullscreen: false,
            pending: PendingIntents::default(),
            reconcile_tolerance,
            outputs: Vec::new(),
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn duration_hint(&self) -> Option<f64> {
        self.duration_hint
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    pub fn fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn has_pending_play(&self) -> bool {
        self.pending.play
    }

    pub fn has_pending_seek(&self) -> bool {
        self.pending.seek.is_some()
    }

    /// Drain queued outputs in the order they were produced
    pub fn take_outputs(&mut self) -> Vec<TransportOutput> {
        std::mem::take(&mut self.outputs)
    }

    /// Start a session: `idle → loading`, syncing audio settings to the
    /// surface and queueing the resume seek
    pub fn begin(&mut self, resume_position: f64, duration_hint: Option<f64>) {
        if !self.transition(TransportState::Loading) {
            return;
        }
        self.set_duration_hint_inner(duration_hint);
        self.command(SurfaceCommand::SetVolume { volume: self.volume });
        self.command(SurfaceCommand::SetMuted { muted: self.muted });

        if resume_position > 0.0 {
            self.seek(resume_position);
        }
    }

    /// Record a duration learned before metadata (manifest or caller supplied)
    pub fn set_duration_hint(&mut self, duration: f64) {
        self.set_duration_hint_inner(Some(duration));
    }

    fn set_duration_hint_inner(&mut self, duration: Option<f64>) {
        if let Some(duration) = duration.filter(|d| d.is_finite() && *d > 0.0) {
            self.duration_hint = Some(duration);
        }
    }

    /// Duration/metadata became known
    ///
    /// From `loading` this reconciles the queued seek, moves to `ready` and
    /// applies a pending play. Later calls only update the duration.
    ///
    /// An infinite duration marks a live stream: the session becomes ready
    /// with no duration and seeks are only bounded below.
    pub fn on_metadata(&mut self, duration: f64) {
        if duration.is_nan() || duration < 0.0 {
            debug!(duration, "Ignoring unusable duration");
            return;
        }
        let live = duration.is_infinite();

        match self.state {
            TransportState::Loading => {
                if live {
                    debug!("Live stream, playhead unbounded");
                }
                self.duration = (!live).then_some(duration);
                self.apply_queued_seek(duration);
                self.transition(TransportState::Ready);

                if std::mem::take(&mut self.pending.play) {
                    self.play();
                }
            }
            state if state.is_active() => {
                self.duration = (!live).then_some(duration);
                if self.position > duration {
                    self.position = duration;
                }
            }
            _ => {}
        }
    }

    fn apply_queued_seek(&mut self, duration: f64) {
        let Some(queued) = self.pending.seek.take() else {
            self.position = self.position.clamp(0.0, duration);
            return;
        };

        let disagrees = match queued.hint {
            Some(hint) => (hint - duration).abs() > self.reconcile_tolerance,
            None => true,
        };
        let target = if disagrees {
            queued.requested.clamp(0.0, duration)
        } else {
            queued.clamped.clamp(0.0, duration)
        };

        debug!(requested = queued.requested, target, reconciled = disagrees, "Applying queued seek");
        self.position = target;
        self.command(SurfaceCommand::Seek { position: target });
    }

    /// `playing ↔ paused`; recorded as an intent before `ready`
    pub fn toggle_playback(&mut self) {
        match self.state {
            TransportState::Idle | TransportState::Loading => {
                self.pending.play = !self.pending.play;
                debug!(pending_play = self.pending.play, "Playback intent recorded");
            }
            TransportState::Ready | TransportState::Paused => self.play(),
            TransportState::Playing => {
                self.command(SurfaceCommand::Pause);
                self.transition(TransportState::Paused);
            }
            TransportState::Ended => {
                self.position = 0.0;
                self.command(SurfaceCommand::Seek { position: 0.0 });
                self.play();
            }
            TransportState::Failed => debug!("Ignoring playback toggle on failed session"),
        }
    }

    fn play(&mut self) {
        self.command(SurfaceCommand::Play);
        self.transition(TransportState::Playing);
    }

    /// Move the playhead, clamped to `[0, duration]`
    pub fn seek(&mut self, target: f64) {
        if target.is_nan() {
            return;
        }

        match self.state {
            TransportState::Loading => {
                let clamped = match self.duration_hint {
                    Some(hint) => target.clamp(0.0, hint),
                    None => target.max(0.0),
                };
                self.pending.seek = Some(QueuedSeek {
                    requested: target,
                    clamped,
                    hint: self.duration_hint,
                });
                self.position = clamped;
            }
            state if state.is_active() => {
                let duration = self.duration.unwrap_or(f64::INFINITY);
                let clamped = target.clamp(0.0, duration);
                self.position = clamped;
                self.command(SurfaceCommand::Seek { position: clamped });

                if state == TransportState::Ended && clamped < duration {
                    self.transition(TransportState::Paused);
                }
            }
            _ => debug!(state = %self.state, "Ignoring seek"),
        }
    }

    /// Seek by `delta` seconds from the current position
    pub fn skip_relative(&mut self, delta: f64) {
        if delta.is_nan() {
            return;
        }
        self.seek(self.position + delta);
    }

    /// Set the volume, clamped to `[0, 1]`; zero mutes
    pub fn set_volume(&mut self, volume: f64) {
        if volume.is_nan() {
            return;
        }
        let volume = volume.clamp(0.0, 1.0);
        self.volume = volume;
        self.command(SurfaceCommand::SetVolume { volume });

        let muted = volume == 0.0;
        if volume > 0.0 {
            self.last_audible_volume = volume;
        }
        if self.muted != muted {
            self.muted = muted;
            self.command(SurfaceCommand::SetMuted { muted });
        }
    }

    /// Unmuting at zero volume restores the last audible volume
    pub fn toggle_mute(&mut self) {
        if self.muted {
            if self.volume == 0.0 {
                self.volume = self.last_audible_volume;
                self.command(SurfaceCommand::SetVolume { volume: self.volume });
            }
            self.muted = false;
        } else {
            self.muted = true;
        }
        self.command(SurfaceCommand::SetMuted { muted: self.muted });
    }

    /// Ask for the opposite fullscreen mode; the flag follows the runtime's
    /// change notification, not the request
    pub fn toggle_fullscreen(&mut self) {
        let command = if self.fullscreen {
            SurfaceCommand::ExitFullscreen
        } else {
            SurfaceCommand::RequestFullscreen
        };
        self.command(command);
    }

    pub fn on_fullscreen_change(&mut self, active: bool) {
        self.fullscreen = active;
    }

    /// Timing tick; returns the accepted position
    pub fn on_time_update(&mut self, position: f64) -> Option<f64> {
        if !position.is_finite() {
            return None;
        }
        match self.state {
            TransportState::Ready | TransportState::Playing | TransportState::Paused => {
                let upper = self.duration.unwrap_or(f64::MAX);
                self.position = position.clamp(0.0, upper);
                Some(self.position)
            }
            _ => None,
        }
    }

    /// The surface started playing by itself (media keys, autoplay)
    pub fn on_surface_playing(&mut self) {
        match self.state {
            TransportState::Loading => self.pending.play = true,
            TransportState::Ready | TransportState::Paused | TransportState::Ended => {
                self.transition(TransportState::Playing);
            }
            _ => {}
        }
    }

    /// The surface paused by itself
    ///
    /// Media elements report a pause right before `ended` when playback runs
    /// out; a pause while playing at the end of the media is the end itself.
    pub fn on_surface_paused(&mut self) {
        match self.state {
            TransportState::Loading => self.pending.play = false,
            TransportState::Playing if self.at_end() => self.finish(),
            TransportState::Ready | TransportState::Playing => {
                self.transition(TransportState::Paused);
            }
            _ => {}
        }
    }

    /// Playback reached the end; pins the position to the duration
    pub fn on_surface_ended(&mut self) {
        match self.state {
            TransportState::Playing => self.finish(),
            TransportState::Ended => debug!("End of media already handled"),
            state => debug!(state = %state, "Ignoring end of media outside playback"),
        }
    }

    fn at_end(&self) -> bool {
        self.duration
            .is_some_and(|duration| self.position >= duration - END_OF_MEDIA_TOLERANCE_SECS)
    }

    fn finish(&mut self) {
        if let Some(duration) = self.duration {
            self.position = duration;
        }
        self.transition(TransportState::Ended);
    }

    /// Terminal failure; stops the surface
    pub fn fail(&mut self) -> bool {
        if matches!(self.state, TransportState::Idle | TransportState::Failed) {
            return false;
        }
        self.pending = PendingIntents::default();
        self.command(SurfaceCommand::Pause);
        self.transition(TransportState::Failed)
    }

    /// Teardown back to idle
    pub fn reset(&mut self) {
        self.pending = PendingIntents::default();
        self.transition(TransportState::Idle);
    }

    fn command(&mut self, command: SurfaceCommand) {
        self.outputs.push(TransportOutput::Command(command));
    }

    fn transition(&mut self, to: TransportState) -> bool {
        let from = self.state;
        if from == to {
            return false;
        }
        if !from.can_transition_to(to) {
            warn!(from = %from, to = %to, "Refusing invalid transport transition");
            return false;
        }
        self.state = to;
        self.outputs.push(TransportOutput::Transition {
            from,
            to,
            position: self.position,
        });
        true
    }
}
