//! Internal event bus
//!
//! Every external notification (surface timing and state, pipeline manifest
//! and error reports, checkpoint completions, retry timers) is translated into
//! one [`EngineEvent`] and queued here. The engine drains the queue in
//! emission order and hands each message to exactly one handler.
//!
//! Messages produced on behalf of a session carry its [`SessionId`]; the
//! engine drops messages whose session is no longer attached, which is how a
//! late manifest fetch or save completion from a torn-down session is
//! neutralised.

use crate::recovery::RecoveryAction;
use crate::types::*;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Notifications from the playback surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SurfaceEvent {
    /// Playhead moved (timing tick)
    TimeUpdate { position: f64 },
    /// Duration or metadata became known
    DurationChange { duration: f64 },
    /// Surface started playing on its own account
    Playing,
    /// Surface paused on its own account
    Paused,
    /// Playback reached the end of the media
    Ended,
    /// Runtime fullscreen state changed
    FullscreenChange { active: bool },
    /// Decoder or element failure
    Error(ErrorEvent),
}

/// Notifications from the adaptive pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Master playlist parsed
    ManifestParsed {
        levels: Vec<QualityLevel>,
        duration: Option<f64>,
    },
    /// Pipeline switched the level it is rendering
    LevelSwitched { level: u32 },
    /// Pipeline-internal fault
    Error(ErrorEvent),
}

/// Message consumed by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Surface(SurfaceEvent),
    Pipeline(PipelineEvent),
    /// A checkpoint save finished
    CheckpointCompleted {
        seq: u64,
        position_seconds: u64,
        outcome: std::result::Result<(), String>,
    },
    /// A delayed recovery command is due
    RetryDue { action: RecoveryAction },
}

impl From<SurfaceEvent> for EngineEvent {
    fn from(event: SurfaceEvent) -> Self {
        EngineEvent::Surface(event)
    }
}

impl From<PipelineEvent> for EngineEvent {
    fn from(event: PipelineEvent) -> Self {
        EngineEvent::Pipeline(event)
    }
}

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The surface, which outlives sessions
    Surface,
    /// Work started on behalf of one session
    Session(SessionId),
}

/// Queued message with its origin
#[derive(Debug, Clone)]
pub struct Envelope {
    pub origin: Origin,
    pub event: EngineEvent,
}

/// Cloneable handle for posting messages onto the bus
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Envelope>,
    origin: Origin,
}

impl EventSender {
    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Queue a message; returns false once the engine is gone
    pub fn send(&self, event: impl Into<EngineEvent>) -> bool {
        self.tx
            .send(Envelope {
                origin: self.origin,
                event: event.into(),
            })
            .is_ok()
    }

    pub fn time_update(&self, position: f64) -> bool {
        self.send(SurfaceEvent::TimeUpdate { position })
    }

    pub fn duration_change(&self, duration: f64) -> bool {
        self.send(SurfaceEvent::DurationChange { duration })
    }

    pub fn ended(&self) -> bool {
        self.send(SurfaceEvent::Ended)
    }

    pub fn fullscreen_change(&self, active: bool) -> bool {
        self.send(SurfaceEvent::FullscreenChange { active })
    }
}

/// Handle given to an adaptive backend for reporting back to its session
#[derive(Debug, Clone)]
pub struct PipelineEvents {
    sender: EventSender,
}

impl PipelineEvents {
    pub(crate) fn new(sender: EventSender) -> Self {
        Self { sender }
    }

    pub fn manifest_parsed(&self, levels: Vec<QualityLevel>, duration: Option<f64>) -> bool {
        self.sender.send(PipelineEvent::ManifestParsed { levels, duration })
    }

    pub fn level_switched(&self, level: u32) -> bool {
        self.sender.send(PipelineEvent::LevelSwitched { level })
    }

    pub fn error(&self, error: ErrorEvent) -> bool {
        self.sender.send(PipelineEvent::Error(error))
    }
}

/// FIFO message queue owned by the engine
#[derive(Debug)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<Envelope>,
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// Sender for surface notifications
    pub fn surface_sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
            origin: Origin::Surface,
        }
    }

    /// Sender stamped with a session id
    pub fn session_sender(&self, session_id: SessionId) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
            origin: Origin::Session(session_id),
        }
    }

    /// Next message if one is already queued
    pub fn try_next(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next message
    pub async fn next(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Discard everything queued, returning how many messages were dropped
    pub fn discard_pending(&mut self) -> usize {
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Published on every transport state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportTransition {
    pub session_id: SessionId,
    pub from: TransportState,
    pub to: TransportState,
    pub position: f64,
}
