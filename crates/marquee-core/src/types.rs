//! Core types for Marquee

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a stream reference is played back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    /// Reference assigned straight to the surface
    Direct,
    /// Adaptive pipeline owns the surface
    Adaptive,
    /// No playback path exists on this host
    Unsupported,
}

impl std::fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackMode::Direct => write!(f, "direct"),
            PlaybackMode::Adaptive => write!(f, "adaptive"),
            PlaybackMode::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// Transport state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    /// No session attached
    Idle,
    /// Source wired, waiting for duration/metadata
    Loading,
    /// Metadata known, playback not started
    Ready,
    /// Content is playing
    Playing,
    /// Playback paused
    Paused,
    /// Playback reached the end
    Ended,
    /// Fatal error, no further automatic recovery
    Failed,
}

impl TransportState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: TransportState) -> bool {
        use TransportState::*;
        matches!(
            (self, target),
            // Teardown is unconditional
            (_, Idle) |
            (Idle, Loading) |
            (Loading, Ready) |
            (Ready, Playing) | (Ready, Paused) |
            (Playing, Paused) | (Playing, Ended) |
            (Paused, Playing) |
            (Ended, Playing) | (Ended, Paused) |
            (Loading, Failed) | (Ready, Failed) | (Playing, Failed) | (Paused, Failed) | (Ended, Failed)
        )
    }

    /// True once duration is known and the session is not terminal
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TransportState::Ready | TransportState::Playing | TransportState::Paused | TransportState::Ended
        )
    }
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportState::Idle => write!(f, "idle"),
            TransportState::Loading => write!(f, "loading"),
            TransportState::Ready => write!(f, "ready"),
            TransportState::Playing => write!(f, "playing"),
            TransportState::Paused => write!(f, "paused"),
            TransportState::Ended => write!(f, "ended"),
            TransportState::Failed => write!(f, "failed"),
        }
    }
}

/// One selectable variant of an adaptive stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualityLevel {
    /// Stable level id assigned by the pipeline
    pub id: u32,
    /// Vertical resolution in pixels
    pub vertical_resolution: u32,
    /// Advertised bandwidth in bits per second (0 if unknown)
    #[serde(default)]
    pub bandwidth: u64,
}

impl QualityLevel {
    pub fn new(id: u32, vertical_resolution: u32) -> Self {
        Self {
            id,
            vertical_resolution,
            bandwidth: 0,
        }
    }

    pub fn with_bandwidth(mut self, bandwidth: u64) -> Self {
        self.bandwidth = bandwidth;
        self
    }

    /// Label in the form `720p`
    pub fn label(&self) -> String {
        format!("{}p", self.vertical_resolution)
    }
}

/// Requested quality: adaptive or pinned to one level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualitySelection {
    #[default]
    Auto,
    Level(u32),
}

impl std::fmt::Display for QualitySelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualitySelection::Auto => write!(f, "auto"),
            QualitySelection::Level(id) => write!(f, "level {}", id),
        }
    }
}

/// Entry in the quality menu exposed to presentation layers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityOption {
    pub selection: QualitySelection,
    pub label: String,
    pub vertical_resolution: Option<u32>,
}

/// Quality levels of one manifest, keyed by stable id
///
/// Built once when the manifest is parsed and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QualityLadder {
    levels: BTreeMap<u32, QualityLevel>,
    /// Ids in manifest order
    order: Vec<u32>,
}

impl QualityLadder {
    /// Build a ladder, keeping the first occurrence of a duplicated id
    pub fn new(levels: impl IntoIterator<Item = QualityLevel>) -> Self {
        let mut ladder = Self::default();
        for level in levels {
            if level.vertical_resolution == 0 || ladder.levels.contains_key(&level.id) {
                tracing::warn!(level_id = level.id, "Skipping invalid or duplicate quality level");
                continue;
            }
            ladder.order.push(level.id);
            ladder.levels.insert(level.id, level);
        }
        ladder
    }

    pub fn get(&self, id: u32) -> Option<&QualityLevel> {
        self.levels.get(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.levels.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Levels in manifest order
    pub fn levels(&self) -> impl Iterator<Item = &QualityLevel> {
        self.order.iter().filter_map(|id| self.levels.get(id))
    }

    /// Menu entries, synthetic `auto` first
    pub fn options(&self) -> Vec<QualityOption> {
        if self.is_empty() {
            return Vec::new();
        }

        let mut options = Vec::with_capacity(self.len() + 1);
        options.push(QualityOption {
            selection: QualitySelection::Auto,
            label: "auto".to_string(),
            vertical_resolution: None,
        });
        options.extend(self.levels().map(|level| QualityOption {
            selection: QualitySelection::Level(level.id),
            label: level.label(),
            vertical_resolution: Some(level.vertical_resolution),
        }));
        options
    }
}

/// Pipeline error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Decode,
    Other,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Decode => write!(f, "decode"),
            ErrorCategory::Other => write!(f, "other"),
        }
    }
}

/// Fault reported by the pipeline or the surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub category: ErrorCategory,
    pub fatal: bool,
    pub detail: String,
}

impl ErrorEvent {
    pub fn new(category: ErrorCategory, fatal: bool, detail: impl Into<String>) -> Self {
        Self {
            category,
            fatal,
            detail: detail.into(),
        }
    }

    pub fn network(detail: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Network, false, detail)
    }

    pub fn decode(detail: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Decode, false, detail)
    }

    pub fn fatal(category: ErrorCategory, detail: impl Into<String>) -> Self {
        Self::new(category, true, detail)
    }
}

/// Transient, non-fatal status shown while a recovery is outstanding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Advisory {
    Reconnecting { attempt: u32 },
    RecoveringDecode { attempt: u32 },
}

/// Terminal failure presented to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FatalError {
    pub category: ErrorCategory,
    pub message: String,
}

/// Persisted playback position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session_id: SessionId,
    pub position_seconds: u64,
    pub saved_at: DateTime<Utc>,
}

/// Read-only view of the attached session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub session_id: Option<SessionId>,
    pub stream_ref: Option<String>,
    pub mode: Option<PlaybackMode>,
    pub state: TransportState,
    pub position: f64,
    pub duration: Option<f64>,
    pub volume: f64,
    pub muted: bool,
    pub selected_quality: QualitySelection,
    pub available_qualities: Vec<QualityOption>,
    pub fullscreen: bool,
    pub advisory: Option<Advisory>,
    pub fatal_error: Option<FatalError>,
    pub last_checkpoint: Option<Checkpoint>,
}

impl PlaybackSnapshot {
    /// Snapshot of a surface with nothing attached
    pub fn detached(volume: f64) -> Self {
        Self {
            session_id: None,
            stream_ref: None,
            mode: None,
            state: TransportState::Idle,
            position: 0.0,
            duration: None,
            volume,
            muted: false,
            selected_quality: QualitySelection::Auto,
            available_qualities: Vec::new(),
            fullscreen: false,
            advisory: None,
            fatal_error: None,
            last_checkpoint: None,
        }
    }
}
