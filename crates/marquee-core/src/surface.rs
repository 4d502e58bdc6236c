//! Playback surface abstraction
//!
//! The surface is the host's media output (a video or audio element, a
//! GStreamer sink, a headless clock). The engine only ever commands it through
//! [`MediaSurface`]; everything the surface observes flows back as
//! [`SurfaceEvent`](crate::events::SurfaceEvent) messages on the event bus.

use serde::{Deserialize, Serialize};
use url::Url;

/// Commands the engine issues to a surface
pub trait MediaSurface {
    /// Whether the surface can natively play the given mime type
    fn can_play_type(&self, mime_type: &str) -> bool;

    /// Assign a source for native playback
    fn set_source(&mut self, url: &Url);

    /// Drop the current source and release its decoder
    fn clear_source(&mut self);

    fn play(&mut self);

    fn pause(&mut self);

    /// Move the playhead, in seconds
    fn set_current_time(&mut self, seconds: f64);

    fn set_volume(&mut self, volume: f64);

    fn set_muted(&mut self, muted: bool);

    /// Ask the host for full-surface presentation; the outcome is reported
    /// later as a fullscreen-change notification
    fn request_fullscreen(&mut self);

    fn exit_fullscreen(&mut self);
}

/// Where playback stood when a source had to be re-wired
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResumePoint {
    pub position: f64,
    pub playing: bool,
}

impl ResumePoint {
    /// Assign `url` again and return the surface to this point
    pub fn rewire(&self, surface: &mut dyn MediaSurface, url: &Url) {
        surface.set_source(url);
        surface.set_current_time(self.position);
        if self.playing {
            surface.play();
        }
    }
}

/// A single surface command, as produced by the transport state machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SurfaceCommand {
    SetSource { url: String },
    ClearSource,
    Play,
    Pause,
    Seek { position: f64 },
    SetVolume { volume: f64 },
    SetMuted { muted: bool },
    RequestFullscreen,
    ExitFullscreen,
}

impl SurfaceCommand {
    /// Apply this command to a surface
    pub fn apply(&self, surface: &mut dyn MediaSurface) {
        match self {
            SurfaceCommand::SetSource { url } => match Url::parse(url) {
                Ok(url) => surface.set_source(&url),
                Err(e) => tracing::warn!(url = %url, error = %e, "Dropping unparsable source"),
            },
            SurfaceCommand::ClearSource => surface.clear_source(),
            SurfaceCommand::Play => surface.play(),
            SurfaceCommand::Pause => surface.pause(),
            SurfaceCommand::Seek { position } => surface.set_current_time(*position),
            SurfaceCommand::SetVolume { volume } => surface.set_volume(*volume),
            SurfaceCommand::SetMuted { muted } => surface.set_muted(*muted),
            SurfaceCommand::RequestFullscreen => surface.request_fullscreen(),
            SurfaceCommand::ExitFullscreen => surface.exit_fullscreen(),
        }
    }
}

/// Surface that records every command it receives
///
/// Useful for hosts that apply commands on their own thread, and for tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    native_types: Vec<String>,
    commands: Vec<SurfaceCommand>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare native support for a mime type
    pub fn with_native_type(mut self, mime_type: impl Into<String>) -> Self {
        self.native_types.push(mime_type.into());
        self
    }

    pub fn commands(&self) -> &[SurfaceCommand] {
        &self.commands
    }

    /// Take the recorded commands, leaving the log empty
    pub fn take_commands(&mut self) -> Vec<SurfaceCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Most recent source assignment, if the source is still set
    pub fn current_source(&self) -> Option<&str> {
        self.commands.iter().rev().find_map(|c| match c {
            SurfaceCommand::SetSource { url } => Some(Some(url.as_str())),
            SurfaceCommand::ClearSource => Some(None),
            _ => None,
        })?
    }
}

impl MediaSurface for RecordingSurface {
    fn can_play_type(&self, mime_type: &str) -> bool {
        self.native_types.iter().any(|t| t.eq_ignore_ascii_case(mime_type))
    }

    fn set_source(&mut self, url: &Url) {
        self.commands.push(SurfaceCommand::SetSource { url: url.to_string() });
    }

    fn clear_source(&mut self) {
        self.commands.push(SurfaceCommand::ClearSource);
    }

    fn play(&mut self) {
        self.commands.push(SurfaceCommand::Play);
    }

    fn pause(&mut self) {
        self.commands.push(SurfaceCommand::Pause);
    }

    fn set_current_time(&mut self, seconds: f64) {
        self.commands.push(SurfaceCommand::Seek { position: seconds });
    }

    fn set_volume(&mut self, volume: f64) {
        self.commands.push(SurfaceCommand::SetVolume { volume });
    }

    fn set_muted(&mut self, muted: bool) {
        self.commands.push(SurfaceCommand::SetMuted { muted });
    }

    fn request_fullscreen(&mut self) {
        self.commands.push(SurfaceCommand::RequestFullscreen);
    }

    fn exit_fullscreen(&mut self) {
        self.commands.push(SurfaceCommand::ExitFullscreen);
    }
}
