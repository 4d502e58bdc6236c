//! Headless collaborators for simulated playback runs

use async_trait::async_trait;
use marquee_core::{EventSender, MediaSurface, ProgressRecord, ProgressStore};
use tracing::{debug, info};
use url::Url;

/// Media surface driven by a simulated clock
///
/// Reports metadata on the first tick after a source is assigned and
/// advances the playhead only while playing. Notifications go through the
/// engine's surface sender once [`HeadlessSurface::connect`] is called.
pub struct HeadlessSurface {
    events: Option<EventSender>,
    media_duration: f64,
    source: Option<Url>,
    metadata_pending: bool,
    position: f64,
    playing: bool,
    volume: f64,
    muted: bool,
    fullscreen: bool,
}

impl HeadlessSurface {
    pub fn new(media_duration: f64) -> Self {
        Self {
            events: None,
            media_duration,
            source: None,
            metadata_pending: false,
            position: 0.0,
            playing: false,
            volume: 1.0,
            muted: false,
            fullscreen: false,
        }
    }

    pub fn connect(&mut self, events: EventSender) {
        self.events = Some(events);
    }

    pub fn source(&self) -> Option<&Url> {
        self.source.as_ref()
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn volume(&self) -> (f64, bool) {
        (self.volume, self.muted)
    }

    /// Move the clock forward by `seconds`
    pub fn advance(&mut self, seconds: f64) {
        if self.source.is_none() {
            return;
        }

        if self.metadata_pending {
            self.metadata_pending = false;
            self.emit(|events| events.duration_change(self.media_duration));
            return;
        }

        if !self.playing {
            return;
        }

        self.position = (self.position + seconds).min(self.media_duration);
        let position = self.position;
        self.emit(|events| events.time_update(position));

        if position >= self.media_duration {
            self.playing = false;
            self.emit(|events| events.ended());
        }
    }

    fn emit(&self, send: impl FnOnce(&EventSender) -> bool) {
        if let Some(events) = &self.events {
            send(events);
        }
    }
}

impl MediaSurface for HeadlessSurface {
    fn can_play_type(&self, _mime_type: &str) -> bool {
        false
    }

    fn set_source(&mut self, url: &Url) {
        debug!(url = %url, "Surface source assigned");
        self.source = Some(url.clone());
        self.metadata_pending = true;
        self.position = 0.0;
        self.playing = false;
    }

    fn clear_source(&mut self) {
        self.source = None;
        self.metadata_pending = false;
        self.playing = false;
    }

    fn play(&mut self) {
        self.playing = self.source.is_some();
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn set_current_time(&mut self, seconds: f64) {
        self.position = seconds.clamp(0.0, self.media_duration);
        let position = self.position;
        self.emit(|events| events.time_update(position));
    }

    fn set_volume(&mut self, volume: f64) {
        self.volume = volume;
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn request_fullscreen(&mut self) {
        self.fullscreen = true;
        self.emit(|events| events.fullscreen_change(true));
    }

    fn exit_fullscreen(&mut self) {
        self.fullscreen = false;
        self.emit(|events| events.fullscreen_change(false));
    }
}

/// Progress store that only logs checkpoints
#[derive(Debug, Default)]
pub struct LoggingStore;

#[async_trait]
impl ProgressStore for LoggingStore {
    async fn save(&self, owner_id: &str, position_seconds: u64) -> marquee_core::Result<ProgressRecord> {
        info!(owner_id, position_seconds, "Progress checkpoint");
        Ok(ProgressRecord {
            id: owner_id.to_string(),
            last_position_seconds: position_seconds,
            is_completed: false,
            last_played_at: Some(chrono::Utc::now().to_rfc3339()),
        })
    }
}
