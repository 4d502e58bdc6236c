//! Adaptive Pipeline Controller
//!
//! Wraps one adaptive-streaming client for one session:
//! - loads the manifest and attaches the client to the surface
//! - builds the quality ladder once the manifest is parsed
//! - applies quality pins and `auto`
//! - relays recovery commands chosen by the supervisor
//!
//! The controller holds no recovery policy. Faults are posted by the backend
//! straight onto the bus through its [`PipelineEvents`] handle.

use crate::events::PipelineEvents;
use crate::surface::{MediaSurface, ResumePoint};
use crate::types::*;
use tracing::{debug, info, warn};
use url::Url;

/// An adaptive-streaming client library (hls.js, a GStreamer demuxer, …)
pub trait AdaptiveBackend: Send {
    /// Start fetching the manifest
    fn load_source(&mut self, url: &Url);

    /// Bind the client's output to the surface
    fn attach_media(&mut self, surface: &mut dyn MediaSurface);

    /// Pin a level, or `None` for the client's own bitrate heuristic
    fn set_level(&mut self, level: Option<u32>);

    /// Restart loading and bring the surface back to `resume`
    fn start_load(&mut self, surface: &mut dyn MediaSurface, resume: ResumePoint);

    /// Rebuild the decode path without refetching the manifest
    fn recover_media_error(&mut self, surface: &mut dyn MediaSurface, resume: ResumePoint);

    /// Abort loaders and free buffers and decoders; must be synchronous
    fn destroy(&mut self);
}

/// Host capability probe and backend factory
pub trait AdaptiveRuntime: Send + Sync {
    /// Whether an adaptive client is available on this host
    fn is_supported(&self) -> bool;

    /// Create a client that reports through `events`
    fn create(&self, events: PipelineEvents) -> Box<dyn AdaptiveBackend>;
}

/// Runtime for hosts with no adaptive client
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAdaptiveRuntime;

impl AdaptiveRuntime for NoAdaptiveRuntime {
    fn is_supported(&self) -> bool {
        false
    }

    fn create(&self, _events: PipelineEvents) -> Box<dyn AdaptiveBackend> {
        Box::new(InertBackend)
    }
}

struct InertBackend;

impl AdaptiveBackend for InertBackend {
    fn load_source(&mut self, _url: &Url) {}
    fn attach_media(&mut self, _surface: &mut dyn MediaSurface) {}
    fn set_level(&mut self, _level: Option<u32>) {}
    fn start_load(&mut self, _surface: &mut dyn MediaSurface, _resume: ResumePoint) {}
    fn recover_media_error(&mut self, _surface: &mut dyn MediaSurface, _resume: ResumePoint) {}
    fn destroy(&mut self) {}
}

/// Controller owning one adaptive backend
///
/// Must be released with [`AdaptivePipeline::release`] before another source
/// is wired to the surface.
pub struct AdaptivePipeline {
    backend: Option<Box<dyn AdaptiveBackend>>,
    manifest_url: Url,
    ladder: Option<QualityLadder>,
    selection: QualitySelection,
}

impl AdaptivePipeline {
    /// Begin loading `manifest_url` and attach the backend to `surface`
    pub fn load(mut backend: Box<dyn AdaptiveBackend>, manifest_url: &Url, surface: &mut dyn MediaSurface) -> Self {
        info!(url = %manifest_url, "Loading adaptive manifest");
        backend.load_source(manifest_url);
        backend.attach_media(surface);

        Self {
            backend: Some(backend),
            manifest_url: manifest_url.clone(),
            ladder: None,
            selection: QualitySelection::Auto,
        }
    }

    pub fn manifest_url(&self) -> &Url {
        &self.manifest_url
    }

    /// Record the parsed levels; the first parse wins
    pub fn on_manifest_parsed(&mut self, levels: Vec<QualityLevel>) -> &QualityLadder {
        if self.ladder.is_some() {
            debug!("Ignoring repeated manifest parse, ladder already fixed");
        }
        self.ladder.get_or_insert_with(|| {
            let ladder = QualityLadder::new(levels);
            info!(levels = ladder.len(), "Manifest parsed");
            ladder
        })
    }

    pub fn is_parsed(&self) -> bool {
        self.ladder.is_some()
    }

    /// Levels from the parsed manifest, empty until then
    pub fn ladder(&self) -> Option<&QualityLadder> {
        self.ladder.as_ref()
    }

    pub fn selection(&self) -> QualitySelection {
        self.selection
    }

    /// Apply a quality request; unknown level ids leave the selection as is
    pub fn set_quality(&mut self, selection: QualitySelection) -> bool {
        let level = match selection {
            QualitySelection::Auto => None,
            QualitySelection::Level(id) => {
                let known = self.ladder.as_ref().is_some_and(|ladder| ladder.contains(id));
                if !known {
                    warn!(level_id = id, "Rejecting unknown quality level");
                    return false;
                }
                Some(id)
            }
        };

        if let Some(backend) = self.backend.as_mut() {
            backend.set_level(level);
        }
        self.selection = selection;
        debug!(selection = %selection, "Quality selection applied");
        true
    }

    /// Reload and return the surface to `resume`
    pub fn reload(&mut self, surface: &mut dyn MediaSurface, resume: ResumePoint) {
        if let Some(backend) = self.backend.as_mut() {
            backend.start_load(surface, resume);
        }
    }

    /// Recover the decode path
    pub fn recover_decode(&mut self, surface: &mut dyn MediaSurface, resume: ResumePoint) {
        if let Some(backend) = self.backend.as_mut() {
            backend.recover_media_error(surface, resume);
        }
    }

    /// Tear the backend down; completes before returning
    pub fn release(mut self) {
        self.destroy_backend();
    }

    fn destroy_backend(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.destroy();
            info!(url = %self.manifest_url, "Adaptive pipeline released");
        }
    }
}

impl Drop for AdaptivePipeline {
    fn drop(&mut self) {
        if self.backend.is_some() {
            warn!(url = %self.manifest_url, "Adaptive pipeline dropped without release");
            self.destroy_backend();
        }
    }
}
