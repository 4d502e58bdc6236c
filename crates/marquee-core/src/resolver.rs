//! Stream Source Resolver
//!
//! Decides how a stream reference reaches the surface and owns whatever was
//! wired for it. [`resolve`] is a pure capability check; [`SourceBinding`] is
//! the single ownership slot for the wired source, released before anything
//! new is installed.

use crate::events::PipelineEvents;
use crate::manifest::{detect_manifest_type, ManifestType};
use crate::pipeline::{AdaptivePipeline, AdaptiveRuntime};
use crate::recovery::RecoveryAction;
use crate::surface::{MediaSurface, ResumePoint};
use crate::types::PlaybackMode;
use tracing::{debug, info, warn};
use url::Url;

/// How a stream reference will be played
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Adaptive manifest driven by the runtime's streaming client
    Adaptive,
    /// Adaptive manifest the surface decodes natively
    NativeAdaptive,
    /// Plain progressive file
    Progressive,
    /// No playback path on this host
    Unsupported,
}

impl Resolution {
    pub fn mode(&self) -> PlaybackMode {
        match self {
            Resolution::Adaptive => PlaybackMode::Adaptive,
            Resolution::NativeAdaptive | Resolution::Progressive => PlaybackMode::Direct,
            Resolution::Unsupported => PlaybackMode::Unsupported,
        }
    }
}

/// Pick a playback path for `url`
///
/// Adaptive manifests prefer the runtime's client, then the surface's native
/// decoder for `adaptive_mime_type`. Anything else is a progressive file.
pub fn resolve(
    url: &Url,
    runtime: &dyn AdaptiveRuntime,
    surface: &dyn MediaSurface,
    adaptive_mime_type: &str,
) -> Resolution {
    if detect_manifest_type(url, None) == ManifestType::Progressive {
        return Resolution::Progressive;
    }
    if runtime.is_supported() {
        Resolution::Adaptive
    } else if surface.can_play_type(adaptive_mime_type) {
        Resolution::NativeAdaptive
    } else {
        Resolution::Unsupported
    }
}

/// What is currently wired to the surface
#[derive(Default)]
pub enum SourceBinding {
    /// Nothing wired
    #[default]
    Vacant,
    /// Reference assigned straight to the surface
    Direct { url: Url },
    /// Pipeline-managed load
    Adaptive(AdaptivePipeline),
    /// Resolution failed, nothing wired
    Unsupported,
}

impl SourceBinding {
    /// Wire `url` according to `resolution`, releasing the previous binding first
    pub fn bind(
        &mut self,
        resolution: Resolution,
        url: &Url,
        runtime: &dyn AdaptiveRuntime,
        events: PipelineEvents,
        surface: &mut dyn MediaSurface,
    ) -> PlaybackMode {
        if !self.is_vacant() {
            warn!("Source slot occupied at bind, releasing previous source");
            self.release(surface);
        }

        *self = match resolution {
            Resolution::Adaptive => {
                let backend = runtime.create(events);
                SourceBinding::Adaptive(AdaptivePipeline::load(backend, url, surface))
            }
            Resolution::NativeAdaptive | Resolution::Progressive => {
                info!(url = %url, native_adaptive = resolution == Resolution::NativeAdaptive, "Assigning source directly");
                surface.set_source(url);
                SourceBinding::Direct { url: url.clone() }
            }
            Resolution::Unsupported => {
                warn!(url = %url, "No playback path for stream");
                SourceBinding::Unsupported
            }
        };

        resolution.mode()
    }

    /// Release whatever is bound; the pipeline is destroyed before this returns
    pub fn release(&mut self, surface: &mut dyn MediaSurface) {
        match std::mem::take(self) {
            SourceBinding::Vacant | SourceBinding::Unsupported => {}
            SourceBinding::Direct { url } => {
                debug!(url = %url, "Clearing direct source");
                surface.clear_source();
            }
            SourceBinding::Adaptive(pipeline) => {
                pipeline.release();
                surface.clear_source();
            }
        }
    }

    /// Issue a recovery command against the bound source
    ///
    /// A direct source has no client to reload, so the surface is re-wired
    /// and returned to `resume`.
    pub fn recover(&mut self, action: RecoveryAction, surface: &mut dyn MediaSurface, resume: ResumePoint) {
        match self {
            SourceBinding::Adaptive(pipeline) => match action {
                RecoveryAction::Reload { .. } => pipeline.reload(surface, resume),
                RecoveryAction::RecoverDecode { .. } => pipeline.recover_decode(surface, resume),
            },
            SourceBinding::Direct { url } => resume.rewire(surface, url),
            SourceBinding::Vacant | SourceBinding::Unsupported => {
                debug!(?action, "No source bound, dropping recovery command");
            }
        }
    }

    pub fn is_vacant(&self) -> bool {
        matches!(self, SourceBinding::Vacant)
    }

    pub fn pipeline(&self) -> Option<&AdaptivePipeline> {
        match self {
            SourceBinding::Adaptive(pipeline) => Some(pipeline),
            _ => None,
        }
    }

    pub fn pipeline_mut(&mut self) -> Option<&mut AdaptivePipeline> {
        match self {
            SourceBinding::Adaptive(pipeline) => Some(pipeline),
            _ => None,
        }
    }
}
