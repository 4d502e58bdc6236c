//! HLS control-plane client
//!
//! An [`AdaptiveBackend`] for surfaces that demux HLS themselves (a GStreamer
//! `playbin` with `hlsdemux`, a native player). The client fetches and parses
//! the multivariant playlist, reports the ladder and tracks the pinned level.
//! Recovery refetches a manifest that never parsed; once it has, the surface
//! is handed the manifest again and returned to where it was. Manifest
//! fetches run as tokio tasks and are aborted on `destroy`.

use crate::events::PipelineEvents;
use crate::manifest::ManifestFetcher;
use crate::pipeline::{AdaptiveBackend, AdaptiveRuntime};
use crate::surface::{MediaSurface, ResumePoint};
use crate::types::{ErrorCategory, ErrorEvent};
use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

/// Runtime producing [`HlsClient`]s
#[derive(Debug, Clone)]
pub struct HlsRuntime {
    fetcher: ManifestFetcher,
}

impl HlsRuntime {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            fetcher: ManifestFetcher::new(timeout)?,
        })
    }

    pub fn with_fetcher(fetcher: ManifestFetcher) -> Self {
        Self { fetcher }
    }
}

impl AdaptiveRuntime for HlsRuntime {
    fn is_supported(&self) -> bool {
        true
    }

    fn create(&self, events: PipelineEvents) -> Box<dyn AdaptiveBackend> {
        Box::new(HlsClient::new(self.fetcher.clone(), events))
    }
}

/// Manifest-level HLS client
pub struct HlsClient {
    fetcher: ManifestFetcher,
    events: PipelineEvents,
    source: Option<Url>,
    load_task: Option<JoinHandle<()>>,
    /// Set once the ladder has been reported
    parsed: Arc<AtomicBool>,
    level: Option<u32>,
}

impl HlsClient {
    pub fn new(fetcher: ManifestFetcher, events: PipelineEvents) -> Self {
        Self {
            fetcher,
            events,
            source: None,
            load_task: None,
            parsed: Arc::new(AtomicBool::new(false)),
            level: None,
        }
    }

    /// Pinned level, `None` while on auto
    pub fn current_level(&self) -> Option<u32> {
        self.level
    }

    /// Whether a manifest fetch is still running
    pub fn is_loading(&self) -> bool {
        self.load_task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn spawn_load(&mut self) {
        let Some(url) = self.source.clone() else {
            return;
        };
        self.abort_load();

        let fetcher = self.fetcher.clone();
        let events = self.events.clone();
        let parsed = self.parsed.clone();

        self.load_task = Some(tokio::spawn(async move {
            match fetcher.fetch(&url).await {
                Ok(manifest) => {
                    parsed.store(true, Ordering::SeqCst);
                    events.manifest_parsed(manifest.levels, manifest.duration);
                }
                Err(e) => {
                    events.error(classify_load_error(&e));
                }
            }
        }));
    }

    /// Hand the manifest back to the surface demuxer
    fn reattach(&self, surface: &mut dyn MediaSurface, resume: ResumePoint) {
        match &self.source {
            Some(url) => {
                debug!(url = %url, position = resume.position, playing = resume.playing, "Re-attaching manifest");
                resume.rewire(surface, url);
            }
            None => warn!("No manifest to re-attach"),
        }
    }

    fn abort_load(&mut self) {
        if let Some(task) = self.load_task.take() {
            if !task.is_finished() {
                debug!("Aborting in-flight manifest fetch");
            }
            task.abort();
        }
    }
}

/// Transport failures are worth a retry; a manifest that does not parse is not
fn classify_load_error(error: &Error) -> ErrorEvent {
    match error {
        Error::ManifestParse(_) => ErrorEvent::fatal(ErrorCategory::Network, error.to_string()),
        _ => ErrorEvent::network(error.to_string()),
    }
}

impl AdaptiveBackend for HlsClient {
    fn load_source(&mut self, url: &Url) {
        self.source = Some(url.clone());
        self.parsed.store(false, Ordering::SeqCst);
        self.spawn_load();
    }

    fn attach_media(&mut self, surface: &mut dyn MediaSurface) {
        if let Some(url) = &self.source {
            surface.set_source(url);
        }
    }

    fn set_level(&mut self, level: Option<u32>) {
        self.level = level;
        if let Some(level) = level {
            self.events.level_switched(level);
        }
    }

    fn start_load(&mut self, surface: &mut dyn MediaSurface, resume: ResumePoint) {
        if self.parsed.load(Ordering::SeqCst) {
            self.reattach(surface, resume);
        } else {
            self.spawn_load();
        }
    }

    fn recover_media_error(&mut self, surface: &mut dyn MediaSurface, resume: ResumePoint) {
        self.reattach(surface, resume);
    }

    fn destroy(&mut self) {
        self.abort_load();
        if let Some(url) = self.source.take() {
            info!(url = %url, "HLS client destroyed");
        }
    }
}

impl Drop for HlsClient {
    fn drop(&mut self) {
        self.abort_load();
    }
}
