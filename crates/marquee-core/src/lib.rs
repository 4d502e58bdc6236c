//! Marquee Core - Playback Engine for Marquee
//!
//! This crate provides the core of media playback:
//! - Stream source resolution (adaptive client, native decoder, progressive file)
//! - Adaptive pipeline control and quality selection
//! - Transport state machine (play/pause/seek/volume/mute/fullscreen)
//! - Error recovery with bounded retries
//! - Progress checkpoints against a remote store
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Marquee Core                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │    Source    │  │   Adaptive   │  │   Recovery   │           │
//! │  │   Resolver   │─►│   Pipeline   │◄─│  Supervisor  │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────▲───────┘           │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │                    ┌──────┴──────┐                              │
//! │                    │  Playback   │                              │
//! │                    │   Engine    │                              │
//! │                    └──────┬──────┘                              │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌──────────────┐            │
//! │  │  Transport   │  │    Event    │  │  Checkpoint  │            │
//! │  │   Machine    │  │     Bus     │  │   Service    │            │
//! │  └──────────────┘  └─────────────┘  └──────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use marquee_core::{EngineConfig, PlaybackEngine, PlaybackRequest, RecordingSurface};
//!
//! # async fn run() -> marquee_core::Result<()> {
//! let mut engine = PlaybackEngine::with_hls(RecordingSurface::new(), EngineConfig::default())?;
//! engine.attach_with(
//!     PlaybackRequest::new("https://cdn.example.com/film/master.m3u8").with_resume(42),
//! )?;
//!
//! let surface = engine.surface_sender();
//! surface.duration_change(600.0);
//! engine.pump();
//! engine.toggle_playback();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod events;
pub mod surface;
pub mod manifest;
pub mod pipeline;
pub mod resolver;
pub mod transport;
pub mod recovery;
pub mod checkpoint;
pub mod store;
pub mod engine;
#[cfg(feature = "hls")]
pub mod hls;

pub use error::{Error, Result};
pub use types::*;
pub use config::{EngineConfig, RetryPolicy, HLS_MIME_TYPE};
pub use events::{EngineEvent, Envelope, EventSender, Origin, PipelineEvent, PipelineEvents, SurfaceEvent, TransportTransition};
pub use surface::{MediaSurface, RecordingSurface, ResumePoint, SurfaceCommand};
pub use manifest::{ManifestFetcher, ParsedManifest};
pub use pipeline::{AdaptiveBackend, AdaptivePipeline, AdaptiveRuntime, NoAdaptiveRuntime};
pub use resolver::{Resolution, SourceBinding};
pub use transport::{Transport, TransportOutput};
pub use recovery::{RecoveryAction, RecoveryDecision, RecoverySupervisor};
pub use checkpoint::{CheckpointService, CheckpointTracker, SaveReason, SaveRequest};
pub use store::{HttpProgressStore, ProgressRecord, ProgressStore};
pub use engine::{PlaybackEngine, PlaybackRequest};
#[cfg(feature = "hls")]
pub use hls::{HlsClient, HlsRuntime};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the playback library
pub fn init() {
    tracing::info!(version = VERSION, "Marquee Core initialized");
}
