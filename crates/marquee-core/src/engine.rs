//! Playback Engine - per-surface orchestrator
//!
//! Coordinates:
//! - Source resolution and the single source ownership slot
//! - Transport state machine and surface commands
//! - Checkpoint scheduling
//! - Error recovery and retry timers
//! - Snapshot and transition publication
//!
//! The engine is driven through `&mut self`. Host notifications enter via an
//! [`EventSender`] and are handled in emission order by [`PlaybackEngine::pump`]
//! or [`PlaybackEngine::next`]. Spawned work (saves, manifest fetches, retry
//! timers) reports back through the same bus, so the engine must be driven
//! from inside a tokio runtime.

use crate::checkpoint::{whole_seconds, CheckpointService, CheckpointTarget, SaveReason};
use crate::config::EngineConfig;
use crate::events::{
    EngineEvent, Envelope, EventBus, EventSender, Origin, PipelineEvent, PipelineEvents, SurfaceEvent,
    TransportTransition,
};
use crate::recovery::{RecoveryAction, RecoveryDecision, RecoverySupervisor};
use crate::resolver::{resolve, SourceBinding};
use crate::store::ProgressStore;
use crate::surface::{MediaSurface, ResumePoint};
use crate::transport::{Transport, TransportOutput};
use crate::types::*;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Capacity of the transition broadcast channel
const TRANSITION_CHANNEL_CAPACITY: usize = 64;

/// Everything needed to start a session
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackRequest {
    /// Stream URL, progressive file or adaptive manifest
    pub stream_ref: String,
    /// Position to resume from, in whole seconds
    pub resume_position: u64,
    /// Library item the progress is saved against; no owner, no saves
    pub progress_owner: Option<String>,
    /// Duration known up front, used to clamp seeks before metadata
    pub nominal_duration: Option<f64>,
}

impl PlaybackRequest {
    pub fn new(stream_ref: impl Into<String>) -> Self {
        Self {
            stream_ref: stream_ref.into(),
            resume_position: 0,
            progress_owner: None,
            nominal_duration: None,
        }
    }

    pub fn with_resume(mut self, seconds: u64) -> Self {
        self.resume_position = seconds;
        self
    }

    pub fn with_progress_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.progress_owner = Some(owner_id.into());
        self
    }

    pub fn with_nominal_duration(mut self, seconds: f64) -> Self {
        self.nominal_duration = Some(seconds);
        self
    }
}

/// State of the one attached session
struct ActiveSession {
    id: SessionId,
    stream_ref: String,
    mode: PlaybackMode,
    transport: Transport,
    checkpoint: CheckpointService,
    recovery: RecoverySupervisor,
    /// Quality requested before the ladder was usable
    pending_quality: Option<QualitySelection>,
    fatal_error: Option<FatalError>,
    /// Backoff timers, one per scheduled recovery command
    retry_timers: Vec<JoinHandle<()>>,
    events: EventSender,
}

impl ActiveSession {
    fn cancel_retries(&mut self) {
        for timer in self.retry_timers.drain(..) {
            timer.abort();
        }
    }
}

/// Playback engine bound to one surface
pub struct PlaybackEngine<S: MediaSurface> {
    surface: S,
    runtime: Arc<dyn crate::pipeline::AdaptiveRuntime>,
    store: Option<Arc<dyn ProgressStore>>,
    config: EngineConfig,
    bus: EventBus,
    source: SourceBinding,
    session: Option<ActiveSession>,
    snapshot_tx: watch::Sender<PlaybackSnapshot>,
    transitions_tx: broadcast::Sender<TransportTransition>,
}

impl<S: MediaSurface> PlaybackEngine<S> {
    /// Create an engine for `surface`
    pub fn new(
        surface: S,
        runtime: Arc<dyn crate::pipeline::AdaptiveRuntime>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;

        let (snapshot_tx, _) = watch::channel(PlaybackSnapshot::detached(config.initial_volume));
        let (transitions_tx, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);

        Ok(Self {
            surface,
            runtime,
            store: None,
            config,
            bus: EventBus::new(),
            source: SourceBinding::Vacant,
            session: None,
            snapshot_tx,
            transitions_tx,
        })
    }

    /// Create an engine using the bundled HLS client
    #[cfg(feature = "hls")]
    pub fn with_hls(surface: S, config: EngineConfig) -> Result<Self> {
        let runtime = crate::hls::HlsRuntime::new(config.request_timeout())?;
        Self::new(surface, Arc::new(runtime), config)
    }

    /// Persist progress through `store`
    pub fn with_store(mut self, store: Arc<dyn ProgressStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Sender the host uses to report surface notifications
    pub fn surface_sender(&self) -> EventSender {
        self.bus.surface_sender()
    }

    /// Id of the attached session
    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Current snapshot
    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Watch the snapshot, updated after every handled message and command
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Receive every transport transition
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<TransportTransition> {
        self.transitions_tx.subscribe()
    }

    /// Attach `stream_ref`, resuming at `resume_position` seconds
    pub fn attach(&mut self, stream_ref: &str, resume_position: u64) -> Result<SessionId> {
        self.attach_with(PlaybackRequest::new(stream_ref).with_resume(resume_position))
    }

    /// Attach a new session, tearing down the current one first
    #[instrument(skip(self), fields(stream_ref = %request.stream_ref))]
    pub fn attach_with(&mut self, request: PlaybackRequest) -> Result<SessionId> {
        let url = Url::parse(&request.stream_ref)
            .map_err(|e| Error::InvalidStreamRef(format!("{}: {}", request.stream_ref, e)))?;

        self.detach();

        let id = SessionId::new();
        let events = self.bus.session_sender(id);
        let resolution = resolve(&url, self.runtime.as_ref(), &self.surface, &self.config.adaptive_mime_type);

        let target = match (request.progress_owner, &self.store) {
            (Some(owner_id), Some(store)) => Some(CheckpointTarget {
                store: store.clone(),
                owner_id,
            }),
            (Some(owner_id), None) => {
                debug!(owner_id = %owner_id, "No progress store configured, checkpoints disabled");
                None
            }
            _ => None,
        };

        let mut transport = Transport::new(self.config.initial_volume, self.config.seek_reconcile_tolerance_secs);
        transport.begin(request.resume_position as f64, request.nominal_duration);

        let mode = self.source.bind(
            resolution,
            &url,
            self.runtime.as_ref(),
            PipelineEvents::new(events.clone()),
            &mut self.surface,
        );

        info!(session_id = %id, mode = %mode, resume_position = request.resume_position, "Session attached");

        self.session = Some(ActiveSession {
            id,
            stream_ref: request.stream_ref.clone(),
            mode,
            transport,
            checkpoint: CheckpointService::new(
                id,
                self.config.checkpoint_threshold_secs,
                request.resume_position,
                target,
                events.clone(),
            ),
            recovery: RecoverySupervisor::new(self.config.retry.clone(), self.config.recovery_reset_secs),
            pending_quality: None,
            fatal_error: None,
            retry_timers: Vec::new(),
            events,
        });

        self.flush();

        if mode == PlaybackMode::Unsupported {
            let unsupported = Error::UnsupportedSource {
                stream_ref: request.stream_ref,
            };
            self.fail_session(FatalError {
                category: ErrorCategory::Other,
                message: unsupported.to_string(),
            });
        }

        self.publish();
        Ok(id)
    }

    /// Tear the attached session down synchronously
    ///
    /// The pipeline is destroyed, retry timers aborted, checkpoint scheduling
    /// stopped and queued messages discarded. An in-flight save completes on
    /// its own and its result is ignored.
    #[instrument(skip(self))]
    pub fn detach(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        session.cancel_retries();
        session.checkpoint.close();
        self.source.release(&mut self.surface);

        session.transport.reset();
        for output in session.transport.take_outputs() {
            if let TransportOutput::Transition { from, to, position } = output {
                announce(
                    &self.transitions_tx,
                    TransportTransition {
                        session_id: session.id,
                        from,
                        to,
                        position,
                    },
                );
            }
        }

        let dropped = self.bus.discard_pending();
        info!(session_id = %session.id, dropped, "Session detached");
        self.publish();
    }

    /// `playing ↔ paused`
    #[instrument(skip(self))]
    pub fn toggle_playback(&mut self) {
        self.command(|transport, _| transport.toggle_playback());
    }

    /// Seek to `seconds`, clamped to the content
    #[instrument(skip(self))]
    pub fn seek(&mut self, seconds: f64) {
        self.command(|transport, _| transport.seek(seconds));
    }

    /// Seek relative to the current position
    #[instrument(skip(self))]
    pub fn skip_relative(&mut self, delta: f64) {
        self.command(|transport, _| transport.skip_relative(delta));
    }

    pub fn skip_forward(&mut self) {
        self.skip_relative(self.config.skip_interval_secs);
    }

    pub fn skip_backward(&mut self) {
        self.skip_relative(-self.config.skip_interval_secs);
    }

    #[instrument(skip(self))]
    pub fn set_volume(&mut self, volume: f64) {
        self.command(|transport, _| transport.set_volume(volume));
    }

    #[instrument(skip(self))]
    pub fn toggle_mute(&mut self) {
        self.command(|transport, _| transport.toggle_mute());
    }

    #[instrument(skip(self))]
    pub fn toggle_fullscreen(&mut self) {
        self.command(|transport, _| transport.toggle_fullscreen());
    }

    /// Pin a quality level or return to `auto`
    ///
    /// Requests made before the ladder is known are applied once it is.
    /// Unknown level ids leave the selection unchanged.
    #[instrument(skip(self))]
    pub fn set_quality(&mut self, selection: QualitySelection) {
        let Some(session) = self.session.as_mut() else {
            debug!("No session attached");
            return;
        };
        if session.transport.state() == TransportState::Failed {
            return;
        }

        match self.source.pipeline_mut() {
            None => debug!(selection = %selection, "Quality selection needs an adaptive pipeline"),
            Some(pipeline) if pipeline.is_parsed() && session.transport.state().is_active() => {
                pipeline.set_quality(selection);
            }
            Some(_) => {
                debug!(selection = %selection, "Queueing quality selection until ready");
                session.pending_quality = Some(selection);
            }
        }
        self.publish();
    }

    /// Handle every message already queued; returns how many were handled
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Some(envelope) = self.bus.try_next() {
            self.dispatch(envelope);
            handled += 1;
        }
        handled
    }

    /// Wait for one message and handle it
    pub async fn next(&mut self) -> bool {
        match self.bus.next().await {
            Some(envelope) => {
                self.dispatch(envelope);
                true
            }
            None => false,
        }
    }

    /// Handle one message
    pub fn dispatch(&mut self, envelope: Envelope) {
        let Some(session) = self.session.as_ref() else {
            debug!(event = ?envelope.event, "No session attached, dropping message");
            return;
        };
        if let Origin::Session(id) = envelope.origin {
            if id != session.id {
                debug!(stale_session = %id, "Dropping message from detached session");
                return;
            }
        }

        match envelope.event {
            EngineEvent::Surface(event) => self.on_surface_event(event),
            EngineEvent::Pipeline(event) => self.on_pipeline_event(event),
            EngineEvent::CheckpointCompleted {
                seq,
                position_seconds,
                outcome,
            } => {
                if let Some(session) = self.session.as_mut() {
                    session.checkpoint.on_complete(seq, position_seconds, outcome);
                }
            }
            EngineEvent::RetryDue { action } => {
                if let Some(session) = self.session.as_mut() {
                    session.retry_timers.retain(|timer| !timer.is_finished());
                }
                self.issue_recovery(action);
            }
        }

        self.flush();
        self.apply_pending_quality();
        self.publish();
    }

    fn on_surface_event(&mut self, event: SurfaceEvent) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let transport = &mut session.transport;

        match event {
            SurfaceEvent::TimeUpdate { position } => {
                if let Some(position) = transport.on_time_update(position) {
                    session.recovery.note_progress(position);
                    if transport.state() == TransportState::Playing {
                        session.checkpoint.on_tick(position);
                    }
                }
            }
            SurfaceEvent::DurationChange { duration } => transport.on_metadata(duration),
            SurfaceEvent::Playing => transport.on_surface_playing(),
            SurfaceEvent::Paused => transport.on_surface_paused(),
            SurfaceEvent::Ended => transport.on_surface_ended(),
            SurfaceEvent::FullscreenChange { active } => transport.on_fullscreen_change(active),
            SurfaceEvent::Error(error) => self.handle_fault(error),
        }
    }

    fn on_pipeline_event(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::ManifestParsed { levels, duration } => {
                if let Some(pipeline) = self.source.pipeline_mut() {
                    pipeline.on_manifest_parsed(levels);
                }
                if let (Some(duration), Some(session)) = (duration, self.session.as_mut()) {
                    session.transport.set_duration_hint(duration);
                }
            }
            PipelineEvent::LevelSwitched { level } => debug!(level, "Pipeline switched level"),
            PipelineEvent::Error(error) => self.handle_fault(error),
        }
    }

    fn handle_fault(&mut self, fault: ErrorEvent) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.transport.state() == TransportState::Failed {
            debug!(detail = %fault.detail, "Ignoring fault on failed session");
            return;
        }

        let position = session.transport.position();
        match session.recovery.classify(&fault, position) {
            RecoveryDecision::Retry { action, delay } => {
                warn!(
                    session_id = %session.id,
                    category = %fault.category,
                    attempt = action.attempt(),
                    delay_ms = delay.as_millis() as u64,
                    detail = %fault.detail,
                    "Recoverable playback fault"
                );
                if delay.is_zero() {
                    self.issue_recovery(action);
                } else {
                    let timer = schedule_retry(session.events.clone(), action, delay);
                    session.retry_timers.push(timer);
                }
            }
            RecoveryDecision::Abort(fatal) => self.fail_session(fatal),
            RecoveryDecision::Ignore => {}
        }
    }

    fn issue_recovery(&mut self, action: RecoveryAction) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if session.transport.state() == TransportState::Failed {
            return;
        }

        debug!(session_id = %session.id, ?action, "Issuing recovery command");
        let resume = ResumePoint {
            position: session.transport.position(),
            playing: session.transport.state() == TransportState::Playing,
        };
        self.source.recover(action, &mut self.surface, resume);
    }

    /// Stop the surface, release the source and mark the session failed
    fn fail_session(&mut self, fatal: FatalError) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        error!(
            session_id = %session.id,
            category = %fatal.category,
            message = %fatal.message,
            "Playback failed"
        );
        session.cancel_retries();
        session.transport.fail();
        session.fatal_error = Some(fatal);

        self.flush();
        self.source.release(&mut self.surface);
    }

    fn apply_pending_quality(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.pending_quality.is_none() || !session.transport.state().is_active() {
            return;
        }
        let Some(pipeline) = self.source.pipeline_mut() else {
            return;
        };
        if !pipeline.is_parsed() {
            return;
        }
        if let Some(selection) = session.pending_quality.take() {
            pipeline.set_quality(selection);
        }
    }

    /// Run a transport operation, then apply its effects
    fn command(&mut self, op: impl FnOnce(&mut Transport, &EngineConfig)) {
        let Some(session) = self.session.as_mut() else {
            debug!("No session attached");
            return;
        };
        op(&mut session.transport, &self.config);
        self.flush();
        self.apply_pending_quality();
        self.publish();
    }

    /// Apply queued transport outputs to the surface and checkpoint service
    fn flush(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        for output in session.transport.take_outputs() {
            match output {
                TransportOutput::Command(command) => command.apply(&mut self.surface),
                TransportOutput::Transition { from, to, position } => {
                    match to {
                        TransportState::Paused => session.checkpoint.on_terminal(position, SaveReason::Paused),
                        TransportState::Ended => session.checkpoint.on_terminal(position, SaveReason::Ended),
                        _ => {}
                    }
                    announce(
                        &self.transitions_tx,
                        TransportTransition {
                            session_id: session.id,
                            from,
                            to,
                            position,
                        },
                    );
                }
            }
        }
    }

    fn build_snapshot(&self) -> PlaybackSnapshot {
        let Some(session) = self.session.as_ref() else {
            return PlaybackSnapshot::detached(self.config.initial_volume);
        };
        let transport = &session.transport;
        let pipeline = self.source.pipeline();

        PlaybackSnapshot {
            session_id: Some(session.id),
            stream_ref: Some(session.stream_ref.clone()),
            mode: Some(session.mode),
            state: transport.state(),
            position: transport.position(),
            duration: transport.duration(),
            volume: transport.volume(),
            muted: transport.muted(),
            selected_quality: pipeline.map(|p| p.selection()).unwrap_or_default(),
            available_qualities: pipeline
                .and_then(|p| p.ladder())
                .map(|ladder| ladder.options())
                .unwrap_or_default(),
            fullscreen: transport.fullscreen(),
            advisory: session.recovery.advisory(),
            fatal_error: session.fatal_error.clone(),
            last_checkpoint: session.checkpoint.last_confirmed().cloned(),
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.build_snapshot());
    }
}

impl<S: MediaSurface> Drop for PlaybackEngine<S> {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Log a transport transition and hand it to subscribers
fn announce(transitions: &broadcast::Sender<TransportTransition>, transition: TransportTransition) {
    info!(
        session_id = %transition.session_id,
        from = %transition.from,
        to = %transition.to,
        position_seconds = whole_seconds(transition.position),
        "Transport transition"
    );
    let _ = transitions.send(transition);
}

/// Post `RetryDue` for `action` after `delay`
fn schedule_retry(events: EventSender, action: RecoveryAction, delay: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        events.send(EngineEvent::RetryDue { action });
    })
}
