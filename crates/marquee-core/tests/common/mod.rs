//! Shared test doubles for the engine integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use marquee_core::{
    AdaptiveBackend, AdaptiveRuntime, EngineConfig, Error, MediaSurface, PipelineEvents, PlaybackEngine,
    ProgressRecord, ProgressStore, QualityLevel, RecordingSurface, Result, ResumePoint, RetryPolicy,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use url::Url;

pub const FILM: &str = "https://cdn.example.com/film/master.m3u8";
pub const BOOK: &str = "https://cdn.example.com/books/dune.mp3";

/// Calls received by mock backends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Load(String),
    Attach,
    SetLevel(Option<u32>),
    StartLoad,
    RecoverDecode,
    Destroy,
}

/// Adaptive runtime whose backends log every call
#[derive(Clone, Default)]
pub struct MockRuntime {
    calls: Arc<Mutex<Vec<BackendCall>>>,
    events: Arc<Mutex<Option<PipelineEvents>>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &BackendCall) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    /// Event handle of the most recently created backend
    pub fn events(&self) -> PipelineEvents {
        self.events.lock().unwrap().clone().expect("no backend created")
    }

    /// Report a parsed manifest with the given level heights
    pub fn parse_manifest(&self, heights: &[u32], duration: Option<f64>) {
        let levels = heights
            .iter()
            .enumerate()
            .map(|(id, height)| QualityLevel::new(id as u32, *height))
            .collect();
        self.events().manifest_parsed(levels, duration);
    }
}

struct MockBackend {
    calls: Arc<Mutex<Vec<BackendCall>>>,
}

impl MockBackend {
    fn log(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl AdaptiveBackend for MockBackend {
    fn load_source(&mut self, url: &Url) {
        self.log(BackendCall::Load(url.to_string()));
    }

    fn attach_media(&mut self, surface: &mut dyn MediaSurface) {
        self.log(BackendCall::Attach);
        surface.set_source(&Url::parse("blob:marquee-adaptive").unwrap());
    }

    fn set_level(&mut self, level: Option<u32>) {
        self.log(BackendCall::SetLevel(level));
    }

    fn start_load(&mut self, _surface: &mut dyn MediaSurface, _resume: ResumePoint) {
        self.log(BackendCall::StartLoad);
    }

    fn recover_media_error(&mut self, _surface: &mut dyn MediaSurface, _resume: ResumePoint) {
        self.log(BackendCall::RecoverDecode);
    }

    fn destroy(&mut self) {
        self.log(BackendCall::Destroy);
    }
}

impl AdaptiveRuntime for MockRuntime {
    fn is_supported(&self) -> bool {
        true
    }

    fn create(&self, events: PipelineEvents) -> Box<dyn AdaptiveBackend> {
        *self.events.lock().unwrap() = Some(events);
        Box::new(MockBackend {
            calls: self.calls.clone(),
        })
    }
}

/// Progress store recording every save it receives
#[derive(Default)]
pub struct MockStore {
    saves: Mutex<Vec<(String, u64)>>,
    fail: AtomicBool,
    gate: Option<Arc<Semaphore>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Saves block until `release` is called once per save
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let store = Self {
            gate: Some(gate.clone()),
            ..Default::default()
        };
        (store, gate)
    }

    pub fn failing() -> Self {
        let store = Self::default();
        store.fail.store(true, Ordering::SeqCst);
        store
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Positions of every save issued so far
    pub fn positions(&self) -> Vec<u64> {
        self.saves.lock().unwrap().iter().map(|(_, p)| *p).collect()
    }

    pub fn owners(&self) -> Vec<String> {
        self.saves.lock().unwrap().iter().map(|(o, _)| o.clone()).collect()
    }
}

#[async_trait]
impl ProgressStore for MockStore {
    async fn save(&self, owner_id: &str, position_seconds: u64) -> Result<ProgressRecord> {
        self.saves.lock().unwrap().push((owner_id.to_string(), position_seconds));

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| Error::Internal(e.to_string()))?
                .forget();
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::save_failed("store unavailable"));
        }

        Ok(ProgressRecord {
            id: owner_id.to_string(),
            last_position_seconds: position_seconds,
            ..Default::default()
        })
    }
}

/// Config with immediate retries, so recovery is observable without timers
pub fn immediate_config() -> EngineConfig {
    EngineConfig {
        retry: RetryPolicy::immediate(3),
        ..Default::default()
    }
}

pub fn adaptive_engine(runtime: &MockRuntime, config: EngineConfig) -> PlaybackEngine<RecordingSurface> {
    PlaybackEngine::new(RecordingSurface::new(), Arc::new(runtime.clone()), config).unwrap()
}

/// Let spawned tasks run and handle whatever they posted
pub async fn settle<S: MediaSurface>(engine: &mut PlaybackEngine<S>) {
    for _ in 0..16 {
        tokio::task::yield_now().await;
        engine.pump();
    }
}

/// Report metadata and handle it
pub fn make_ready<S: MediaSurface>(engine: &mut PlaybackEngine<S>, duration: f64) {
    engine.surface_sender().duration_change(duration);
    engine.pump();
}

/// Feed timing ticks from `from` to `to` seconds, `rate` per second
pub async fn play_through<S: MediaSurface>(engine: &mut PlaybackEngine<S>, from: f64, to: f64, rate: u32) {
    let sender = engine.surface_sender();
    let step = 1.0 / rate as f64;
    let mut position = from;
    while position <= to {
        sender.time_update(position);
        engine.pump();
        tokio::task::yield_now().await;
        position += step;
    }
    settle(engine).await;
}
