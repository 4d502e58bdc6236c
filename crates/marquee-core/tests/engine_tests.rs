//! Integration tests for the playback engine

mod common;

use common::*;
use marquee_core::{
    Advisory, EngineConfig, ErrorCategory, ErrorEvent, NoAdaptiveRuntime, PlaybackEngine, PlaybackMode,
    PlaybackRequest, QualitySelection, RecordingSurface, RetryPolicy, SurfaceCommand, SurfaceEvent, TransportState,
    HLS_MIME_TYPE,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

fn book_engine(store: Arc<MockStore>) -> PlaybackEngine<RecordingSurface> {
    PlaybackEngine::new(RecordingSurface::new(), Arc::new(NoAdaptiveRuntime), EngineConfig::default())
        .unwrap()
        .with_store(store)
}

// =============================================================================
// Resume and transport
// =============================================================================

#[tokio::test]
async fn test_resume_then_play_then_skip_back() {
    let runtime = MockRuntime::new();
    let mut engine = adaptive_engine(&runtime, EngineConfig::default());

    engine.attach(FILM, 42).unwrap();
    runtime.parse_manifest(&[360, 720, 1080], None);
    make_ready(&mut engine, 600.0);

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state, TransportState::Ready);
    assert_eq!(snapshot.position, 42.0);
    assert!(engine.surface().commands().contains(&SurfaceCommand::Seek { position: 42.0 }));

    engine.toggle_playback();
    assert_eq!(engine.snapshot().state, TransportState::Playing);

    play_through(&mut engine, 42.0, 45.0, 4).await;
    let elapsed = engine.snapshot().position - 42.0;

    engine.skip_relative(-50.0);
    assert_eq!(engine.snapshot().position, (42.0 + elapsed - 50.0).max(0.0));
}

#[tokio::test]
async fn test_adaptive_load_order() {
    let runtime = MockRuntime::new();
    let mut engine = adaptive_engine(&runtime, EngineConfig::default());
    engine.attach(FILM, 0).unwrap();

    assert_eq!(runtime.calls(), vec![BackendCall::Load(FILM.to_string()), BackendCall::Attach]);
    assert_eq!(engine.snapshot().mode, Some(PlaybackMode::Adaptive));
}

#[tokio::test]
async fn test_native_adaptive_assigns_directly() {
    let surface = RecordingSurface::new().with_native_type(HLS_MIME_TYPE);
    let mut engine = PlaybackEngine::new(surface, Arc::new(NoAdaptiveRuntime), EngineConfig::default()).unwrap();

    engine.attach(FILM, 0).unwrap();
    assert_eq!(engine.snapshot().mode, Some(PlaybackMode::Direct));
    assert_eq!(engine.surface().current_source(), Some(FILM));
}

#[tokio::test]
async fn test_nominal_duration_clamps_seek_before_metadata() {
    let mut engine = book_engine(Arc::new(MockStore::new()));
    engine
        .attach_with(PlaybackRequest::new(BOOK).with_nominal_duration(3600.0))
        .unwrap();

    engine.seek(5000.0);
    assert_eq!(engine.snapshot().position, 3600.0);

    // Real duration far from the hint: the original request is re-clamped
    make_ready(&mut engine, 4200.0);
    assert_eq!(engine.snapshot().position, 4200.0);
}

#[tokio::test]
async fn test_volume_round_trip() {
    let mut engine = book_engine(Arc::new(MockStore::new()));
    engine.attach(BOOK, 0).unwrap();
    make_ready(&mut engine, 60.0);

    for step in 0..=20 {
        let v = step as f64 / 20.0;
        engine.set_volume(v);
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.volume, v);
        assert_eq!(snapshot.muted, v == 0.0);
    }
}

#[tokio::test]
async fn test_seek_idempotent_through_engine() {
    let mut engine = book_engine(Arc::new(MockStore::new()));
    engine.attach(BOOK, 0).unwrap();
    make_ready(&mut engine, 600.0);

    for target in [0.0, 0.5, 299.9, 600.0] {
        engine.seek(target);
        let once = engine.snapshot().position;
        engine.seek(target);
        assert_eq!(engine.snapshot().position, once);
    }
}

#[tokio::test]
async fn test_fullscreen_reconciled_from_notification() {
    let mut engine = book_engine(Arc::new(MockStore::new()));
    engine.attach(BOOK, 0).unwrap();
    make_ready(&mut engine, 60.0);

    engine.toggle_fullscreen();
    assert_eq!(engine.surface().commands().last(), Some(&SurfaceCommand::RequestFullscreen));
    assert!(!engine.snapshot().fullscreen);

    engine.surface_sender().fullscreen_change(true);
    engine.pump();
    assert!(engine.snapshot().fullscreen);
}

// =============================================================================
// Quality selection
// =============================================================================

#[tokio::test]
async fn test_unknown_quality_keeps_selection() {
    let runtime = MockRuntime::new();
    let mut engine = adaptive_engine(&runtime, EngineConfig::default());
    engine.attach(FILM, 0).unwrap();
    runtime.parse_manifest(&[360, 720, 1080], None);
    make_ready(&mut engine, 600.0);

    let snapshot = engine.snapshot();
    let labels: Vec<_> = snapshot.available_qualities.iter().map(|o| o.label.as_str()).collect();
    assert_eq!(labels, vec!["auto", "360p", "720p", "1080p"]);

    engine.set_quality(QualitySelection::Level(1));
    assert_eq!(engine.snapshot().selected_quality, QualitySelection::Level(1));

    engine.set_quality(QualitySelection::Level(99));
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.selected_quality, QualitySelection::Level(1));
    assert!(snapshot.fatal_error.is_none());
    assert_eq!(snapshot.state, TransportState::Ready);
    assert_eq!(runtime.count(&BackendCall::SetLevel(Some(99))), 0);
}

#[tokio::test]
async fn test_quality_queued_until_ready() {
    let runtime = MockRuntime::new();
    let mut engine = adaptive_engine(&runtime, EngineConfig::default());
    engine.attach(FILM, 0).unwrap();

    engine.set_quality(QualitySelection::Level(2));
    assert_eq!(engine.snapshot().selected_quality, QualitySelection::Auto);

    runtime.parse_manifest(&[360, 720, 1080], None);
    make_ready(&mut engine, 600.0);

    assert_eq!(engine.snapshot().selected_quality, QualitySelection::Level(2));
    assert_eq!(runtime.count(&BackendCall::SetLevel(Some(2))), 1);
}

#[tokio::test]
async fn test_manifest_duration_used_as_hint() {
    let runtime = MockRuntime::new();
    let mut engine = adaptive_engine(&runtime, EngineConfig::default());
    engine.attach(FILM, 0).unwrap();
    runtime.parse_manifest(&[720], Some(120.0));
    engine.pump();

    engine.seek(500.0);
    assert_eq!(engine.snapshot().position, 120.0);

    make_ready(&mut engine, 120.4);
    assert_eq!(engine.snapshot().position, 120.0);
}

// =============================================================================
// Error recovery
// =============================================================================

fn playing_film(runtime: &MockRuntime, config: EngineConfig) -> PlaybackEngine<RecordingSurface> {
    let mut engine = adaptive_engine(runtime, config);
    engine.attach(FILM, 0).unwrap();
    runtime.parse_manifest(&[360, 720, 1080], None);
    make_ready(&mut engine, 600.0);
    engine.toggle_playback();
    engine
}

#[tokio::test]
async fn test_network_faults_retry_then_fail() {
    let runtime = MockRuntime::new();
    let mut engine = playing_film(&runtime, immediate_config());
    let events = runtime.events();

    for attempt in 1..=3 {
        events.error(ErrorEvent::network("fragLoadError"));
        engine.pump();

        let snapshot = engine.snapshot();
        assert_eq!(runtime.count(&BackendCall::StartLoad), attempt as usize);
        assert_eq!(snapshot.state, TransportState::Playing);
        assert_eq!(snapshot.advisory, Some(Advisory::Reconnecting { attempt }));
    }

    events.error(ErrorEvent::network("fragLoadError"));
    engine.pump();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state, TransportState::Failed);
    let fatal = snapshot.fatal_error.unwrap();
    assert_eq!(fatal.category, ErrorCategory::Network);
    assert!(fatal.message.contains("exhausted"));

    assert_eq!(runtime.count(&BackendCall::StartLoad), 3);
    assert_eq!(runtime.count(&BackendCall::Destroy), 1);
    assert!(engine.surface().commands().contains(&SurfaceCommand::Pause));
    assert_eq!(engine.surface().current_source(), None);
}

#[tokio::test]
async fn test_decode_fault_recovers_without_reload() {
    let runtime = MockRuntime::new();
    let mut engine = playing_film(&runtime, immediate_config());

    runtime.events().error(ErrorEvent::decode("bufferAppendError"));
    engine.pump();

    assert_eq!(runtime.count(&BackendCall::RecoverDecode), 1);
    assert_eq!(runtime.count(&BackendCall::StartLoad), 0);
    assert_eq!(engine.snapshot().advisory, Some(Advisory::RecoveringDecode { attempt: 1 }));
}

#[tokio::test]
async fn test_fatal_fault_is_never_retried() {
    let runtime = MockRuntime::new();
    let mut engine = playing_film(&runtime, immediate_config());

    runtime
        .events()
        .error(ErrorEvent::fatal(ErrorCategory::Decode, "codec unsupported"));
    engine.pump();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state, TransportState::Failed);
    assert_eq!(snapshot.fatal_error.unwrap().message, "codec unsupported");
    assert_eq!(runtime.count(&BackendCall::RecoverDecode), 0);

    // Further faults and commands are inert
    engine.toggle_playback();
    engine.surface_sender().send(marquee_core::SurfaceEvent::Error(ErrorEvent::network("late")));
    engine.pump();
    assert_eq!(engine.snapshot().state, TransportState::Failed);
    assert_eq!(runtime.count(&BackendCall::StartLoad), 0);
}

#[tokio::test]
async fn test_progress_clears_advisory() {
    let runtime = MockRuntime::new();
    let mut engine = playing_film(&runtime, immediate_config());
    let sender = engine.surface_sender();
    sender.time_update(30.0);
    engine.pump();

    runtime.events().error(ErrorEvent::network("timeout"));
    engine.pump();
    assert!(engine.snapshot().advisory.is_some());

    sender.time_update(30.5);
    engine.pump();
    assert_eq!(engine.snapshot().advisory, None);
}

fn short_backoff() -> EngineConfig {
    EngineConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 20,
            max_delay_ms: 20,
        },
        ..Default::default()
    }
}

#[tokio::test]
async fn test_delayed_retry_fires_after_backoff() {
    let runtime = MockRuntime::new();
    let mut engine = playing_film(&runtime, short_backoff());

    runtime.events().error(ErrorEvent::network("timeout"));
    engine.pump();
    assert_eq!(runtime.count(&BackendCall::StartLoad), 0);

    tokio::time::sleep(Duration::from_millis(80)).await;
    engine.pump();
    assert_eq!(runtime.count(&BackendCall::StartLoad), 1);
}

#[tokio::test]
async fn test_back_to_back_faults_each_reload() {
    let runtime = MockRuntime::new();
    let mut engine = playing_film(&runtime, short_backoff());
    let events = runtime.events();

    events.error(ErrorEvent::network("fragLoadError"));
    engine.pump();
    events.error(ErrorEvent::network("fragLoadError"));
    engine.pump();
    assert_eq!(runtime.count(&BackendCall::StartLoad), 0);
    assert_eq!(engine.snapshot().advisory, Some(Advisory::Reconnecting { attempt: 2 }));

    tokio::time::sleep(Duration::from_millis(100)).await;
    engine.pump();
    assert_eq!(runtime.count(&BackendCall::StartLoad), 2);
    assert_eq!(engine.snapshot().state, TransportState::Playing);
}

#[tokio::test]
async fn test_detach_cancels_pending_retry() {
    let runtime = MockRuntime::new();
    let mut engine = playing_film(&runtime, short_backoff());

    runtime.events().error(ErrorEvent::network("timeout"));
    engine.pump();
    engine.detach();

    tokio::time::sleep(Duration::from_millis(80)).await;
    engine.pump();
    assert_eq!(runtime.count(&BackendCall::StartLoad), 0);
    assert_eq!(runtime.count(&BackendCall::Destroy), 1);
}

// =============================================================================
// Session lifecycle
// =============================================================================

#[tokio::test]
async fn test_reattach_is_independent_of_previous_session() {
    let runtime = MockRuntime::new();
    let mut engine = playing_film(&runtime, immediate_config());
    engine.set_quality(QualitySelection::Level(2));
    let first_events = runtime.events();
    first_events.error(ErrorEvent::fatal(ErrorCategory::Network, "manifestLoadError"));
    engine.pump();
    let first_id = engine.session_id().unwrap();
    assert_eq!(engine.snapshot().state, TransportState::Failed);

    let second_id = assert_ok!(engine.attach(FILM, 0));
    assert_ne!(second_id, first_id);

    // Late report from the torn-down pipeline
    first_events.error(ErrorEvent::fatal(ErrorCategory::Network, "stale"));
    engine.pump();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state, TransportState::Loading);
    assert!(snapshot.available_qualities.is_empty());
    assert_eq!(snapshot.selected_quality, QualitySelection::Auto);
    assert!(snapshot.fatal_error.is_none());
    assert!(snapshot.advisory.is_none());
    assert!(snapshot.last_checkpoint.is_none());
}

#[tokio::test]
async fn test_attach_releases_previous_pipeline_first() {
    let runtime = MockRuntime::new();
    let mut engine = adaptive_engine(&runtime, EngineConfig::default());
    engine.attach(FILM, 0).unwrap();
    engine.attach("https://cdn.example.com/other/master.m3u8", 0).unwrap();

    let calls = runtime.calls();
    let destroy = calls.iter().position(|c| *c == BackendCall::Destroy).unwrap();
    let second_load = calls
        .iter()
        .rposition(|c| matches!(c, BackendCall::Load(_)))
        .unwrap();
    assert!(destroy < second_load);
}

// =============================================================================
// Checkpoints
// =============================================================================

#[tokio::test]
async fn test_detach_mid_save_schedules_nothing_more() {
    let (store, gate) = MockStore::gated();
    let store = Arc::new(store);
    let mut engine = book_engine(store.clone());

    engine
        .attach_with(PlaybackRequest::new(BOOK).with_progress_owner("book-1"))
        .unwrap();
    make_ready(&mut engine, 600.0);
    engine.toggle_playback();
    play_through(&mut engine, 0.0, 6.0, 4).await;
    assert_eq!(store.positions(), vec![5]);

    // Pause save is deferred behind the blocked one
    engine.toggle_playback();
    settle(&mut engine).await;
    assert_eq!(store.positions(), vec![5]);

    engine.detach();
    gate.add_permits(8);
    settle(&mut engine).await;
    assert_eq!(store.positions(), vec![5]);

    engine.attach(BOOK, 0).unwrap();
    settle(&mut engine).await;
    assert!(engine.snapshot().last_checkpoint.is_none());
    assert_eq!(store.positions(), vec![5]);
}

#[tokio::test]
async fn test_save_frequency_bounded_by_threshold() {
    let store = Arc::new(MockStore::new());
    let mut engine = book_engine(store.clone());
    engine
        .attach_with(PlaybackRequest::new(BOOK).with_progress_owner("book-1"))
        .unwrap();
    make_ready(&mut engine, 600.0);
    engine.toggle_playback();

    play_through(&mut engine, 0.0, 93.0, 25).await;

    let positions = store.positions();
    assert!(positions.len() <= 20, "{} saves", positions.len());
    assert!(positions.windows(2).all(|w| w[1] >= w[0] + 5));
    assert!(store.owners().iter().all(|o| o == "book-1"));
}

#[tokio::test]
async fn test_ended_saves_truncated_duration_once() {
    let store = Arc::new(MockStore::new());
    let mut engine = book_engine(store.clone());
    engine
        .attach_with(PlaybackRequest::new(BOOK).with_resume(590).with_progress_owner("book-1"))
        .unwrap();
    make_ready(&mut engine, 600.7);
    engine.toggle_playback();
    play_through(&mut engine, 590.0, 598.0, 10).await;
    assert_eq!(store.positions(), vec![595]);

    engine.surface_sender().ended();
    engine.pump();
    settle(&mut engine).await;

    let positions = store.positions();
    assert_eq!(positions, vec![595, 600]);
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.state, TransportState::Ended);
    assert_eq!(snapshot.last_checkpoint.unwrap().position_seconds, 600);
}

#[tokio::test]
async fn test_pause_reported_before_end_saves_once() {
    let store = Arc::new(MockStore::new());
    let mut engine = book_engine(store.clone());
    engine
        .attach_with(PlaybackRequest::new(BOOK).with_resume(598).with_progress_owner("book-1"))
        .unwrap();
    make_ready(&mut engine, 600.0);
    engine.toggle_playback();

    // Media elements report `pause` right before `ended`
    let sender = engine.surface_sender();
    sender.time_update(600.0);
    sender.send(SurfaceEvent::Paused);
    sender.ended();
    engine.pump();
    settle(&mut engine).await;

    assert_eq!(engine.snapshot().state, TransportState::Ended);
    assert_eq!(store.positions(), vec![600]);
}

#[tokio::test]
async fn test_pause_saves_exact_position() {
    let store = Arc::new(MockStore::new());
    let mut engine = book_engine(store.clone());
    engine
        .attach_with(PlaybackRequest::new(BOOK).with_progress_owner("book-1"))
        .unwrap();
    make_ready(&mut engine, 600.0);
    engine.toggle_playback();
    play_through(&mut engine, 0.0, 7.3, 10).await;

    engine.toggle_playback();
    settle(&mut engine).await;
    assert_eq!(store.positions(), vec![5, 7]);
}

#[tokio::test]
async fn test_failed_save_superseded_not_retried() {
    let store = Arc::new(MockStore::failing());
    let mut engine = book_engine(store.clone());
    engine
        .attach_with(PlaybackRequest::new(BOOK).with_progress_owner("book-1"))
        .unwrap();
    make_ready(&mut engine, 600.0);
    engine.toggle_playback();

    play_through(&mut engine, 0.0, 7.0, 10).await;
    assert_eq!(store.positions(), vec![5]);
    assert!(engine.snapshot().last_checkpoint.is_none());
    assert_eq!(engine.snapshot().state, TransportState::Playing);

    store.set_failing(false);
    play_through(&mut engine, 7.1, 10.5, 10).await;
    assert_eq!(store.positions(), vec![5, 10]);
    assert_eq!(engine.snapshot().last_checkpoint.unwrap().position_seconds, 10);
}

#[tokio::test]
async fn test_no_owner_no_saves() {
    let store = Arc::new(MockStore::new());
    let mut engine = book_engine(store.clone());
    engine.attach(BOOK, 0).unwrap();
    make_ready(&mut engine, 600.0);
    engine.toggle_playback();
    play_through(&mut engine, 0.0, 20.0, 4).await;
    engine.toggle_playback();
    settle(&mut engine).await;

    assert!(store.positions().is_empty());
}
