//! CLI command implementations

use crate::headless::{HeadlessSurface, LoggingStore};
use crate::output::{self, LadderReport, OutputFormat};
use anyhow::Context;
use marquee_core::{
    EngineConfig, HttpProgressStore, ManifestFetcher, PlaybackEngine, PlaybackRequest, ProgressStore, TransportState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{info, warn};
use url::Url;

/// Options for a headless playback run
#[derive(Debug, Clone)]
pub struct SimulateArgs {
    pub stream_ref: String,
    pub resume: u64,
    pub duration: f64,
    pub owner: Option<String>,
    pub progress_endpoint: Option<String>,
    pub token: Option<String>,
    pub rate: u32,
    pub seek_to: Option<f64>,
    pub pause_at: Option<f64>,
}

/// Fetch a manifest and list its variant ladder
pub async fn inspect(manifest_url: &str, config: &EngineConfig, format: OutputFormat) -> anyhow::Result<()> {
    let url = Url::parse(manifest_url).with_context(|| format!("Invalid manifest URL: {}", manifest_url))?;
    let fetcher = ManifestFetcher::new(config.request_timeout())?;
    let parsed = fetcher.fetch(&url).await?;

    let report = LadderReport::new(manifest_url, &parsed);
    println!("{}", output::render_ladder(&report, format)?);

    Ok(())
}

/// Play a stream to completion (or to `--pause-at`) on a simulated clock
pub async fn simulate(args: SimulateArgs, config: EngineConfig, format: OutputFormat) -> anyhow::Result<()> {
    anyhow::ensure!(args.rate > 0, "--rate must be at least 1");
    anyhow::ensure!(
        args.duration.is_finite() && args.duration > 0.0,
        "--duration must be a positive number of seconds"
    );

    let store: Arc<dyn ProgressStore> = match &args.progress_endpoint {
        Some(endpoint) => {
            let base = Url::parse(endpoint).with_context(|| format!("Invalid progress endpoint: {}", endpoint))?;
            let mut store = HttpProgressStore::new(base, config.request_timeout())?;
            if let Some(token) = &args.token {
                store = store.with_token(token.clone());
            }
            Arc::new(store)
        }
        None => Arc::new(LoggingStore),
    };

    let mut engine = PlaybackEngine::with_hls(HeadlessSurface::new(args.duration), config)?.with_store(store);
    let sender = engine.surface_sender();
    engine.surface_mut().connect(sender);
    let mut transitions = engine.subscribe_transitions();

    let mut request = PlaybackRequest::new(&args.stream_ref)
        .with_resume(args.resume)
        .with_nominal_duration(args.duration);
    if let Some(owner) = &args.owner {
        request = request.with_progress_owner(owner.clone());
    }

    let session_id = engine.attach_with(request)?;
    info!(session_id = %session_id, mode = ?engine.snapshot().mode, "Session attached");
    engine.toggle_playback();

    let step = 1.0 / args.rate as f64;
    // Headroom for recovery retries and slow manifests
    let max_steps = ((args.duration + 60.0) * args.rate as f64).ceil() as u64;
    let mut seek_pending = args.seek_to;

    for _ in 0..max_steps {
        engine.surface_mut().advance(step);
        drain(&mut engine).await;
        print_transitions(&mut transitions, format)?;

        let snapshot = engine.snapshot();
        if snapshot.state == TransportState::Playing {
            if let Some(target) = seek_pending.take() {
                info!(target, "Seeking");
                engine.seek(target);
                continue;
            }
            if let Some(pause_at) = args.pause_at {
                if snapshot.position >= pause_at {
                    engine.toggle_playback();
                    break;
                }
            }
        }

        if matches!(snapshot.state, TransportState::Ended | TransportState::Failed | TransportState::Idle) {
            break;
        }
    }

    // Give in-flight saves a chance to land
    for _ in 0..20 {
        drain(&mut engine).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    print_transitions(&mut transitions, format)?;

    let snapshot = engine.snapshot();
    if let Some(advisory) = snapshot.advisory {
        warn!(?advisory, "Run ended during recovery");
    }
    println!("{}", output::render_snapshot(&snapshot, format)?);

    engine.detach();
    if let Some(error) = snapshot.fatal_error {
        anyhow::bail!("Playback failed: {}", error.message);
    }
    Ok(())
}

/// Handle everything currently queued, letting spawned tasks make progress
async fn drain(engine: &mut PlaybackEngine<HeadlessSurface>) {
    tokio::time::sleep(Duration::from_millis(1)).await;
    engine.pump();
}

fn print_transitions(
    transitions: &mut broadcast::Receiver<marquee_core::TransportTransition>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    loop {
        match transitions.try_recv() {
            Ok(transition) => println!("{}", output::render_transition(&transition, format)?),
            Err(TryRecvError::Lagged(skipped)) => warn!(skipped, "Transition output fell behind"),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return Ok(()),
        }
    }
}
