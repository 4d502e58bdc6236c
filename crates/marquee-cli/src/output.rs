//! Output formatting for CLI

use clap::ValueEnum;
use marquee_core::{ParsedManifest, PlaybackSnapshot, TransportTransition};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Variant ladder of one manifest
#[derive(Debug, Serialize)]
pub struct LadderReport {
    pub manifest: String,
    pub duration: Option<f64>,
    pub levels: Vec<LadderEntry>,
}

#[derive(Debug, Serialize, Tabled)]
pub struct LadderEntry {
    #[tabled(rename = "Level")]
    pub id: u32,
    #[tabled(rename = "Quality")]
    pub label: String,
    #[tabled(rename = "Bandwidth", display_with = "display_kbps")]
    pub bandwidth: u64,
    #[tabled(rename = "Playlist")]
    pub uri: String,
}

fn display_kbps(bandwidth: &u64) -> String {
    format!("{} kbps", bandwidth / 1000)
}

impl LadderReport {
    pub fn new(manifest: &str, parsed: &ParsedManifest) -> Self {
        let levels = parsed
            .levels
            .iter()
            .zip(parsed.variant_uris.iter())
            .map(|(level, uri)| LadderEntry {
                id: level.id,
                label: level.label(),
                bandwidth: level.bandwidth,
                uri: uri.to_string(),
            })
            .collect();

        Self {
            manifest: manifest.to_string(),
            duration: parsed.duration,
            levels,
        }
    }
}

pub fn render_ladder(report: &LadderReport, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Text => {
            let mut out = format!("Manifest: {}\n", report.manifest);
            if let Some(duration) = report.duration {
                out.push_str(&format!("Duration: {:.1}s\n", duration));
            }
            if report.levels.is_empty() {
                out.push_str("No selectable video levels (media playlist or audio-only)\n");
            } else {
                out.push_str(&Table::new(&report.levels).to_string());
                out.push('\n');
            }
            Ok(out)
        }
    }
}

pub fn render_transition(transition: &TransportTransition, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string(&TransitionLine::from(transition))?),
        OutputFormat::Text => Ok(format!(
            "[{}] {} -> {} @ {:.2}s",
            chrono::Local::now().format("%H:%M:%S"),
            transition.from,
            transition.to,
            transition.position
        )),
    }
}

#[derive(Serialize)]
struct TransitionLine {
    session_id: String,
    from: String,
    to: String,
    position: f64,
}

impl From<&TransportTransition> for TransitionLine {
    fn from(transition: &TransportTransition) -> Self {
        Self {
            session_id: transition.session_id.to_string(),
            from: transition.from.to_string(),
            to: transition.to.to_string(),
            position: transition.position,
        }
    }
}

pub fn render_snapshot(snapshot: &PlaybackSnapshot, format: OutputFormat) -> anyhow::Result<String> {
    if format == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(snapshot)?);
    }

    let mut out = String::from("\nFinal state:\n");
    if let Some(stream_ref) = &snapshot.stream_ref {
        out.push_str(&format!("  Stream:   {}\n", stream_ref));
    }
    if let Some(mode) = snapshot.mode {
        out.push_str(&format!("  Mode:     {}\n", mode));
    }
    out.push_str(&format!("  State:    {}\n", snapshot.state));
    match snapshot.duration {
        Some(duration) => out.push_str(&format!("  Position: {:.2}s / {:.2}s\n", snapshot.position, duration)),
        None => out.push_str(&format!("  Position: {:.2}s\n", snapshot.position)),
    }
    out.push_str(&format!(
        "  Volume:   {:.2}{}\n",
        snapshot.volume,
        if snapshot.muted { " (muted)" } else { "" }
    ));
    if !snapshot.available_qualities.is_empty() {
        let labels: Vec<&str> = snapshot.available_qualities.iter().map(|q| q.label.as_str()).collect();
        out.push_str(&format!("  Quality:  {} of [{}]\n", snapshot.selected_quality, labels.join(", ")));
    }
    if let Some(checkpoint) = &snapshot.last_checkpoint {
        out.push_str(&format!(
            "  Saved:    {}s at {}\n",
            checkpoint.position_seconds,
            checkpoint.saved_at.format("%H:%M:%S")
        ));
    }
    if let Some(error) = &snapshot.fatal_error {
        out.push_str(&format!("  Error:    [{}] {}\n", error.category, error.message));
    }
    Ok(out)
}
