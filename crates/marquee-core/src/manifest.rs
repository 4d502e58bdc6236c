//! HLS manifest retrieval and parsing
//!
//! Only the parts the engine needs: manifest-type detection for the resolver,
//! and the quality ladder plus an optional VOD duration for the pipeline.

use crate::{error::Error, types::QualityLevel, Result};
use m3u8_rs::{MasterPlaylist, MediaPlaylist, Playlist};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Manifest types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestType {
    /// HLS multivariant or media playlist
    Hls,
    /// Plain progressive file (mp3, mp4, …)
    Progressive,
}

/// Detect manifest type from URL or content
pub fn detect_manifest_type(url: &Url, content: Option<&str>) -> ManifestType {
    // Check URL extension first
    let path = url.path().to_lowercase();
    if path.ends_with(".m3u8") || path.ends_with(".m3u") {
        return ManifestType::Hls;
    }

    // Check content if available
    if let Some(content) = content {
        if content.trim_start().starts_with("#EXTM3U") {
            return ManifestType::Hls;
        }
    }

    ManifestType::Progressive
}

/// What the engine needs from a parsed manifest
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedManifest {
    /// Video levels in manifest order, ids assigned by position
    pub levels: Vec<QualityLevel>,
    /// VOD duration in seconds, when a media playlist was seen
    pub duration: Option<f64>,
    /// Variant playlist URIs, parallel to `levels`
    pub variant_uris: Vec<Url>,
}

/// Parse a playlist body fetched from `base_url`
pub fn parse_manifest(content: &[u8], base_url: &Url) -> Result<ParsedManifest> {
    match m3u8_rs::parse_playlist_res(content) {
        Ok(Playlist::MasterPlaylist(master)) => parse_master(&master, base_url),
        Ok(Playlist::MediaPlaylist(media)) => Ok(ParsedManifest {
            levels: Vec::new(),
            duration: media_duration(&media),
            variant_uris: Vec::new(),
        }),
        Err(e) => Err(Error::ManifestParse(format!("Failed to parse HLS playlist: {:?}", e))),
    }
}

/// Extract levels from a master playlist
fn parse_master(master: &MasterPlaylist, base_url: &Url) -> Result<ParsedManifest> {
    let mut levels = Vec::new();
    let mut variant_uris = Vec::new();

    for variant in master.variants.iter().filter(|v| !v.is_i_frame) {
        // Audio-only variants carry no resolution and are not selectable
        let Some(resolution) = variant.resolution.as_ref() else {
            debug!(uri = %variant.uri, "Skipping variant without resolution");
            continue;
        };
        if resolution.height == 0 {
            continue;
        }

        let uri = resolve_uri(base_url, &variant.uri)?;
        levels.push(QualityLevel::new(levels.len() as u32, resolution.height as u32).with_bandwidth(variant.bandwidth));
        variant_uris.push(uri);
    }

    Ok(ParsedManifest {
        levels,
        duration: None,
        variant_uris,
    })
}

fn media_duration(media: &MediaPlaylist) -> Option<f64> {
    if !media.end_list {
        return None;
    }
    Some(media.segments.iter().map(|s| s.duration as f64).sum())
}

/// Resolve relative URI against base URL
fn resolve_uri(base: &Url, relative: &str) -> Result<Url> {
    base.join(relative)
        .map_err(|e| Error::ManifestParse(format!("Invalid URI '{}': {}", relative, e)))
}

/// HTTP manifest fetcher
#[derive(Debug, Clone)]
pub struct ManifestFetcher {
    client: Client,
}

impl ManifestFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Fetch and parse a manifest; for a master playlist the first variant is
    /// fetched too, to learn the VOD duration
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &Url) -> Result<ParsedManifest> {
        let content = self.fetch_body(url).await?;
        let mut manifest = parse_manifest(content.as_bytes(), url)?;

        if manifest.duration.is_none() {
            if let Some(first) = manifest.variant_uris.first().cloned() {
                match self.fetch_body(&first).await {
                    Ok(body) => {
                        if let Ok(Playlist::MediaPlaylist(media)) = m3u8_rs::parse_playlist_res(body.as_bytes()) {
                            manifest.duration = media_duration(&media);
                        }
                    }
                    Err(e) => debug!(url = %first, error = %e, "Variant playlist unavailable, no duration hint"),
                }
            }
        }

        Ok(manifest)
    }

    async fn fetch_body(&self, url: &Url) -> Result<String> {
        debug!("Fetching HLS playlist: {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::ManifestFetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ManifestFetch(format!("{} returned {}", url, status)));
        }

        response
            .text()
            .await
            .map_err(|e| Error::ManifestFetch(e.to_string()))
    }
}
