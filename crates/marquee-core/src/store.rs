//! Progress persistence endpoint
//!
//! The remote store is the system of record for listening/viewing progress.
//! The engine only ever calls [`ProgressStore::save`]; resume positions are
//! fetched by the host and handed to `attach`.

use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Library record returned by the store after a position update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProgressRecord {
    pub id: String,
    pub last_position_seconds: u64,
    pub is_completed: bool,
    pub last_played_at: Option<String>,
}

/// Remote progress store
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Persist `position_seconds` for the library item `owner_id`
    async fn save(&self, owner_id: &str, position_seconds: u64) -> Result<ProgressRecord>;
}

/// HTTP progress store
///
/// Issues `PUT {base}/library/{owner}/position?positionSeconds={n}`.
pub struct HttpProgressStore {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpProgressStore {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: Url) -> Self {
        Self {
            client,
            base_url,
            token: None,
        }
    }

    /// Authenticate requests with a bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn position_url(&self, owner_id: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::InvalidConfig(format!("progress endpoint cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["library", owner_id, "position"]);
        Ok(url)
    }
}

#[async_trait]
impl ProgressStore for HttpProgressStore {
    #[instrument(skip(self))]
    async fn save(&self, owner_id: &str, position_seconds: u64) -> Result<ProgressRecord> {
        let url = self.position_url(owner_id)?;

        let mut request = self
            .client
            .put(url)
            .query(&[("positionSeconds", position_seconds)]);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::save_failed(format!("progress store returned {}", status)));
        }

        let record = response.json::<ProgressRecord>().await?;
        debug!(owner_id, position_seconds, "Progress saved");
        Ok(record)
    }
}
