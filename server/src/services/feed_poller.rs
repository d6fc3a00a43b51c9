use std::path::Path;
use std::sync::Arc;

use attack_map_shared::parse_feed;
use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::feed_refresh_interval;
use crate::state::{AppState, FeedSnapshot};

const BODY_PREVIEW_CHARS: usize = 200;

pub async fn run(state: AppState) {
    let mut interval = tokio::time::interval(feed_refresh_interval());
    let mut last_count = None;

    loop {
        interval.tick().await;
        match refresh(&state).await {
            Ok(count) => {
                if last_count != Some(count) {
                    info!(records = count, "attacker feed refreshed");
                    last_count = Some(count);
                }
            }
            Err(FeedError::Missing(path)) => {
                debug!(path = %path, "attacker feed file not present yet");
            }
            Err(e) => warn!(error = %e, "attacker feed refresh failed, keeping previous snapshot"),
        }
    }
}

#[derive(Debug)]
pub enum FeedError {
    Missing(String),
    Unavailable(String),
    Invalid(String),
}

impl std::fmt::Display for FeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedError::Missing(path) => write!(f, "feed file {path} does not exist"),
            FeedError::Unavailable(e) => write!(f, "feed unavailable: {e}"),
            FeedError::Invalid(e) => write!(f, "feed invalid: {e}"),
        }
    }
}

/// Pull the feed once and swap in a new snapshot. An unreadable or
/// malformed payload leaves the current snapshot untouched.
pub async fn refresh(state: &AppState) -> Result<usize, FeedError> {
    let raw = match &state.feed_url {
        Some(url) => fetch_upstream(&state.http_client, url).await?,
        None => read_feed_file(&state.feed_path).await?,
    };
    let snapshot = build_snapshot(&raw)?;
    let count = snapshot.records;
    *state.feed.write().await = snapshot;
    Ok(count)
}

pub fn build_snapshot(raw: &[u8]) -> Result<FeedSnapshot, FeedError> {
    let text = std::str::from_utf8(raw).map_err(|e| FeedError::Invalid(e.to_string()))?;
    let records = parse_feed(text).map_err(|e| {
        FeedError::Invalid(format!("{e}; body preview: {}", preview(raw)))
    })?;
    let json = serde_json::to_vec(&records).map_err(|e| FeedError::Invalid(e.to_string()))?;
    Ok(FeedSnapshot {
        records: records.len(),
        json: Arc::new(Bytes::from(json)),
        refreshed_at: Some(Utc::now()),
    })
}

async fn read_feed_file(path: &Path) -> Result<Vec<u8>, FeedError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(FeedError::Missing(path.display().to_string()))
        }
        Err(e) => Err(FeedError::Unavailable(format!(
            "read {}: {e}",
            path.display()
        ))),
    }
}

async fn fetch_upstream(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, FeedError> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| FeedError::Unavailable(format!("request failed: {e}")))?;
    let status = resp.status();
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| FeedError::Unavailable(format!("failed to read response body: {e}")))?;

    if !status.is_success() {
        return Err(FeedError::Unavailable(format!(
            "upstream status {status}; body preview: {}",
            preview(&bytes)
        )));
    }
    Ok(bytes.to_vec())
}

fn preview(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .take(BODY_PREVIEW_CHARS)
        .collect()
}
