use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

use crate::config::{
    feed_path, feed_url, max_save_records, saved_attackers_path, upstream_connect_timeout,
    upstream_http_timeout,
};

/// Latest validated attacker feed, serialized once and shared by every request.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub records: usize,
    pub json: Arc<Bytes>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl Default for FeedSnapshot {
    fn default() -> Self {
        Self {
            records: 0,
            json: Arc::new(Bytes::from_static(b"[]")),
            refreshed_at: None,
        }
    }
}

/// Where saved records end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Postgres,
    File,
}

impl Storage {
    pub fn as_str(self) -> &'static str {
        match self {
            Storage::Postgres => "postgres",
            Storage::File => "file",
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub feed: Arc<RwLock<FeedSnapshot>>,
    pub http_client: reqwest::Client,
    /// PostgreSQL pool for saved records. None if DATABASE_URL is not set.
    pub db: Option<PgPool>,
    pub feed_path: PathBuf,
    pub feed_url: Option<String>,
    pub saved_path: PathBuf,
    pub max_save_records: usize,
    /// Serializes rewrites of the saved-records file.
    pub save_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(db: Option<PgPool>) -> Self {
        let request_timeout = upstream_http_timeout();
        let connect_timeout = upstream_connect_timeout();
        let http_client = reqwest::Client::builder()
            .user_agent("attack-map/0.1")
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build configured HTTP client, using defaults");
                reqwest::Client::new()
            });
        let feed_path = feed_path();
        let saved_path = saved_attackers_path(&feed_path);
        Self {
            feed: Arc::new(RwLock::new(FeedSnapshot::default())),
            http_client,
            db,
            feed_path,
            feed_url: feed_url(),
            saved_path,
            max_save_records: max_save_records(),
            save_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn storage(&self) -> Storage {
        if self.db.is_some() {
            Storage::Postgres
        } else {
            Storage::File
        }
    }
}
