use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use attack_map_shared::{AttackRecord, records_from_values};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{error, info};

use crate::routes::api::json_bytes_response;
use crate::state::AppState;

/// Rows per INSERT statement; 7 binds each keeps us far under the
/// Postgres bind parameter limit.
const UPSERT_CHUNK_ROWS: usize = 1_000;

/// Serve the pre-serialized feed snapshot without re-encoding it.
pub async fn get_attackers(State(state): State<AppState>) -> Response {
    let json = Arc::clone(&state.feed.read().await.json);
    json_bytes_response((*json).clone(), "no-store")
}

pub async fn save_attackers(State(state): State<AppState>, body: Bytes) -> Response {
    let records = match parse_save_payload(&body, state.max_save_records) {
        Ok(records) => records,
        Err(rejection) => return rejection.into_response(),
    };

    let storage = state.storage();
    let result = match &state.db {
        Some(pool) => upsert_records(pool, &records).await,
        None => {
            let _guard = state.save_lock.lock().await;
            write_saved_file(&state.saved_path, &records).await
        }
    };

    match result {
        Ok(()) => {
            info!(records = records.len(), storage = storage.as_str(), "saved attack records");
            StatusCode::ACCEPTED.into_response()
        }
        Err(e) => {
            error!(error = %e, storage = storage.as_str(), "failed to save attack records");
            (StatusCode::SERVICE_UNAVAILABLE, "storage unavailable").into_response()
        }
    }
}

fn parse_save_payload(
    body: &[u8],
    max_records: usize,
) -> Result<Vec<AttackRecord>, (StatusCode, String)> {
    let values: Vec<serde_json::Value> = serde_json::from_slice(body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("expected a JSON array of records: {e}"),
        )
    })?;
    if values.len() > max_records {
        return Err((
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("at most {max_records} records per save"),
        ));
    }
    Ok(records_from_values(values))
}

/// Later entries win when a payload repeats an id, which also keeps a
/// single upsert statement from touching the same row twice.
fn dedupe_by_id(records: &[AttackRecord]) -> Vec<&AttackRecord> {
    let mut position: HashMap<&str, usize> = HashMap::with_capacity(records.len());
    let mut unique: Vec<&AttackRecord> = Vec::with_capacity(records.len());
    for record in records {
        match position.get(record.id.as_str()) {
            Some(&index) => unique[index] = record,
            None => {
                position.insert(record.id.as_str(), unique.len());
                unique.push(record);
            }
        }
    }
    unique
}

async fn upsert_records(pool: &PgPool, records: &[AttackRecord]) -> Result<(), String> {
    let rows = dedupe_by_id(records);
    if rows.is_empty() {
        return Ok(());
    }
    let saved_at = Utc::now();

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| format!("begin transaction: {e}"))?;

    for chunk in rows.chunks(UPSERT_CHUNK_ROWS) {
        let mut query_builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO attack_records \
             (id, latitude, longitude, country, attack_type, ip, saved_at) ",
        );
        query_builder.push_values(chunk, |mut builder, record| {
            builder
                .push_bind(record.id.clone())
                .push_bind(record.latitude)
                .push_bind(record.longitude)
                .push_bind(record.country.clone())
                .push_bind(record.kind.clone())
                .push_bind(record.ip.clone())
                .push_bind(saved_at);
        });
        query_builder.push(
            " ON CONFLICT (id) DO UPDATE SET \
             latitude = EXCLUDED.latitude, longitude = EXCLUDED.longitude, \
             country = EXCLUDED.country, attack_type = EXCLUDED.attack_type, \
             ip = EXCLUDED.ip, saved_at = EXCLUDED.saved_at",
        );
        query_builder
            .build()
            .execute(&mut *tx)
            .await
            .map_err(|e| format!("upsert attack records: {e}"))?;
    }

    tx.commit()
        .await
        .map_err(|e| format!("commit transaction: {e}"))?;
    Ok(())
}

/// Replace the saved file with the latest payload via a temp file + rename.
async fn write_saved_file(path: &Path, records: &[AttackRecord]) -> Result<(), String> {
    let json = serde_json::to_vec_pretty(records).map_err(|e| format!("encode records: {e}"))?;
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| format!("create {}: {e}", dir.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| format!("write {}: {e}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| format!("rename into {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::routes::api::tests::spawn_test_server;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "attack-map-{name}-{}-{}",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        std::fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    #[test]
    fn payload_must_be_an_array_within_the_limit() {
        let (status, _) = parse_save_payload(br#"{"id":"1"}"#, 10).expect_err("object");
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = parse_save_payload(br#"[{"id":"1"},{"id":"2"}]"#, 1).expect_err("too many");
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

        let records = parse_save_payload(br#"[{"id":"1"}, 42, {"id":"self","type":"Self"}]"#, 10)
            .expect("lenient array");
        assert_eq!(records.len(), 2);
        assert!(records[1].is_self());
    }

    #[test]
    fn repeated_ids_keep_the_last_entry_in_first_position() {
        let records = parse_save_payload(
            br#"[{"id":"a","country":"X"},{"id":"b"},{"id":"a","country":"Y"}]"#,
            10,
        )
        .expect("records");
        let unique = dedupe_by_id(&records);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].id, "a");
        assert_eq!(unique[0].country, "Y");
        assert_eq!(unique[1].id, "b");
    }

    #[tokio::test]
    async fn attackers_endpoint_serves_the_current_snapshot() {
        let state = AppState::new(None);
        {
            let mut feed = state.feed.write().await;
            feed.records = 1;
            feed.json = Arc::new(Bytes::from_static(
                br#"[{"id":"1","latitude":1.0,"longitude":2.0,"country":"X","type":"DDoS"}]"#,
            ));
        }
        let (addr, server_handle) = spawn_test_server(state).await;

        let resp = reqwest::get(format!("http://{addr}/api/attackers"))
            .await
            .expect("attackers request");
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(
            resp.headers()
                .get(reqwest::header::CACHE_CONTROL)
                .and_then(|v| v.to_str().ok()),
            Some("no-store")
        );
        let body = resp.json::<serde_json::Value>().await.expect("attackers json");
        assert_eq!(body[0]["type"], "DDoS");

        server_handle.abort();
    }

    #[tokio::test]
    async fn save_without_database_writes_the_latest_payload() {
        let dir = scratch_dir("save");
        let mut state = AppState::new(None);
        state.saved_path = dir.join("saved_attackers.json");
        let saved_path = state.saved_path.clone();
        let (addr, server_handle) = spawn_test_server(state).await;
        let client = reqwest::Client::new();
        let url = format!("http://{addr}/api/attackers/save");

        let first = serde_json::json!([
            {"id": "1", "latitude": 10.0, "longitude": 20.0, "country": "X", "type": "Malware"},
            {"id": "2", "latitude": 30.0, "longitude": 40.0, "country": "Y"},
        ]);
        let resp = client.post(&url).json(&first).send().await.expect("first save");
        assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);

        let second = serde_json::json!([
            {"id": "1", "latitude": 10.0, "longitude": 20.0, "country": "X", "type": "Malware"},
            {"id": "2", "latitude": 30.0, "longitude": 40.0, "country": "Y"},
            {"id": "self", "latitude": 52.5, "longitude": 13.4, "country": "DE", "type": "Self", "ip": "203.0.113.9"},
        ]);
        let resp = client.post(&url).json(&second).send().await.expect("second save");
        assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);

        let saved: Vec<AttackRecord> =
            serde_json::from_slice(&std::fs::read(&saved_path).expect("saved file"))
                .expect("saved records");
        assert_eq!(saved.len(), 3);
        assert_eq!(saved[2].ip.as_deref(), Some("203.0.113.9"));

        server_handle.abort();
    }

    #[tokio::test]
    async fn malformed_and_oversized_saves_are_rejected() {
        let dir = scratch_dir("save-reject");
        let mut state = AppState::new(None);
        state.saved_path = dir.join("saved_attackers.json");
        state.max_save_records = 1;
        let saved_path = state.saved_path.clone();
        let (addr, server_handle) = spawn_test_server(state).await;
        let client = reqwest::Client::new();
        let url = format!("http://{addr}/api/attackers/save");

        let resp = client
            .post(&url)
            .body("not json")
            .send()
            .await
            .expect("malformed save");
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

        let resp = client
            .post(&url)
            .json(&serde_json::json!([{"id": "1"}, {"id": "2"}]))
            .send()
            .await
            .expect("oversized save");
        assert_eq!(resp.status(), reqwest::StatusCode::PAYLOAD_TOO_LARGE);
        assert!(!saved_path.exists());

        server_handle.abort();
    }

    #[tokio::test]
    async fn unwritable_storage_reports_service_unavailable() {
        let dir = scratch_dir("save-blocked");
        // A directory where the file should be makes the rename fail.
        let blocked = dir.join("saved_attackers.json");
        std::fs::create_dir_all(blocked.join("occupied")).expect("create blocking dir");
        let mut state = AppState::new(None);
        state.saved_path = blocked;
        let (addr, server_handle) = spawn_test_server(state).await;

        let resp = reqwest::Client::new()
            .post(format!("http://{addr}/api/attackers/save"))
            .json(&serde_json::json!([{"id": "1"}]))
            .send()
            .await
            .expect("blocked save");
        assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

        server_handle.abort();
    }
}
