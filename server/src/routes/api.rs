use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, header};
use axum::response::Response;
use bytes::Bytes;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let (records, refreshed_at) = {
        let feed = state.feed.read().await;
        (feed.records, feed.refreshed_at.map(|at| at.to_rfc3339()))
    };
    Json(serde_json::json!({
        "status": "ok",
        "records": records,
        "storage": state.storage().as_str(),
        "feed_refreshed_at": refreshed_at,
    }))
}

pub(crate) fn json_bytes_response(body: Bytes, cache_control: &'static str) -> Response {
    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control),
    );
    response
}

#[cfg(test)]
pub(crate) mod tests {
    use std::net::SocketAddr;

    use super::*;

    pub(crate) async fn spawn_test_server(
        state: AppState,
    ) -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        let app = crate::app::build_app(state);
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve test app");
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn health_reports_record_count_and_storage() {
        let state = AppState::new(None);
        state.feed.write().await.records = 7;
        let (addr, server_handle) = spawn_test_server(state).await;

        let health = reqwest::get(format!("http://{addr}/api/health"))
            .await
            .expect("health request")
            .error_for_status()
            .expect("health status")
            .json::<serde_json::Value>()
            .await
            .expect("health json");

        assert_eq!(health["status"], "ok");
        assert_eq!(health["records"], 7);
        assert_eq!(health["storage"], "file");
        assert!(health["feed_refreshed_at"].is_null());

        server_handle.abort();
    }
}
