use std::path::Path;

use axum::{
    Router,
    extract::Request,
    http::{HeaderValue, header},
    middleware::{self, Next},
    response::Response,
};
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;

use crate::config::STATIC_DIR;
use crate::routes;
use crate::state::AppState;

const WORLD_TOPOLOGY_PATH: &str = "/world-110m.json";

pub(crate) fn build_app(state: AppState) -> Router {
    let static_assets = Router::new()
        .fallback_service(
            ServeDir::new(STATIC_DIR)
                .precompressed_br()
                .precompressed_gzip(),
        )
        .layer(middleware::from_fn(set_static_cache_control));

    let app = Router::new()
        .route(
            "/api/attackers",
            axum::routing::get(routes::attackers::get_attackers),
        )
        .route(
            "/api/attackers/save",
            axum::routing::post(routes::attackers::save_attackers),
        )
        .route("/api/health", axum::routing::get(routes::api::health));

    app.layer(CompressionLayer::new())
        .fallback_service(static_assets)
        .with_state(state)
}

async fn set_static_cache_control(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_owned();
    let mut response = next.run(request).await;

    if response.status().is_success()
        && let Some(cache_control) = cache_control_for_path(&path)
    {
        response.headers_mut().insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static(cache_control),
        );
    }

    response
}

fn cache_control_for_path(path: &str) -> Option<&'static str> {
    if is_hashed_bundle_asset(path) {
        return Some("public, max-age=31536000, immutable");
    }

    // The base map topology changes only with a redeploy.
    if path == WORLD_TOPOLOGY_PATH {
        return Some("public, max-age=86400");
    }

    None
}

/// Trunk output carries a content hash in its filename.
fn is_hashed_bundle_asset(path: &str) -> bool {
    let path = Path::new(path);
    let is_bundle = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| matches!(ext, "wasm" | "js" | "css"));
    is_bundle
        && path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .is_some_and(|stem| stem.split(['-', '_', '.']).any(is_content_hash))
}

fn is_content_hash(segment: &str) -> bool {
    segment.len() >= 8 && segment.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use tower::ServiceExt;

    #[test]
    fn hashed_client_bundle_is_immutable() {
        assert_eq!(
            cache_control_for_path("/attack-map-client-3f9a41c2d07e55b1_bg.wasm"),
            Some("public, max-age=31536000, immutable")
        );
        assert_eq!(
            cache_control_for_path("/attack-map-client-3f9a41c2d07e55b1.js"),
            Some("public, max-age=31536000, immutable")
        );
    }

    #[test]
    fn world_topology_gets_a_day_of_caching() {
        assert_eq!(
            cache_control_for_path("/world-110m.json"),
            Some("public, max-age=86400")
        );
        assert_eq!(cache_control_for_path("/world-110m.js"), None);
    }

    #[test]
    fn html_and_unhashed_scripts_are_not_overridden() {
        assert_eq!(cache_control_for_path("/"), None);
        assert_eq!(cache_control_for_path("/index.html"), None);
        assert_eq!(cache_control_for_path("/main.js"), None);
    }

    #[tokio::test]
    async fn save_route_only_accepts_post() {
        let app = build_app(AppState::new(None));
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("GET")
                    .uri("/api/attackers/save")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(
            response.status(),
            axum::http::StatusCode::METHOD_NOT_ALLOWED
        );
    }
}
