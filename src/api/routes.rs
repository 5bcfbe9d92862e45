//! HTTP API route definitions.

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use super::handlers::{healthz, organizers, prometheus, sessions, version, AppState};

/// Create the API router, shared by the plaintext and TLS listeners.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/version", get(version))
        // Database-backed
        .route("/organizers", get(organizers))
        // Upstream pass-through
        .route("/sessions", get(sessions))
        // Health and metrics
        .route("/healthz", get(healthz))
        .route("/metrics", get(prometheus))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::tests::test_state;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn version_endpoint_returns_quoted_version() {
        let (state, _rx) = test_state("http://127.0.0.1:1/schedule.json");
        let (status, body) = get_body(create_router(state), "/version").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "\"0.0.1\"");
    }

    #[tokio::test]
    async fn organizers_returns_503_before_startup_completes() {
        let (state, _rx) = test_state("http://127.0.0.1:1/schedule.json");
        let (status, body) = get_body(create_router(state), "/organizers").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("database not ready"));
    }

    #[tokio::test]
    async fn healthz_returns_503_when_database_is_down() {
        let (state, _rx) = test_state("http://127.0.0.1:1/schedule.json");
        let (status, body) = get_body(create_router(state), "/healthz").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let report: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(report["ready"], false);
        assert_eq!(report["database"]["driver"], "mysql");
        assert_eq!(report["database"]["alive"], false);
    }

    #[tokio::test]
    async fn metrics_returns_404_without_recorder() {
        let (state, _rx) = test_state("http://127.0.0.1:1/schedule.json");
        let (status, _) = get_body(create_router(state), "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn sessions_passes_upstream_document_through() {
        let document = r#"{"sessions":[{"id": 1, "title":"Keynote"}]}"#;
        let upstream = Router::new().route("/schedule.json", get(move || async move { document }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, upstream).await });

        let (state, mut rx) = test_state(&format!("http://{addr}/schedule.json"));
        let (status, body) = get_body(create_router(state), "/sessions").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, document);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn sessions_failure_signals_halt() {
        let (state, mut rx) = test_state("http://127.0.0.1:1/schedule.json");
        let (status, _) = get_body(create_router(state), "/sessions").await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let reason = rx.try_recv().unwrap();
        assert!(reason.contains("schedule.json"));
    }

    #[tokio::test]
    async fn every_route_records_request_latency() {
        let handle = crate::metrics::tests::test_recorder();
        let (mut state, _rx) = test_state("http://127.0.0.1:1/schedule.json");
        state.metrics = Some(handle.clone());

        let routes = ["/version", "/organizers", "/sessions", "/healthz"];
        for uri in routes {
            get_body(create_router(state.clone()), uri).await;
        }

        let (status, rendered) = get_body(create_router(state), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        for uri in routes {
            assert!(
                rendered.contains(&format!("endpoint=\"{uri}\"")),
                "no latency recorded for {uri}"
            );
        }
    }
}
