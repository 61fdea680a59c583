//! Route tables and the top-level `build_app` assembly.

pub mod chat;
pub mod completions;
pub mod downloads;
pub mod engines;
pub mod health;
pub mod metrics;

use axum::{
    http::{HeaderName, Request},
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::{middleware::admission::admission_middleware, models::common::generate_id, state::AppState};

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone, Default)]
struct MakeGatewayRequestId;

impl MakeRequestId for MakeGatewayRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let value: axum::http::HeaderValue = generate_id("req-").parse().ok()?;
        Some(RequestId::new(value))
    }
}

/// Assembles the full router: routes, then the admission pipeline (CORS,
/// API-key auth, rate limiting — §4.3), request tracing, and a request-id
/// that is generated per request and propagated onto the response.
pub fn build_app(state: AppState) -> Router {
    let header_name = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/models", get(health::list_models))
        .route("/v1/models", get(health::list_models))
        .route("/v1/chat/completions", post(chat::create_chat_completion))
        .route("/v1/completions", post(completions::create_completion))
        .route("/metrics", get(metrics::combined_metrics))
        .route("/v1/metrics", get(metrics::combined_metrics))
        .route(
            "/engines",
            get(engines::list_engines).post(engines::register_engine),
        )
        .route("/engines/:id/status", get(engines::engine_status))
        .route("/engines/:id", delete(engines::remove_engine))
        .route(
            "/downloads",
            get(downloads::list_downloads).post(downloads::start_download),
        )
        .route("/downloads/cancel-all", post(downloads::cancel_all_downloads))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            admission_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(header_name.clone()))
        .layer(SetRequestIdLayer::new(header_name, MakeGatewayRequestId))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::{Request, StatusCode}};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::{config::GatewayConfig, state::AppState};

    use super::build_app;

    fn app() -> axum::Router {
        build_app(AppState::new(GatewayConfig::default()))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_check_returns_ok() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn bare_and_versioned_models_routes_agree() {
        let app = app();
        let bare = app
            .clone()
            .oneshot(Request::builder().uri("/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let versioned = app
            .oneshot(Request::builder().uri("/v1/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(bare.status(), StatusCode::OK);
        assert_eq!(versioned.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn chat_completion_round_trips_through_the_test_engine() {
        let app = app();

        let register = Request::builder()
            .method("POST")
            .uri("/engines")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({"id": "m1", "path": "models/m1.bin", "load_at_startup": true})
                    .to_string(),
            ))
            .unwrap();
        assert_eq!(
            app.clone().oneshot(register).await.unwrap().status(),
            StatusCode::CREATED
        );

        let request = Request::builder()
            .method("POST")
            .uri("/v1/chat/completions")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({
                    "model": "m1",
                    "messages": [{"role": "user", "content": "hello there"}]
                })
                .to_string(),
            ))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["choices"][0]["message"]["content"], "hello there");
    }

    #[tokio::test]
    async fn unknown_engine_id_yields_not_found() {
        let request = Request::builder()
            .uri("/engines/nope/status")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn register_then_list_engines() {
        let app = app();
        let register = Request::builder()
            .method("POST")
            .uri("/engines")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({"id": "m1", "path": "models/m1.bin"}).to_string(),
            ))
            .unwrap();
        let response = app.clone().oneshot(register).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let list = Request::builder().uri("/engines").body(Body::empty()).unwrap();
        let response = app.oneshot(list).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body["engines"][0]["id"], "m1");
    }
}
