use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;

use crate::{error::GatewayError, state::AppState};

/// Composes CORS, API-key, and rate-limit checks into the single admission
/// decision described in §4.3. Ordering is load-bearing: CORS runs first so
/// preflights never consume a rate-limit slot or leak whether an API key is
/// configured, and rate limiting runs last so rejected/anonymous requests
/// still short-circuit before touching the dispatcher.
pub async fn admission_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().as_str().to_string();
    let headers = req.headers().clone();

    let origin = header_str(&headers, "origin");
    let request_method = header_str(&headers, "access-control-request-method");
    let request_headers = header_str(&headers, "access-control-request-headers");

    let cors_decision = state.cors.process(
        &method,
        origin.as_deref(),
        request_headers.as_deref(),
        request_method.as_deref(),
    );

    if !cors_decision.is_valid {
        let mut response = GatewayError::CorsViolation("CORS policy violation".into())
            .into_response();
        apply_headers(&mut response, &cors_decision.headers);
        return response;
    }

    if cors_decision.is_preflight {
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_headers(&mut response, &cors_decision.headers);
        return response;
    }

    let api_key_policy = state.api_key.snapshot();
    if api_key_policy.enabled && api_key_policy.required {
        let presented = header_str(&headers, &api_key_policy.header_name_lower());
        if !api_key_policy.verify(presented.as_deref()) {
            let mut response =
                GatewayError::AuthFailure("Invalid or missing API key".into()).into_response();
            apply_headers(&mut response, &cors_decision.headers);
            return response;
        }
    }

    let client_key = client_key(&req, &headers);
    let outcome = state.rate_limiter.check(&client_key);

    if !outcome.allowed {
        let mut response = GatewayError::RateLimited {
            message: "Rate limit exceeded".into(),
            retry_after_secs: outcome.reset_secs,
        }
        .into_response();
        apply_headers(
            &mut response,
            &[
                ("X-Rate-Limit-Limit", state.rate_limiter.current_limit().to_string()),
                ("X-Rate-Limit-Remaining", "0".to_string()),
                ("X-Rate-Limit-Reset", outcome.reset_secs.to_string()),
            ],
        );
        apply_headers(&mut response, &cors_decision.headers);
        return response;
    }

    let mut response = next.run(req).await;
    apply_headers(
        &mut response,
        &[
            ("X-Rate-Limit-Limit", state.rate_limiter.current_limit().to_string()),
            ("X-Rate-Limit-Remaining", outcome.remaining.to_string()),
            ("X-Rate-Limit-Reset", outcome.reset_secs.to_string()),
        ],
    );
    apply_headers(&mut response, &cors_decision.headers);
    response
}

fn header_str(headers: &axum::http::HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn apply_headers(response: &mut Response, headers: &[(&str, String)]) {
    for (name, value) in headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(*name),
            HeaderValue::from_str(value),
        ) {
            response.headers_mut().insert(name, value);
        }
    }
}

/// Client identity for rate limiting: the connecting socket address, falling
/// back to `X-Forwarded-For`'s first hop when present (reverse-proxy
/// deployments), matching the spec's "keyed by client identifier (IP
/// string)" data model.
fn client_key(req: &Request, headers: &axum::http::HeaderMap) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
