use axum::{extract::State, response::Response};

use crate::{error::GatewayError, models::completion::CompletionRequest, state::AppState};

#[tracing::instrument(name = "text.completions", skip_all, fields(model))]
pub async fn create_completion(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Result<Response, GatewayError> {
    let request = CompletionRequest::from_json(&body)?;
    tracing::Span::current().record("model", request.model.as_str());
    crate::streaming::dispatch_completion(
        &state.node_manager,
        &state.metrics,
        state.config.server.request_timeout(),
        request,
    )
    .await
}
