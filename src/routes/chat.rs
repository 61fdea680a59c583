use axum::{extract::State, response::Response};

use crate::{error::GatewayError, models::chat::ChatCompletionRequest, state::AppState};

#[tracing::instrument(name = "chat.completions", skip_all, fields(model))]
pub async fn create_chat_completion(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Result<Response, GatewayError> {
    let request = ChatCompletionRequest::from_json(&body)?;
    tracing::Span::current().record("model", request.model.as_str());
    crate::streaming::dispatch_chat(
        &state.node_manager,
        &state.metrics,
        state.config.server.request_timeout(),
        request,
    )
    .await
}
