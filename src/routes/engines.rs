use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::{
    error::GatewayError,
    models::engine::{
        EngineListResponse, RegisterEngineRequest, RegisterEngineResponse, RemoveEngineResponse,
    },
    state::AppState,
};

#[tracing::instrument(name = "engines.list", skip_all)]
pub async fn list_engines(State(state): State<AppState>) -> Json<EngineListResponse> {
    Json(EngineListResponse {
        engines: state.node_manager.list().await,
    })
}

/// Registers a new engine and, when `load_at_startup` is set on the request,
/// loads it synchronously before replying — mirroring `NodeManager::add`'s
/// register-then-load semantics (§4.4).
#[tracing::instrument(name = "engines.register", skip_all, fields(engine_id))]
pub async fn register_engine(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Result<Response, GatewayError> {
    let request = RegisterEngineRequest::from_json(&body)?;
    request.validate()?;
    tracing::Span::current().record("engine_id", request.id.as_str());

    let params = request.load_params.clone().unwrap_or(serde_json::Value::Null);
    let status = if request.load_at_startup.unwrap_or(false) {
        let loaded = state
            .node_manager
            .add(request.id.clone(), request.path.clone(), params, request.gpu_id)
            .await?;
        if loaded { "loaded" } else { "failed" }
    } else {
        state
            .node_manager
            .register(request.id.clone(), request.path.clone(), params, request.gpu_id)?;
        "registered"
    };

    Ok((
        StatusCode::CREATED,
        Json(RegisterEngineResponse {
            id: request.id,
            status: status.to_string(),
        }),
    )
        .into_response())
}

#[tracing::instrument(name = "engines.status", skip_all, fields(engine_id = %id))]
pub async fn engine_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, GatewayError> {
    match state.node_manager.status(&id).await {
        Some(status) => Ok(Json(status).into_response()),
        None => Err(GatewayError::NotFound(format!("engine '{id}' not found"))),
    }
}

#[tracing::instrument(name = "engines.remove", skip_all, fields(engine_id = %id))]
pub async fn remove_engine(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RemoveEngineResponse>, GatewayError> {
    let removed = state.node_manager.remove(&id).await?;
    Ok(Json(RemoveEngineResponse { id, removed }))
}
