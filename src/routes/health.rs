use axum::{extract::State, Json};

use crate::{
    models::health::{HealthResponse, ModelEntry, ModelsListResponse},
    models::common::unix_now,
    state::AppState,
};

#[tracing::instrument(name = "health.check", skip_all)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

#[tracing::instrument(name = "health.models", skip_all)]
pub async fn list_models(State(state): State<AppState>) -> Json<ModelsListResponse> {
    let entries = state.node_manager.list().await;
    let created = unix_now();
    let data = entries
        .into_iter()
        .map(|entry| ModelEntry {
            id: entry.id,
            object: "model",
            created,
            owned_by: "cortex-gateway".to_string(),
        })
        .collect();
    Json(ModelsListResponse { data })
}
