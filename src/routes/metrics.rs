use axum::{extract::State, Json};

use crate::{
    models::{common::unix_now, metrics::CombinedMetricsResponse},
    state::AppState,
};

#[tracing::instrument(name = "metrics.combined", skip_all)]
pub async fn combined_metrics(State(state): State<AppState>) -> Json<CombinedMetricsResponse> {
    Json(CombinedMetricsResponse {
        system_metrics: state.system_metrics.snapshot(),
        completion_metrics: state.metrics.combined_completion(),
        timestamp: unix_now(),
    })
}
