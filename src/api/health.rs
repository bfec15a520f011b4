//! Health check endpoint

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

pub async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_ok = sqlx::query("SELECT 1").fetch_one(&state.pool).await.is_ok();
    Json(HealthResponse {
        status: if db_ok { "ok".to_string() } else { "degraded".to_string() },
        service: "backend".to_string(),
    })
}
