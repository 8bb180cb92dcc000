use axum::{extract::State, http::StatusCode, response::Json};
use diesel::{sql_query, RunQueryDsl};
use serde_json::json;
use tracing::warn;

use crate::{error::AppError, state::AppState};

/// Liveness. The database probe is informational and never fails the check.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let database = match state
        .with_conn(|conn| sql_query("SELECT 1").execute(conn).map_err(AppError::from))
        .await
    {
        Ok(_) => "ok",
        Err(err) => {
            warn!(status = %err.status(), "health check could not reach the database");
            "unavailable"
        }
    };
    (StatusCode::OK, Json(json!({ "status": "ok", "database": database })))
}
