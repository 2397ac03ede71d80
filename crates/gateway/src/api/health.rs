//! `GET /aitoys/v1/health` — liveness plus a readiness view of per-module
//! init status, for operational visibility rather than client-facing use.

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let init_errors: Vec<_> = state
        .modules
        .init_errors()
        .iter()
        .map(|e| {
            serde_json::json!({
                "module_type": e.module_type.as_str(),
                "code": e.code,
                "message": e.message,
                "retriable": e.retriable,
            })
        })
        .collect();

    Json(serde_json::json!({
        "status": "ok",
        "modules_registered": state.modules.len(),
        "module_init_errors": init_errors,
    }))
}
