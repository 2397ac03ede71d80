pub mod chat_completions;
pub mod health;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws/chat", get(crate::gateway_ws::handler))
        .route("/aitoys/v1/health", get(health::health))
        .route("/v1/chat/completions", post(chat_completions::chat_completions))
        .with_state(state)
}
