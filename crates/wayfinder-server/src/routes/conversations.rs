use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use super::error_response;
use crate::state::AppState;

async fn list_conversations(State(state): State<AppState>) -> Response {
    match state.service.get_history() {
        Ok(history) => Json(history).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn load_conversation(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.service.load_conversation(&id) {
        Ok(messages) => Json(messages).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn delete_conversation(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.service.delete_conversation(&id) {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/conversations", get(list_conversations))
        .route(
            "/conversations/:id",
            get(load_conversation).delete(delete_conversation),
        )
        .with_state(state)
}
