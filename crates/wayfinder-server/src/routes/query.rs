use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use wayfinder::agent::Cancellation;
use wayfinder::errors::RunError;

use super::error_response;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest {
    message: String,
    #[serde(default)]
    conversation_id: Option<String>,
}

// The run is dropped, and with it any in-flight model or browser call, if the client goes away
async fn run_query(State(state): State<AppState>, Json(request): Json<QueryRequest>) -> Response {
    if request.message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "message must not be empty");
    }

    let result = state
        .service
        .run_query(
            &request.message,
            request.conversation_id.as_deref(),
            &Cancellation::new(),
        )
        .await;

    match result {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => {
            error!(error = %e, "query failed");
            let status = match &e {
                RunError::RecursionLimit { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                RunError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
                RunError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            error_response(status, e)
        }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/query", post(run_query))
        .with_state(state)
}
