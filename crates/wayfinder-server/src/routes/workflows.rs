use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::error_response;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveWorkflowRequest {
    conversation_id: String,
}

async fn save_workflow(
    State(state): State<AppState>,
    Json(request): Json<SaveWorkflowRequest>,
) -> Response {
    let response = state.service.save_workflow(&request.conversation_id).await;
    Json(response).into_response()
}

async fn list_workflows(State(state): State<AppState>) -> Response {
    match state.service.get_workflows() {
        Ok(workflows) => Json(workflows).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn run_workflow(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let response = state.service.run_workflow(&id).await;
    Json(response).into_response()
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/workflows", get(list_workflows).post(save_workflow))
        .route("/workflows/:id/run", post(run_workflow))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{answer, body_json, empty_request, json_request, state};
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_save_without_tool_calls_reports_failure() {
        let app = crate::routes::configure(state(answer("done")));

        let response = app
            .clone()
            .oneshot(json_request("POST", "/query", json!({"message": "Say done"})))
            .await
            .unwrap();
        let id = body_json(response).await["conversationId"].clone();

        let response = app
            .clone()
            .oneshot(json_request("POST", "/workflows", json!({"conversationId": id})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "No successful tool calls found to save.");

        let response = app
            .oneshot(empty_request("GET", "/workflows"))
            .await
            .unwrap();
        assert_eq!(body_json(response).await, json!([]));
    }

    #[tokio::test]
    async fn test_run_unknown_workflow() {
        let app = routes(state(vec![]));
        let response = app
            .oneshot(empty_request("POST", "/workflows/missing/run"))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Workflow not found");
    }
}
