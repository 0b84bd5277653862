use crate::app::AppState;
use crate::error::AppResult;
use crate::payload::CompletionPayload;
use crate::upstream::Completion;
use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct CompletionRequest {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(flatten)]
    pub payload: CompletionPayload,
}

pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn create_completion(
    State(state): State<AppState>,
    Json(req): Json<CompletionRequest>,
) -> AppResult<Response> {
    let api_key = req.api_key.as_deref().filter(|k| !k.trim().is_empty());
    if api_key.is_some() {
        tracing::info!("using caller-supplied api key");
    }
    match state.client.complete(&req.payload, api_key).await {
        Ok(Completion::Text(result)) => Ok(Json(json!({ "result": result })).into_response()),
        Ok(Completion::Stream(stream)) => Ok((
            [
                (CONTENT_TYPE, "text/plain; charset=utf-8"),
                (CACHE_CONTROL, "no-cache"),
            ],
            Body::from_stream(stream),
        )
            .into_response()),
        Err(err) => {
            tracing::warn!(error = %err, "completion failed");
            Err(err.into())
        }
    }
}
