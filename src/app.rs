use crate::config::RuntimeConfig;
use crate::error::{AppError, AppResult};
use crate::upstream::OpenAiClient;
use axum::Router;
use axum::http::HeaderName;
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<RuntimeConfig>,
    pub client: OpenAiClient,
}

pub fn load_state() -> AppResult<AppState> {
    load_state_with_runtime(RuntimeConfig::from_env())
}

pub fn load_state_with_runtime(runtime: RuntimeConfig) -> AppResult<AppState> {
    if runtime.client.api_keys.is_none() {
        tracing::warn!("OPENAI_API_KEY is not set; only caller-supplied keys will authenticate");
    }
    let client = OpenAiClient::new(runtime.client.clone()).map_err(AppError::from)?;
    Ok(AppState {
        runtime: Arc::new(runtime),
        client,
    })
}

pub fn build_app(state: AppState) -> Router {
    Router::<AppState>::new()
        .route("/healthz", get(crate::handlers::healthz))
        .route("/api/completions", post(crate::handlers::create_completion))
        .with_state(state)
        .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
        .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
}
