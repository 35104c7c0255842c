//! HTTP surface for the news verification pipeline.
//!
//! Routes:
//! - `POST /api/chatbot` with `{"prompt": "..."}`
//! - `GET /health`
pub mod error;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::Instrument;
use uuid::Uuid;
use verity_common::{Result, VerityError};
use verity_config::VerityConfig;
use verity_llm::build_provider;
use verity_pipeline::{HttpClassifier, Pipeline, PipelineOutcome, PlausibilityGate};

use crate::error::{ApiError, ApiResult};

pub const APP_NAME: &str = "verity";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

/// Wire the configured provider, classifier and thresholds into a pipeline.
pub fn build_pipeline(config: &VerityConfig) -> Result<Pipeline> {
    let extraction = &config.extraction;
    let provider = build_provider(&extraction.provider, extraction.timeout())?;

    let classifier = HttpClassifier::new(
        &config.classifier.endpoint,
        config.classifier.query_param.clone(),
        config.classifier.auth_token.clone(),
    )?
    .with_timeout(config.classifier.timeout());

    let gate = PlausibilityGate::new(
        config.plausibility.min_tokens,
        config.plausibility.min_overlap,
    );

    Ok(Pipeline::new(provider, Arc::new(classifier))
        .with_priming(&extraction.priming)
        .with_generation(extraction.generation)
        .with_gate(gate))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chatbot", post(chatbot))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Anything other than a JSON object with a string `prompt` is treated as
/// missing input.
fn prompt_from(payload: std::result::Result<Json<Value>, JsonRejection>) -> Option<String> {
    match payload {
        Ok(Json(body)) => body.get("prompt").and_then(Value::as_str).map(str::to_owned),
        Err(rejection) => {
            tracing::debug!(%rejection, "request body rejected");
            None
        }
    }
}

async fn chatbot(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<PipelineOutcome>> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("chatbot", %request_id);

    async move {
        let Some(prompt) = prompt_from(payload) else {
            tracing::info!(outcome = "input_missing", "request rejected");
            return Err(ApiError::from(&VerityError::InputMissing));
        };

        match state.pipeline.run(&prompt).await {
            Ok(outcome) => {
                let category = if outcome.result.is_some() {
                    "classified"
                } else {
                    "unclassified"
                };
                tracing::info!(outcome = category, "request completed");
                Ok(Json(outcome))
            }
            Err(err @ (VerityError::InputMissing | VerityError::ContentFlagged)) => {
                tracing::info!(outcome = "rejected", error = %err, "request rejected");
                Err(ApiError::from(&err))
            }
            Err(err) => {
                tracing::error!(error = %err, "chatbot request failed");
                Err(ApiError::from(&err))
            }
        }
    }
    .instrument(span)
    .await
}
