//! HTTP API
//!
//! One axum application: a health route and a single question/answer route.
//! The inference engine is loaded once and shared; generation is synchronous
//! model code, so it runs on a blocking thread.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::rag::{InferenceEngine, RagQuery, Source};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<Source>,
}

/// Error payload: `{"error": "..."}` with the matching status code.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.to_string(),
        }
    }

    fn internal(err: anyhow::Error) -> Self {
        tracing::error!("Request failed: {:#}", err);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{:#}", err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    engine: Arc<InferenceEngine>,
}

/// Build the router with both routes and permissive CORS.
pub fn app(engine: Arc<InferenceEngine>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/chat", post(chat))
        .layer(CorsLayer::permissive())
        .with_state(AppState { engine })
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "service": "medrag", "status": "ok" }))
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if request.question.trim().is_empty() {
        return Err(ApiError::bad_request("Question cannot be empty"));
    }

    let engine = state.engine.clone();
    let query = RagQuery::new(&request.question);

    let response = tokio::task::spawn_blocking(move || engine.answer(&query))
        .await
        .map_err(|e| ApiError::internal(anyhow::anyhow!("Worker thread failed: {}", e)))?
        .map_err(ApiError::internal)?;

    Ok(Json(ChatResponse {
        answer: response.answer,
        sources: response.sources,
    }))
}

/// Serve the engine until ctrl-c.
pub async fn serve(engine: Arc<InferenceEngine>, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app(engine))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install ctrl-c handler: {}", e);
        return;
    }
    tracing::info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::{EngineConfig, Generator, InferenceEngineBuilder, SamplingParams};
    use crate::retrieval::{Retriever, SearchResult};

    struct EmptyRetriever;

    impl Retriever for EmptyRetriever {
        fn retrieve(&self, _query: &str, _top_k: usize) -> anyhow::Result<Vec<SearchResult>> {
            Ok(vec![])
        }

        fn name(&self) -> &str {
            "empty"
        }
    }

    struct StaticGenerator;

    impl Generator for StaticGenerator {
        fn generate(&self, _prompt: &str, _params: &SamplingParams) -> anyhow::Result<String> {
            Ok("a canned answer".to_string())
        }

        fn model_name(&self) -> &str {
            "static"
        }

        fn max_context_length(&self) -> usize {
            4096
        }

        fn count_tokens(&self, text: &str) -> anyhow::Result<usize> {
            Ok(text.split_whitespace().count())
        }
    }

    fn state() -> AppState {
        let engine = InferenceEngineBuilder::new()
            .retriever(Arc::new(EmptyRetriever))
            .generator(Box::new(StaticGenerator))
            .config(EngineConfig::default())
            .build()
            .unwrap();
        AppState {
            engine: Arc::new(engine),
        }
    }

    #[tokio::test]
    async fn test_empty_question_is_bad_request() {
        let result = chat(
            State(state()),
            Json(ChatRequest {
                question: "   ".to_string(),
            }),
        )
        .await;

        let err = result.err().expect("empty question must be rejected");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_chat_returns_answer() {
        let result = chat(
            State(state()),
            Json(ChatRequest {
                question: "How is RDS managed?".to_string(),
            }),
        )
        .await;

        let Json(body) = result.ok().expect("valid question must succeed");
        assert_eq!(body.answer, "a canned answer");
    }

    #[tokio::test]
    async fn test_health_payload() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "ok");
    }

    #[test]
    fn test_router_builds() {
        let engine = InferenceEngineBuilder::new()
            .retriever(Arc::new(EmptyRetriever))
            .generator(Box::new(StaticGenerator))
            .build()
            .unwrap();
        let _router = app(Arc::new(engine));
    }
}
