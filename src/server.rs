use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Path, State, rejection::BytesRejection},
    http::{HeaderMap, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::Instrument;

use crate::config::Config;
use crate::error::{PromptBoostrError, Result};
use crate::fields;
use crate::generate::{Generator, PromptGenerator};
use crate::models::{GenerateResponse, HintResponse, WizardResponse};
use crate::ping::Pinger;
use crate::transport::{MockTransport, OpenAiTransport, Transport};
use crate::tree::{Question, QuestionTree, TreeStep};
use crate::wizard::{self, ConversationWizard, Wizard};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<dyn PromptGenerator>,
    pub wizard: Arc<dyn ConversationWizard>,
    pub pinger: Arc<Pinger>,
    pub tree: Arc<QuestionTree>,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport: Arc<dyn Transport> = if config.openai.mock {
            tracing::info!("MOCK_AI enabled - completions are answered locally");
            Arc::new(MockTransport)
        } else {
            Arc::new(OpenAiTransport::new(
                &config.openai.base_url,
                config.openai.api_key.clone(),
                config.get_request_timeout(),
            )?)
        };

        Ok(Self::with_transport(config, transport))
    }

    pub fn with_transport(config: &Config, transport: Arc<dyn Transport>) -> Self {
        let model = config.openai.model.clone();
        Self {
            generator: Arc::new(Generator::new(
                Arc::clone(&transport),
                model.clone(),
                config.generate.max_tokens,
            )),
            wizard: Arc::new(Wizard::new(
                Arc::clone(&transport),
                model.clone(),
                config.wizard.temperature,
            )),
            pinger: Arc::new(Pinger::new(transport, model, config.openai.mock)),
            tree: Arc::new(QuestionTree::load_or_default(
                config.questions.path.as_deref(),
            )),
        }
    }
}

pub fn router(state: AppState, config: &Config) -> Router {
    let mut router = Router::new()
        .route("/api/generate", get(generate_hint).post(generate))
        .route("/api/tree-wizard", get(wizard_hint).post(wizard_turn))
        .route("/api/wizard", get(wizard_hint).post(wizard_turn))
        .route("/api/ping", get(ping))
        .route("/api/questions/start", get(question_start))
        .route("/api/questions/:id", get(question_get))
        .route("/api/questions/:id/answer", axum::routing::post(question_answer))
        .layer(DefaultBodyLimit::max(config.server.body_limit_bytes))
        .layer(middleware::from_fn(trace_request));

    if let Some(expected) = config.server.bearer_token.clone() {
        router = router.layer(middleware::from_fn_with_state(
            Arc::new(expected),
            require_bearer,
        ));
    }

    // Added after the layers so health checks skip auth and tracing
    router
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
}

async fn trace_request(req: Request<Body>, next: Next) -> Response {
    let span = tracing::info_span!(
        "request",
        id = %uuid::Uuid::new_v4(),
        method = %req.method(),
        path = %req.uri().path(),
    );
    async move {
        let response = next.run(req).await;
        tracing::info!(status = response.status().as_u16(), "Handled request");
        response
    }
    .instrument(span)
    .await
}

async fn require_bearer(
    State(expected): State<Arc<String>>,
    req: Request<Body>,
    next: Next,
) -> impl IntoResponse {
    let headers: &HeaderMap = req.headers();
    let header_ok = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", expected.as_str()));
    // Fallback for clients that cannot set headers: access_token or token query keys
    let query_ok = req.uri().query().is_some_and(|q| {
        q.split('&').filter_map(|pair| pair.split_once('=')).any(|(k, v)| {
            (k == "access_token" || k == "token") && v == expected.as_str()
        })
    });
    if !header_ok && !query_ok {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }
    next.run(req).await
}

/// Buffered request body, with limit and read failures reported in the JSON error shape
fn read_body(body: Result<Bytes, BytesRejection>) -> Result<Bytes> {
    body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            tracing::warn!("Rejected oversized request body");
            PromptBoostrError::PayloadTooLarge(rejection.body_text())
        } else {
            PromptBoostrError::Validation(rejection.body_text())
        }
    })
}

async fn generate(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<GenerateResponse>> {
    let body = read_body(body)?;
    // An unparseable body counts as an empty object
    let body: Value = serde_json::from_slice(&body).unwrap_or_else(|_| Value::Object(Default::default()));
    let fields = fields::validate(&body)?;

    let generated = state.generator.generate(&fields).await?;
    Ok(Json(GenerateResponse {
        ok: true,
        model: generated.model,
        markdown: generated.markdown,
        structured: generated.structured,
    }))
}

async fn generate_hint() -> Json<HintResponse> {
    Json(HintResponse {
        ok: true,
        hint: "POST JSON { role, goal, context, format, constraints, ...optional_fields } to generate your prompt.".to_string(),
    })
}

async fn wizard_turn(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<WizardResponse>> {
    let body = read_body(body)?;
    let body: Value = serde_json::from_slice(&body)
        .map_err(|_| PromptBoostrError::Validation("Invalid request body".to_string()))?;
    let request = wizard::parse_request(&body)?;

    let turn = state.wizard.turn(request).await?;
    Ok(Json(turn.into_payload()))
}

async fn wizard_hint() -> Json<HintResponse> {
    Json(HintResponse {
        ok: true,
        hint: "This is the conversational wizard API. POST with { messages, extractedData }.".to_string(),
    })
}

async fn ping(State(state): State<AppState>) -> Response {
    let (status, body) = state.pinger.ping().await;
    (status, Json(body)).into_response()
}

async fn question_start(State(state): State<AppState>) -> Json<Question> {
    Json(state.tree.start().clone())
}

async fn question_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Question>> {
    Ok(Json(state.tree.get(&id)?.clone()))
}

#[derive(Debug, Deserialize)]
struct AnswerRequest {
    value: String,
    #[serde(default)]
    answers: BTreeMap<String, String>,
}

async fn question_answer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<TreeStep>> {
    let body = read_body(body)?;
    let request: AnswerRequest = serde_json::from_slice(&body).map_err(|_| {
        PromptBoostrError::Validation("Body must be JSON { value, answers }.".to_string())
    })?;
    Ok(Json(state.tree.answer(&id, &request.value, request.answers)?))
}
