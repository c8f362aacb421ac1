use axum::http::StatusCode;
use std::sync::Arc;

use crate::error::PromptBoostrError;
use crate::models::{ChatMessage, ChatRequest, PingResponse};
use crate::transport::Transport;

const QUOTA_HINT: &str =
    "OpenAI quota exceeded: add billing or enable MOCK_AI to develop without calling the API.";

/// Cheap round-trip to the completions API
pub struct Pinger {
    tx: Arc<dyn Transport>,
    model: String,
    mock: bool,
}

impl Pinger {
    pub fn new(tx: Arc<dyn Transport>, model: String, mock: bool) -> Self {
        Self { tx, model, mock }
    }

    pub async fn ping(&self) -> (StatusCode, PingResponse) {
        if self.mock {
            return (
                StatusCode::OK,
                PingResponse {
                    ok: true,
                    model: Some("mock".to_string()),
                    text: Some("pong".to_string()),
                    code: None,
                    message: None,
                },
            );
        }

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system("You are a concise assistant."),
                ChatMessage::user("Reply with 'pong' only."),
            ],
            temperature: None,
            max_tokens: Some(5),
            response_format: None,
        };

        match self.tx.chat(&request).await {
            Ok(response) => (
                StatusCode::OK,
                PingResponse {
                    ok: true,
                    model: Some(self.model.clone()),
                    text: Some(response.first_content().unwrap_or("no response").to_string()),
                    code: None,
                    message: None,
                },
            ),
            Err(e) => {
                tracing::warn!("Ping failed: {}", e);
                ping_failure(e)
            }
        }
    }
}

fn ping_failure(err: PromptBoostrError) -> (StatusCode, PingResponse) {
    let (status, code, message) = match err {
        PromptBoostrError::Upstream {
            status,
            code,
            message,
        } => (status, code, message),
        other => (500, None, other.to_string()),
    };
    let code = code.unwrap_or_else(|| "unknown".to_string());
    let message = if code == "insufficient_quota" {
        QUOTA_HINT.to_string()
    } else {
        message
    };
    let status = if status == 429 {
        StatusCode::TOO_MANY_REQUESTS
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    (
        status,
        PingResponse {
            ok: false,
            model: None,
            text: None,
            code: Some(code),
            message: Some(message),
        },
    )
}
