use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value, json};
use std::time::Duration;

use crate::error::{PromptBoostrError, Result};
use crate::fields::CORE_FIELDS;
use crate::models::{ApiErrorEnvelope, ChatRequest, ChatResponse};
use crate::prompts::GENERATE_SYSTEM_PROMPT;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse>;
}

/// Chat-completions client for OpenAI-compatible endpoints. One attempt per call.
pub struct OpenAiTransport {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl OpenAiTransport {
    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PromptBoostrError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
        })
    }
}

#[async_trait]
impl Transport for OpenAiTransport {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        tracing::debug!(model = %req.model, messages = req.messages.len(), "Sending chat completion");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(req)
            .send()
            .await
            .map_err(|e| PromptBoostrError::Upstream {
                status: 502,
                code: None,
                message: format!("Failed to reach completions API: {e}"),
            })?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<ChatResponse>()
                .await
                .map_err(|e| PromptBoostrError::Upstream {
                    status: 502,
                    code: None,
                    message: format!("Failed to parse completions API response: {e}"),
                });
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        tracing::warn!(status = status.as_u16(), "Completions API returned an error");
        Err(upstream_error(status.as_u16(), &body))
    }
}

/// Turn an error body into an `Upstream` error, keeping the API's code and message when present.
fn upstream_error(status: u16, body: &str) -> PromptBoostrError {
    match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) => {
            let code = match envelope.error.code {
                Some(Value::String(s)) => Some(s),
                Some(Value::Null) | None => envelope.error.kind,
                Some(other) => Some(other.to_string()),
            };
            PromptBoostrError::Upstream {
                status,
                code,
                message: envelope
                    .error
                    .message
                    .unwrap_or_else(|| format!("Completions API error ({status})")),
            }
        }
        Err(_) => PromptBoostrError::Upstream {
            status,
            code: None,
            message: format!("Completions API error ({status}): {body}"),
        },
    }
}

/// Offline transport used in mock mode: canned answers, no network.
#[derive(Debug, Default)]
pub struct MockTransport;

const MOCK_MODEL: &str = "mock";
const EXTRACTED_MARKER: &str = "Extracted data: ";

impl MockTransport {
    fn generate_reply(req: &ChatRequest) -> Value {
        let user = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let mut structured = Map::new();
        for line in user.lines().take_while(|l| !l.is_empty()) {
            if let Some((label, value)) = line.split_once(": ") {
                structured.insert(label.to_lowercase().replace(' ', "_"), json!(value));
            }
        }
        let final_prompt = user.split("\n\n").next().unwrap_or_default().to_string();
        structured.insert("final_prompt".to_string(), json!(final_prompt));

        json!({
            "markdown": format!("## Summary\nMock prompt built offline.\n\n## Model instructions\n{final_prompt}"),
            "structured": structured,
        })
    }

    fn wizard_reply(req: &ChatRequest) -> Value {
        let state: Map<String, Value> = req
            .messages
            .iter()
            .rev()
            .filter(|m| m.role == "system")
            .find_map(|m| m.content.split_once(EXTRACTED_MARKER))
            .and_then(|(_, raw)| serde_json::from_str(raw).ok())
            .unwrap_or_default();

        let is_filled = |key: &str| {
            state
                .get(key)
                .and_then(Value::as_str)
                .is_some_and(|s| !s.trim().is_empty())
        };
        let mut missing = CORE_FIELDS.iter().copied().filter(|f| !is_filled(f));

        let last_user = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.trim().to_string())
            .unwrap_or_default();
        let already_stored = state.values().any(|v| v.as_str() == Some(last_user.as_str()));

        let mut extracted = Map::new();
        let mut next = missing.next();
        if let Some(field) = next {
            if !last_user.is_empty() && !already_stored {
                extracted.insert(field.to_string(), json!(last_user));
                next = missing.next();
            }
        }

        let next_question = match next {
            Some(field) => format!(
                "What should the {field} be?\n\nFor example:\n- 'A first idea'\n- 'Another idea'"
            ),
            None => "All core fields are filled. Anything to add about audience or tone?".to_string(),
        };

        json!({ "next_question": next_question, "extracted_data": extracted })
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let is_generate = req
            .messages
            .first()
            .is_some_and(|m| m.role == "system" && m.content == GENERATE_SYSTEM_PROMPT);

        let content = if is_generate {
            Self::generate_reply(req).to_string()
        } else if req.wants_json() {
            Self::wizard_reply(req).to_string()
        } else {
            "pong".to_string()
        };

        let response = json!({
            "model": MOCK_MODEL,
            "choices": [{ "message": { "role": "assistant", "content": content } }],
        });
        Ok(serde_json::from_value(response)?)
    }
}
