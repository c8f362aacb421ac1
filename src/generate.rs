use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::{PromptBoostrError, Result};
use crate::fields::FieldSet;
use crate::models::{ChatMessage, ChatRequest, ResponseFormat};
use crate::prompts::{GENERATE_SYSTEM_PROMPT, render_generate_user};
use crate::transport::Transport;

/// A model-built prompt: readable summary plus the structured object
#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    pub model: String,
    pub markdown: String,
    pub structured: Map<String, Value>,
}

#[async_trait]
pub trait PromptGenerator: Send + Sync {
    async fn generate(&self, fields: &FieldSet) -> Result<Generated>;
}

pub struct Generator {
    tx: Arc<dyn Transport>,
    model: String,
    max_tokens: u32,
}

impl Generator {
    pub fn new(tx: Arc<dyn Transport>, model: String, max_tokens: u32) -> Self {
        Self {
            tx,
            model,
            max_tokens,
        }
    }

    fn build_request(&self, fields: &FieldSet) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(GENERATE_SYSTEM_PROMPT),
                ChatMessage::user(render_generate_user(fields)),
            ],
            temperature: None,
            max_tokens: Some(self.max_tokens),
            response_format: Some(ResponseFormat::json_object()),
        }
    }
}

/// Shape-check the model's JSON text: `markdown` must be a non-empty string
/// and `structured` an object.
pub fn parse_generated(raw: &str) -> Result<(String, Map<String, Value>)> {
    let parsed: Value = serde_json::from_str(raw).map_err(|_| {
        tracing::error!("Invalid JSON from model: {}", raw);
        PromptBoostrError::InvalidModelJson {
            raw: raw.to_string(),
        }
    })?;

    let markdown = parsed
        .get("markdown")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let structured = parsed.get("structured").and_then(Value::as_object).cloned();

    match (markdown, structured) {
        (Some(markdown), Some(structured)) => Ok((markdown, structured)),
        _ => {
            tracing::error!("Malformed JSON from model (missing keys): {}", parsed);
            Err(PromptBoostrError::MalformedModelJson { raw: parsed })
        }
    }
}

#[async_trait]
impl PromptGenerator for Generator {
    async fn generate(&self, fields: &FieldSet) -> Result<Generated> {
        tracing::info!(fields = fields.len(), model = %self.model, "Generating prompt");

        let request = self.build_request(fields);
        let response = self.tx.chat(&request).await?;

        let Some(raw) = response.first_content() else {
            return Err(PromptBoostrError::EmptyCompletion(
                "No content returned by model.".to_string(),
            ));
        };

        let (markdown, structured) = parse_generated(raw)?;

        Ok(Generated {
            model: response.model.clone().unwrap_or_else(|| self.model.clone()),
            markdown,
            structured,
        })
    }
}
