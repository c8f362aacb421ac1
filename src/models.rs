use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// Chat message format shared by the completions API and the wizard client
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            kind: "json_object".to_string(),
        }
    }
}

// Completions API request format
#[derive(Debug, Serialize, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

impl ChatRequest {
    pub fn wants_json(&self) -> bool {
        self.response_format
            .as_ref()
            .is_some_and(|f| f.kind == "json_object")
    }
}

// Completions API response format
#[derive(Debug, Deserialize, Clone)]
pub struct ChatResponse {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Choice {
    pub message: ChoiceMessage,
}

/// Assistant message; `content` is null for refusals and tool calls
#[derive(Debug, Deserialize, Clone)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatResponse {
    /// Text of the first choice, if any and non-empty
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .filter(|s| !s.is_empty())
    }
}

/// Error envelope returned by OpenAI-compatible APIs
#[derive(Debug, Deserialize)]
pub struct ApiErrorEnvelope {
    pub error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// Successful body of POST /api/generate
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerateResponse {
    pub ok: bool,
    pub model: String,
    pub markdown: String,
    pub structured: Map<String, Value>,
}

/// Body of GET hints and probes
#[derive(Debug, Serialize, Deserialize)]
pub struct HintResponse {
    pub ok: bool,
    pub hint: String,
}

/// Body of POST /api/tree-wizard
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardRequest {
    pub messages: Vec<ChatMessage>,
    pub extracted_data: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WizardResponse {
    pub next_question: String,
    pub extracted_data: Map<String, Value>,
    pub merged_data: Map<String, Value>,
    pub missing_core_fields: Vec<String>,
    pub complete: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PingResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
