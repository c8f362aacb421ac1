//! Conversational wizard: one model call per user reply, with the
//! extracted fields carried by the client between turns.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::{PromptBoostrError, Result};
use crate::fields::{CORE_FIELDS, MAX_FIELD_CHARS};
use crate::models::{ChatMessage, ChatRequest, ResponseFormat, WizardRequest, WizardResponse};
use crate::prompts::{WIZARD_FALLBACK_QUESTION, render_extracted_note, wizard_system_prompt};
use crate::transport::Transport;

/// Fields collected so far in a wizard session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WizardState {
    data: Map<String, Value>,
}

impl WizardState {
    pub fn new(data: Map<String, Value>) -> Self {
        let mut state = Self::default();
        state.merge(&Value::Object(data));
        state
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Merge newly extracted fields; newer values win. Nulls and blank
    /// strings never erase what is already known.
    pub fn merge(&mut self, updates: &Value) {
        let Some(updates) = updates.as_object() else {
            return;
        };
        for (key, value) in updates {
            let value = match value {
                Value::Null => continue,
                Value::String(s) => {
                    let s: String = s.trim().chars().take(MAX_FIELD_CHARS).collect();
                    if s.is_empty() {
                        continue;
                    }
                    Value::String(s)
                }
                other => other.clone(),
            };
            self.data.insert(key.clone(), value);
        }
    }

    pub fn missing_core(&self) -> Vec<&'static str> {
        CORE_FIELDS
            .iter()
            .copied()
            .filter(|f| self.get_str(f).is_none())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_core().is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.data
    }
}

/// One wizard turn as returned to the client
#[derive(Debug, Clone, PartialEq)]
pub struct WizardTurn {
    pub next_question: String,
    pub extracted: Map<String, Value>,
    pub state: WizardState,
}

impl WizardTurn {
    pub fn into_payload(self) -> WizardResponse {
        let missing_core_fields = self
            .state
            .missing_core()
            .into_iter()
            .map(str::to_string)
            .collect();
        let complete = self.state.is_complete();
        WizardResponse {
            next_question: self.next_question,
            extracted_data: self.extracted,
            merged_data: self.state.into_map(),
            missing_core_fields,
            complete,
        }
    }
}

/// Decode a raw wizard body, rejecting anything that is not
/// `{messages: [{role, content}], extractedData: {}}`.
pub fn parse_request(body: &Value) -> Result<WizardRequest> {
    let invalid = || PromptBoostrError::Validation("Invalid request body".to_string());

    let obj = body.as_object().ok_or_else(invalid)?;
    if !obj.get("messages").is_some_and(Value::is_array)
        || !obj.get("extractedData").is_some_and(Value::is_object)
    {
        return Err(invalid());
    }
    serde_json::from_value(body.clone()).map_err(|_| invalid())
}

fn is_unclear_answer(answer: &str) -> bool {
    matches!(
        answer.to_lowercase().as_str(),
        "hi" | "hello" | "idk" | "i don't know"
    )
}

/// The first user reply answers "What are we creating today?", so it
/// becomes the goal unless it is too short or a non-answer.
pub fn deduce_goal(messages: &[ChatMessage], state: &mut WizardState) {
    let mut user_messages = messages.iter().filter(|m| m.role == "user");
    let (Some(first), None) = (user_messages.next(), user_messages.next()) else {
        return;
    };
    if state.get_str("goal").is_some() {
        return;
    }

    let answer = first.content.trim();
    if answer.chars().count() > 5 && !is_unclear_answer(answer) {
        tracing::debug!("Deduced goal from first answer");
        state.merge(&serde_json::json!({ "goal": answer }));
    }
}

#[async_trait]
pub trait ConversationWizard: Send + Sync {
    async fn turn(&self, request: WizardRequest) -> Result<WizardTurn>;
}

pub struct Wizard {
    tx: Arc<dyn Transport>,
    model: String,
    temperature: f32,
}

impl Wizard {
    pub fn new(tx: Arc<dyn Transport>, model: String, temperature: f32) -> Self {
        Self {
            tx,
            model,
            temperature,
        }
    }

    fn build_request(&self, history: &[ChatMessage], state: &WizardState) -> ChatRequest {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(wizard_system_prompt()));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::system(render_extracted_note(state.as_map())));

        ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(self.temperature),
            max_tokens: None,
            response_format: Some(ResponseFormat::json_object()),
        }
    }
}

/// Parse the model's turn; `None` when it is not the expected shape.
fn parse_turn(raw: &str) -> Option<(String, Map<String, Value>)> {
    let parsed: Value = serde_json::from_str(raw).ok()?;
    let question = parsed.get("next_question")?.as_str()?.to_string();
    let extracted = parsed.get("extracted_data")?.as_object()?.clone();
    Some((question, extracted))
}

#[async_trait]
impl ConversationWizard for Wizard {
    async fn turn(&self, request: WizardRequest) -> Result<WizardTurn> {
        let history: Vec<ChatMessage> = request
            .messages
            .into_iter()
            .filter(|m| {
                let keep = m.role == "user" || m.role == "assistant";
                if !keep {
                    tracing::warn!(role = %m.role, "Dropping client message with unsupported role");
                }
                keep
            })
            .collect();

        let mut state = WizardState::new(request.extracted_data);
        deduce_goal(&history, &mut state);

        tracing::info!(
            turns = history.len(),
            missing = state.missing_core().len(),
            "Running wizard turn"
        );

        let response = self.tx.chat(&self.build_request(&history, &state)).await?;
        let Some(raw) = response.first_content() else {
            return Err(PromptBoostrError::EmptyCompletion(
                "The model did not return a response.".to_string(),
            ));
        };

        let (next_question, extracted) = match parse_turn(raw) {
            Some(turn) => turn,
            None => {
                tracing::error!("Failed to parse JSON from model: {}", raw);
                (WIZARD_FALLBACK_QUESTION.to_string(), Map::new())
            }
        };

        state.merge(&Value::Object(extracted.clone()));

        Ok(WizardTurn {
            next_question,
            extracted,
            state,
        })
    }
}
