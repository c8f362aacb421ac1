use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::error::{PromptBoostrError, Result};
use crate::fields::MAX_FIELD_CHARS;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionKind {
    SingleChoice,
    TextInput,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionOption {
    pub label: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_question_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub field_to_set: String,
    #[serde(default, deserialize_with = "deserialize_null_as_empty")]
    pub options: Vec<QuestionOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_question_id: Option<String>,
    #[serde(default)]
    pub is_start_node: bool,
}

/// Text-input questions exported with `options: null` load as having no options
fn deserialize_null_as_empty<'de, D>(deserializer: D) -> Result<Vec<QuestionOption>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<QuestionOption>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Result of answering one question
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TreeStep {
    Next {
        question: Question,
        answers: BTreeMap<String, String>,
    },
    Finished {
        answers: BTreeMap<String, String>,
    },
}

#[derive(Debug, Deserialize)]
struct TreeFile {
    questions: Vec<Question>,
}

/// Static question graph walked by the decision-tree wizard
#[derive(Debug, Clone)]
pub struct QuestionTree {
    questions: HashMap<String, Question>,
    start_id: String,
}

impl QuestionTree {
    pub fn from_questions(questions: Vec<Question>) -> Result<Self> {
        let invalid = |msg: String| PromptBoostrError::Config(format!("Invalid question tree: {msg}"));

        let mut ids = HashSet::new();
        for q in &questions {
            if !ids.insert(q.id.as_str()) {
                return Err(invalid(format!("duplicate question id '{}'", q.id)));
            }
        }

        let starts: Vec<&Question> = questions.iter().filter(|q| q.is_start_node).collect();
        let start_id = match starts.as_slice() {
            [only] => only.id.clone(),
            [] => return Err(invalid("no start node".to_string())),
            _ => return Err(invalid("more than one start node".to_string())),
        };

        for q in &questions {
            if q.kind == QuestionKind::SingleChoice && q.options.is_empty() {
                return Err(invalid(format!("single-choice question '{}' has no options", q.id)));
            }
            let targets = q
                .next_question_id
                .iter()
                .chain(q.options.iter().filter_map(|o| o.next_question_id.as_ref()));
            for target in targets {
                if !ids.contains(target.as_str()) {
                    return Err(invalid(format!(
                        "question '{}' points to unknown question '{}'",
                        q.id, target
                    )));
                }
            }
        }

        let questions = questions.into_iter().map(|q| (q.id.clone(), q)).collect();
        Ok(Self {
            questions,
            start_id,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            PromptBoostrError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let file: TreeFile = serde_yaml::from_str(&contents).map_err(|e| {
            PromptBoostrError::Config(format!("Failed to parse {}: {e}", path.display()))
        })?;
        let tree = Self::from_questions(file.questions)?;
        tracing::info!(questions = tree.len(), "Loaded question tree from {}", path.display());
        Ok(tree)
    }

    /// Tree from the configured file, or the built-in one when unset or unusable
    pub fn load_or_default(path: Option<&str>) -> Self {
        match path.map(Self::load) {
            Some(Ok(tree)) => tree,
            Some(Err(e)) => {
                tracing::warn!("{} - using built-in question tree", e);
                Self::builtin()
            }
            None => Self::builtin(),
        }
    }

    /// Text-input path over the five core fields, with a category choice up front
    pub fn builtin() -> Self {
        let questions = builtin_questions()
            .into_iter()
            .map(|q| (q.id.clone(), q))
            .collect();
        Self {
            questions,
            start_id: "category".to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn start(&self) -> &Question {
        &self.questions[&self.start_id]
    }

    pub fn get(&self, id: &str) -> Result<&Question> {
        self.questions
            .get(id)
            .ok_or_else(|| PromptBoostrError::NotFound(format!("Unknown question '{id}'")))
    }

    /// Record `value` for the question and move to the next one.
    pub fn answer(
        &self,
        question_id: &str,
        value: &str,
        mut answers: BTreeMap<String, String>,
    ) -> Result<TreeStep> {
        let question = self.get(question_id)?;
        let value: String = value.trim().chars().take(MAX_FIELD_CHARS).collect();
        if value.is_empty() {
            return Err(PromptBoostrError::Validation("Answer must not be empty".to_string()));
        }

        let chosen_next = match question.kind {
            QuestionKind::SingleChoice => {
                let option = question
                    .options
                    .iter()
                    .find(|o| o.value == value)
                    .ok_or_else(|| {
                        PromptBoostrError::Validation(format!(
                            "'{value}' is not an option of question '{}'",
                            question.id
                        ))
                    })?;
                option.next_question_id.clone()
            }
            QuestionKind::TextInput => None,
        };

        answers.insert(question.field_to_set.clone(), value);

        match chosen_next.or_else(|| question.next_question_id.clone()) {
            Some(next_id) => Ok(TreeStep::Next {
                question: self.get(&next_id)?.clone(),
                answers,
            }),
            None => {
                tracing::info!(answers = answers.len(), "Question tree finished");
                Ok(TreeStep::Finished { answers })
            }
        }
    }
}

fn builtin_questions() -> Vec<Question> {
    let text = |id: &str, text: &str, field: &str, next: Option<&str>| Question {
        id: id.to_string(),
        text: text.to_string(),
        kind: QuestionKind::TextInput,
        field_to_set: field.to_string(),
        options: Vec::new(),
        next_question_id: next.map(str::to_string),
        is_start_node: false,
    };
    let option = |label: &str, value: &str| QuestionOption {
        label: label.to_string(),
        value: value.to_string(),
        next_question_id: None,
    };

    vec![
        Question {
            id: "category".to_string(),
            text: "What are we creating today?".to_string(),
            kind: QuestionKind::SingleChoice,
            field_to_set: "category".to_string(),
            options: vec![
                option("Text", "Text"),
                option("Image", "Image"),
                option("Analysis", "Analysis"),
                option("General knowledge", "General knowledge"),
            ],
            next_question_id: Some("goal".to_string()),
            is_start_node: true,
        },
        text("goal", "What is the goal of the prompt?", "goal", Some("role")),
        text("role", "Which role should the model play?", "role", Some("context")),
        text("context", "What context should the model know about?", "context", Some("format")),
        text("format", "What format should the answer take?", "format", Some("constraints")),
        text("constraints", "Any constraints to respect?", "constraints", None),
    ]
}
