//! Prompt field catalogue and request validation.

use serde_json::Value;

use crate::error::{PromptBoostrError, Result};

/// Fields every generation request must carry
pub const CORE_FIELDS: [&str; 5] = ["role", "goal", "context", "format", "constraints"];

/// Refinements the form and wizard may send
pub const OPTIONAL_FIELDS: [&str; 20] = [
    "category",
    "subCategory",
    "audience",
    "tone",
    "length",
    "style",
    "subject",
    "mood",
    "palette",
    "detailLevel",
    "ratio",
    "dataType",
    "period",
    "deliverableType",
    "recommendationsCount",
    "complexity",
    "includeExample",
    "explicitRole",
    "validationCriteria",
    "targetApplication",
];

pub const MAX_FIELD_CHARS: usize = 5000;

/// Known fields in catalogue order, core first
pub fn all_fields() -> impl Iterator<Item = &'static str> {
    CORE_FIELDS.iter().chain(OPTIONAL_FIELDS.iter()).copied()
}

/// Validated field values, kept in catalogue order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSet {
    entries: Vec<(&'static str, String)>,
}

impl FieldSet {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.entries.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Trim and cap a field value; anything but a string becomes empty.
pub fn sanitize(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().chars().take(MAX_FIELD_CHARS).collect(),
        _ => String::new(),
    }
}

pub fn validate(body: &Value) -> Result<FieldSet> {
    let Some(obj) = body.as_object() else {
        return Err(PromptBoostrError::Validation("Body must be JSON.".to_string()));
    };

    let mut entries = Vec::new();
    let mut missing = Vec::new();

    for field in all_fields() {
        let value = match obj.get(field) {
            Some(Value::Null) | None => String::new(),
            Some(v) => sanitize(v),
        };
        if value.is_empty() {
            if CORE_FIELDS.contains(&field) {
                missing.push(field);
            }
            continue;
        }
        entries.push((field, value));
    }

    if !missing.is_empty() {
        return Err(PromptBoostrError::Validation(format!(
            "Missing core fields: {}",
            missing.join(", ")
        )));
    }

    Ok(FieldSet { entries })
}

/// Human label for a camelCase key: `subCategory` becomes `Sub Category`.
pub fn label_for(key: &str) -> String {
    let mut label = String::with_capacity(key.len() + 4);
    for (i, ch) in key.chars().enumerate() {
        if i == 0 {
            label.extend(ch.to_uppercase());
        } else if ch.is_uppercase() {
            label.push(' ');
            label.push(ch);
        } else {
            label.push(ch);
        }
    }
    label
}
