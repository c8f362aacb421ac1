use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

pub type Result<T, E = PromptBoostrError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PromptBoostrError {
    /// Client sent a body that failed field validation
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    /// The completions API answered with an error or could not be reached
    #[error("{message}")]
    Upstream {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("{0}")]
    EmptyCompletion(String),

    #[error("Invalid JSON from model.")]
    InvalidModelJson { raw: String },

    #[error("Malformed JSON from model (missing 'markdown' or 'structured' key).")]
    MalformedModelJson { raw: serde_json::Value },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    ok: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw_response: Option<serde_json::Value>,
}

impl PromptBoostrError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            // Upstream status passes through when it is a usable error status
            Self::Upstream { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::InvalidModelJson { .. } | Self::MalformedModelJson { .. } => {
                StatusCode::BAD_GATEWAY
            }
            Self::EmptyCompletion(_)
            | Self::Config(_)
            | Self::Serialization(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn raw_response(&self) -> Option<serde_json::Value> {
        match self {
            Self::InvalidModelJson { raw } => Some(serde_json::Value::String(raw.clone())),
            Self::MalformedModelJson { raw } => Some(raw.clone()),
            _ => None,
        }
    }
}

impl IntoResponse for PromptBoostrError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            ok: false,
            error: self.to_string(),
            raw_response: self.raw_response(),
        };
        (status, Json(body)).into_response()
    }
}
