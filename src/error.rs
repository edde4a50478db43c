//! HTTP error type.
//!
//! Handlers return `Result<T, ApiError>`; the `IntoResponse` impl renders the
//! JSON error bodies clients key on (`error`, `errorDetail`, `platform`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing url")]
    MissingUrl,

    #[error("Invalid url")]
    InvalidUrl,

    #[error("not found: {0}")]
    NotFound(String),

    /// Extraction worked but nothing playable came out of it.
    #[error("no playable media: {detail}")]
    NoPlayableMedia { detail: String, platform: String },

    /// Extraction failed; `error` is the client-facing summary.
    #[error("{error}: {detail}")]
    Extraction {
        error: String,
        detail: String,
        platform: Option<String>,
    },

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn extraction(error: impl Into<String>, err: &anyhow::Error, platform: Option<&str>) -> Self {
        ApiError::Extraction {
            error: error.into(),
            detail: format!("{:#}", err),
            platform: platform.map(String::from),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingUrl | ApiError::InvalidUrl => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NoPlayableMedia { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Extraction { .. } | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::MissingUrl | ApiError::InvalidUrl => json!({ "error": self.to_string() }),
            ApiError::NotFound(m) => json!({ "error": m }),
            ApiError::NoPlayableMedia { detail, platform } => json!({
                "error": "No playable media found",
                "errorDetail": detail,
                "platform": platform,
            }),
            ApiError::Extraction {
                error: summary,
                detail,
                platform,
            } => {
                error!(error = %summary, detail = %detail, "extraction failed");
                match platform {
                    Some(p) => json!({ "error": summary, "errorDetail": detail, "platform": p }),
                    None => json!({ "error": summary, "errorDetail": detail }),
                }
            }
            ApiError::Upstream(detail) => {
                error!(detail = %detail, "upstream request failed");
                json!({ "error": "Upstream request failed", "errorDetail": detail })
            }
            ApiError::Internal(m) => {
                error!(message = %m, "internal server error");
                json!({ "error": "Server error", "errorDetail": "internal server error" })
            }
        };
        (status, Json(body)).into_response()
    }
}
