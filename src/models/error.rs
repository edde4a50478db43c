use thiserror::Error;

/// Extraction failures that change what the caller does next. Everything
/// else travels as a plain `anyhow::Error`.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The platform wants a logged-in session; retrying other methods
    /// without credentials will not help.
    #[error("authentication required: {0}")]
    AuthRequired(String),

    #[error("no media found: {0}")]
    NoMedia(String),
}

impl ExtractError {
    pub fn is_auth_required(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<ExtractError>(),
            Some(ExtractError::AuthRequired(_))
        )
    }
}
