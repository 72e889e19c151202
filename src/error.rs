//! Error types for credential handling and image transformation.

use axum::http::StatusCode;

/// Errors surfaced by the key manager and the transformation client.
#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    /// No credential could be resolved from any source.
    #[error("no API key configured")]
    NoCredential,

    /// The validation round trip for a candidate key failed.
    #[error("API key failed validation")]
    InvalidCredential,

    /// The remote service rejected the key during real usage.
    #[error("authentication failed: {0}")]
    AuthError(String),

    /// Rate or quota limit hit.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Remote safety or policy refusal.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// The model answered with text instead of an image.
    #[error("model returned text instead of an image: {0}")]
    ModelTextOnly(String),

    /// A candidate came back without any usable segment.
    #[error("no image data in response")]
    NoImageData,

    /// The response carried no candidates.
    #[error("empty response from model")]
    EmptyResponse,

    /// Anything else, with the underlying message.
    #[error("{0}")]
    Unknown(String),

    /// A transformation is already in flight.
    #[error("a transformation is already running")]
    Busy,

    /// Caller supplied something unusable (bad data URL, unknown preset).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The persisted credential slot could not be read or written.
    #[error("storage error: {0}")]
    Storage(String),
}

impl StudioError {
    /// Stable machine-readable code for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoCredential => "no_credential",
            Self::InvalidCredential => "invalid_credential",
            Self::AuthError(_) => "auth_error",
            Self::QuotaExceeded(_) => "quota_exceeded",
            Self::ContentBlocked(_) => "content_blocked",
            Self::ModelTextOnly(_) => "model_text_only",
            Self::NoImageData => "no_image_data",
            Self::EmptyResponse => "empty_response",
            Self::Unknown(_) => "unknown",
            Self::Busy => "busy",
            Self::InvalidInput(_) => "invalid_input",
            Self::Storage(_) => "storage",
        }
    }

    /// Short sentence suitable for showing next to the action that failed.
    pub fn user_message(&self) -> String {
        match self {
            Self::NoCredential => "No API key is set. Enter one in key settings.".into(),
            Self::InvalidCredential => "That API key is not valid.".into(),
            Self::AuthError(_) => {
                "The API key was rejected. It may lack permission for this model or require billing. Please enter a key again.".into()
            }
            Self::QuotaExceeded(_) => "Quota exceeded. Wait a moment and try again.".into(),
            Self::ContentBlocked(reason) => {
                format!("The request was blocked by the safety filter ({reason}).")
            }
            Self::ModelTextOnly(text) => format!("The model did not return an image: {text}"),
            Self::NoImageData => {
                "The model did not produce an image. Check the prompt or key permissions.".into()
            }
            Self::EmptyResponse => "The model returned an empty response.".into(),
            Self::Unknown(message) => format!("Transformation failed: {message}"),
            Self::Busy => "A transformation is already running.".into(),
            Self::InvalidInput(message) => message.clone(),
            Self::Storage(_) => "Could not access the saved key.".into(),
        }
    }

    /// HTTP status used when this error is returned from the web layer.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NoCredential | Self::AuthError(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidCredential | Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::ContentBlocked(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Busy => StatusCode::CONFLICT,
            Self::ModelTextOnly(_) | Self::NoImageData | Self::EmptyResponse | Self::Unknown(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for errors that should flip the key manager offline.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthError(_))
    }
}

impl From<anyhow::Error> for StudioError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Result type alias for studio operations.
pub type Result<T> = std::result::Result<T, StudioError>;
