use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream error: {message}")]
    Upstream {
        /// HTTP status when the failure came off the wire, `None` for
        /// upstream failures with no response to classify.
        status: Option<StatusCode>,
        message: String,
    },

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    pub fn upstream(message: impl Into<String>) -> Self {
        AppError::Upstream {
            status: None,
            message: message.into(),
        }
    }

    /// Transient failures worth retrying for idempotent reads. Client
    /// errors (4xx) are deterministic rejections and never retried;
    /// mutations are never retried automatically regardless of this
    /// classification.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::HttpClient(e) => e.is_timeout() || e.is_connect(),
            AppError::Upstream { status, .. } => {
                status.map_or(true, |status| status.is_server_error())
            }
            _ => false,
        }
    }

    /// Message suitable for a blocking notification in the screen layer.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(message) => message.clone(),
            AppError::NotFound(message) => message.clone(),
            AppError::Upload(_) => "Image upload failed".to_string(),
            AppError::Authentication(_) => "Please sign in and try again".to_string(),
            AppError::Upstream { .. } | AppError::HttpClient(_) | AppError::Serialization(_) => {
                "Something went wrong, please try again".to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

// Validation helper
impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let error_messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| {
                    format!(
                        "{}: {}",
                        field,
                        error.message.as_ref().unwrap_or(&"Invalid value".into())
                    )
                })
            })
            .collect();

        AppError::Validation(error_messages.join(", "))
    }
}
