use thiserror::Error;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported by provider: {0}")]
    Unsupported(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("Timed out after {secs}s: {operation}")]
    Timeout { operation: String, secs: u64 },

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WalletError {
    pub fn provider(status: u16, message: impl Into<String>) -> Self {
        Self::Provider {
            status,
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// HTTP-style status code reported to callers for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::Unsupported(_) => 400,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::Provider { status, .. } => *status,
            Self::Timeout { .. } => 504,
            Self::Http(e) => e.status().map(|s| s.as_u16()).unwrap_or(502),
            Self::Store(_) | Self::Config(_) | Self::Serialization(_) => 500,
        }
    }

    /// Message safe to hand back to API callers.
    pub fn client_message(&self) -> String {
        match self {
            Self::Validation(m)
            | Self::NotFound(m)
            | Self::Unsupported(m)
            | Self::Conflict(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m) => m.clone(),
            Self::Provider { message, .. } => message.clone(),
            Self::Timeout { operation, .. } => format!("{operation} timed out"),
            Self::Http(_) => "Upstream request failed".to_string(),
            Self::Store(_) => "A storage error occurred".to_string(),
            Self::Config(_) => "Service is not fully configured".to_string(),
            Self::Serialization(_) => "Malformed upstream payload".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WalletError>;
