//! Error types for cerberus

use thiserror::Error;

/// Main error type for cerberus operations
#[derive(Debug, Error)]
pub enum CerberusError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Access denied (HTTP {status})")]
    Auth { status: u16 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("External tool error: {0}")]
    ExternalTool(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Browser automation error: {0}")]
    Automation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Coarse failure classes reported by the fetch and orchestration layers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Auth,
    Io,
    ExternalTool,
    Extraction,
    Automation,
    Config,
    Cancelled,
}

impl CerberusError {
    /// Classify the error into its failure kind
    pub fn kind(&self) -> FailureKind {
        match self {
            CerberusError::Network(_) | CerberusError::Http(_) => FailureKind::Network,
            CerberusError::Auth { .. } => FailureKind::Auth,
            CerberusError::Io(_) => FailureKind::Io,
            CerberusError::ExternalTool(_) | CerberusError::MissingDependency(_) => {
                FailureKind::ExternalTool
            }
            CerberusError::Extraction(_) | CerberusError::Json(_) => FailureKind::Extraction,
            CerberusError::Automation(_) => FailureKind::Automation,
            CerberusError::Config(_) | CerberusError::InvalidUrl(_) => FailureKind::Config,
            CerberusError::Cancelled => FailureKind::Cancelled,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        self.kind() == FailureKind::Network
    }
}
