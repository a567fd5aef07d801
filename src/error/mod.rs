//! Unified error handling for Mailroom

use crate::mail::TransportError;
use thiserror::Error;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, MailError>;

/// Mail pipeline error types
///
/// Only configuration and validation problems surface through this type to
/// callers of the executor. Delivery-time failures are recorded on the
/// delivery log by the worker and never propagate.
#[derive(Error, Debug)]
pub enum MailError {
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Delivery queue is closed")]
    QueueClosed,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl MailError {
    /// Short machine-readable kind, used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            MailError::TemplateNotFound(_) => "template_not_found",
            MailError::InvalidMessage(_) => "invalid_message",
            MailError::Transport(_) => "transport",
            MailError::Configuration(_) => "configuration",
            MailError::QueueClosed => "queue_closed",
            MailError::Database(_) => "database",
            MailError::Serialization(_) => "serialization",
            MailError::Internal(_) => "internal",
        }
    }
}

// Conversion from validation errors
impl From<validator::ValidationErrors> for MailError {
    fn from(errors: validator::ValidationErrors) -> Self {
        MailError::Configuration(errors.to_string())
    }
}
