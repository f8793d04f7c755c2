//! Notification error types

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while handing a message to the mail server
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("SMTP authentication failed: {0}")]
    Auth(String),

    #[error("SMTP connection failed: {0}")]
    Connection(String),

    #[error("SMTP exchange timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid message: {0}")]
    Message(String),
}

impl TransportError {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Auth(_) => true,
            TransportError::Connection(_) => true,
            TransportError::Timeout(_) => true,
            TransportError::Message(_) => false,
        }
    }
}

/// Errors raised while turning a payload into mail bodies
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Mail template not found: {0}")]
    TemplateNotFound(String),

    #[error("Failed to read mail template {path}: {source}")]
    TemplateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to render mail template {name}: {message}")]
    Render { name: String, message: String },
}
