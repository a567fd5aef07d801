//! Transport trait and error types

use crate::domain::{DeliveryPayload, LogId, TemplateFields};
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Mail transport not configured")]
    NotConfigured,

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Attachment error: {0}")]
    Attachment(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    /// A transport precondition on the message or its settings failed
    #[error("{0}")]
    Precondition(String),
}

/// Sender identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub email: String,
    pub name: Option<String>,
}

impl Sender {
    pub fn new(email: impl Into<String>, name: Option<String>) -> Self {
        Self {
            email: email.into(),
            name,
        }
    }

    /// `Name <email>` or the bare address
    pub fn formatted(&self) -> String {
        match self.name.as_deref().filter(|n| !n.is_empty()) {
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }
}

/// Addressing shared by both send operations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub from_email: Option<String>,
    pub from_name: Option<String>,
    pub log_id: Option<LogId>,
}

impl Envelope {
    /// Sender for this message; the transport's configured sender fills the gaps
    pub fn sender(&self, fallback: &Sender) -> Sender {
        let email = self
            .from_email
            .as_deref()
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| fallback.email.clone());
        let name = self
            .from_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .or_else(|| fallback.name.clone());

        Sender { email, name }
    }
}

/// Attachment materialized on local disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAttachment {
    pub path: PathBuf,
    pub file_name: String,
    pub content_type: String,
}

impl ResolvedAttachment {
    pub async fn read(&self) -> Result<Vec<u8>, TransportError> {
        tokio::fs::read(&self.path).await.map_err(|e| {
            TransportError::Attachment(format!("{}: {}", self.path.display(), e))
        })
    }
}

/// Fully composed message rendered by us
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub envelope: Envelope,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<ResolvedAttachment>,
}

/// Message rendered by the provider from one of its own templates
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceTemplateMail {
    pub envelope: Envelope,
    pub template_id: String,
    pub fields: TemplateFields,
    pub subject: Option<String>,
    pub attachments: Vec<ResolvedAttachment>,
}

/// Provider-agnostic mail transport
///
/// The delivery worker treats every error returned here as a failed send.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a message whose subject and body we rendered
    async fn send(&self, mail: &OutgoingMail) -> Result<(), TransportError>;

    /// Send a message rendered by a provider-side template
    async fn send_using_service_template(
        &self,
        mail: &ServiceTemplateMail,
    ) -> Result<(), TransportError>;

    /// Transport specific preconditions, run before attachments are fetched
    fn prepare(&self, _payload: &mut DeliveryPayload) -> Result<(), TransportError> {
        Ok(())
    }

    /// Get the transport name
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_transport() {
        let mut mock = MockTransport::new();

        mock.expect_name().returning(|| "mock");
        mock.expect_send().returning(|_| Ok(()));

        assert_eq!(mock.name(), "mock");

        let mail = OutgoingMail {
            envelope: Envelope {
                to: vec!["to@example.com".to_string()],
                ..Default::default()
            },
            subject: "Test".to_string(),
            body: "<p>Hello</p>".to_string(),
            attachments: vec![],
        };
        assert!(mock.send(&mail).await.is_ok());
    }

    #[test]
    fn test_transport_error_display() {
        let errors = vec![
            TransportError::NotConfigured,
            TransportError::ConnectionError("timeout".to_string()),
            TransportError::AuthenticationFailed("bad password".to_string()),
            TransportError::SendFailed("recipient rejected".to_string()),
            TransportError::InvalidConfiguration("missing host".to_string()),
            TransportError::RateLimited,
            TransportError::Attachment("missing".to_string()),
            TransportError::NotSupported("templates".to_string()),
        ];

        for err in errors {
            let msg = err.to_string();
            assert!(!msg.is_empty());
        }
    }

    #[test]
    fn test_sender_formatted() {
        let sender = Sender::new("a@example.com", Some("Alice".to_string()));
        assert_eq!(sender.formatted(), "Alice <a@example.com>");

        let sender = Sender::new("a@example.com", Some(String::new()));
        assert_eq!(sender.formatted(), "a@example.com");
    }

    #[test]
    fn test_envelope_sender_fallback() {
        let fallback = Sender::new("noreply@example.com", Some("Example".to_string()));

        let envelope = Envelope::default();
        assert_eq!(envelope.sender(&fallback), fallback);

        let envelope = Envelope {
            from_email: Some("shop@example.com".to_string()),
            from_name: Some("Shop".to_string()),
            ..Default::default()
        };
        let sender = envelope.sender(&fallback);
        assert_eq!(sender.email, "shop@example.com");
        assert_eq!(sender.name.as_deref(), Some("Shop"));

        let envelope = Envelope {
            from_email: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(envelope.sender(&fallback).email, "noreply@example.com");
    }

    #[tokio::test]
    async fn test_resolved_attachment_read_missing_file() {
        let attachment = ResolvedAttachment {
            path: PathBuf::from("/nonexistent/mailroom-attachment"),
            file_name: "a.txt".to_string(),
            content_type: "text/plain".to_string(),
        };
        assert!(matches!(
            attachment.read().await,
            Err(TransportError::Attachment(_))
        ));
    }
}
