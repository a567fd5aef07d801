//! Transport that writes messages to the application log

use super::transport::{OutgoingMail, ServiceTemplateMail, Transport, TransportError};
use async_trait::async_trait;

/// Development transport; nothing leaves the process
#[derive(Debug, Default, Clone)]
pub struct LogTransport;

impl LogTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for LogTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), TransportError> {
        let envelope = &mail.envelope;
        tracing::info!(
            log_id = ?envelope.log_id,
            to = %envelope.to.join(", "),
            cc = %envelope.cc.join(", "),
            bcc = %envelope.bcc.join(", "),
            from = ?envelope.from_email,
            subject = %mail.subject,
            attachments = mail.attachments.len(),
            "Mail message"
        );
        tracing::debug!(log_id = ?envelope.log_id, body = %mail.body, "Mail body");
        Ok(())
    }

    async fn send_using_service_template(
        &self,
        mail: &ServiceTemplateMail,
    ) -> Result<(), TransportError> {
        let envelope = &mail.envelope;
        tracing::info!(
            log_id = ?envelope.log_id,
            to = %envelope.to.join(", "),
            template = %mail.template_id,
            fields = ?mail.fields,
            attachments = mail.attachments.len(),
            "Mail message using service template"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::transport::Envelope;

    #[tokio::test]
    async fn test_log_transport_always_succeeds() {
        let transport = LogTransport::new();
        let mail = OutgoingMail {
            envelope: Envelope {
                to: vec!["a@example.com".to_string()],
                ..Default::default()
            },
            subject: "Hi".to_string(),
            body: "Body".to_string(),
            attachments: vec![],
        };

        assert!(transport.send(&mail).await.is_ok());
        assert_eq!(transport.name(), "log");
    }
}
