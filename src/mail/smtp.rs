//! SMTP transport implementation using lettre

use super::mime::build_message;
use super::transport::{OutgoingMail, Sender, ServiceTemplateMail, Transport, TransportError};
use crate::domain::SmtpConfig;
use async_trait::async_trait;
use lettre::{
    transport::smtp::authentication::Credentials, AsyncSmtpTransport, AsyncTransport,
    Tokio1Executor,
};
use std::time::Duration;

/// SMTP relay transport
pub struct SmtpTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Sender,
}

impl SmtpTransport {
    /// Create a new SMTP transport from configuration
    pub fn from_config(config: &SmtpConfig) -> Result<Self, TransportError> {
        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| TransportError::InvalidConfiguration(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            let credentials = Credentials::new(username.clone(), password.clone());
            builder = builder.credentials(credentials);
        }

        Ok(Self {
            transport: builder.build(),
            sender: Sender::new(config.from_email.clone(), config.from_name.clone()),
        })
    }
}

fn classify(error_msg: String) -> TransportError {
    if error_msg.contains("authentication") || error_msg.contains("AUTH") {
        TransportError::AuthenticationFailed(error_msg)
    } else if error_msg.contains("connection") || error_msg.contains("timeout") {
        TransportError::ConnectionError(error_msg)
    } else {
        TransportError::SendFailed(error_msg)
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), TransportError> {
        let sender = mail.envelope.sender(&self.sender);
        let email = build_message(mail, &sender).await?;

        let response = self
            .transport
            .send(email)
            .await
            .map_err(|e| classify(e.to_string()))?;

        tracing::debug!(
            log_id = ?mail.envelope.log_id,
            response = ?response.message().next(),
            "SMTP relay accepted message"
        );
        Ok(())
    }

    async fn send_using_service_template(
        &self,
        _mail: &ServiceTemplateMail,
    ) -> Result<(), TransportError> {
        Err(TransportError::NotSupported(
            "SMTP has no provider-side templates".to_string(),
        ))
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}
