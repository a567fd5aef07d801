//! AWS SES transport implementation
//!
//! Messages we render are sent as raw MIME so that attachments survive.
//! Provider-side templates map onto SES stored templates.

use super::mime::build_message;
use super::transport::{OutgoingMail, Sender, ServiceTemplateMail, Transport, TransportError};
use crate::domain::SesConfig;
use async_trait::async_trait;
use aws_sdk_sesv2::{
    config::Region,
    primitives::Blob,
    types::{Destination, EmailContent, RawMessage, Template},
    Client,
};

/// AWS SES transport
///
/// Supports IAM role credentials (when running in AWS), explicit access key
/// credentials and configuration sets for tracking.
pub struct SesTransport {
    client: Client,
    sender: Sender,
    configuration_set: Option<String>,
}

impl SesTransport {
    /// Create a new SES transport from configuration
    ///
    /// This is an async operation because the AWS SDK needs to load credentials.
    pub async fn from_config(config: &SesConfig) -> Result<Self, TransportError> {
        let region = Region::new(config.region.clone());

        let sdk_config = if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let credentials = aws_sdk_sesv2::config::Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "mailroom-ses",
            );

            aws_config::from_env()
                .region(region)
                .credentials_provider(credentials)
                .load()
                .await
        } else {
            aws_config::from_env().region(region).load().await
        };

        Ok(Self {
            client: Client::new(&sdk_config),
            sender: Sender::new(config.from_email.clone(), config.from_name.clone()),
            configuration_set: config.configuration_set.clone(),
        })
    }

    fn destination(to: &[String], cc: &[String], bcc: &[String]) -> Destination {
        let non_empty = |list: &[String]| (!list.is_empty()).then(|| list.to_vec());

        Destination::builder()
            .set_to_addresses(non_empty(to))
            .set_cc_addresses(non_empty(cc))
            .set_bcc_addresses(non_empty(bcc))
            .build()
    }

    async fn dispatch(
        &self,
        sender: &Sender,
        destination: Destination,
        content: EmailContent,
    ) -> Result<Option<String>, TransportError> {
        let mut request = self
            .client
            .send_email()
            .from_email_address(sender.formatted())
            .destination(destination)
            .content(content);

        if let Some(config_set) = &self.configuration_set {
            request = request.configuration_set_name(config_set);
        }

        let response = request.send().await.map_err(|e| classify(e.to_string()))?;
        Ok(response.message_id)
    }
}

fn classify(error_msg: String) -> TransportError {
    if error_msg.contains("AccessDenied")
        || error_msg.contains("InvalidClientTokenId")
        || error_msg.contains("SignatureDoesNotMatch")
    {
        TransportError::AuthenticationFailed(error_msg)
    } else if error_msg.contains("Throttling") || error_msg.contains("rate") {
        TransportError::RateLimited
    } else if error_msg.contains("connection") || error_msg.contains("timeout") {
        TransportError::ConnectionError(error_msg)
    } else {
        TransportError::SendFailed(error_msg)
    }
}

#[async_trait]
impl Transport for SesTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), TransportError> {
        let sender = mail.envelope.sender(&self.sender);
        let message = build_message(mail, &sender).await?;

        let raw = RawMessage::builder()
            .data(Blob::new(message.formatted()))
            .build()
            .map_err(|e| TransportError::InvalidConfiguration(e.to_string()))?;
        let content = EmailContent::builder().raw(raw).build();

        let envelope = &mail.envelope;
        let message_id = self
            .dispatch(
                &sender,
                Self::destination(&envelope.to, &envelope.cc, &envelope.bcc),
                content,
            )
            .await?;

        tracing::debug!(log_id = ?envelope.log_id, ?message_id, "SES accepted message");
        Ok(())
    }

    async fn send_using_service_template(
        &self,
        mail: &ServiceTemplateMail,
    ) -> Result<(), TransportError> {
        if mail.envelope.to.is_empty() {
            return Err(TransportError::SendFailed(
                "No recipients specified".to_string(),
            ));
        }
        if !mail.attachments.is_empty() {
            tracing::warn!(
                log_id = ?mail.envelope.log_id,
                count = mail.attachments.len(),
                "SES templated sends do not carry attachments, ignoring them"
            );
        }

        let template_data = serde_json::to_string(&mail.fields)
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        let template = Template::builder()
            .template_name(&mail.template_id)
            .template_data(template_data)
            .build();
        let content = EmailContent::builder().template(template).build();

        let sender = mail.envelope.sender(&self.sender);
        let envelope = &mail.envelope;
        let message_id = self
            .dispatch(
                &sender,
                Self::destination(&envelope.to, &envelope.cc, &envelope.bcc),
                content,
            )
            .await?;

        tracing::debug!(
            log_id = ?envelope.log_id,
            template = %mail.template_id,
            ?message_id,
            "SES accepted templated message"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ses"
    }
}
