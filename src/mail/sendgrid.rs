//! Sendgrid v3 HTTP API transport

use super::transport::{
    Envelope, OutgoingMail, ResolvedAttachment, Sender, ServiceTemplateMail, Transport,
    TransportError,
};
use crate::domain::{DeliveryPayload, SendgridConfig, TemplateFields};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::StatusCode;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct EmailAddress {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl EmailAddress {
    fn bare(email: &str) -> Self {
        Self {
            email: email.to_string(),
            name: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct Personalization {
    to: Vec<EmailAddress>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cc: Vec<EmailAddress>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    bcc: Vec<EmailAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dynamic_template_data: Option<TemplateFields>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    custom_args: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(rename = "type")]
    content_type: &'static str,
    value: String,
}

#[derive(Debug, Serialize)]
struct AttachmentPart {
    content: String,
    filename: String,
    #[serde(rename = "type")]
    content_type: String,
    disposition: &'static str,
}

#[derive(Debug, Serialize)]
struct SendRequest {
    personalizations: Vec<Personalization>,
    from: EmailAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    content: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    template_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<AttachmentPart>,
}

/// Sendgrid transport
pub struct SendgridTransport {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    sender: Sender,
}

impl SendgridTransport {
    pub fn from_config(config: &SendgridConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| TransportError::InvalidConfiguration(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            sender: Sender::new(config.from_email.clone(), config.from_name.clone()),
        })
    }

    fn personalization(envelope: &Envelope) -> Personalization {
        let addresses = |list: &[String]| -> Vec<EmailAddress> {
            list.iter().map(|a| EmailAddress::bare(a)).collect()
        };

        let mut custom_args = BTreeMap::new();
        if let Some(log_id) = envelope.log_id {
            custom_args.insert("log_id".to_string(), log_id.to_string());
        }

        Personalization {
            to: addresses(&envelope.to),
            cc: addresses(&envelope.cc),
            bcc: addresses(&envelope.bcc),
            subject: None,
            dynamic_template_data: None,
            custom_args,
        }
    }

    fn from_address(&self, envelope: &Envelope) -> EmailAddress {
        let sender = envelope.sender(&self.sender);
        EmailAddress {
            email: sender.email,
            name: sender.name,
        }
    }

    async fn encode_attachments(
        attachments: &[ResolvedAttachment],
    ) -> Result<Vec<AttachmentPart>, TransportError> {
        let mut parts = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            let content = attachment.read().await?;
            parts.push(AttachmentPart {
                content: STANDARD.encode(content),
                filename: attachment.file_name.clone(),
                content_type: attachment.content_type.clone(),
                disposition: "attachment",
            });
        }
        Ok(parts)
    }

    async fn post(&self, request: &SendRequest) -> Result<(), TransportError> {
        if request.personalizations.iter().all(|p| p.to.is_empty()) {
            return Err(TransportError::SendFailed(
                "No recipients specified".to_string(),
            ));
        }

        let response = self
            .client
            .post(format!("{}/v3/mail/send", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::ConnectionError(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                TransportError::AuthenticationFailed(body)
            }
            StatusCode::TOO_MANY_REQUESTS => TransportError::RateLimited,
            _ => TransportError::SendFailed(format!("Sendgrid returned {}: {}", status, body)),
        })
    }
}

#[async_trait]
impl Transport for SendgridTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), TransportError> {
        let request = SendRequest {
            personalizations: vec![Self::personalization(&mail.envelope)],
            from: self.from_address(&mail.envelope),
            subject: Some(mail.subject.clone()),
            content: vec![Content {
                content_type: "text/html",
                value: mail.body.clone(),
            }],
            template_id: None,
            attachments: Self::encode_attachments(&mail.attachments).await?,
        };

        self.post(&request).await
    }

    async fn send_using_service_template(
        &self,
        mail: &ServiceTemplateMail,
    ) -> Result<(), TransportError> {
        let mut personalization = Self::personalization(&mail.envelope);
        personalization.subject = mail.subject.clone().filter(|s| !s.is_empty());
        personalization.dynamic_template_data = Some(mail.fields.clone());

        let request = SendRequest {
            personalizations: vec![personalization],
            from: self.from_address(&mail.envelope),
            subject: None,
            content: vec![],
            template_id: Some(mail.template_id.clone()),
            attachments: Self::encode_attachments(&mail.attachments).await?,
        };

        self.post(&request).await
    }

    /// Sendgrid rejects empty content values
    fn prepare(&self, payload: &mut DeliveryPayload) -> Result<(), TransportError> {
        if !payload.uses_service_template() && payload.body_is_empty() {
            payload.body = Some(" ".to_string());
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sendgrid"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(endpoint: &str) -> SendgridTransport {
        SendgridTransport::from_config(&SendgridConfig {
            api_key: "SG.test".to_string(),
            endpoint: endpoint.to_string(),
            from_email: "noreply@example.com".to_string(),
            from_name: Some("Example".to_string()),
        })
        .unwrap()
    }

    fn envelope() -> Envelope {
        Envelope {
            to: vec!["a@example.com".to_string()],
            cc: vec!["c@example.com".to_string()],
            log_id: Some(7),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_send_posts_v3_payload() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .and(header("authorization", "Bearer SG.test"))
            .and(body_json(json!({
                "personalizations": [{
                    "to": [{"email": "a@example.com"}],
                    "cc": [{"email": "c@example.com"}],
                    "custom_args": {"log_id": "7"}
                }],
                "from": {"email": "noreply@example.com", "name": "Example"},
                "subject": "Hello",
                "content": [{"type": "text/html", "value": "<p>Hi</p>"}]
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mail = OutgoingMail {
            envelope: envelope(),
            subject: "Hello".to_string(),
            body: "<p>Hi</p>".to_string(),
            attachments: vec![],
        };

        transport(&mock_server.uri()).send(&mail).await.unwrap();
    }

    #[tokio::test]
    async fn test_service_template_payload() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .and(body_json(json!({
                "personalizations": [{
                    "to": [{"email": "a@example.com"}],
                    "cc": [{"email": "c@example.com"}],
                    "dynamic_template_data": {"name": "Ann"},
                    "custom_args": {"log_id": "7"}
                }],
                "from": {"email": "noreply@example.com", "name": "Example"},
                "template_id": "d-123"
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mail = ServiceTemplateMail {
            envelope: envelope(),
            template_id: "d-123".to_string(),
            fields: [("name".to_string(), "Ann".to_string())].into_iter().collect(),
            subject: None,
            attachments: vec![],
        };

        transport(&mock_server.uri())
            .send_using_service_template(&mail)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_error_status_mapping() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid"))
            .mount(&mock_server)
            .await;

        let transport = transport(&mock_server.uri());
        let mail = OutgoingMail {
            envelope: envelope(),
            subject: "Hello".to_string(),
            body: "x".to_string(),
            attachments: vec![],
        };

        assert!(matches!(
            transport.send(&mail).await,
            Err(TransportError::AuthenticationFailed(_))
        ));
        assert!(matches!(
            transport.send(&mail).await,
            Err(TransportError::RateLimited)
        ));
        match transport.send(&mail).await {
            Err(TransportError::SendFailed(msg)) => assert!(msg.contains("invalid")),
            other => panic!("Expected SendFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_prepare_fills_empty_body() {
        let transport = transport("https://api.sendgrid.com");

        let mut payload = DeliveryPayload::default();
        transport.prepare(&mut payload).unwrap();
        assert_eq!(payload.body.as_deref(), Some(" "));

        let mut templated = DeliveryPayload {
            service_template: Some("d-1".to_string()),
            ..Default::default()
        };
        transport.prepare(&mut templated).unwrap();
        assert_eq!(templated.body, None);
    }
}
