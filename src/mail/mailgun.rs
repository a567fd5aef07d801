//! Mailgun HTTP API transport

use super::transport::{
    Envelope, OutgoingMail, ResolvedAttachment, Sender, ServiceTemplateMail, Transport,
    TransportError,
};
use crate::domain::{DeliveryPayload, MailgunConfig};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use std::time::Duration;

/// Mailgun transport
pub struct MailgunTransport {
    client: reqwest::Client,
    api_key: String,
    domain: String,
    endpoint: String,
    sender: Sender,
}

impl MailgunTransport {
    pub fn from_config(config: &MailgunConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| TransportError::InvalidConfiguration(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            domain: config.domain.trim().to_string(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            sender: Sender::new(config.from_email.clone(), config.from_name.clone()),
        })
    }

    fn domain(&self) -> Result<&str, TransportError> {
        if self.domain.is_empty() {
            return Err(TransportError::Precondition(
                "Mailgun domain is empty".to_string(),
            ));
        }
        Ok(&self.domain)
    }

    fn envelope_form(&self, envelope: &Envelope) -> Result<Form, TransportError> {
        if envelope.to.is_empty() {
            return Err(TransportError::SendFailed(
                "No recipients specified".to_string(),
            ));
        }

        let mut form = Form::new()
            .text("from", envelope.sender(&self.sender).formatted())
            .text("to", envelope.to.join(","));

        if !envelope.cc.is_empty() {
            form = form.text("cc", envelope.cc.join(","));
        }
        if !envelope.bcc.is_empty() {
            form = form.text("bcc", envelope.bcc.join(","));
        }
        if let Some(log_id) = envelope.log_id {
            form = form.text("v:log_id", log_id.to_string());
        }

        Ok(form)
    }

    async fn attach(
        mut form: Form,
        attachments: &[ResolvedAttachment],
    ) -> Result<Form, TransportError> {
        for attachment in attachments {
            let part = Part::bytes(attachment.read().await?)
                .file_name(attachment.file_name.clone())
                .mime_str(&attachment.content_type)
                .map_err(|e| TransportError::Attachment(e.to_string()))?;
            form = form.part("attachment", part);
        }
        Ok(form)
    }

    async fn post(&self, form: Form) -> Result<(), TransportError> {
        let url = format!("{}/v3/{}/messages", self.endpoint, self.domain()?);

        let response = self
            .client
            .post(url)
            .basic_auth("api", Some(&self.api_key))
            .multipart(form)
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
            _ => TransportError::SendFailed(format!("Mailgun returned {}: {}", status, body)),
        })
    }
}

#[async_trait]
impl Transport for MailgunTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), TransportError> {
        let form = self
            .envelope_form(&mail.envelope)?
            .text("subject", mail.subject.clone())
            .text("html", mail.body.clone());
        let form = Self::attach(form, &mail.attachments).await?;

        self.post(form).await
    }

    async fn send_using_service_template(
        &self,
        mail: &ServiceTemplateMail,
    ) -> Result<(), TransportError> {
        let variables = serde_json::to_string(&mail.fields)
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        let mut form = self
            .envelope_form(&mail.envelope)?
            .text("template", mail.template_id.clone())
            .text("h:X-Mailgun-Variables", variables);
        if let Some(subject) = mail.subject.as_deref().filter(|s| !s.is_empty()) {
            form = form.text("subject", subject.to_string());
        }
        let form = Self::attach(form, &mail.attachments).await?;

        self.post(form).await
    }

    fn prepare(&self, _payload: &mut DeliveryPayload) -> Result<(), TransportError> {
        self.domain().map(|_| ())
    }

    fn name(&self) -> &'static str {
        "mailgun"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn config(endpoint: &str, domain: &str) -> MailgunConfig {
        MailgunConfig {
            api_key: "key-test".to_string(),
            domain: domain.to_string(),
            endpoint: endpoint.to_string(),
            from_email: "noreply@example.com".to_string(),
            from_name: None,
        }
    }

    fn outgoing() -> OutgoingMail {
        OutgoingMail {
            envelope: Envelope {
                to: vec!["a@example.com".to_string(), "b@example.com".to_string()],
                log_id: Some(3),
                ..Default::default()
            },
            subject: "Hello".to_string(),
            body: "<p>Hi</p>".to_string(),
            attachments: vec![],
        }
    }

    fn body_text(request: &Request) -> String {
        String::from_utf8_lossy(&request.body).into_owned()
    }

    #[tokio::test]
    async fn test_send_posts_form_to_domain() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mg.example.com/messages"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport =
            MailgunTransport::from_config(&config(&mock_server.uri(), "mg.example.com")).unwrap();
        transport.send(&outgoing()).await.unwrap();

        let requests = mock_server.received_requests().await.unwrap();
        let body = body_text(&requests[0]);
        assert!(body.contains("a@example.com,b@example.com"));
        assert!(body.contains("name=\"v:log_id\""));
        assert!(body.contains("<p>Hi</p>"));
    }

    #[tokio::test]
    async fn test_service_template_form() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mg.example.com/messages"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let transport =
            MailgunTransport::from_config(&config(&mock_server.uri(), "mg.example.com")).unwrap();
        let mail = ServiceTemplateMail {
            envelope: outgoing().envelope,
            template_id: "order-shipped".to_string(),
            fields: BTreeMap::from([("order".to_string(), "42".to_string())]),
            subject: None,
            attachments: vec![],
        };
        transport.send_using_service_template(&mail).await.unwrap();

        let requests = mock_server.received_requests().await.unwrap();
        let body = body_text(&requests[0]);
        assert!(body.contains("order-shipped"));
        assert!(body.contains(r#"{"order":"42"}"#));
        assert!(!body.contains("name=\"subject\""));
    }

    #[test]
    fn test_prepare_requires_domain() {
        let transport =
            MailgunTransport::from_config(&config("https://api.mailgun.net", "  ")).unwrap();
        let err = transport
            .prepare(&mut DeliveryPayload::default())
            .unwrap_err();
        assert!(matches!(err, TransportError::Precondition(_)));
        assert_eq!(err.to_string(), "Mailgun domain is empty");

        let transport =
            MailgunTransport::from_config(&config("https://api.mailgun.net", "mg.example.com"))
                .unwrap();
        assert!(transport.prepare(&mut DeliveryPayload::default()).is_ok());
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_authentication_failed() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Forbidden"))
            .mount(&mock_server)
            .await;

        let transport =
            MailgunTransport::from_config(&config(&mock_server.uri(), "mg.example.com")).unwrap();
        assert!(matches!(
            transport.send(&outgoing()).await,
            Err(TransportError::AuthenticationFailed(_))
        ));
    }
}
