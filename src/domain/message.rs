//! Message payloads handed from the executor to the delivery worker

use super::attachment::AttachmentSet;
use super::mail_log::LogId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Template field map (`{{key}}` -> value)
pub type TemplateFields = BTreeMap<String, String>;

/// Plain-data unit of work for one delivery attempt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryPayload {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub service_template: Option<String>,
    pub fields: TemplateFields,
    pub log_id: Option<LogId>,
    pub attachments: AttachmentSet,
    pub from_email: Option<String>,
    pub from_name: Option<String>,
}

impl DeliveryPayload {
    pub fn uses_service_template(&self) -> bool {
        self.service_template.as_deref().is_some_and(|s| !s.is_empty())
    }

    pub fn body_is_empty(&self) -> bool {
        self.body.as_deref().map_or(true, str::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uses_service_template() {
        let mut payload = DeliveryPayload::default();
        assert!(!payload.uses_service_template());

        payload.service_template = Some(String::new());
        assert!(!payload.uses_service_template());

        payload.service_template = Some("d-42".to_string());
        assert!(payload.uses_service_template());
    }

    #[test]
    fn test_body_is_empty() {
        let mut payload = DeliveryPayload::default();
        assert!(payload.body_is_empty());
        payload.body = Some(String::new());
        assert!(payload.body_is_empty());
        payload.body = Some(" ".to_string());
        assert!(!payload.body_is_empty());
    }
}
