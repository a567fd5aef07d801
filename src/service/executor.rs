//! Mail executor
//!
//! The executor accumulates the fields of one message, either explicitly or
//! from a named template, validates them, writes the delivery log and hands
//! the message to the delivery queue.
//!
//! Template defaults are applied asymmetrically: a template's sender is only
//! adopted when none was set with [`MailExecutor::set_from`], while template
//! cc/bcc lists always replace whatever was set before.

use super::dispatch::{Dispatch, MailDispatcher};
use crate::domain::{
    join_addresses, AttachmentSet, DeliveryPayload, MailStatus, MailTemplate, NewMailLog,
    TemplateFields,
};
use crate::error::{MailError, Result};
use crate::mail::TemplateEngine;
use crate::repository::MailTemplateRepository;
use std::sync::Arc;

/// Values injected into every executor
#[derive(Debug, Clone, Default)]
pub struct ExecutorSettings {
    /// Global subject wrapper containing `{subject}`
    pub subject_template: Option<String>,
    pub from_email: Option<String>,
    pub from_name: Option<String>,
    /// Stored on every log record
    pub debug: bool,
}

/// Builder state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageDraft {
    pub recipients: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub from_email: Option<String>,
    pub from_name: Option<String>,
    pub from_is_manual: bool,
    pub template: Option<String>,
    pub fields: TemplateFields,
    pub attachments: AttachmentSet,
}

/// Fold a template's defaults into the draft
pub fn apply_template_defaults(draft: &mut MessageDraft, template: &MailTemplate) {
    if !draft.from_is_manual && template.declares_from() {
        draft.from_email = template.from_email.clone();
        draft.from_name = template.from_name.clone();
        draft.from_is_manual = true;
    }

    if !template.cc.is_empty() {
        draft.cc = template.cc.clone();
    }
    if !template.bcc.is_empty() {
        draft.bcc = template.bcc.clone();
    }
}

/// Fully resolved message, ready to be logged and delivered
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMessage {
    pub recipients: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: Option<String>,
    pub from_email: Option<String>,
    pub from_name: Option<String>,
    pub template_id: Option<i64>,
    pub template: Option<String>,
    pub service_template: Option<String>,
    pub fields: TemplateFields,
    pub attachments: AttachmentSet,
}

/// Resolve builder state against its template (if any)
pub fn resolve(
    draft: &MessageDraft,
    template: Option<&MailTemplate>,
    subject_template: Option<&str>,
) -> ResolvedMessage {
    let engine = TemplateEngine::with_fields(&draft.fields);

    let recipients = if !draft.recipients.is_empty() {
        draft.recipients.clone()
    } else {
        template.map(|t| t.recipients.clone()).unwrap_or_default()
    };

    let (raw_subject, raw_body) = match template {
        Some(t) => (t.subject.clone(), t.body.clone()),
        None => (draft.subject.clone(), draft.body.clone()),
    };

    ResolvedMessage {
        recipients,
        cc: draft.cc.clone(),
        bcc: draft.bcc.clone(),
        subject: engine.render_subject(raw_subject.as_deref().unwrap_or_default(), subject_template),
        body: raw_body.map(|body| engine.render(&body)),
        from_email: draft.from_email.clone(),
        from_name: draft.from_name.clone(),
        template_id: template.and_then(|t| t.id),
        template: template.map(|t| t.template.clone()),
        service_template: template
            .and_then(MailTemplate::service_template_id)
            .map(str::to_string),
        fields: draft.fields.clone(),
        attachments: draft.attachments.clone(),
    }
}

impl ResolvedMessage {
    pub fn uses_service_template(&self) -> bool {
        self.service_template.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.uses_service_template() && self.subject.is_empty() {
            return Err(MailError::InvalidMessage("Subject is empty".to_string()));
        }
        Ok(())
    }

    /// Log record for this message
    pub fn to_log(&self, debug: bool) -> Result<NewMailLog> {
        let (body, service_template_params) = if self.uses_service_template() {
            let params = if self.fields.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&self.fields)?)
            };
            (None, params)
        } else {
            (self.body.clone(), None)
        };

        Ok(NewMailLog {
            recipient: self.recipients.join(", "),
            cc: join_addresses(&self.cc, ","),
            bcc: join_addresses(&self.bcc, ","),
            subject: Some(self.subject.clone()),
            body,
            from_email: self.from_email.clone(),
            from_name: self.from_name.clone(),
            status: MailStatus::Created,
            template_id: self.template_id,
            template: self.template.clone(),
            service_template: self.service_template.clone(),
            service_template_params,
            attachments: self.attachments.log_string(),
            debug,
        })
    }

    pub fn into_payload(self) -> DeliveryPayload {
        DeliveryPayload {
            to: self.recipients,
            cc: self.cc,
            bcc: self.bcc,
            subject: Some(self.subject),
            body: self.body,
            service_template: self.service_template,
            fields: self.fields,
            log_id: None,
            attachments: self.attachments,
            from_email: self.from_email,
            from_name: self.from_name,
        }
    }
}

/// Builder for one message
pub struct MailExecutor {
    templates: Arc<dyn MailTemplateRepository>,
    dispatcher: MailDispatcher,
    settings: Arc<ExecutorSettings>,
    draft: MessageDraft,
    template: Option<MailTemplate>,
}

impl MailExecutor {
    pub fn new(
        templates: Arc<dyn MailTemplateRepository>,
        dispatcher: MailDispatcher,
        settings: Arc<ExecutorSettings>,
    ) -> Self {
        let draft = MessageDraft {
            from_email: settings.from_email.clone(),
            from_name: settings.from_name.clone(),
            ..Default::default()
        };

        Self {
            templates,
            dispatcher,
            settings,
            draft,
            template: None,
        }
    }

    pub fn set_recipients<I, S>(&mut self, recipients: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.draft.recipients = recipients.into_iter().map(Into::into).collect();
        self
    }

    pub fn set_cc<I, S>(&mut self, cc: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.draft.cc = cc.into_iter().map(Into::into).collect();
        self
    }

    pub fn set_bcc<I, S>(&mut self, bcc: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.draft.bcc = bcc.into_iter().map(Into::into).collect();
        self
    }

    pub fn set_subject(&mut self, subject: impl Into<String>) -> &mut Self {
        self.draft.subject = Some(subject.into());
        self
    }

    pub fn set_body(&mut self, body: impl Into<String>) -> &mut Self {
        self.draft.body = Some(body.into());
        self
    }

    pub fn set_attachments(&mut self, attachments: AttachmentSet) -> &mut Self {
        self.draft.attachments = attachments;
        self
    }

    /// Set the sender explicitly; template senders no longer apply
    pub fn set_from(&mut self, email: Option<String>, name: Option<String>) -> &mut Self {
        self.draft.from_email = email;
        self.draft.from_name = name;
        self.draft.from_is_manual = true;
        self
    }

    /// Use a named template with the given fields
    pub async fn set_template(&mut self, name: &str, fields: TemplateFields) -> Result<&mut Self> {
        let template = self
            .templates
            .find_by_template(name)
            .await?
            .ok_or_else(|| MailError::TemplateNotFound(name.to_string()))?;

        self.draft.template = Some(name.to_string());
        self.draft.fields = fields;
        apply_template_defaults(&mut self.draft, &template);
        self.template = Some(template);

        Ok(self)
    }

    pub fn draft(&self) -> &MessageDraft {
        &self.draft
    }

    pub fn resolve(&self) -> ResolvedMessage {
        resolve(
            &self.draft,
            self.template.as_ref(),
            self.settings.subject_template.as_deref(),
        )
    }

    /// Explicit recipients, else the template's defaults
    pub fn recipients(&self) -> Vec<String> {
        self.resolve().recipients
    }

    pub fn subject(&self) -> String {
        self.resolve().subject
    }

    pub fn body(&self) -> Option<String> {
        self.resolve().body
    }

    pub fn validate(&self) -> Result<()> {
        self.resolve().validate()
    }

    /// Log the message and enqueue its delivery (or log it as disabled)
    pub async fn send(&self) -> Result<Dispatch> {
        let message = self.resolve();
        let log = message.to_log(self.settings.debug)?;
        self.dispatcher.dispatch(log, message.into_payload()).await
    }

    /// Validate, then send
    pub async fn run(&self) -> Result<Dispatch> {
        self.validate()?;
        self.send().await
    }
}
