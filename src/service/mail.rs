//! Mail service: the public entry points of the pipeline

use super::dispatch::{Dispatch, MailDispatcher};
use super::executor::{ExecutorSettings, MailExecutor};
use crate::domain::{
    split_addresses, AttachmentSet, DeliveryPayload, MailLog, MailStatus,
    TemplateFields, TemplateSummary, TemplateVariable,
};
use crate::error::{MailError, Result};
use crate::repository::{MailLogRepository, MailTemplateRepository};
use std::sync::Arc;

/// A message whose subject and body are given by the caller
#[derive(Debug, Clone, Default)]
pub struct SendMail {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachments: AttachmentSet,
}

/// A message rendered from a named template
#[derive(Debug, Clone, Default)]
pub struct TemplateMail {
    pub template: String,
    pub fields: TemplateFields,
    /// Overrides the template's default recipients
    pub to: Option<Vec<String>>,
    pub attachments: AttachmentSet,
    pub from_email: Option<String>,
    pub from_name: Option<String>,
}

pub struct MailService {
    templates: Arc<dyn MailTemplateRepository>,
    logs: Option<Arc<dyn MailLogRepository>>,
    dispatcher: MailDispatcher,
    settings: Arc<ExecutorSettings>,
}

impl MailService {
    pub fn new(
        templates: Arc<dyn MailTemplateRepository>,
        logs: Option<Arc<dyn MailLogRepository>>,
        dispatcher: MailDispatcher,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            templates,
            logs,
            dispatcher,
            settings: Arc::new(settings),
        }
    }

    /// A fresh executor for building a message by hand
    pub fn executor(&self) -> MailExecutor {
        MailExecutor::new(
            self.templates.clone(),
            self.dispatcher.clone(),
            self.settings.clone(),
        )
    }

    pub async fn send(&self, mail: SendMail) -> Result<Dispatch> {
        let mut executor = self.executor();
        executor
            .set_recipients(mail.to)
            .set_subject(mail.subject)
            .set_body(mail.body)
            .set_attachments(mail.attachments);

        executor.run().await
    }

    pub async fn send_using_template(&self, mail: TemplateMail) -> Result<Dispatch> {
        let mut executor = self.executor();

        if mail.from_email.is_some() || mail.from_name.is_some() {
            executor.set_from(mail.from_email, mail.from_name);
        }
        if let Some(to) = mail.to {
            executor.set_recipients(to);
        }
        executor.set_attachments(mail.attachments);
        executor.set_template(&mail.template, mail.fields).await?;

        let dispatch = executor.run().await?;
        tracing::info!(template = %mail.template, log_id = ?dispatch.log_id(), "Template mail accepted");
        Ok(dispatch)
    }

    pub async fn list_templates(&self) -> Result<Vec<TemplateSummary>> {
        let templates = self.templates.list().await?;
        Ok(templates.iter().map(|t| t.summary()).collect())
    }

    /// Declared variables of a template; empty for unknown names
    pub async fn get_template_variables(&self, template: &str) -> Result<Vec<TemplateVariable>> {
        Ok(self
            .templates
            .find_by_template(template)
            .await?
            .map(|t| t.variables)
            .unwrap_or_default())
    }

    /// Dispatch every skipped message again.
    ///
    /// Each skipped record is moved back to `created` and queued under its
    /// own log id, so a message is resent at most once per call and the log
    /// table does not grow. Attachments are not resent.
    pub async fn resend_skipped(&self) -> Result<Vec<Dispatch>> {
        let logs = self.logs.as_ref().ok_or_else(|| {
            MailError::Configuration("Resending skipped mail requires a log store".to_string())
        })?;

        let skipped = logs.find_by_status(MailStatus::Skip).await?;
        tracing::info!(count = skipped.len(), "Resending skipped mail");

        let mut dispatches = Vec::with_capacity(skipped.len());
        for log in &skipped {
            if let Some(dispatch) = self.dispatcher.requeue(log.id, resend_payload(log)).await? {
                dispatches.push(dispatch);
            }
        }

        Ok(dispatches)
    }
}

fn resend_payload(log: &MailLog) -> DeliveryPayload {
    let fields: TemplateFields = match log.service_template_params.as_deref() {
        Some(params) => serde_json::from_str(params).unwrap_or_else(|e| {
            tracing::warn!(log_id = log.id, error = %e, "Unreadable service template params");
            TemplateFields::new()
        }),
        None => TemplateFields::new(),
    };

    DeliveryPayload {
        to: split_addresses(Some(&log.recipient)),
        cc: split_addresses(log.cc.as_deref()),
        bcc: split_addresses(log.bcc.as_deref()),
        subject: log.subject.clone(),
        body: log.body.clone(),
        service_template: log.service_template.clone(),
        fields,
        log_id: Some(log.id),
        attachments: AttachmentSet::new(),
        from_email: log.from_email.clone(),
        from_name: log.from_name.clone(),
    }
}
