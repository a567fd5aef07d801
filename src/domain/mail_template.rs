//! Mail template domain types
//!
//! A template is addressed by its unique `template` key. The pipeline only
//! ever reads templates; editing happens elsewhere.

use serde::{Deserialize, Serialize};

/// A declared template variable and its human-readable label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateVariable {
    pub variable: String,
    pub label: String,
}

impl TemplateVariable {
    pub fn new(variable: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            label: label.into(),
        }
    }
}

/// Short listing entry used by editing tooling
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateSummary {
    pub id: String,
    pub title: String,
}

/// Stored mail template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailTemplate {
    /// Database id, absent for templates loaded from a definitions file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Unique template key
    pub template: String,
    /// Display name
    pub name: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default)]
    pub from_email: Option<String>,
    #[serde(default)]
    pub from_name: Option<String>,
    /// Provider-side template id; when set the provider renders subject and body
    #[serde(default)]
    pub service_template: Option<String>,
    #[serde(default)]
    pub variables: Vec<TemplateVariable>,
}

impl MailTemplate {
    pub fn new(template: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            template: template.into(),
            name: name.into(),
            subject: None,
            body: None,
            recipients: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            from_email: None,
            from_name: None,
            service_template: None,
            variables: Vec::new(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_recipients<I, S>(mut self, recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recipients = recipients.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cc<I, S>(mut self, cc: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cc = cc.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_bcc<I, S>(mut self, bcc: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bcc = bcc.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_from(mut self, email: Option<&str>, name: Option<&str>) -> Self {
        self.from_email = email.map(str::to_string);
        self.from_name = name.map(str::to_string);
        self
    }

    pub fn with_service_template(mut self, id: impl Into<String>) -> Self {
        self.service_template = Some(id.into());
        self
    }

    pub fn with_variable(mut self, variable: impl Into<String>, label: impl Into<String>) -> Self {
        self.variables.push(TemplateVariable::new(variable, label));
        self
    }

    /// True when the template declares a sender (email or name)
    pub fn declares_from(&self) -> bool {
        self.from_email.as_deref().is_some_and(|s| !s.is_empty())
            || self.from_name.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Provider template id, ignoring blank values
    pub fn service_template_id(&self) -> Option<&str> {
        self.service_template.as_deref().filter(|s| !s.is_empty())
    }

    pub fn summary(&self) -> TemplateSummary {
        TemplateSummary {
            id: self.template.clone(),
            title: self.name.clone(),
        }
    }
}

/// Split a comma separated address column into a list
pub fn split_addresses(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Join an address list into a column value (`None` when empty)
pub fn join_addresses(values: &[String], separator: &str) -> Option<String> {
    if values.is_empty() {
        None
    } else {
        Some(values.join(separator))
    }
}
