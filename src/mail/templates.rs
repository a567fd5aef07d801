//! Template variable substitution
//!
//! Variables are written as `{{variable_name}}`. Placeholders without a value
//! are left untouched. Subjects can additionally be wrapped by a global
//! subject template such as `[Shop] {subject}`.

use crate::domain::TemplateFields;

/// Placeholder for the original subject inside a subject template
pub const SUBJECT_PLACEHOLDER: &str = "{subject}";

/// Rendering engine holding a field map
#[derive(Debug, Default, Clone)]
pub struct TemplateEngine {
    variables: TemplateFields,
}

impl TemplateEngine {
    /// Create a new template engine
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fields(fields: &TemplateFields) -> Self {
        Self {
            variables: fields.clone(),
        }
    }

    /// Set a variable value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Set multiple variables from an iterator
    pub fn set_all<I, K, V>(&mut self, iter: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in iter {
            self.variables.insert(k.into(), v.into());
        }
        self
    }

    /// Replace every `{{variable}}` with its value
    pub fn render(&self, template: &str) -> String {
        substitute(template, &self.variables)
    }

    /// Wrap the subject with `subject_template` (if any), then substitute
    pub fn render_subject(&self, subject: &str, subject_template: Option<&str>) -> String {
        let wrapped = wrap_subject(subject, subject_template);
        self.render(&wrapped)
    }
}

/// Replace every literal `{{key}}` in `text` with the matching value
pub fn substitute(text: &str, fields: &TemplateFields) -> String {
    let mut result = text.to_string();

    for (key, value) in fields {
        let placeholder = format!("{{{{{}}}}}", key);
        if result.contains(&placeholder) {
            result = result.replace(&placeholder, value);
        }
    }

    result
}

/// Apply the global subject template once
pub fn wrap_subject(subject: &str, subject_template: Option<&str>) -> String {
    match subject_template.filter(|t| !t.is_empty()) {
        Some(template) => template.replace(SUBJECT_PLACEHOLDER, subject),
        None => subject.to_string(),
    }
}
