//! Transport configuration types - one variant per supported provider

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Transport configuration, selected by `MAIL_TRANSPORT`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportConfig {
    /// No transport configured; resolving one fails at delivery time
    #[default]
    None,

    /// SMTP relay
    Smtp(SmtpConfig),

    /// AWS Simple Email Service (v2 API)
    Ses(SesConfig),

    /// Sendgrid v3 HTTP API
    Sendgrid(SendgridConfig),

    /// Mailgun HTTP API
    Mailgun(MailgunConfig),

    /// Writes messages to the application log instead of sending them
    Log,
}

impl TransportConfig {
    /// Check if a transport is configured (not None)
    pub fn is_configured(&self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn transport_type(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Smtp(_) => "smtp",
            Self::Ses(_) => "ses",
            Self::Sendgrid(_) => "sendgrid",
            Self::Mailgun(_) => "mailgun",
            Self::Log => "log",
        }
    }
}

/// SMTP configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct SmtpConfig {
    /// SMTP server host
    #[validate(length(min = 1, max = 255))]
    pub host: String,

    /// SMTP server port (typically 587 for STARTTLS, 25 for unencrypted)
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Use STARTTLS
    #[serde(default = "default_true")]
    pub use_tls: bool,

    /// Connection timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Fallback sender when a message carries none
    #[validate(email)]
    pub from_email: String,

    pub from_name: Option<String>,
}

/// AWS SES configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct SesConfig {
    /// AWS region (e.g., "us-east-1")
    #[validate(length(min = 1, max = 50))]
    pub region: String,

    /// AWS access key ID (optional - uses the default credential chain if not provided)
    pub access_key_id: Option<String>,

    pub secret_access_key: Option<String>,

    /// Fallback sender (must be verified in SES)
    #[validate(email)]
    pub from_email: String,

    pub from_name: Option<String>,

    /// Configuration set name (optional, for tracking)
    pub configuration_set: Option<String>,
}

/// Sendgrid configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct SendgridConfig {
    #[validate(length(min = 1))]
    pub api_key: String,

    /// API base URL
    #[serde(default = "default_sendgrid_endpoint")]
    #[validate(url)]
    pub endpoint: String,

    #[validate(email)]
    pub from_email: String,

    pub from_name: Option<String>,
}

/// Mailgun configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct MailgunConfig {
    #[validate(length(min = 1))]
    pub api_key: String,

    /// Sending domain; checked before every send rather than at startup
    #[serde(default)]
    pub domain: String,

    /// API base URL (https://api.eu.mailgun.net for EU accounts)
    #[serde(default = "default_mailgun_endpoint")]
    #[validate(url)]
    pub endpoint: String,

    #[validate(email)]
    pub from_email: String,

    pub from_name: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_smtp_port() -> u16 {
    587
}

fn default_timeout_secs() -> u64 {
    60
}

pub(crate) fn default_sendgrid_endpoint() -> String {
    "https://api.sendgrid.com".to_string()
}

pub(crate) fn default_mailgun_endpoint() -> String {
    "https://api.mailgun.net".to_string()
}
