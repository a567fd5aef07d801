//! Configuration management for Mailroom

use crate::domain::{
    MailgunConfig, SendgridConfig, SesConfig, SmtpConfig, TransportConfig,
};
use crate::domain::transport::{default_mailgun_endpoint, default_sendgrid_endpoint};
use crate::mail::AllowList;
use crate::service::ExecutorSettings;
use anyhow::{bail, Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use validator::Validate;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Composition and policy settings
    pub mail: MailConfig,
    /// Active transport
    pub transport: TransportConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Delivery worker pool
    pub worker: WorkerConfig,
    /// Logging and metrics
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    /// When false every message is logged as `disabled` and never sent
    pub enabled: bool,
    /// Log messages as delivered without handing them to a transport
    pub debug: bool,
    pub allowed_emails: AllowList,
    /// Global subject wrapper, e.g. `[Shop] {subject}`
    pub subject_template: Option<String>,
    pub from_address: Option<String>,
    pub from_name: Option<String>,
    /// JSON file with template definitions
    pub templates_path: Option<PathBuf>,
}

impl MailConfig {
    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            subject_template: self.subject_template.clone(),
            from_email: self.from_address.clone(),
            from_name: self.from_name.clone(),
            debug: self.debug,
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debug: false,
            allowed_emails: AllowList::All,
            subject_template: None,
            from_address: None,
            from_name: None,
            templates_path: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Without a URL the pipeline runs without an audit trail
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            min_connections: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Deliveries processed in parallel
    pub concurrency: usize,
    /// Tasks buffered before enqueueing waits
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// `json` or `text`
    pub log_format: String,
    pub metrics_enabled: bool,
    /// Address of the Prometheus scrape endpoint
    pub metrics_listen_addr: SocketAddr,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            metrics_enabled: false,
            metrics_listen_addr: SocketAddr::from(([0, 0, 0, 0], 9090)),
        }
    }
}

fn flag(value: Option<String>, default: bool) -> bool {
    value
        .map(|s| matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mail = MailConfig {
            enabled: flag(var("MAIL_ENABLED"), true),
            debug: flag(var("MAIL_DEBUG"), false),
            allowed_emails: var("MAIL_ALLOWED_EMAILS")
                .map(|s| AllowList::parse(&s))
                .unwrap_or_default(),
            subject_template: non_empty(var("MAIL_SUBJECT_TEMPLATE")),
            from_address: non_empty(var("MAIL_FROM_ADDRESS")),
            from_name: non_empty(var("MAIL_FROM_NAME")),
            templates_path: non_empty(var("MAIL_TEMPLATES_PATH")).map(PathBuf::from),
        };

        let transport = transport_from_lookup(&var, &mail)?;

        let database = DatabaseConfig {
            url: non_empty(var("DATABASE_URL")),
            max_connections: var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|| "10".to_string())
                .parse()
                .unwrap_or(10),
            min_connections: var("DATABASE_MIN_CONNECTIONS")
                .unwrap_or_else(|| "1".to_string())
                .parse()
                .unwrap_or(1),
        };

        let worker = WorkerConfig {
            concurrency: var("MAIL_WORKER_CONCURRENCY")
                .unwrap_or_else(|| "4".to_string())
                .parse()
                .context("Invalid MAIL_WORKER_CONCURRENCY")?,
            queue_capacity: var("MAIL_QUEUE_CAPACITY")
                .unwrap_or_else(|| "1024".to_string())
                .parse()
                .context("Invalid MAIL_QUEUE_CAPACITY")?,
        };

        let telemetry = TelemetryConfig {
            log_format: var("LOG_FORMAT").unwrap_or_else(|| "text".to_string()),
            metrics_enabled: flag(var("METRICS_ENABLED"), false),
            metrics_listen_addr: var("METRICS_LISTEN_ADDR")
                .unwrap_or_else(|| "0.0.0.0:9090".to_string())
                .parse()
                .context("Invalid METRICS_LISTEN_ADDR")?,
        };

        Ok(Self {
            mail,
            transport,
            database,
            worker,
            telemetry,
        })
    }
}

fn transport_from_lookup<F>(var: &F, mail: &MailConfig) -> Result<TransportConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let kind = var("MAIL_TRANSPORT")
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_default();

    let from_email = || {
        mail.from_address
            .clone()
            .with_context(|| format!("MAIL_FROM_ADDRESS is required for the {} transport", kind))
    };

    let config = match kind.as_str() {
        "" | "none" => TransportConfig::None,
        "log" => TransportConfig::Log,
        "smtp" => {
            let config = SmtpConfig {
                host: var("SMTP_HOST").context("SMTP_HOST is required")?,
                port: var("SMTP_PORT")
                    .unwrap_or_else(|| "587".to_string())
                    .parse()
                    .context("Invalid SMTP_PORT")?,
                username: non_empty(var("SMTP_USERNAME")),
                password: non_empty(var("SMTP_PASSWORD")),
                use_tls: flag(var("SMTP_USE_TLS"), true),
                timeout_secs: var("SMTP_TIMEOUT_SECS")
                    .unwrap_or_else(|| "60".to_string())
                    .parse()
                    .context("Invalid SMTP_TIMEOUT_SECS")?,
                from_email: from_email()?,
                from_name: mail.from_name.clone(),
            };
            config.validate().context("Invalid SMTP configuration")?;
            TransportConfig::Smtp(config)
        }
        "ses" => {
            let config = SesConfig {
                region: var("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                access_key_id: non_empty(var("AWS_ACCESS_KEY_ID")),
                secret_access_key: non_empty(var("AWS_SECRET_ACCESS_KEY")),
                from_email: from_email()?,
                from_name: mail.from_name.clone(),
                configuration_set: non_empty(var("SES_CONFIGURATION_SET")),
            };
            config.validate().context("Invalid SES configuration")?;
            TransportConfig::Ses(config)
        }
        "sendgrid" => {
            let config = SendgridConfig {
                api_key: var("SENDGRID_API_KEY").context("SENDGRID_API_KEY is required")?,
                endpoint: var("SENDGRID_ENDPOINT").unwrap_or_else(default_sendgrid_endpoint),
                from_email: from_email()?,
                from_name: mail.from_name.clone(),
            };
            config.validate().context("Invalid Sendgrid configuration")?;
            TransportConfig::Sendgrid(config)
        }
        "mailgun" => {
            let config = MailgunConfig {
                api_key: var("MAILGUN_API_KEY").context("MAILGUN_API_KEY is required")?,
                // checked per delivery
                domain: var("MAILGUN_DOMAIN").unwrap_or_default(),
                endpoint: var("MAILGUN_ENDPOINT").unwrap_or_else(default_mailgun_endpoint),
                from_email: from_email()?,
                from_name: mail.from_name.clone(),
            };
            config.validate().context("Invalid Mailgun configuration")?;
            TransportConfig::Mailgun(config)
        }
        other => bail!("Unknown MAIL_TRANSPORT: {}", other),
    };

    Ok(config)
}
