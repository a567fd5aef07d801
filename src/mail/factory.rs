//! Transport resolution

use super::log::LogTransport;
use super::mailgun::MailgunTransport;
use super::sendgrid::SendgridTransport;
use super::ses::SesTransport;
use super::smtp::SmtpTransport;
use super::transport::{Transport, TransportError};
use crate::domain::TransportConfig;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use validator::Validate;

/// Resolves the active transport for a delivery
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn Transport>, TransportError>;
}

fn invalid(e: validator::ValidationErrors) -> TransportError {
    TransportError::InvalidConfiguration(e.to_string())
}

/// Build a transport from configuration
pub async fn build_transport(
    config: &TransportConfig,
) -> Result<Arc<dyn Transport>, TransportError> {
    match config {
        TransportConfig::None => Err(TransportError::NotConfigured),
        TransportConfig::Smtp(smtp_config) => {
            smtp_config.validate().map_err(invalid)?;
            Ok(Arc::new(SmtpTransport::from_config(smtp_config)?))
        }
        TransportConfig::Ses(ses_config) => {
            ses_config.validate().map_err(invalid)?;
            Ok(Arc::new(SesTransport::from_config(ses_config).await?))
        }
        TransportConfig::Sendgrid(sendgrid_config) => {
            sendgrid_config.validate().map_err(invalid)?;
            Ok(Arc::new(SendgridTransport::from_config(sendgrid_config)?))
        }
        TransportConfig::Mailgun(mailgun_config) => {
            mailgun_config.validate().map_err(invalid)?;
            Ok(Arc::new(MailgunTransport::from_config(mailgun_config)?))
        }
        TransportConfig::Log => Ok(Arc::new(LogTransport::new())),
    }
}

/// Builds the configured transport on first use and reuses it afterwards.
///
/// A failed build is not cached; the next delivery tries again.
pub struct ConfiguredTransportFactory {
    config: TransportConfig,
    transport: OnceCell<Arc<dyn Transport>>,
}

impl ConfiguredTransportFactory {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            transport: OnceCell::new(),
        }
    }
}

#[async_trait]
impl TransportFactory for ConfiguredTransportFactory {
    async fn create(&self) -> Result<Arc<dyn Transport>, TransportError> {
        let transport = self
            .transport
            .get_or_try_init(|| build_transport(&self.config))
            .await?;

        Ok(transport.clone())
    }
}

/// Always hands out the same transport
pub struct StaticTransportFactory {
    transport: Arc<dyn Transport>,
}

impl StaticTransportFactory {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl TransportFactory for StaticTransportFactory {
    async fn create(&self) -> Result<Arc<dyn Transport>, TransportError> {
        Ok(self.transport.clone())
    }
}
