//! Wiring of stores, transports and the delivery worker

use crate::config::Config;
use crate::mail::{AttachmentDownloader, ConfiguredTransportFactory, TransportFactory};
use crate::repository::{
    InMemoryMailLogRepository, InMemoryMailTemplateRepository, MailLogRepository,
    MailLogRepositoryImpl, MailTemplateRepository, MailTemplateRepositoryImpl,
};
use crate::service::{DeliveryContext, DeliveryQueue, DeliveryWorker, MailDispatcher, MailService};
use anyhow::{Context, Result};
use sqlx::{mysql::MySqlPoolOptions, MySqlPool};
use std::sync::Arc;
use tracing::info;

/// Storage backends the pipeline runs against
pub struct Stores {
    pub templates: Arc<dyn MailTemplateRepository>,
    pub logs: Option<Arc<dyn MailLogRepository>>,
    pool: Option<MySqlPool>,
}

impl Stores {
    /// MySQL when `DATABASE_URL` is set, otherwise templates from the
    /// definitions file and logs kept in memory
    pub async fn connect(config: &Config) -> Result<Self> {
        match &config.database.url {
            Some(url) => {
                let pool = MySqlPoolOptions::new()
                    .max_connections(config.database.max_connections)
                    .min_connections(config.database.min_connections)
                    .connect(url)
                    .await
                    .context("Failed to connect to database")?;
                info!("Connected to database");

                Ok(Self {
                    templates: Arc::new(MailTemplateRepositoryImpl::new(pool.clone())),
                    logs: Some(Arc::new(MailLogRepositoryImpl::new(pool.clone()))),
                    pool: Some(pool),
                })
            }
            None => {
                let templates = match &config.mail.templates_path {
                    Some(path) => InMemoryMailTemplateRepository::from_json_file(path).await?,
                    None => InMemoryMailTemplateRepository::new(),
                };
                info!("No database configured, mail logs are kept in memory");

                Ok(Self {
                    templates: Arc::new(templates),
                    logs: Some(Arc::new(InMemoryMailLogRepository::new())),
                    pool: None,
                })
            }
        }
    }

    /// Stores without a database pool behind them
    pub fn new(
        templates: Arc<dyn MailTemplateRepository>,
        logs: Option<Arc<dyn MailLogRepository>>,
    ) -> Self {
        Self {
            templates,
            logs,
            pool: None,
        }
    }
}

/// A running pipeline: the service front and the worker behind it
pub struct Mailroom {
    pub service: MailService,
    pub stores: Stores,
    worker: DeliveryWorker,
}

impl Mailroom {
    pub async fn start(config: &Config) -> Result<Self> {
        let stores = Stores::connect(config).await?;
        let transports = Arc::new(ConfiguredTransportFactory::new(config.transport.clone()));
        Ok(Self::with_parts(config, stores, transports))
    }

    /// Assemble the pipeline from already built collaborators
    pub fn with_parts(
        config: &Config,
        stores: Stores,
        transports: Arc<dyn TransportFactory>,
    ) -> Self {
        let ctx = Arc::new(DeliveryContext {
            transports,
            logs: stores.logs.clone(),
            allow_list: config.mail.allowed_emails.clone(),
            downloader: AttachmentDownloader::new(),
        });

        let (queue, worker) = DeliveryQueue::start(
            ctx,
            config.worker.concurrency,
            config.worker.queue_capacity,
        );
        let dispatcher = MailDispatcher::new(stores.logs.clone(), queue, config.mail.enabled)
            .with_debug(config.mail.debug);

        let service = MailService::new(
            stores.templates.clone(),
            stores.logs.clone(),
            dispatcher,
            config.mail.executor_settings(),
        );

        info!(
            transport = config.transport.transport_type(),
            enabled = config.mail.enabled,
            debug = config.mail.debug,
            "Mailroom started"
        );

        Self {
            service,
            stores,
            worker,
        }
    }

    /// Drain the queue and release the database pool
    pub async fn shutdown(self) {
        let Mailroom {
            service,
            stores,
            worker,
        } = self;

        // The service holds the last queue sender
        drop(service);
        worker.shutdown().await;

        if let Some(pool) = stores.pool {
            pool.close().await;
        }
        info!("Mailroom stopped");
    }
}
