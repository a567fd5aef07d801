//! Log-then-enqueue hand-off shared by the executor and resends

use super::delivery::{DeliveryQueue, DeliveryTask};
use crate::domain::{DeliveryPayload, DeliveryStatus, LogId, MailStatus, NewMailLog};
use crate::error::{MailError, Result};
use crate::repository::MailLogRepository;
use metrics::counter;
use std::sync::Arc;

/// What happened to a message handed to the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Sending is globally disabled; a `disabled` log was written
    Disabled { log_id: Option<LogId> },
    /// Debug mode; a `success` log marked as debug was written, nothing sent
    Debug { log_id: Option<LogId> },
    /// A `created` log was written and the delivery task enqueued
    Queued { log_id: Option<LogId> },
}

impl Dispatch {
    pub fn log_id(&self) -> Option<LogId> {
        match self {
            Self::Disabled { log_id } | Self::Debug { log_id } | Self::Queued { log_id } => {
                *log_id
            }
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }
}

#[derive(Clone)]
pub struct MailDispatcher {
    logs: Option<Arc<dyn MailLogRepository>>,
    queue: DeliveryQueue,
    enabled: bool,
    debug: bool,
}

impl MailDispatcher {
    pub fn new(
        logs: Option<Arc<dyn MailLogRepository>>,
        queue: DeliveryQueue,
        enabled: bool,
    ) -> Self {
        Self {
            logs,
            queue,
            enabled,
            debug: false,
        }
    }

    /// In debug mode messages are logged as delivered and never sent
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    async fn create_log(&self, log: &NewMailLog) -> Result<Option<LogId>> {
        match &self.logs {
            Some(logs) => Ok(Some(logs.create(log).await?)),
            None => Ok(None),
        }
    }

    /// Persist the log record, then enqueue the delivery
    pub async fn dispatch(
        &self,
        mut log: NewMailLog,
        mut payload: DeliveryPayload,
    ) -> Result<Dispatch> {
        if !self.enabled {
            log.status = MailStatus::Disabled;
            let log_id = self.create_log(&log).await?;
            counter!("mailroom_messages_total", "status" => MailStatus::Disabled.as_str())
                .increment(1);
            tracing::info!(?log_id, recipient = %log.recipient, "Mail sending disabled, message logged only");
            return Ok(Dispatch::Disabled { log_id });
        }

        if self.debug {
            log.status = MailStatus::Success;
            log.debug = true;
            let log_id = self.create_log(&log).await?;
            counter!("mailroom_messages_total", "status" => MailStatus::Success.as_str())
                .increment(1);
            tracing::info!(?log_id, recipient = %log.recipient, "Debug mode, message logged as sent");
            return Ok(Dispatch::Debug { log_id });
        }

        if self.queue.is_closed() {
            return Err(MailError::QueueClosed);
        }

        log.status = MailStatus::Created;
        let log_id = self.create_log(&log).await?;
        payload.log_id = log_id;

        if let Err(e) = self.queue.enqueue(DeliveryTask::new(payload)).await {
            self.fail_log(log_id, &e).await;
            return Err(e);
        }

        tracing::debug!(?log_id, template = ?log.template, "Mail queued for delivery");
        Ok(Dispatch::Queued { log_id })
    }

    /// Queue a skipped record again under its own log id.
    ///
    /// Returns `None` when nothing was queued: sending is disabled or in
    /// debug mode, or the record is no longer skipped.
    pub async fn requeue(
        &self,
        log_id: LogId,
        mut payload: DeliveryPayload,
    ) -> Result<Option<Dispatch>> {
        let Some(logs) = &self.logs else {
            return Err(MailError::Configuration(
                "Resending skipped mail requires a log store".to_string(),
            ));
        };

        if !self.enabled || self.debug {
            tracing::info!(log_id, "Sending disabled or in debug mode, skipped mail left in place");
            return Ok(None);
        }

        if self.queue.is_closed() {
            return Err(MailError::QueueClosed);
        }

        if !logs.requeue_skipped(log_id).await? {
            tracing::debug!(log_id, "Log record no longer skipped, not resent");
            return Ok(None);
        }
        payload.log_id = Some(log_id);

        if let Err(e) = self.queue.enqueue(DeliveryTask::new(payload)).await {
            self.fail_log(Some(log_id), &e).await;
            return Err(e);
        }

        tracing::debug!(log_id, "Skipped mail queued again");
        Ok(Some(Dispatch::Queued {
            log_id: Some(log_id),
        }))
    }

    /// The queue closed between the check and the hand-off
    async fn fail_log(&self, log_id: Option<LogId>, error: &MailError) {
        let (Some(logs), Some(log_id)) = (&self.logs, log_id) else {
            return;
        };
        if let Err(e) = logs
            .set_status(log_id, &DeliveryStatus::failure(error.to_string()))
            .await
        {
            tracing::warn!(log_id, error = %e, "Failed to mark undeliverable log");
        }
    }
}
