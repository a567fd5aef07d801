//! Asynchronous delivery
//!
//! A [`DeliveryTask`] carries one composed message from the executor to a
//! transport. Tasks are handed to a [`DeliveryQueue`] and drained by a
//! bounded pool of concurrent workers; every task records exactly one
//! terminal status on its log record.

use crate::domain::{transition, DeliveryPayload, DeliveryStatus, LogId, MailStatus};
use crate::error::{MailError, Result};
use crate::mail::{
    resolve_local, AllowList, AttachmentDownloader, Envelope, OutgoingMail, ResolvedAttachment,
    ServiceTemplateMail, Transport, TransportError, TransportFactory,
};
use crate::repository::MailLogRepository;
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::Instrument;

/// Shared collaborators of every delivery task
pub struct DeliveryContext {
    pub transports: Arc<dyn TransportFactory>,
    pub logs: Option<Arc<dyn MailLogRepository>>,
    pub allow_list: AllowList,
    pub downloader: AttachmentDownloader,
}

/// Writes status updates for one log record, enforcing the state machine.
///
/// Updates are no-ops without a log id or store, and a missing record is
/// ignored. Store failures are logged and never abort the delivery.
struct StatusRecorder {
    logs: Option<Arc<dyn MailLogRepository>>,
    log_id: Option<LogId>,
    current: MailStatus,
}

impl StatusRecorder {
    fn new(logs: Option<Arc<dyn MailLogRepository>>, log_id: Option<LogId>) -> Self {
        Self {
            logs,
            log_id,
            current: MailStatus::Created,
        }
    }

    async fn record(&mut self, next: DeliveryStatus) {
        let next = match transition(self.current, next) {
            Ok(next) => next,
            Err(e) => {
                tracing::error!(log_id = ?self.log_id, error = %e, "Rejected status update");
                return;
            }
        };
        self.current = next.kind();

        let (Some(logs), Some(log_id)) = (&self.logs, self.log_id) else {
            return;
        };

        match logs.set_status(log_id, &next).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(log_id, status = %next.kind(), "Log record not found, status not stored")
            }
            Err(e) => {
                tracing::warn!(log_id, status = %next.kind(), error = %e, "Failed to store status")
            }
        }
    }
}

/// One delivery attempt
#[derive(Debug, Clone)]
pub struct DeliveryTask {
    payload: DeliveryPayload,
}

impl DeliveryTask {
    pub fn new(payload: DeliveryPayload) -> Self {
        Self { payload }
    }

    pub fn payload(&self) -> &DeliveryPayload {
        &self.payload
    }

    /// Run the task to completion and return the terminal status
    pub async fn run(self, ctx: &DeliveryContext) -> MailStatus {
        let log_id = self.payload.log_id;
        let span = tracing::info_span!("delivery", log_id = ?log_id);

        async move {
            let mut recorder = StatusRecorder::new(ctx.logs.clone(), log_id);
            let terminal = self.deliver(ctx, &mut recorder).await;

            match &terminal {
                DeliveryStatus::Success => tracing::info!("Mail delivered"),
                DeliveryStatus::Skip => tracing::info!("Recipient not allowed, delivery skipped"),
                DeliveryStatus::Failure(error) => tracing::warn!(%error, "Mail delivery failed"),
                _ => {}
            }

            let status = terminal.kind();
            recorder.record(terminal).await;
            counter!("mailroom_messages_total", "status" => status.as_str()).increment(1);
            status
        }
        .instrument(span)
        .await
    }

    async fn deliver(self, ctx: &DeliveryContext, recorder: &mut StatusRecorder) -> DeliveryStatus {
        let mut payload = self.payload;

        if !ctx.allow_list.allows_all(&payload.to) {
            tracing::debug!(to = %payload.to.join(", "), "Primary recipient rejected by allow-list");
            return DeliveryStatus::Skip;
        }
        payload.cc = ctx.allow_list.filter(&payload.cc);
        payload.bcc = ctx.allow_list.filter(&payload.bcc);

        recorder.record(DeliveryStatus::Sending).await;

        if payload.to.is_empty() {
            return DeliveryStatus::failure("No recipients specified");
        }

        let transport = match ctx.transports.create().await {
            Ok(transport) => transport,
            Err(e) => return DeliveryStatus::failure(format!("Transport Init Error: {}", e)),
        };

        if let Err(e) = transport.prepare(&mut payload) {
            return DeliveryStatus::failure(e.to_string());
        }

        // temporary files live until the end of this scope
        let materialized = ctx.downloader.materialize(&mut payload.attachments).await;
        let attachments = resolve_local(&payload.attachments);
        tracing::debug!(
            transport = transport.name(),
            attachments = attachments.len(),
            downloaded = materialized.len(),
            "Sending mail"
        );

        let started = Instant::now();
        let result = send(transport.as_ref(), payload, attachments).await;
        histogram!("mailroom_transport_send_duration_seconds", "transport" => transport.name())
            .record(started.elapsed().as_secs_f64());
        drop(materialized);

        match result {
            Ok(()) => DeliveryStatus::Success,
            Err(e) => DeliveryStatus::failure(e.to_string()),
        }
    }
}

async fn send(
    transport: &dyn Transport,
    payload: DeliveryPayload,
    attachments: Vec<ResolvedAttachment>,
) -> std::result::Result<(), TransportError> {
    let service_template = payload
        .service_template
        .clone()
        .filter(|s| !s.is_empty());

    let envelope = Envelope {
        to: payload.to,
        cc: payload.cc,
        bcc: payload.bcc,
        from_email: payload.from_email,
        from_name: payload.from_name,
        log_id: payload.log_id,
    };

    match service_template {
        Some(template_id) => {
            transport
                .send_using_service_template(&ServiceTemplateMail {
                    envelope,
                    template_id,
                    fields: payload.fields,
                    subject: payload.subject,
                    attachments,
                })
                .await
        }
        None => {
            transport
                .send(&OutgoingMail {
                    envelope,
                    subject: payload.subject.unwrap_or_default(),
                    body: payload.body.unwrap_or_default(),
                    attachments,
                })
                .await
        }
    }
}

/// Handle for enqueueing delivery tasks
#[derive(Clone)]
pub struct DeliveryQueue {
    sender: mpsc::Sender<DeliveryTask>,
}

/// The pool draining a [`DeliveryQueue`]
pub struct DeliveryWorker {
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl DeliveryQueue {
    /// Spawn the worker pool and return the queue feeding it
    pub fn start(
        ctx: Arc<DeliveryContext>,
        concurrency: usize,
        capacity: usize,
    ) -> (Self, DeliveryWorker) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(run_pool(ctx, receiver, shutdown_rx, concurrency.max(1)));
        tracing::info!(concurrency, capacity, "Delivery worker running");

        (
            Self { sender },
            DeliveryWorker {
                shutdown: Some(shutdown_tx),
                handle,
            },
        )
    }

    /// Hand a task to the pool; waits only while the queue is full
    pub async fn enqueue(&self, task: DeliveryTask) -> Result<()> {
        self.sender
            .send(task)
            .await
            .map_err(|_| MailError::QueueClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl DeliveryWorker {
    /// Stop accepting tasks, then wait for queued and in-flight deliveries
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Delivery worker terminated abnormally");
        }
    }
}

async fn run_pool(
    ctx: Arc<DeliveryContext>,
    mut receiver: mpsc::Receiver<DeliveryTask>,
    mut shutdown: oneshot::Receiver<()>,
    concurrency: usize,
) {
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut tasks = JoinSet::new();
    let mut listening = true;

    loop {
        let task = tokio::select! {
            signal = &mut shutdown, if listening => {
                listening = false;
                if signal.is_ok() {
                    tracing::info!("Delivery queue closing");
                    receiver.close();
                }
                continue;
            }
            task = receiver.recv() => task,
        };

        let Some(task) = task else {
            break;
        };

        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };

        while let Some(result) = tasks.try_join_next() {
            reap(result);
        }

        let ctx = ctx.clone();
        tasks.spawn(async move {
            let _permit = permit;
            task.run(&ctx).await
        });
    }

    while let Some(result) = tasks.join_next().await {
        reap(result);
    }
    tracing::info!("Delivery worker stopped");
}

fn reap(result: std::result::Result<MailStatus, JoinError>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "Delivery task panicked");
    }
}
