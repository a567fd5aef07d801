//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use mailroom::app::{Mailroom, Stores};
use mailroom::config::Config;
use mailroom::domain::{MailLog, MailTemplate};
use mailroom::mail::{
    OutgoingMail, ServiceTemplateMail, StaticTransportFactory, Transport, TransportError,
};
use mailroom::repository::{
    InMemoryMailLogRepository, InMemoryMailTemplateRepository, MailLogRepository,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// What a [`RecordingTransport`] was asked to send
#[derive(Debug, Clone)]
pub enum Sent {
    Mail(OutgoingMail),
    ServiceTemplate(ServiceTemplateMail),
}

impl Sent {
    pub fn cc(&self) -> &[String] {
        match self {
            Sent::Mail(mail) => &mail.envelope.cc,
            Sent::ServiceTemplate(mail) => &mail.envelope.cc,
        }
    }

    pub fn to(&self) -> &[String] {
        match self {
            Sent::Mail(mail) => &mail.envelope.to,
            Sent::ServiceTemplate(mail) => &mail.envelope.to,
        }
    }
}

/// Transport that records every call and whether attachment files existed
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    seen_files: Mutex<Vec<(PathBuf, bool)>>,
    fail_with: Option<String>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            fail_with: Some(message.to_string()),
            ..Default::default()
        })
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Attachment paths handed over, and whether each existed at send time
    pub fn seen_files(&self) -> Vec<(PathBuf, bool)> {
        self.seen_files.lock().unwrap().clone()
    }

    fn record(&self, sent: Sent, files: &[PathBuf]) -> Result<(), TransportError> {
        self.seen_files
            .lock()
            .unwrap()
            .extend(files.iter().map(|p| (p.clone(), p.exists())));
        self.sent.lock().unwrap().push(sent);

        match &self.fail_with {
            Some(message) => Err(TransportError::SendFailed(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), TransportError> {
        let files: Vec<PathBuf> = mail.attachments.iter().map(|a| a.path.clone()).collect();
        self.record(Sent::Mail(mail.clone()), &files)
    }

    async fn send_using_service_template(
        &self,
        mail: &ServiceTemplateMail,
    ) -> Result<(), TransportError> {
        let files: Vec<PathBuf> = mail.attachments.iter().map(|a| a.path.clone()).collect();
        self.record(Sent::ServiceTemplate(mail.clone()), &files)
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Build a configuration from explicit variables only
pub fn config(vars: &[(&str, &str)]) -> Config {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_lookup(|key| vars.get(key).cloned()).expect("valid test configuration")
}

/// A pipeline over in-memory stores and a recording transport
pub struct TestPipeline {
    pub mailroom: Mailroom,
    pub logs: Arc<InMemoryMailLogRepository>,
    pub transport: Arc<RecordingTransport>,
}

impl TestPipeline {
    pub fn start(config: &Config, templates: Vec<MailTemplate>) -> Self {
        Self::with_transport(config, templates, RecordingTransport::new())
    }

    pub fn with_transport(
        config: &Config,
        templates: Vec<MailTemplate>,
        transport: Arc<RecordingTransport>,
    ) -> Self {
        Self::build(
            config,
            templates,
            Arc::new(InMemoryMailLogRepository::new()),
            transport,
        )
    }

    /// A pipeline writing to an existing log store
    pub fn with_logs(
        config: &Config,
        logs: Arc<InMemoryMailLogRepository>,
        transport: Arc<RecordingTransport>,
    ) -> Self {
        Self::build(config, Vec::new(), logs, transport)
    }

    fn build(
        config: &Config,
        templates: Vec<MailTemplate>,
        logs: Arc<InMemoryMailLogRepository>,
        transport: Arc<RecordingTransport>,
    ) -> Self {
        let stores = Stores::new(
            Arc::new(InMemoryMailTemplateRepository::with_templates(templates)),
            Some(logs.clone() as Arc<dyn MailLogRepository>),
        );
        let factory = Arc::new(StaticTransportFactory::new(transport.clone()));
        let mailroom = Mailroom::with_parts(config, stores, factory);

        Self {
            mailroom,
            logs,
            transport,
        }
    }

    /// Wait for every queued delivery, then return the log records
    pub async fn finish(self) -> (Vec<MailLog>, Arc<RecordingTransport>) {
        self.mailroom.shutdown().await;
        (self.logs.records().await, self.transport)
    }
}
