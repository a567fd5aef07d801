//! Data access layer (Repository pattern)

pub mod mail_log;
pub mod mail_template;

pub use mail_log::{InMemoryMailLogRepository, MailLogRepository, MailLogRepositoryImpl};
pub use mail_template::{
    load_definitions, InMemoryMailTemplateRepository, MailTemplateRepository,
    MailTemplateRepositoryImpl,
};
