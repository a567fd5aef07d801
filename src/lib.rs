//! Mailroom - transactional mail composition and delivery
//!
//! Messages are composed from stored templates, recorded in an audit log,
//! and delivered in the background through a pluggable transport (SMTP,
//! AWS SES, Sendgrid, Mailgun, or the application log).

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod mail;
pub mod migration;
pub mod repository;
pub mod service;
pub mod telemetry;

// Re-export commonly used types
pub use app::Mailroom;
pub use config::Config;
pub use error::{MailError, Result};
