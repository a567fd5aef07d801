//! Mail composition and delivery building blocks
//!
//! This module provides the provider-agnostic transport contract and its
//! implementations:
//! - SMTP (using lettre)
//! - AWS SES
//! - Sendgrid and Mailgun (HTTP APIs)
//! - Log (development only)
//!
//! along with template substitution, recipient allow-listing and attachment
//! materialization.

pub mod attachments;
pub mod factory;
pub mod log;
pub mod mailgun;
mod mime;
pub mod recipients;
pub mod sendgrid;
pub mod ses;
pub mod smtp;
pub mod templates;
pub mod transport;

pub use attachments::{resolve_local, AttachmentDownloader, MaterializedAttachments, TempFile};
pub use factory::{
    build_transport, ConfiguredTransportFactory, StaticTransportFactory, TransportFactory,
};
pub use log::LogTransport;
pub use mailgun::MailgunTransport;
pub use recipients::{AllowList, ALLOW_ALL};
pub use sendgrid::SendgridTransport;
pub use ses::SesTransport;
pub use smtp::SmtpTransport;
pub use templates::{substitute, wrap_subject, TemplateEngine, SUBJECT_PLACEHOLDER};
pub use transport::{
    Envelope, OutgoingMail, ResolvedAttachment, Sender, ServiceTemplateMail, Transport,
    TransportError,
};
