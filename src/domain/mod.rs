//! Domain models for Mailroom

pub mod attachment;
pub mod mail_log;
pub mod mail_template;
pub mod message;
pub mod transport;

pub use attachment::*;
pub use mail_log::*;
pub use mail_template::*;
pub use message::*;
pub use transport::*;
