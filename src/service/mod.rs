//! Business logic layer

pub mod delivery;
pub mod dispatch;
pub mod executor;
pub mod mail;

pub use delivery::{DeliveryContext, DeliveryQueue, DeliveryTask, DeliveryWorker};
pub use dispatch::{Dispatch, MailDispatcher};
pub use executor::{
    apply_template_defaults, resolve, ExecutorSettings, MailExecutor, MessageDraft,
    ResolvedMessage,
};
pub use mail::{MailService, SendMail, TemplateMail};
