//! Delivery log domain types and the delivery status state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Identifier of a delivery log record
pub type LogId = i64;

/// Persisted delivery status
///
/// ```text
/// Created ──> Sending ──> Success | Failure
///    └──────> Skip ──> Created (resend, once per skipped record)
/// Disabled (initial and terminal, written by the executor only)
/// Success is also written at creation for debug-mode records
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailStatus {
    Created,
    Sending,
    Success,
    Failure,
    Skip,
    Disabled,
}

impl MailStatus {
    pub fn all() -> &'static [MailStatus] {
        &[
            MailStatus::Created,
            MailStatus::Sending,
            MailStatus::Success,
            MailStatus::Failure,
            MailStatus::Skip,
            MailStatus::Disabled,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Sending => "sending",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Skip => "skip",
            Self::Disabled => "disabled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failure | Self::Skip | Self::Disabled
        )
    }

    /// Statuses a log record may be created with
    pub fn is_initial(&self) -> bool {
        matches!(self, Self::Created | Self::Disabled | Self::Success)
    }

    /// Whether `self -> next` is an edge of the delivery state machine
    pub fn can_transition_to(&self, next: MailStatus) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Sending)
                | (Self::Created, Self::Skip)
                | (Self::Sending, Self::Success)
                | (Self::Sending, Self::Failure)
                | (Self::Skip, Self::Created)
        )
    }
}

impl fmt::Display for MailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MailStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MailStatus::all()
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Unknown mail status: {}", s))
    }
}

impl<'r> sqlx::Decode<'r, sqlx::MySql> for MailStatus {
    fn decode(value: sqlx::mysql::MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = sqlx::Decode::<'r, sqlx::MySql>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl sqlx::Type<sqlx::MySql> for MailStatus {
    fn type_info() -> sqlx::mysql::MySqlTypeInfo {
        <String as sqlx::Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &sqlx::mysql::MySqlTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::MySql>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::MySql> for MailStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<u8>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::MySql>>::encode_by_ref(&self.as_str(), buf)
    }
}

/// Status value carrying its payload, as written by the delivery worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Created,
    Sending,
    Success,
    Failure(String),
    Skip,
    Disabled,
}

impl DeliveryStatus {
    pub fn kind(&self) -> MailStatus {
        match self {
            Self::Created => MailStatus::Created,
            Self::Sending => MailStatus::Sending,
            Self::Success => MailStatus::Success,
            Self::Failure(_) => MailStatus::Failure,
            Self::Skip => MailStatus::Skip,
            Self::Disabled => MailStatus::Disabled,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failure(message) => Some(message),
            _ => None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(message.into())
    }
}

/// Rejected state machine edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: MailStatus,
    pub to: MailStatus,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid status transition {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

/// Validate `current -> next` against the state machine
pub fn transition(
    current: MailStatus,
    next: DeliveryStatus,
) -> Result<DeliveryStatus, InvalidTransition> {
    if current.can_transition_to(next.kind()) {
        Ok(next)
    } else {
        Err(InvalidTransition {
            from: current,
            to: next.kind(),
        })
    }
}

/// Input for creating a delivery log record
#[derive(Debug, Clone, PartialEq)]
pub struct NewMailLog {
    pub recipient: String,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub from_email: Option<String>,
    pub from_name: Option<String>,
    pub status: MailStatus,
    pub template_id: Option<i64>,
    pub template: Option<String>,
    pub service_template: Option<String>,
    /// JSON encoded template fields, only for service template sends
    pub service_template_params: Option<String>,
    pub attachments: Option<String>,
    pub debug: bool,
}

/// Stored delivery log record
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct MailLog {
    pub id: LogId,
    pub recipient: String,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub from_email: Option<String>,
    pub from_name: Option<String>,
    pub status: MailStatus,
    pub error: Option<String>,
    pub template_id: Option<i64>,
    pub template: Option<String>,
    pub service_template: Option<String>,
    pub service_template_params: Option<String>,
    pub attachments: Option<String>,
    pub debug: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MailLog {
    pub fn from_new(id: LogId, input: &NewMailLog) -> Self {
        let now = Utc::now();
        Self {
            id,
            recipient: input.recipient.clone(),
            cc: input.cc.clone(),
            bcc: input.bcc.clone(),
            subject: input.subject.clone(),
            body: input.body.clone(),
            from_email: input.from_email.clone(),
            from_name: input.from_name.clone(),
            status: input.status,
            error: None,
            template_id: input.template_id,
            template: input.template.clone(),
            service_template: input.service_template.clone(),
            service_template_params: input.service_template_params.clone(),
            attachments: input.attachments.clone(),
            debug: input.debug,
            created_at: now,
            updated_at: now,
        }
    }
}
