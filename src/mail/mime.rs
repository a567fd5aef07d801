//! MIME message assembly shared by the SMTP and SES transports

use super::transport::{OutgoingMail, Sender, TransportError};
use lettre::message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart};
use lettre::Message;

pub(crate) fn parse_mailbox(address: &str, kind: &str) -> Result<Mailbox, TransportError> {
    address.parse().map_err(|e| {
        TransportError::InvalidConfiguration(format!("Invalid {} address: {}", kind, e))
    })
}

/// Build an HTML message, as `multipart/mixed` when attachments are present
pub(crate) async fn build_message(
    mail: &OutgoingMail,
    sender: &Sender,
) -> Result<Message, TransportError> {
    if mail.envelope.to.is_empty() {
        return Err(TransportError::SendFailed(
            "No recipients specified".to_string(),
        ));
    }

    let mut builder = Message::builder()
        .from(parse_mailbox(&sender.formatted(), "from")?)
        .subject(&mail.subject);

    for to in &mail.envelope.to {
        builder = builder.to(parse_mailbox(to, "to")?);
    }
    for cc in &mail.envelope.cc {
        builder = builder.cc(parse_mailbox(cc, "cc")?);
    }
    for bcc in &mail.envelope.bcc {
        builder = builder.bcc(parse_mailbox(bcc, "bcc")?);
    }

    if mail.attachments.is_empty() {
        return builder
            .header(ContentType::TEXT_HTML)
            .body(mail.body.clone())
            .map_err(|e| TransportError::SendFailed(e.to_string()));
    }

    let mut multipart = MultiPart::mixed().singlepart(
        SinglePart::builder()
            .header(ContentType::TEXT_HTML)
            .body(mail.body.clone()),
    );

    for attachment in &mail.attachments {
        let content = attachment.read().await?;
        let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
            TransportError::Attachment(format!(
                "{}: invalid content type {}: {}",
                attachment.file_name, attachment.content_type, e
            ))
        })?;
        multipart = multipart
            .singlepart(Attachment::new(attachment.file_name.clone()).body(content, content_type));
    }

    builder
        .multipart(multipart)
        .map_err(|e| TransportError::SendFailed(e.to_string()))
}
