//! Render a [`Message`] into a MIME message with lettre.
//!
//! Layout:
//! - body only: a single `text/plain` part
//! - with alternatives: `multipart/alternative` (body first)
//! - with attachments: `multipart/mixed` wrapping the above, then attachments

use lettre::message::header::{ContentType, HeaderName, HeaderValue};
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};

use crate::error::{Error, TransportError};
use crate::mail::{Alternative, AttachmentRef, Message};

const DEFAULT_ATTACHMENT_TYPE: &str = "application/octet-stream";

/// Read any file attachments, then build the lettre message.
pub async fn render(msg: &Message) -> Result<lettre::Message, Error> {
    if !msg.attachments.iter().any(|a| matches!(a, AttachmentRef::File { .. })) {
        return Ok(to_lettre(msg)?);
    }
    let mut resolved = msg.clone();
    for attachment in &mut resolved.attachments {
        if let AttachmentRef::File { .. } = attachment {
            *attachment = attachment.resolve().await?.into();
        }
    }
    Ok(to_lettre(&resolved)?)
}

/// Build a lettre message. File attachments must already be resolved.
pub fn to_lettre(msg: &Message) -> Result<lettre::Message, TransportError> {
    if msg.recipients().next().is_none() {
        return Err(TransportError::Build(format!(
            "message '{}' has no recipients",
            msg.subject
        )));
    }

    let mut builder = lettre::Message::builder()
        .from(mailbox(&msg.from)?)
        .subject(msg.subject.clone());
    for addr in &msg.to {
        builder = builder.to(mailbox(addr)?);
    }
    for addr in &msg.cc {
        builder = builder.cc(mailbox(addr)?);
    }
    for addr in &msg.bcc {
        builder = builder.bcc(mailbox(addr)?);
    }
    for addr in &msg.reply_to {
        builder = builder.reply_to(mailbox(addr)?);
    }
    for (name, value) in &msg.headers {
        let name = HeaderName::new_from_ascii(name.clone())
            .map_err(|e| TransportError::Build(format!("invalid header name '{name}': {e}")))?;
        builder = builder.raw_header(HeaderValue::new(name, value.clone()));
    }

    let built = if msg.attachments.is_empty() {
        if msg.alternatives.is_empty() {
            builder.singlepart(SinglePart::plain(msg.body.clone()))
        } else {
            builder.multipart(alternative_part(&msg.body, &msg.alternatives)?)
        }
    } else {
        let mut mixed = if msg.alternatives.is_empty() {
            MultiPart::mixed().singlepart(SinglePart::plain(msg.body.clone()))
        } else {
            MultiPart::mixed().multipart(alternative_part(&msg.body, &msg.alternatives)?)
        };
        for attachment in &msg.attachments {
            mixed = mixed.singlepart(attachment_part(attachment)?);
        }
        builder.multipart(mixed)
    };

    built.map_err(|e| TransportError::Build(e.to_string()))
}

fn mailbox(addr: &str) -> Result<Mailbox, TransportError> {
    addr.parse().map_err(|e: lettre::address::AddressError| TransportError::InvalidAddress {
        address: addr.to_string(),
        reason: e.to_string(),
    })
}

fn content_type(mimetype: &str) -> Result<ContentType, TransportError> {
    ContentType::parse(mimetype)
        .map_err(|e| TransportError::Build(format!("invalid content type '{mimetype}': {e}")))
}

fn alternative_part(body: &str, alternatives: &[Alternative]) -> Result<MultiPart, TransportError> {
    let mut part = MultiPart::alternative().singlepart(SinglePart::plain(body.to_string()));
    for alt in alternatives {
        part = part.singlepart(
            SinglePart::builder()
                .header(content_type(&alt.mimetype)?)
                .body(alt.content.clone()),
        );
    }
    Ok(part)
}

fn attachment_part(attachment: &AttachmentRef) -> Result<SinglePart, TransportError> {
    let AttachmentRef::Inline {
        filename,
        content,
        mimetype,
    } = attachment
    else {
        return Err(TransportError::Build(
            "file attachments must be resolved before rendering".into(),
        ));
    };

    let ct = content_type(mimetype.as_deref().unwrap_or(DEFAULT_ATTACHMENT_TYPE))?;
    Ok(match filename {
        Some(name) => Attachment::new(name.clone()).body(content.clone(), ct),
        None => SinglePart::builder().header(ct).body(content.clone()),
    })
}

#[cfg(test)]
mod tests {
    use mail_parser::{MessageParser, MimeHeaders};

    use super::*;
    use crate::mail::ENCRYPTED_MIMETYPE;

    fn parse(msg: &lettre::Message) -> mail_parser::Message<'static> {
        MessageParser::default()
            .parse(&msg.formatted())
            .unwrap()
            .into_owned()
    }

    #[test]
    fn plain_message_renders_headers_and_body() {
        let mut msg = Message::new("me@x.com", &["a@x.com"], "Hello", "hi there")
            .with_header("X-Ticket", "42");
        msg.cc = vec!["c@x.com".into()];

        let parsed = parse(&to_lettre(&msg).unwrap());
        assert_eq!(parsed.subject(), Some("Hello"));
        assert_eq!(parsed.body_text(0).as_deref().map(str::trim_end), Some("hi there"));
        let ticket = parsed
            .headers()
            .iter()
            .find(|h| h.name.as_str() == "X-Ticket")
            .and_then(|h| h.value.as_text());
        assert_eq!(ticket, Some("42"));
        let cc = parsed.cc().and_then(|a| a.first()).and_then(|a| a.address());
        assert_eq!(cc, Some("c@x.com"));
    }

    #[test]
    fn alternatives_and_attachments_render_as_parts() {
        let msg = Message::new("me@x.com", &["b@x.com"], "Report", "ENC body")
            .with_alternative("<p>see attached</p>", "text/html")
            .with_attachment(AttachmentRef::inline(
                "report.pdf.asc",
                b"ENC pdf".to_vec(),
                ENCRYPTED_MIMETYPE,
            ));

        let parsed = parse(&to_lettre(&msg).unwrap());
        assert_eq!(parsed.attachment_count(), 1);
        let attachment = parsed.attachment(0).unwrap();
        assert_eq!(attachment.attachment_name(), Some("report.pdf.asc"));
        assert_eq!(attachment.contents(), b"ENC pdf");
        let ct = attachment.content_type().unwrap();
        assert_eq!(ct.ctype(), "application");
        assert_eq!(ct.subtype(), Some("gpg-encrypted"));
    }

    #[test]
    fn bcc_only_message_still_renders() {
        let mut msg = Message::new("me@x.com", &[], "Hidden", "x");
        msg.bcc = vec!["d@x.com".into()];
        let rendered = to_lettre(&msg).unwrap();
        assert_eq!(rendered.envelope().to().len(), 1);
    }

    #[test]
    fn message_without_recipients_is_rejected() {
        let msg = Message::new("me@x.com", &[], "Nobody", "x");
        assert!(matches!(to_lettre(&msg), Err(TransportError::Build(_))));
    }

    #[test]
    fn invalid_address_is_reported() {
        let msg = Message::new("me@x.com", &["not an address"], "Hi", "x");
        match to_lettre(&msg) {
            Err(TransportError::InvalidAddress { address, .. }) => {
                assert_eq!(address, "not an address")
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn render_reads_file_attachments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"plain notes").unwrap();
        let msg = Message::new("me@x.com", &["a@x.com"], "Hi", "x")
            .with_attachment(AttachmentRef::file(&path));

        let parsed = parse(&render(&msg).await.unwrap());
        let attachment = parsed.attachment(0).unwrap();
        assert_eq!(attachment.attachment_name(), Some("notes.txt"));
        assert_eq!(attachment.contents(), b"plain notes");
    }

    #[test]
    fn unresolved_file_attachment_is_rejected() {
        let msg = Message::new("me@x.com", &["a@x.com"], "Hi", "x")
            .with_attachment(AttachmentRef::file("/tmp/report.pdf"));
        assert!(matches!(to_lettre(&msg), Err(TransportError::Build(_))));
    }
}
