//! Per-recipient attachment encryption.

use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::mail::{ASC_SUFFIX, AttachmentRef, ENCRYPTED_MIMETYPE};
use crate::pipeline::crypt::encrypt_bytes;
use crate::pipeline::encryptor::Encryptor;
use crate::policy::Recovery;

/// Result of transforming one part of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartOutcome<T> {
    Keep(T),
    Omit,
    DropMessage,
}

impl Encryptor {
    /// Encrypt one attachment for `address`.
    ///
    /// Attachments already tagged as ciphertext are returned unchanged. File
    /// references are read first; a read failure aborts the batch.
    pub async fn encrypt_attachment(
        &self,
        address: &str,
        attachment: &AttachmentRef,
        use_asc: bool,
    ) -> Result<PartOutcome<AttachmentRef>, PipelineError> {
        if attachment.is_encrypted() {
            return Ok(PartOutcome::Keep(attachment.clone()));
        }

        let resolved = attachment.resolve().await?;
        match encrypt_bytes(
            self.engine.as_ref(),
            &resolved.content,
            address,
            &self.options,
        )
        .await
        {
            Ok(ciphertext) => {
                let filename = resolved.filename.map(|name| {
                    if use_asc {
                        format!("{name}{ASC_SUFFIX}")
                    } else {
                        name
                    }
                });
                debug!(address, filename = ?filename, bytes = ciphertext.len(), "Attachment encrypted");
                Ok(PartOutcome::Keep(AttachmentRef::Inline {
                    filename,
                    content: ciphertext,
                    mimetype: Some(ENCRYPTED_MIMETYPE.to_string()),
                }))
            }
            Err(error) => {
                warn!(address, filename = ?resolved.filename, error = %error, "Attachment encryption failed");
                let outcome = match self.policy.on_attachment_encryption_failed(&error).await? {
                    Recovery::Cleartext => PartOutcome::Keep(resolved.into()),
                    Recovery::Blank => PartOutcome::Keep(AttachmentRef::Inline {
                        filename: resolved.filename,
                        content: Vec::new(),
                        mimetype: resolved.mimetype,
                    }),
                    Recovery::Substitute(text) => PartOutcome::Keep(AttachmentRef::Inline {
                        filename: resolved.filename,
                        content: self.engine.encoding().encode(&text),
                        mimetype: Some("text/plain".to_string()),
                    }),
                    Recovery::Omit => PartOutcome::Omit,
                    Recovery::DropMessage => PartOutcome::DropMessage,
                };
                Ok(outcome)
            }
        }
    }

    /// Encrypt every attachment in order, or `None` to drop the copy.
    pub(crate) async fn encrypt_attachments(
        &self,
        attachments: &[AttachmentRef],
        address: &str,
        use_asc: bool,
    ) -> Result<Option<Vec<AttachmentRef>>, PipelineError> {
        let mut out = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            match self.encrypt_attachment(address, attachment, use_asc).await? {
                PartOutcome::Keep(a) => out.push(a),
                PartOutcome::Omit => {}
                PartOutcome::DropMessage => return Ok(None),
            }
        }
        Ok(Some(out))
    }
}
