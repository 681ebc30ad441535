//! Message splitter and encryptor.
//!
//! For each input message:
//! 1. Partition `to` into keyless and keyed recipients
//! 2. Keyless recipients get one unencrypted copy
//! 3. Keyed recipients get encrypted copies (see [`FanoutMode`]), or one
//!    unencrypted copy when the message is marked `do_not_encrypt`
//!
//! The input message itself is consumed; only derived copies leave.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::crypto::{CryptoEngine, EncryptOptions};
use crate::error::PipelineError;
use crate::keys::{KeyDirectory, KeyedRecipient};
use crate::mail::{Alternative, ENCRYPTED_MIMETYPE, Message};
use crate::pipeline::crypt::encrypt_text;
use crate::pipeline::partition::partition_recipients;
use crate::pipeline::{Disposition, FanoutMode};
use crate::policy::{FailurePolicy, Recovery};

/// Splits messages by key availability and encrypts the keyed copies.
pub struct Encryptor {
    pub(crate) engine: Arc<dyn CryptoEngine>,
    pub(crate) directory: Arc<dyn KeyDirectory>,
    pub(crate) policy: Arc<dyn FailurePolicy>,
    pub(crate) options: EncryptOptions,
    pub(crate) fanout: FanoutMode,
}

impl Encryptor {
    pub fn new(
        engine: Arc<dyn CryptoEngine>,
        directory: Arc<dyn KeyDirectory>,
        policy: Arc<dyn FailurePolicy>,
    ) -> Self {
        Self {
            engine,
            directory,
            policy,
            options: EncryptOptions::default(),
            fanout: FanoutMode::default(),
        }
    }

    pub fn with_options(mut self, options: EncryptOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_fanout(mut self, fanout: FanoutMode) -> Self {
        self.fanout = fanout;
        self
    }

    /// Expand and encrypt a batch.
    ///
    /// Messages are handled strictly in input order. A handled failure does not
    /// stop sibling operations; a policy error aborts the batch.
    pub async fn encrypt_messages(
        &self,
        messages: Vec<Message>,
    ) -> Result<Vec<Message>, PipelineError> {
        let batch_id = Uuid::new_v4();
        info!(%batch_id, count = messages.len(), fanout = ?self.fanout, "Encrypting message batch");

        let mut unencrypted = Vec::new();
        let mut encrypted = Vec::new();

        for msg in messages {
            let partition = partition_recipients(self.directory.as_ref(), &msg.to).await?;
            debug!(
                %batch_id,
                subject = %msg.subject,
                keyless = partition.keyless.len(),
                keyed = partition.keyed.len(),
                "Recipients partitioned"
            );

            if !partition.keyless.is_empty() {
                unencrypted.push(msg.duplicate_for(partition.keyless.clone()));
            }
            if partition.keyed.is_empty() {
                continue;
            }

            if msg.do_not_encrypt {
                debug!(%batch_id, subject = %msg.subject, "Encryption suppressed for message");
                unencrypted.push(msg.duplicate_for(partition.keyed_addresses()));
                continue;
            }

            match self.fanout {
                FanoutMode::PerRecipient => {
                    for recipient in &partition.keyed {
                        let mut copy = msg.duplicate_for(vec![recipient.address.clone()]);
                        match self.encrypt_for(&mut copy, recipient).await? {
                            Disposition::Send => encrypted.push(copy),
                            Disposition::Drop => {
                                info!(%batch_id, address = %recipient.address, "Encrypted copy dropped by policy");
                            }
                        }
                    }
                }
                FanoutMode::SharedCopy => {
                    let mut copy = msg.duplicate_for(partition.keyed_addresses());
                    let mut disposition = Disposition::Send;
                    for recipient in &partition.keyed {
                        // Each pass starts from the source content and overwrites the copy.
                        copy.body.clone_from(&msg.body);
                        copy.alternatives.clone_from(&msg.alternatives);
                        copy.attachments.clone_from(&msg.attachments);
                        if self.encrypt_for(&mut copy, recipient).await? == Disposition::Drop {
                            disposition = Disposition::Drop;
                        }
                    }
                    match disposition {
                        Disposition::Send => encrypted.push(copy),
                        Disposition::Drop => {
                            info!(%batch_id, subject = %msg.subject, "Shared encrypted copy dropped by policy");
                        }
                    }
                }
            }
        }

        info!(
            %batch_id,
            unencrypted = unencrypted.len(),
            encrypted = encrypted.len(),
            "Batch encryption complete"
        );
        unencrypted.extend(encrypted);
        Ok(unencrypted)
    }

    /// Encrypt body, alternatives and attachments of `msg` for one recipient.
    pub(crate) async fn encrypt_for(
        &self,
        msg: &mut Message,
        recipient: &KeyedRecipient,
    ) -> Result<Disposition, PipelineError> {
        let address = recipient.address.as_str();

        if self.encrypt_body(msg, address).await? == Disposition::Drop {
            return Ok(Disposition::Drop);
        }

        if !msg.alternatives.is_empty() {
            match self.encrypt_alternatives(&msg.alternatives, address).await? {
                Some(alternatives) => msg.alternatives = alternatives,
                None => return Ok(Disposition::Drop),
            }
        }

        if !msg.attachments.is_empty() {
            match self
                .encrypt_attachments(&msg.attachments, address, recipient.use_asc)
                .await?
            {
                Some(attachments) => msg.attachments = attachments,
                None => return Ok(Disposition::Drop),
            }
        }

        Ok(Disposition::Send)
    }

    async fn encrypt_body(
        &self,
        msg: &mut Message,
        address: &str,
    ) -> Result<Disposition, PipelineError> {
        let error = match encrypt_text(self.engine.as_ref(), &msg.body, address, &self.options).await
        {
            Ok(ciphertext) => {
                msg.body = ciphertext;
                return Ok(Disposition::Send);
            }
            Err(error) => error,
        };

        warn!(address, error = %error, "Message body encryption failed");
        match self.policy.on_message_body_encryption_failed(&error).await? {
            Recovery::Cleartext => {}
            Recovery::Blank | Recovery::Omit => msg.body.clear(),
            Recovery::Substitute(text) => msg.body = text,
            Recovery::DropMessage => return Ok(Disposition::Drop),
        }
        Ok(Disposition::Send)
    }

    /// Transformed alternatives in original order, or `None` to drop the copy.
    async fn encrypt_alternatives(
        &self,
        alternatives: &[Alternative],
        address: &str,
    ) -> Result<Option<Vec<Alternative>>, PipelineError> {
        let mut out = Vec::with_capacity(alternatives.len());
        for alt in alternatives {
            if alt.is_encrypted() {
                out.push(alt.clone());
                continue;
            }

            match encrypt_text(self.engine.as_ref(), &alt.content, address, &self.options).await {
                Ok(ciphertext) => out.push(Alternative {
                    content: ciphertext,
                    mimetype: ENCRYPTED_MIMETYPE.to_string(),
                }),
                Err(error) => {
                    warn!(address, mimetype = %alt.mimetype, error = %error, "Alternative encryption failed");
                    match self.policy.on_alternative_encryption_failed(&error).await? {
                        Recovery::Cleartext => out.push(alt.clone()),
                        Recovery::Blank => out.push(Alternative {
                            content: String::new(),
                            mimetype: alt.mimetype.clone(),
                        }),
                        Recovery::Substitute(text) => out.push(Alternative {
                            content: text,
                            mimetype: alt.mimetype.clone(),
                        }),
                        Recovery::Omit => {}
                        Recovery::DropMessage => return Ok(None),
                    }
                }
            }
        }
        Ok(Some(out))
    }
}
