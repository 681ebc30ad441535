//! Clear-signing of outbound bodies.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::crypto::{CryptoEngine, EncryptOptions};
use crate::error::PipelineError;
use crate::mail::Message;
use crate::pipeline::SigningFailureMode;
use crate::pipeline::crypt::sign_text;
use crate::policy::{FailurePolicy, Recovery};

/// Replaces each message body with a clear-signed version.
///
/// Alternatives and attachments are not signed.
pub struct Signer {
    engine: Arc<dyn CryptoEngine>,
    policy: Arc<dyn FailurePolicy>,
    signing_key: String,
    options: EncryptOptions,
    failures: SigningFailureMode,
}

impl Signer {
    pub fn new(
        engine: Arc<dyn CryptoEngine>,
        policy: Arc<dyn FailurePolicy>,
        signing_key: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            policy,
            signing_key: signing_key.into(),
            options: EncryptOptions::default(),
            failures: SigningFailureMode::default(),
        }
    }

    pub fn with_options(mut self, options: EncryptOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_failure_mode(mut self, failures: SigningFailureMode) -> Self {
        self.failures = failures;
        self
    }

    /// Sign every message body in place, preserving order.
    pub async fn sign_messages(
        &self,
        messages: Vec<Message>,
    ) -> Result<Vec<Message>, PipelineError> {
        let batch_id = Uuid::new_v4();
        info!(%batch_id, count = messages.len(), key = %self.signing_key, "Signing message batch");

        let mut out = Vec::with_capacity(messages.len());
        for mut msg in messages {
            match sign_text(
                self.engine.as_ref(),
                &msg.body,
                &self.signing_key,
                &self.options,
            )
            .await {
                Ok(signed) => {
                    msg.body = signed;
                    out.push(msg);
                }
                Err(error) => {
                    warn!(%batch_id, subject = %msg.subject, error = %error, "Message signing failed");
                    if self.failures == SigningFailureMode::Strict {
                        return Err(PipelineError::Signing(error));
                    }
                    match self.policy.on_message_signing_failed(&error).await? {
                        Recovery::Cleartext => {}
                        Recovery::Blank | Recovery::Omit => msg.body.clear(),
                        Recovery::Substitute(text) => msg.body = text,
                        Recovery::DropMessage => {
                            debug!(%batch_id, subject = %msg.subject, "Unsigned message dropped by policy");
                            continue;
                        }
                    }
                    out.push(msg);
                }
            }
        }

        info!(%batch_id, signed = out.len(), "Batch signing complete");
        Ok(out)
    }
}
