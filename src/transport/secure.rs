//! Encrypt-before-send and sign-before-send wrappers around any transport.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::Error;
use crate::mail::Message;
use crate::pipeline::{Encryptor, Signer};
use crate::transport::Transport;

/// Transform applied to a batch before the inner transport sees it.
pub enum PreSend {
    Encrypt(Arc<Encryptor>),
    Sign(Arc<Signer>),
}

/// A transport whose batches pass through a [`PreSend`] step first.
///
/// When disabled the batch goes to the inner transport untouched. The inner
/// transport's result (or error) is returned as is.
pub struct SecureTransport {
    inner: Arc<dyn Transport>,
    pre_send: PreSend,
    enabled: bool,
    name: String,
}

impl SecureTransport {
    pub fn new(inner: Arc<dyn Transport>, pre_send: PreSend) -> Self {
        let prefix = match pre_send {
            PreSend::Encrypt(_) => "encrypting",
            PreSend::Sign(_) => "signing",
        };
        let name = format!("{prefix}-{}", inner.name());
        Self {
            inner,
            pre_send,
            enabled: true,
            name,
        }
    }

    /// Build an encrypting transport.
    pub fn encrypting(inner: Arc<dyn Transport>, encryptor: Encryptor) -> Self {
        Self::new(inner, PreSend::Encrypt(Arc::new(encryptor)))
    }

    /// Build a signing transport.
    pub fn signing(inner: Arc<dyn Transport>, signer: Signer) -> Self {
        Self::new(inner, PreSend::Sign(Arc::new(signer)))
    }

    /// Turn the pre-send step on or off (the process-wide GnuPG switch).
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

#[async_trait]
impl Transport for SecureTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_messages(&self, messages: Vec<Message>) -> Result<usize, Error> {
        let messages = if !self.enabled {
            debug!(transport = %self.name, "GnuPG disabled, sending batch untouched");
            messages
        } else {
            match &self.pre_send {
                PreSend::Encrypt(encryptor) => encryptor.encrypt_messages(messages).await?,
                PreSend::Sign(signer) => signer.sign_messages(messages).await?,
            }
        };
        self.inner.send_messages(messages).await
    }
}
