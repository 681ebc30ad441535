//! Test doubles for the pipeline: a recording engine and a recording policy.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::crypto::{
    CryptResult, CryptoEngine, EncryptOptions, STATUS_ENCRYPTION_OK, STATUS_SIGNATURE_CREATED,
};
use crate::error::{CryptoError, PipelineError};
use crate::policy::{FailurePolicy, FailureSite, Recovery};

/// Fake engine. Ciphertext is `ENC[addr](plaintext)`, signatures `SIGNED[key](plaintext)`.
#[derive(Default)]
pub struct RecordingEngine {
    failing_recipients: HashSet<String>,
    failing_plaintexts: HashSet<Vec<u8>>,
    sign_status: Option<String>,
    pub encrypt_calls: Mutex<Vec<(String, Vec<u8>)>>,
    pub sign_calls: Mutex<Vec<(String, Vec<u8>)>>,
    sign_options: Mutex<Vec<EncryptOptions>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every encryption to `address` fails.
    pub fn failing_for(mut self, address: &str) -> Self {
        self.failing_recipients.insert(address.to_string());
        self
    }

    /// Encryption of exactly this plaintext fails.
    pub fn failing_on(mut self, plaintext: &[u8]) -> Self {
        self.failing_plaintexts.insert(plaintext.to_vec());
        self
    }

    /// Signing reports `status` instead of success.
    pub fn signing_status(mut self, status: &str) -> Self {
        self.sign_status = Some(status.to_string());
        self
    }

    pub fn encrypt_count(&self) -> usize {
        self.encrypt_calls.lock().unwrap().len()
    }

    pub fn sign_count(&self) -> usize {
        self.sign_calls.lock().unwrap().len()
    }

    pub fn sign_options(&self) -> Vec<EncryptOptions> {
        self.sign_options.lock().unwrap().clone()
    }
}

pub fn ciphertext(address: &str, plaintext: &str) -> String {
    format!("ENC[{address}]({plaintext})")
}

#[async_trait]
impl CryptoEngine for RecordingEngine {
    async fn encrypt(
        &self,
        plaintext: &[u8],
        recipient: &str,
        _options: &EncryptOptions,
    ) -> CryptResult {
        self.encrypt_calls
            .lock()
            .unwrap()
            .push((recipient.to_string(), plaintext.to_vec()));
        if self.failing_recipients.contains(recipient) {
            return CryptResult::failure("invalid recipient");
        }
        if self.failing_plaintexts.contains(plaintext) {
            return CryptResult::failure("failure: encrypt 1");
        }
        let text = String::from_utf8_lossy(plaintext);
        CryptResult::success(STATUS_ENCRYPTION_OK, ciphertext(recipient, &text).into_bytes())
    }

    async fn sign(
        &self,
        plaintext: &[u8],
        signing_key: &str,
        options: &EncryptOptions,
    ) -> CryptResult {
        self.sign_calls
            .lock()
            .unwrap()
            .push((signing_key.to_string(), plaintext.to_vec()));
        self.sign_options.lock().unwrap().push(options.clone());
        if let Some(status) = &self.sign_status {
            return CryptResult::failure(status.clone());
        }
        let text = String::from_utf8_lossy(plaintext);
        CryptResult::success(
            STATUS_SIGNATURE_CREATED,
            format!("SIGNED[{signing_key}]({text})").into_bytes(),
        )
    }
}

/// Policy that records every call and answers with a fixed recovery, or aborts.
pub struct RecordingPolicy {
    answer: Option<Recovery>,
    pub calls: Mutex<Vec<(FailureSite, CryptoError)>>,
}

impl RecordingPolicy {
    pub fn answering(recovery: Recovery) -> Self {
        Self {
            answer: Some(recovery),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn aborting() -> Self {
        Self {
            answer: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn sites(&self) -> Vec<FailureSite> {
        self.calls.lock().unwrap().iter().map(|(s, _)| *s).collect()
    }
}

#[async_trait]
impl FailurePolicy for RecordingPolicy {
    async fn on_failure(
        &self,
        site: FailureSite,
        error: &CryptoError,
    ) -> Result<Recovery, PipelineError> {
        self.calls.lock().unwrap().push((site, error.clone()));
        match &self.answer {
            Some(recovery) => Ok(recovery.clone()),
            None => Err(PipelineError::Aborted(error.clone())),
        }
    }
}
