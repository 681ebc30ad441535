//! Cryptographic engine abstraction.
//!
//! The pipeline never talks to GnuPG directly. It holds an
//! `Arc<dyn CryptoEngine>` and decides success or failure from the
//! [`CryptResult`] the engine reports.

pub mod encoding;
pub mod gpg;

use async_trait::async_trait;

pub use encoding::TextEncoding;
pub use gpg::GpgEngine;

/// Status reported by the engine when encryption succeeded.
pub const STATUS_ENCRYPTION_OK: &str = "encryption ok";

/// Status that marks a successful signature. Anything else is a failure.
pub const STATUS_SIGNATURE_CREATED: &str = "signature created";

/// Options applied uniformly to every encrypt call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncryptOptions {
    /// Encrypt to keys even if they are not certified.
    pub always_trust: bool,
    /// Also sign the ciphertext with this key.
    pub sign_with: Option<String>,
}

/// Raw outcome of one engine operation, as GnuPG reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptResult {
    pub ok: bool,
    pub status: String,
    pub data: Vec<u8>,
}

impl CryptResult {
    pub fn success(status: &str, data: impl Into<Vec<u8>>) -> Self {
        Self {
            ok: true,
            status: status.to_string(),
            data: data.into(),
        }
    }

    pub fn failure(status: impl Into<String>) -> Self {
        Self {
            ok: false,
            status: status.into(),
            data: Vec::new(),
        }
    }
}

/// Encrypt/sign capability backed by GnuPG or a test double.
#[async_trait]
pub trait CryptoEngine: Send + Sync {
    /// Encrypt `plaintext` to the public key of `recipient`.
    async fn encrypt(
        &self,
        plaintext: &[u8],
        recipient: &str,
        options: &EncryptOptions,
    ) -> CryptResult;

    /// Produce a clear-signed copy of `plaintext` with `signing_key`.
    ///
    /// Only `always_trust` applies here; `sign_with` is an encryption option.
    async fn sign(
        &self,
        plaintext: &[u8],
        signing_key: &str,
        options: &EncryptOptions,
    ) -> CryptResult;

    /// Encoding used to turn text bodies into engine input and back.
    fn encoding(&self) -> TextEncoding {
        TextEncoding::Utf8
    }
}
