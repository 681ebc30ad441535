//! Success checks around single engine calls.

use crate::crypto::{CryptoEngine, EncryptOptions, STATUS_SIGNATURE_CREATED};
use crate::error::CryptoError;

/// Encrypt raw bytes for `address`.
///
/// Fails when the engine reports not-ok, or returns no ciphertext for
/// non-empty input.
pub async fn encrypt_bytes(
    engine: &dyn CryptoEngine,
    plaintext: &[u8],
    address: &str,
    options: &EncryptOptions,
) -> Result<Vec<u8>, CryptoError> {
    let result = engine.encrypt(plaintext, address, options).await;
    if !result.ok {
        return Err(CryptoError::EncryptionFailed {
            address: address.to_string(),
            status: result.status,
        });
    }
    if result.data.is_empty() && !plaintext.is_empty() {
        return Err(CryptoError::EncryptionFailed {
            address: address.to_string(),
            status: format!("{} (empty ciphertext)", result.status),
        });
    }
    Ok(result.data)
}

/// Encrypt text, using the engine's encoding in both directions.
pub async fn encrypt_text(
    engine: &dyn CryptoEngine,
    text: &str,
    address: &str,
    options: &EncryptOptions,
) -> Result<String, CryptoError> {
    let encoding = engine.encoding();
    let ciphertext = encrypt_bytes(engine, &encoding.encode(text), address, options).await?;
    Ok(encoding.decode(&ciphertext))
}

/// Clear-sign text with `signing_key`.
pub async fn sign_text(
    engine: &dyn CryptoEngine,
    text: &str,
    signing_key: &str,
    options: &EncryptOptions,
) -> Result<String, CryptoError> {
    let encoding = engine.encoding();
    let result = engine
        .sign(&encoding.encode(text), signing_key, options)
        .await;
    if result.status != STATUS_SIGNATURE_CREATED {
        return Err(CryptoError::SigningFailed {
            key: signing_key.to_string(),
            status: result.status,
        });
    }
    Ok(encoding.decode(&result.data))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::crypto::{CryptResult, STATUS_ENCRYPTION_OK};

    /// Engine that returns a canned result for every call.
    struct CannedEngine(CryptResult);

    #[async_trait]
    impl CryptoEngine for CannedEngine {
        async fn encrypt(&self, _: &[u8], _: &str, _: &EncryptOptions) -> CryptResult {
            self.0.clone()
        }
        async fn sign(&self, _: &[u8], _: &str, _: &EncryptOptions) -> CryptResult {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn encrypt_not_ok_is_failure_with_status() {
        let engine = CannedEngine(CryptResult::failure("invalid recipient"));
        let err = encrypt_text(&engine, "hello", "b@x.com", &EncryptOptions::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CryptoError::EncryptionFailed {
                address: "b@x.com".into(),
                status: "invalid recipient".into(),
            }
        );
    }

    #[tokio::test]
    async fn empty_ciphertext_for_nonempty_plaintext_is_failure() {
        let engine = CannedEngine(CryptResult::success(STATUS_ENCRYPTION_OK, Vec::new()));
        let err = encrypt_text(&engine, "hello", "b@x.com", &EncryptOptions::default())
            .await
            .unwrap_err();
        assert!(err.status().contains("empty ciphertext"));
    }

    #[tokio::test]
    async fn empty_plaintext_may_yield_empty_ciphertext() {
        let engine = CannedEngine(CryptResult::success(STATUS_ENCRYPTION_OK, Vec::new()));
        let out = encrypt_text(&engine, "", "b@x.com", &EncryptOptions::default())
            .await
            .unwrap();
        assert_eq!(out, "");
    }

    #[tokio::test]
    async fn signing_requires_signature_created_status() {
        let engine = CannedEngine(CryptResult::success("signing begun", b"sig".to_vec()));
        let err = sign_text(&engine, "hello", "ABCD", &EncryptOptions::default()).await.unwrap_err();
        assert!(matches!(err, CryptoError::SigningFailed { ref key, .. } if key == "ABCD"));

        let engine = CannedEngine(CryptResult::success(
            STATUS_SIGNATURE_CREATED,
            b"-----BEGIN PGP SIGNED MESSAGE-----".to_vec(),
        ));
        let signed = sign_text(&engine, "hello", "ABCD", &EncryptOptions::default()).await.unwrap();
        assert!(signed.starts_with("-----BEGIN PGP SIGNED MESSAGE-----"));
    }
}
