//! Failure policies: what to do when GnuPG cannot encrypt or sign.
//!
//! The pipeline detects the failure, builds a [`CryptoError`], and asks the
//! policy. A hook returns `Ok(Recovery)` to continue with a defined
//! substitute, or `Err(PipelineError)` to abort the whole batch.
//!
//! How each recovery applies per call site:
//!
//! | Recovery        | body           | alternative          | attachment                     |
//! |-----------------|----------------|----------------------|--------------------------------|
//! | `Cleartext`     | keep plaintext | keep original        | keep original                  |
//! | `Blank`         | empty          | empty, same type     | empty bytes, same name/type    |
//! | `Substitute(t)` | `t`            | `t`, same type       | `t` as `text/plain`            |
//! | `Omit`          | empty          | removed              | removed                        |
//! | `DropMessage`   | copy not sent  | copy not sent        | copy not sent                  |
//!
//! Signing failures follow the body column.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{CryptoError, PipelineError};

/// Substitute chosen by a policy after a handled failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "recovery", content = "text", rename_all = "snake_case")]
pub enum Recovery {
    /// Keep the unencrypted (or unsigned) content.
    Cleartext,
    /// Replace the content with nothing.
    Blank,
    /// Replace the content with a site-specific text.
    Substitute(String),
    /// Remove the failing part; bodies are blanked.
    Omit,
    /// Do not send the derived copy at all.
    DropMessage,
}

impl FromStr for Recovery {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cleartext" => Ok(Self::Cleartext),
            "blank" => Ok(Self::Blank),
            "omit" => Ok(Self::Omit),
            "drop" | "drop_message" => Ok(Self::DropMessage),
            other => Err(format!("unknown recovery '{other}'")),
        }
    }
}

/// Where in the pipeline a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureSite {
    MessageBody,
    Alternative,
    Attachment,
    Signing,
}

impl fmt::Display for FailureSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::MessageBody => "message body",
            Self::Alternative => "alternative",
            Self::Attachment => "attachment",
            Self::Signing => "signing",
        };
        f.write_str(label)
    }
}

/// Site-configurable hooks invoked on cryptographic failures.
///
/// Each hook has a default that forwards to [`FailurePolicy::on_failure`], so
/// a policy can implement one method for everything or override per site.
#[async_trait]
pub trait FailurePolicy: Send + Sync {
    /// Catch-all decision for every site.
    async fn on_failure(
        &self,
        site: FailureSite,
        error: &CryptoError,
    ) -> Result<Recovery, PipelineError>;

    async fn on_message_body_encryption_failed(
        &self,
        error: &CryptoError,
    ) -> Result<Recovery, PipelineError> {
        self.on_failure(FailureSite::MessageBody, error).await
    }

    async fn on_alternative_encryption_failed(
        &self,
        error: &CryptoError,
    ) -> Result<Recovery, PipelineError> {
        self.on_failure(FailureSite::Alternative, error).await
    }

    async fn on_attachment_encryption_failed(
        &self,
        error: &CryptoError,
    ) -> Result<Recovery, PipelineError> {
        self.on_failure(FailureSite::Attachment, error).await
    }

    async fn on_message_signing_failed(
        &self,
        error: &CryptoError,
    ) -> Result<Recovery, PipelineError> {
        self.on_failure(FailureSite::Signing, error).await
    }
}

/// Re-raise every failure, aborting the batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbortPolicy;

#[async_trait]
impl FailurePolicy for AbortPolicy {
    async fn on_failure(
        &self,
        site: FailureSite,
        error: &CryptoError,
    ) -> Result<Recovery, PipelineError> {
        warn!(%site, error = %error, "Cryptographic failure, aborting batch");
        Err(PipelineError::Aborted(error.clone()))
    }
}

/// Answer every failure with the same recovery.
#[derive(Debug, Clone)]
pub struct FixedPolicy {
    recovery: Recovery,
}

impl FixedPolicy {
    pub fn new(recovery: Recovery) -> Self {
        Self { recovery }
    }
}

#[async_trait]
impl FailurePolicy for FixedPolicy {
    async fn on_failure(
        &self,
        site: FailureSite,
        error: &CryptoError,
    ) -> Result<Recovery, PipelineError> {
        warn!(
            %site,
            error = %error,
            recovery = ?self.recovery,
            "Cryptographic failure handled by policy"
        );
        Ok(self.recovery.clone())
    }
}

/// A failure forwarded to whoever watches the notice channel (e.g. admins).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureNotice {
    pub site: FailureSite,
    pub error: CryptoError,
}

/// Publish each failure as a [`FailureNotice`], then defer to `inner`.
pub struct NotifyingPolicy<P> {
    inner: P,
    notices: mpsc::UnboundedSender<FailureNotice>,
}

impl<P: FailurePolicy> NotifyingPolicy<P> {
    pub fn new(inner: P, notices: mpsc::UnboundedSender<FailureNotice>) -> Self {
        Self { inner, notices }
    }
}

#[async_trait]
impl<P: FailurePolicy> FailurePolicy for NotifyingPolicy<P> {
    async fn on_failure(
        &self,
        site: FailureSite,
        error: &CryptoError,
    ) -> Result<Recovery, PipelineError> {
        let notice = FailureNotice {
            site,
            error: error.clone(),
        };
        if self.notices.send(notice).is_err() {
            warn!(%site, "Failure notice channel closed");
        }
        self.inner.on_failure(site, error).await
    }
}

/// Build the policy named by configuration: `abort` or a fixed recovery.
pub fn policy_from_name(name: &str) -> Result<Box<dyn FailurePolicy>, String> {
    if name.trim().eq_ignore_ascii_case("abort") {
        return Ok(Box::new(AbortPolicy));
    }
    Ok(Box::new(FixedPolicy::new(name.parse()?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure() -> CryptoError {
        CryptoError::EncryptionFailed {
            address: "b@x.com".into(),
            status: "invalid recipient".into(),
        }
    }

    #[tokio::test]
    async fn abort_policy_raises_for_every_site() {
        let policy = AbortPolicy;
        assert!(matches!(
            policy.on_message_body_encryption_failed(&failure()).await,
            Err(PipelineError::Aborted(_))
        ));
        assert!(policy.on_alternative_encryption_failed(&failure()).await.is_err());
        assert!(policy.on_attachment_encryption_failed(&failure()).await.is_err());
        assert!(policy.on_message_signing_failed(&failure()).await.is_err());
    }

    #[tokio::test]
    async fn fixed_policy_returns_configured_recovery() {
        let policy = FixedPolicy::new(Recovery::Substitute("[encrypted content unavailable]".into()));
        let recovery = policy.on_attachment_encryption_failed(&failure()).await.unwrap();
        assert_eq!(
            recovery,
            Recovery::Substitute("[encrypted content unavailable]".into())
        );
    }

    #[tokio::test]
    async fn notifying_policy_publishes_then_delegates() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let policy = NotifyingPolicy::new(FixedPolicy::new(Recovery::Omit), tx);

        let recovery = policy.on_alternative_encryption_failed(&failure()).await.unwrap();
        assert_eq!(recovery, Recovery::Omit);

        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.site, FailureSite::Alternative);
        assert_eq!(notice.error.subject(), "b@x.com");
    }

    #[tokio::test]
    async fn notifying_policy_survives_closed_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let policy = NotifyingPolicy::new(AbortPolicy, tx);
        assert!(policy.on_message_body_encryption_failed(&failure()).await.is_err());
    }

    #[test]
    fn policy_names() {
        assert!(policy_from_name("abort").is_ok());
        assert!(policy_from_name("cleartext").is_ok());
        assert!(policy_from_name("DROP").is_ok());
        assert!(policy_from_name("shrug").is_err());
        assert_eq!("omit".parse::<Recovery>().unwrap(), Recovery::Omit);
    }
}
