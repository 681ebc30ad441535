//! Outbound message pipeline.
//!
//! Every batch handed to a secure transport flows through one of:
//! 1. `Encryptor::encrypt_messages()`: partition recipients by key
//!    availability, duplicate per treatment group, encrypt body,
//!    alternatives and attachments for keyed recipients
//! 2. `Signer::sign_messages()`: replace each body with a clear-signed copy
//!
//! Output order for encryption: all unencrypted copies (in input order),
//! then all encrypted copies (in input order).

pub mod attachment;
pub mod crypt;
pub mod encryptor;
pub mod partition;
pub mod signer;

#[cfg(test)]
pub(crate) mod test_support;

use std::str::FromStr;

pub use attachment::PartOutcome;
pub use encryptor::Encryptor;
pub use partition::{Partition, partition_recipients};
pub use signer::Signer;

/// How keyed recipients of one message are grouped into encrypted copies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FanoutMode {
    /// One encrypted copy per keyed recipient, each encrypted to that
    /// recipient only.
    #[default]
    PerRecipient,
    /// One encrypted copy addressed to every keyed recipient. Content is
    /// re-derived for each recipient in turn, so the copy that is sent is
    /// encrypted for the last one only. Kept for compatibility with
    /// deployments that relied on a single copy.
    SharedCopy,
}

impl FromStr for FanoutMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per-recipient" | "per_recipient" => Ok(Self::PerRecipient),
            "shared" | "shared-copy" | "shared_copy" => Ok(Self::SharedCopy),
            other => Err(format!("expected 'per-recipient' or 'shared', got '{other}'")),
        }
    }
}

/// What the signer does when GnuPG cannot sign a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SigningFailureMode {
    /// Abort the batch with the signing error.
    #[default]
    Strict,
    /// Ask the failure policy's signing hook.
    Permissive,
}

impl FromStr for SigningFailureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "permissive" => Ok(Self::Permissive),
            other => Err(format!("expected 'strict' or 'permissive', got '{other}'")),
        }
    }
}

/// Whether a derived copy should still be sent after its transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    Send,
    Drop,
}
