//! Error types for secure-mail.

use std::path::PathBuf;

/// Top-level error type for the gateway.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Failures reported by the GnuPG engine for a single operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("Encrypting mail to {address} failed: '{status}'")]
    EncryptionFailed { address: String, status: String },

    #[error("Signing mail with key {key} failed: '{status}'")]
    SigningFailed { key: String, status: String },
}

impl CryptoError {
    /// Address (for encryption) or key id (for signing) the failure is about.
    pub fn subject(&self) -> &str {
        match self {
            Self::EncryptionFailed { address, .. } => address,
            Self::SigningFailed { key, .. } => key,
        }
    }

    /// Engine status string carried by the failure.
    pub fn status(&self) -> &str {
        match self {
            Self::EncryptionFailed { status, .. } | Self::SigningFailed { status, .. } => status,
        }
    }
}

/// Errors that stop a batch from going through the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to read attachment {path}: {source}")]
    AttachmentRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Batch aborted by failure policy: {0}")]
    Aborted(#[source] CryptoError),

    #[error("Signing failed: {0}")]
    Signing(#[source] CryptoError),

    #[error("Signing requested but no signing key is configured")]
    MissingSigningKey,

    #[error("Key directory lookup failed: {0}")]
    KeyDirectory(#[from] DatabaseError),
}

/// Key directory persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Errors raised by outbound transports.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Transport {name} failed to send: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the gateway.
pub type Result<T> = std::result::Result<T, Error>;
