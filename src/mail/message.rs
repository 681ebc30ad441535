//! Outgoing message model: body, alternatives, attachments, headers.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Media type tagging content that is already ciphertext.
///
/// Every transform step passes content carrying this marker through untouched.
pub const ENCRYPTED_MIMETYPE: &str = "application/gpg-encrypted";

/// Filename suffix for encrypted attachments when the recipient asks for it.
pub const ASC_SUFFIX: &str = ".asc";

/// A composed outbound email.
///
/// `Clone` is a deep copy: every field is owned, so a duplicated message
/// never shares body, alternatives or attachments with its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Envelope sender / `From` header.
    pub from: String,
    /// Primary recipients. Only this list decides encryption routing.
    pub to: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reply_to: Vec<String>,
    #[serde(default)]
    pub subject: String,
    /// Primary text body.
    #[serde(default)]
    pub body: String,
    /// Alternative renderings of the body, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<Alternative>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentRef>,
    /// Extra headers, in insertion order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
    /// Send this message in the clear even to recipients with keys.
    #[serde(default)]
    pub do_not_encrypt: bool,
    /// Opaque delivery channel association, carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
}

impl Message {
    pub fn new(from: &str, to: &[&str], subject: &str, body: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.iter().map(|s| s.to_string()).collect(),
            cc: Vec::new(),
            bcc: Vec::new(),
            reply_to: Vec::new(),
            subject: subject.to_string(),
            body: body.to_string(),
            alternatives: Vec::new(),
            attachments: Vec::new(),
            headers: Vec::new(),
            do_not_encrypt: false,
            connection: None,
        }
    }

    pub fn with_alternative(mut self, content: &str, mimetype: &str) -> Self {
        self.alternatives.push(Alternative::new(content, mimetype));
        self
    }

    pub fn with_attachment(mut self, attachment: AttachmentRef) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Deep copy addressed to `to` instead of the source recipients.
    pub fn duplicate_for(&self, to: Vec<String>) -> Self {
        Self {
            to,
            ..self.clone()
        }
    }

    /// Every envelope recipient: to, cc and bcc.
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        self.to
            .iter()
            .chain(self.cc.iter())
            .chain(self.bcc.iter())
            .map(String::as_str)
    }
}

/// An alternative body such as `text/html`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alternative {
    pub content: String,
    pub mimetype: String,
}

impl Alternative {
    pub fn new(content: &str, mimetype: &str) -> Self {
        Self {
            content: content.to_string(),
            mimetype: mimetype.to_string(),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.mimetype == ENCRYPTED_MIMETYPE
    }
}

/// An attachment as supplied by the caller.
///
/// A `File` reference is resolved to `Inline` form before any transform runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttachmentRef {
    /// Path to a file on disk; its media type is unknown.
    File { path: PathBuf },
    /// Attachment content held in memory.
    Inline {
        filename: Option<String>,
        content: Vec<u8>,
        mimetype: Option<String>,
    },
}

impl AttachmentRef {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File { path: path.into() }
    }

    pub fn inline(filename: &str, content: impl Into<Vec<u8>>, mimetype: &str) -> Self {
        Self::Inline {
            filename: Some(filename.to_string()),
            content: content.into(),
            mimetype: Some(mimetype.to_string()),
        }
    }

    /// Whether the attachment is already tagged as ciphertext.
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::Inline { mimetype: Some(m), .. } if m == ENCRYPTED_MIMETYPE)
    }

    /// Resolve to concrete `(filename, content, mimetype)` form.
    ///
    /// Reads the referenced file for `File`; the handle is closed before returning
    /// on every path.
    pub async fn resolve(&self) -> Result<ResolvedAttachment, PipelineError> {
        match self {
            Self::File { path } => {
                let content =
                    tokio::fs::read(path)
                        .await
                        .map_err(|source| PipelineError::AttachmentRead {
                            path: path.clone(),
                            source,
                        })?;
                Ok(ResolvedAttachment {
                    filename: basename(path),
                    content,
                    mimetype: None,
                })
            }
            Self::Inline {
                filename,
                content,
                mimetype,
            } => Ok(ResolvedAttachment {
                filename: filename.clone(),
                content: content.clone(),
                mimetype: mimetype.clone(),
            }),
        }
    }
}

/// An attachment after file references have been read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAttachment {
    pub filename: Option<String>,
    pub content: Vec<u8>,
    pub mimetype: Option<String>,
}

impl From<ResolvedAttachment> for AttachmentRef {
    fn from(a: ResolvedAttachment) -> Self {
        Self::Inline {
            filename: a.filename,
            content: a.content,
            mimetype: a.mimetype,
        }
    }
}

fn basename(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}
