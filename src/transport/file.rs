//! File transport: one `.eml` file per message in an output directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lettre::Transport as _;
use tracing::debug;

use crate::error::{Error, TransportError};
use crate::mail::Message;
use crate::transport::{Transport, render};

pub struct FileTransport {
    dir: PathBuf,
    inner: lettre::FileTransport,
}

impl FileTransport {
    /// Write into `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, TransportError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            inner: lettre::FileTransport::new(&dir),
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl Transport for FileTransport {
    fn name(&self) -> &str {
        "file"
    }

    async fn send_messages(&self, messages: Vec<Message>) -> Result<usize, Error> {
        let mut sent = 0;
        for msg in &messages {
            let email = render(msg).await?;
            let inner = self.inner.clone();
            let id = tokio::task::spawn_blocking(move || inner.send(&email))
                .await
                .map_err(|e| TransportError::SendFailed {
                    name: "file".into(),
                    reason: format!("writer task failed: {e}"),
                })?
                .map_err(|e| TransportError::SendFailed {
                    name: "file".into(),
                    reason: e.to_string(),
                })?;
            debug!(id = %id, dir = %self.dir.display(), "Message written to file");
            sent += 1;
        }
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_one_eml_per_message() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FileTransport::new(dir.path().join("outbox")).unwrap();

        let sent = transport
            .send_messages(vec![
                Message::new("me@x.com", &["a@x.com"], "One", "1"),
                Message::new("me@x.com", &["b@x.com"], "Two", "2"),
            ])
            .await
            .unwrap();
        assert_eq!(sent, 2);

        let emls: Vec<_> = std::fs::read_dir(transport.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "eml"))
            .collect();
        assert_eq!(emls.len(), 2);
    }

    #[tokio::test]
    async fn invalid_message_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FileTransport::new(dir.path()).unwrap();
        let err = transport
            .send_messages(vec![Message::new("me@x.com", &[], "Nobody", "x")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Build(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
