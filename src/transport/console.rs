//! Console transport: prints rendered messages for local testing.

use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, TransportError};
use crate::mail::Message;
use crate::transport::{Transport, render};

const SEPARATOR_WIDTH: usize = 79;

/// Writes each message, followed by a dashed separator line.
pub struct ConsoleTransport {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self::with_writer(std::io::stdout())
    }

    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(writer)),
        }
    }
}

impl Default for ConsoleTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    fn name(&self) -> &str {
        "console"
    }

    async fn send_messages(&self, messages: Vec<Message>) -> Result<usize, Error> {
        if messages.is_empty() {
            return Ok(0);
        }

        let mut rendered = Vec::with_capacity(messages.len());
        for msg in &messages {
            rendered.push(render(msg).await?.formatted());
        }

        let mut out = self.out.lock().map_err(|_| TransportError::SendFailed {
            name: "console".into(),
            reason: "output lock poisoned".into(),
        })?;
        for bytes in &rendered {
            out.write_all(bytes).map_err(TransportError::from)?;
            writeln!(out).map_err(TransportError::from)?;
            writeln!(out, "{}", "-".repeat(SEPARATOR_WIDTH)).map_err(TransportError::from)?;
        }
        out.flush().map_err(TransportError::from)?;

        tracing::debug!(count = rendered.len(), "Messages written to console");
        Ok(rendered.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    /// Writer that appends into a shared buffer.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn writes_each_message_with_separator() {
        let buf = SharedBuf::default();
        let transport = ConsoleTransport::with_writer(buf.clone());
        let sent = transport
            .send_messages(vec![
                Message::new("me@x.com", &["a@x.com"], "First", "one"),
                Message::new("me@x.com", &["b@x.com"], "Second", "two"),
            ])
            .await
            .unwrap();
        assert_eq!(sent, 2);

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("Subject: First"));
        assert!(text.contains("Subject: Second"));
        assert_eq!(text.matches(&"-".repeat(79)).count(), 2);
    }

    #[tokio::test]
    async fn empty_batch_writes_nothing() {
        let buf = SharedBuf::default();
        let transport = ConsoleTransport::with_writer(buf.clone());
        assert_eq!(transport.send_messages(Vec::new()).await.unwrap(), 0);
        assert!(buf.0.lock().unwrap().is_empty());
    }
}
