//! In-memory transport that keeps every sent message in an outbox.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Error;
use crate::mail::Message;
use crate::transport::Transport;

#[derive(Default)]
pub struct MemoryTransport {
    outbox: Mutex<Vec<Message>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, in send order.
    pub async fn outbox(&self) -> Vec<Message> {
        self.outbox.lock().await.clone()
    }

    pub async fn clear(&self) {
        self.outbox.lock().await.clear();
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    async fn send_messages(&self, messages: Vec<Message>) -> Result<usize, Error> {
        let count = messages.len();
        self.outbox.lock().await.extend(messages);
        Ok(count)
    }
}
