//! Outbound delivery backends.
//!
//! A [`Transport`] takes finished messages and hands them to something that
//! delivers them. [`SecureTransport`] wraps any transport with an encrypt or
//! sign step applied to the batch first.

pub mod console;
pub mod file;
pub mod memory;
pub mod render;
pub mod secure;
pub mod smtp;

use async_trait::async_trait;

use crate::error::Error;
use crate::mail::Message;

pub use console::ConsoleTransport;
pub use file::FileTransport;
pub use memory::MemoryTransport;
pub use render::{render, to_lettre};
pub use secure::{PreSend, SecureTransport};
pub use smtp::SmtpTransport;

/// A backend that sends a batch of messages.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Send `messages`, returning how many were handed off.
    async fn send_messages(&self, messages: Vec<Message>) -> Result<usize, Error>;
}
