//! Secure Mail: outbound encryption and signing gateway backed by GnuPG.

pub mod config;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod mail;
pub mod pipeline;
pub mod policy;
pub mod store;
pub mod transport;
