//! Key directory: which recipient addresses have a usable public key.

use std::collections::{HashMap, HashSet};
use std::sync::{LazyLock, RwLock};

use async_trait::async_trait;
use regex::Regex;

use crate::error::DatabaseError;

/// Matches the `<addr>` part of a user id such as `Alice <alice@x.com>`.
static ANGLE_ADDR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([^<>]+)>\s*$").expect("static regex is valid")
});

/// An address with a known public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedRecipient {
    pub address: String,
    /// Append `.asc` to encrypted attachment filenames for this address.
    pub use_asc: bool,
}

impl KeyedRecipient {
    pub fn new(address: &str, use_asc: bool) -> Self {
        Self {
            address: address.to_string(),
            use_asc,
        }
    }
}

/// Lookup of keyed addresses.
#[async_trait]
pub trait KeyDirectory: Send + Sync {
    /// Return the subset of `addresses` that have a key.
    ///
    /// Implementations return each address at most once, in the order it first
    /// appears in `addresses`.
    async fn lookup(&self, addresses: &[String]) -> Result<Vec<KeyedRecipient>, DatabaseError>;
}

/// In-process key directory.
#[derive(Debug, Default)]
pub struct MemoryKeyDirectory {
    entries: RwLock<HashMap<String, bool>>,
}

impl MemoryKeyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(self, address: &str, use_asc: bool) -> Self {
        self.insert(address, use_asc);
        self
    }

    pub fn insert(&self, address: &str, use_asc: bool) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(address.to_string(), use_asc);
    }

    pub fn remove(&self, address: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(address)
            .is_some()
    }
}

#[async_trait]
impl KeyDirectory for MemoryKeyDirectory {
    async fn lookup(&self, addresses: &[String]) -> Result<Vec<KeyedRecipient>, DatabaseError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut seen = HashSet::new();
        Ok(addresses
            .iter()
            .filter(|addr| seen.insert(addr.as_str()))
            .filter_map(|addr| {
                entries
                    .get(addr)
                    .map(|&use_asc| KeyedRecipient::new(addr, use_asc))
            })
            .collect())
    }
}

/// Extract e-mail addresses from key user ids.
///
/// `Name <addr>` yields `addr`; a bare uid is taken as the address. Empty
/// uids are skipped.
pub fn addresses_from_uids(uids: &[String]) -> Vec<String> {
    uids.iter()
        .map(|uid| uid.trim())
        .filter(|uid| !uid.is_empty())
        .map(|uid| match ANGLE_ADDR.captures(uid) {
            Some(caps) => caps[1].trim().to_string(),
            None => uid.to_string(),
        })
        .collect()
}
