//! Split a message's `to` list by key availability.
//!
//! Only `to` decides routing. cc, bcc and reply-to ride along unchanged on
//! whichever copies are produced.

use std::collections::HashSet;

use crate::error::DatabaseError;
use crate::keys::{KeyDirectory, KeyedRecipient};

/// Recipients of one message grouped by treatment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    /// Addresses without a key, in original order.
    pub keyless: Vec<String>,
    /// Addresses with a key, in directory order.
    pub keyed: Vec<KeyedRecipient>,
}

impl Partition {
    /// Split `to` given the keyed subset reported by a directory.
    ///
    /// Keyed entries that are not in `to` are ignored.
    pub fn split(to: &[String], keyed: Vec<KeyedRecipient>) -> Self {
        let wanted: HashSet<&str> = to.iter().map(String::as_str).collect();
        let keyed: Vec<KeyedRecipient> = keyed
            .into_iter()
            .filter(|k| wanted.contains(k.address.as_str()))
            .collect();
        let keyed_set: HashSet<&str> = keyed.iter().map(|k| k.address.as_str()).collect();
        let keyless = to
            .iter()
            .filter(|addr| !keyed_set.contains(addr.as_str()))
            .cloned()
            .collect();
        Self { keyless, keyed }
    }

    pub fn keyed_addresses(&self) -> Vec<String> {
        self.keyed.iter().map(|k| k.address.clone()).collect()
    }
}

/// Query `directory` for the keyed subset of `to` and split.
pub async fn partition_recipients(
    directory: &dyn KeyDirectory,
    to: &[String],
) -> Result<Partition, DatabaseError> {
    let keyed = directory.lookup(to).await?;
    Ok(Partition::split(to, keyed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::MemoryKeyDirectory;

    fn addrs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn mixed_recipients_split_without_loss() {
        let dir = MemoryKeyDirectory::new()
            .with_address("b@x.com", true)
            .with_address("d@x.com", false);
        let to = addrs(&["a@x.com", "b@x.com", "c@x.com", "d@x.com"]);

        let partition = partition_recipients(&dir, &to).await.unwrap();
        assert_eq!(partition.keyless, addrs(&["a@x.com", "c@x.com"]));
        assert_eq!(partition.keyed_addresses(), addrs(&["b@x.com", "d@x.com"]));

        let mut union: Vec<String> = partition
            .keyless
            .iter()
            .cloned()
            .chain(partition.keyed_addresses())
            .collect();
        union.sort();
        let mut original = to.clone();
        original.sort();
        assert_eq!(union, original);
    }

    #[tokio::test]
    async fn no_keys_means_everyone_keyless() {
        let dir = MemoryKeyDirectory::new();
        let to = addrs(&["a@x.com", "c@x.com"]);
        let partition = partition_recipients(&dir, &to).await.unwrap();
        assert_eq!(partition.keyless, to);
        assert!(partition.keyed.is_empty());
    }

    #[test]
    fn directory_extras_are_ignored() {
        let partition = Partition::split(
            &addrs(&["a@x.com"]),
            vec![KeyedRecipient::new("stranger@x.com", true)],
        );
        assert_eq!(partition.keyless, addrs(&["a@x.com"]));
        assert!(partition.keyed.is_empty());
    }
}
