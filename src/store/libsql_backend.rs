//! libSQL-backed key directory.
//!
//! Persists which addresses have a public key in the keyring and whether
//! their encrypted attachments get the `.asc` suffix. Supports local file
//! and in-memory databases.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::keys::{KeyDirectory, KeyedRecipient};
use crate::store::migrations;

const ADDRESS_COLUMNS: &str = "address, use_asc, fingerprint, created_at, updated_at";

/// A registered keyed address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAddress {
    pub address: String,
    pub use_asc: bool,
    /// Fingerprint of the key the address was registered from, if known.
    pub fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// libSQL key directory.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlKeyDirectory {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlKeyDirectory {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let directory = Self::from_database(db)?;
        migrations::run_migrations(&directory.conn).await?;
        info!(path = %path.display(), "Key directory opened");
        Ok(directory)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let directory = Self::from_database(db)?;
        migrations::run_migrations(&directory.conn).await?;
        Ok(directory)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Register an address, or update its suffix flag and fingerprint.
    pub async fn upsert_address(
        &self,
        address: &str,
        use_asc: bool,
        fingerprint: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO addresses (address, use_asc, fingerprint, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(address) DO UPDATE SET
                    use_asc = excluded.use_asc,
                    fingerprint = excluded.fingerprint,
                    updated_at = excluded.updated_at",
                params![address, use_asc as i64, opt_text(fingerprint), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_address: {e}")))?;

        debug!(address, use_asc, "Address registered");
        Ok(())
    }

    /// Forget an address. Returns whether it was registered.
    pub async fn remove_address(&self, address: &str) -> Result<bool, DatabaseError> {
        let affected = self
            .conn
            .execute("DELETE FROM addresses WHERE address = ?1", params![address])
            .await
            .map_err(|e| DatabaseError::Query(format!("remove_address: {e}")))?;
        Ok(affected > 0)
    }

    pub async fn get_address(&self, address: &str) -> Result<Option<StoredAddress>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {ADDRESS_COLUMNS} FROM addresses WHERE address = ?1"),
                params![address],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_address: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let stored = row_to_address(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_address row parse: {e}")))?;
                Ok(Some(stored))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_address: {e}"))),
        }
    }

    /// All registered addresses, alphabetically.
    pub async fn list_addresses(&self) -> Result<Vec<StoredAddress>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {ADDRESS_COLUMNS} FROM addresses ORDER BY address"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_addresses: {e}")))?;

        let mut addresses = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_addresses: {e}")))?
        {
            addresses.push(
                row_to_address(&row)
                    .map_err(|e| DatabaseError::Query(format!("list_addresses row parse: {e}")))?,
            );
        }
        Ok(addresses)
    }
}

#[async_trait]
impl KeyDirectory for LibSqlKeyDirectory {
    async fn lookup(&self, addresses: &[String]) -> Result<Vec<KeyedRecipient>, DatabaseError> {
        let mut seen = HashSet::new();
        let mut keyed = Vec::new();
        for address in addresses {
            if !seen.insert(address.as_str()) {
                continue;
            }
            let mut rows = self
                .conn
                .query(
                    "SELECT use_asc FROM addresses WHERE address = ?1",
                    params![address.as_str()],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("lookup: {e}")))?;

            if let Some(row) = rows
                .next()
                .await
                .map_err(|e| DatabaseError::Query(format!("lookup: {e}")))?
            {
                let use_asc: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("lookup row parse: {e}")))?;
                keyed.push(KeyedRecipient::new(address, use_asc != 0));
            }
        }
        debug!(
            requested = addresses.len(),
            keyed = keyed.len(),
            "Key directory lookup"
        );
        Ok(keyed)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Map a row in ADDRESS_COLUMNS order to a StoredAddress.
fn row_to_address(row: &libsql::Row) -> Result<StoredAddress, libsql::Error> {
    let address: String = row.get(0)?;
    let use_asc: i64 = row.get(1)?;
    let fingerprint: Option<String> = row.get(2).ok();
    let created_str: String = row.get(3)?;
    let updated_str: String = row.get(4)?;

    Ok(StoredAddress {
        address,
        use_asc: use_asc != 0,
        fingerprint,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn upsert_and_lookup() {
        let dir = LibSqlKeyDirectory::new_memory().await.unwrap();
        dir.upsert_address("b@x.com", true, Some("0123ABCD"))
            .await
            .unwrap();
        dir.upsert_address("c@x.com", false, None).await.unwrap();

        let keyed = dir
            .lookup(&addrs(&["a@x.com", "c@x.com", "b@x.com", "c@x.com"]))
            .await
            .unwrap();
        assert_eq!(
            keyed,
            vec![
                KeyedRecipient::new("c@x.com", false),
                KeyedRecipient::new("b@x.com", true),
            ]
        );
    }

    #[tokio::test]
    async fn upsert_updates_existing_row() {
        let dir = LibSqlKeyDirectory::new_memory().await.unwrap();
        dir.upsert_address("b@x.com", true, None).await.unwrap();
        dir.upsert_address("b@x.com", false, Some("FFFF"))
            .await
            .unwrap();

        let stored = dir.get_address("b@x.com").await.unwrap().unwrap();
        assert!(!stored.use_asc);
        assert_eq!(stored.fingerprint.as_deref(), Some("FFFF"));
        assert!(stored.updated_at >= stored.created_at);
        assert_eq!(dir.list_addresses().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn remove_address_reports_presence() {
        let dir = LibSqlKeyDirectory::new_memory().await.unwrap();
        dir.upsert_address("b@x.com", true, None).await.unwrap();
        assert!(dir.remove_address("b@x.com").await.unwrap());
        assert!(!dir.remove_address("b@x.com").await.unwrap());
        assert!(dir.get_address("b@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_is_sorted() {
        let dir = LibSqlKeyDirectory::new_memory().await.unwrap();
        dir.upsert_address("z@x.com", true, None).await.unwrap();
        dir.upsert_address("a@x.com", true, None).await.unwrap();
        let listed: Vec<String> = dir
            .list_addresses()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.address)
            .collect();
        assert_eq!(listed, vec!["a@x.com", "z@x.com"]);
    }

    #[tokio::test]
    async fn local_database_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("secure-mail.db");
        {
            let store = LibSqlKeyDirectory::new_local(&path).await.unwrap();
            store.upsert_address("b@x.com", true, None).await.unwrap();
        }
        let store = LibSqlKeyDirectory::new_local(&path).await.unwrap();
        assert!(store.get_address("b@x.com").await.unwrap().is_some());
    }
}
