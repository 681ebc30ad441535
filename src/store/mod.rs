//! Persistence layer: libSQL-backed key directory.

pub mod libsql_backend;
pub mod migrations;

pub use libsql_backend::{LibSqlKeyDirectory, StoredAddress};
