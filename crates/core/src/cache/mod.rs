//! SQLite-backed Cache Store.
//!
//! Named stores hold complete response snapshots keyed by request identity
//! (method + URL). Access is async via tokio-rusqlite. It supports:
//!
//! - Idempotent store creation and cascading store deletion
//! - Transactional writes, single and batched
//! - Lookup in one store or across all stores
//! - An optional byte quota on stored bodies

pub mod connection;
pub mod entries;
pub mod migrations;
pub mod stores;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::{CacheHandle, EntrySummary};
