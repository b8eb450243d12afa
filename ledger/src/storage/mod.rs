//! Persistence: versioned snapshots and the sled store that keeps them.

pub mod db;
pub mod snapshot;

pub use db::{DbError, DbResult, LedgerDb};
pub use snapshot::{AggregateEntry, BalanceEntry, KeyRegistry, LedgerSnapshot, SnapshotError};
