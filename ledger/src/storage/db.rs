//! # LedgerDb: Persistent Snapshot Store
//!
//! Keeps the latest [`LedgerSnapshot`] in an embedded sled database.
//!
//! ## Tree Layout
//!
//! | Tree       | Key          | Value                              |
//! |------------|--------------|------------------------------------|
//! | `state`    | `current`    | `LedgerSnapshot::to_bytes()`       |
//! | `metadata` | `revision`   | save counter (8B BE)               |
//! | `metadata` | `digest`     | BLAKE3 digest of the snapshot (32B)|
//!
//! ## Atomicity
//!
//! [`LedgerDb::save`] writes the snapshot, the bumped revision and the
//! digest in one multi-tree transaction, then flushes. A crash mid-save
//! leaves the previous revision intact.

use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::path::Path;

use super::snapshot::{LedgerSnapshot, SnapshotError};
use crate::config::{METADATA_TREE, STATE_TREE};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("corrupt metadata: {0}")]
    Corrupt(String),

    #[error("not found: {0}")]
    NotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;

// ---------------------------------------------------------------------------
// Well-known Keys
// ---------------------------------------------------------------------------

const STATE_CURRENT: &[u8] = b"current";
const META_REVISION: &[u8] = b"revision";
const META_DIGEST: &[u8] = b"digest";

// ---------------------------------------------------------------------------
// LedgerDb
// ---------------------------------------------------------------------------

/// sled-backed store for ledger snapshots.
///
/// Cloning shares the same underlying database handle.
#[derive(Debug, Clone)]
pub struct LedgerDb {
    db: Db,
    state: Tree,
    metadata: Tree,
}

impl LedgerDb {
    /// Opens or creates a database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// An in-memory database removed on drop. For tests.
    pub fn open_temporary() -> DbResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let state = db.open_tree(STATE_TREE)?;
        let metadata = db.open_tree(METADATA_TREE)?;
        Ok(Self {
            db,
            state,
            metadata,
        })
    }

    /// Persists `snapshot` as the current state and returns the new
    /// revision number. Revisions start at 1.
    pub fn save(&self, snapshot: &LedgerSnapshot) -> DbResult<u64> {
        let bytes = snapshot.to_bytes()?;
        let digest = snapshot.digest()?;

        let revision = (&self.state, &self.metadata)
            .transaction(|(state, metadata)| -> Result<u64, ConflictableTransactionError<DbError>> {
                let current = match metadata.get(META_REVISION)? {
                    Some(raw) => decode_revision(&raw).map_err(ConflictableTransactionError::Abort)?,
                    None => 0,
                };
                let next = current + 1;
                state.insert(STATE_CURRENT, bytes.as_slice())?;
                metadata.insert(META_REVISION, &next.to_be_bytes())?;
                metadata.insert(META_DIGEST, &digest)?;
                Ok(next)
            })
            .map_err(|e| match e {
                TransactionError::Abort(err) => err,
                TransactionError::Storage(err) => DbError::Sled(err),
            })?;

        self.db.flush()?;
        tracing::debug!(revision, entries = snapshot.entries.len(), "ledger snapshot saved");
        Ok(revision)
    }

    /// The latest saved snapshot, if any. Not verified.
    pub fn load(&self) -> DbResult<Option<LedgerSnapshot>> {
        match self.state.get(STATE_CURRENT)? {
            Some(bytes) => Ok(Some(LedgerSnapshot::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Like [`load`](Self::load) but fails when nothing was ever saved.
    pub fn load_required(&self) -> DbResult<LedgerSnapshot> {
        self.load()?
            .ok_or_else(|| DbError::NotFound("no ledger snapshot saved yet".into()))
    }

    /// Number of saves so far; zero for a fresh database.
    pub fn revision(&self) -> DbResult<u64> {
        match self.metadata.get(META_REVISION)? {
            Some(raw) => decode_revision(&raw),
            None => Ok(0),
        }
    }

    /// Digest recorded by the last save.
    pub fn stored_digest(&self) -> DbResult<Option<[u8; 32]>> {
        match self.metadata.get(META_DIGEST)? {
            Some(raw) => {
                let digest: [u8; 32] = raw
                    .as_ref()
                    .try_into()
                    .map_err(|_| DbError::Corrupt(format!("digest has {} bytes", raw.len())))?;
                Ok(Some(digest))
            }
            None => Ok(None),
        }
    }

    /// Returns `true` once a snapshot has been saved.
    pub fn is_initialized(&self) -> DbResult<bool> {
        Ok(self.state.contains_key(STATE_CURRENT)?)
    }
}

fn decode_revision(raw: &[u8]) -> DbResult<u64> {
    let bytes: [u8; 8] = raw
        .try_into()
        .map_err(|_| DbError::Corrupt(format!("revision has {} bytes", raw.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Address, Amount, AssetId, KeyId};
    use crate::Ledger;

    fn sample_ledger() -> Ledger {
        let peer = Address::repeat_byte(1);
        let ledger = Ledger::with_peers([peer]);
        ledger
            .deposit(&peer, KeyId(0), AssetId::from_label("ether").unwrap(), Amount::from(7u64))
            .unwrap();
        ledger
    }

    #[test]
    fn fresh_database_is_empty() {
        let db = LedgerDb::open_temporary().unwrap();
        assert_eq!(db.revision().unwrap(), 0);
        assert!(db.load().unwrap().is_none());
        assert!(!db.is_initialized().unwrap());
        assert!(matches!(db.load_required(), Err(DbError::NotFound(_))));
    }

    #[test]
    fn save_bumps_revision_and_records_digest() {
        let db = LedgerDb::open_temporary().unwrap();
        let snapshot = sample_ledger().snapshot();

        assert_eq!(db.save(&snapshot).unwrap(), 1);
        assert_eq!(db.save(&snapshot).unwrap(), 2);
        assert_eq!(db.revision().unwrap(), 2);
        assert_eq!(db.stored_digest().unwrap(), Some(snapshot.digest().unwrap()));
        assert_eq!(db.load().unwrap(), Some(snapshot));
    }

    #[test]
    fn reopening_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = sample_ledger().snapshot();
        {
            let db = LedgerDb::open(dir.path()).unwrap();
            db.save(&snapshot).unwrap();
        }
        let db = LedgerDb::open(dir.path()).unwrap();
        assert_eq!(db.revision().unwrap(), 1);
        assert_eq!(db.load_required().unwrap(), snapshot);
    }

    #[test]
    fn corrupt_revision_reported() {
        assert!(matches!(decode_revision(&[1, 2, 3]), Err(DbError::Corrupt(_))));
        assert_eq!(decode_revision(&5u64.to_be_bytes()).unwrap(), 5);
    }
}
