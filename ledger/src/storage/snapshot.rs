//! # Ledger Snapshots
//!
//! A [`LedgerSnapshot`] is the versioned, flat image of everything a ledger
//! holds. It is what gets written to disk, exported, and handed to a newer
//! build of the ledger logic: state outlives code, so the layout is guarded
//! by [`LAYOUT_VERSION`] and every snapshot is re-verified before a ledger is
//! rebuilt from it.
//!
//! ## Binary Layout
//!
//! ```text
//! [0..2]   layout version (u16, big-endian)
//! [2..]    bincode(LedgerSnapshot)
//! ```
//!
//! The version prefix is readable without decoding the body, so an
//! unsupported snapshot is refused before bincode ever sees it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

use crate::config::{LAYOUT_VERSION, MIN_SUPPORTED_LAYOUT_VERSION};
use crate::ledger::LedgerState;
use crate::types::{Address, Amount, AssetId, KeyId};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors raised while encoding, decoding or verifying a snapshot.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("unsupported layout version {found} (this build reads {min}..={max})")]
    UnsupportedVersion { found: u16, min: u16, max: u16 },

    #[error("snapshot is truncated")]
    Truncated,

    #[error("codec error: {0}")]
    Codec(String),

    #[error("zero balance stored for key {key}, asset {asset}")]
    ZeroEntry { key: KeyId, asset: AssetId },

    #[error("duplicate balance entry for key {key}, asset {asset}")]
    DuplicateEntry { key: KeyId, asset: AssetId },

    /// `key` is `None` for the global registry.
    #[error("asset {asset} registered twice (key {key:?})")]
    DuplicateRegistration { key: Option<KeyId>, asset: AssetId },

    #[error("key {key} has more than one registry")]
    DuplicateKeyRegistry { key: KeyId },

    #[error("key {key} holds {asset} without having it registered")]
    UnregisteredHolding { key: KeyId, asset: AssetId },

    #[error("asset {asset} is registered for a key but not globally")]
    MissingGlobalAsset { asset: AssetId },

    #[error("aggregate for {asset} is {recorded}, balances sum to {computed}")]
    AggregateMismatch {
        asset: AssetId,
        recorded: Amount,
        computed: Amount,
    },

    #[error("balances of {asset} overflow a 256-bit total")]
    AggregateOverflow { asset: AssetId },
}

// ---------------------------------------------------------------------------
// Snapshot Rows
// ---------------------------------------------------------------------------

/// One positive balance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub key: KeyId,
    pub asset: AssetId,
    pub amount: Amount,
}

/// One key's registry, in first-seen order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRegistry {
    pub key: KeyId,
    pub assets: Vec<AssetId>,
}

/// One per-asset total.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateEntry {
    pub asset: AssetId,
    pub total: Amount,
}

// ---------------------------------------------------------------------------
// LedgerSnapshot
// ---------------------------------------------------------------------------

/// Versioned image of a ledger's full state.
///
/// Entries come out sorted by `(key, asset)`, registries by key, and
/// aggregates by asset, so two snapshots of the same state differ only in
/// `captured_at`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub layout_version: u16,
    pub captured_at: DateTime<Utc>,
    pub entries: Vec<BalanceEntry>,
    pub key_registries: Vec<KeyRegistry>,
    pub global_registry: Vec<AssetId>,
    pub aggregate: Vec<AggregateEntry>,
    pub peers: Vec<Address>,
}

impl LedgerSnapshot {
    /// Flattens `state` into a snapshot at the current layout version.
    pub(crate) fn capture(state: &LedgerState, mut peers: Vec<Address>) -> Self {
        peers.sort();
        peers.dedup();

        Self {
            layout_version: LAYOUT_VERSION,
            captured_at: Utc::now(),
            entries: state
                .balances
                .entries()
                .map(|(key, asset, amount)| BalanceEntry { key, asset, amount })
                .collect(),
            key_registries: state
                .registry
                .keys()
                .map(|(key, assets)| KeyRegistry {
                    key,
                    assets: assets.to_vec(),
                })
                .collect(),
            global_registry: state.registry.global().to_vec(),
            aggregate: state
                .aggregate
                .sorted()
                .into_iter()
                .map(|(asset, total)| AggregateEntry { asset, total })
                .collect(),
            peers,
        }
    }

    /// Checks every structural invariant the ledger relies on.
    ///
    /// # Errors
    ///
    /// The first violation found, in this order: layout version, balance
    /// entries, registries, aggregate totals.
    pub fn verify(&self) -> Result<(), SnapshotError> {
        check_version(self.layout_version)?;

        let mut held = HashSet::with_capacity(self.entries.len());
        let mut computed: BTreeMap<AssetId, Amount> = BTreeMap::new();
        for entry in &self.entries {
            if entry.amount.is_zero() {
                return Err(SnapshotError::ZeroEntry {
                    key: entry.key,
                    asset: entry.asset,
                });
            }
            if !held.insert((entry.key, entry.asset)) {
                return Err(SnapshotError::DuplicateEntry {
                    key: entry.key,
                    asset: entry.asset,
                });
            }
            let total = computed.entry(entry.asset).or_default();
            *total = total
                .checked_add(entry.amount)
                .ok_or(SnapshotError::AggregateOverflow { asset: entry.asset })?;
        }

        let mut global = HashSet::with_capacity(self.global_registry.len());
        for asset in &self.global_registry {
            if !global.insert(*asset) {
                return Err(SnapshotError::DuplicateRegistration {
                    key: None,
                    asset: *asset,
                });
            }
        }

        let mut registered = HashSet::new();
        let mut seen_keys = HashSet::with_capacity(self.key_registries.len());
        for registry in &self.key_registries {
            if !seen_keys.insert(registry.key) {
                return Err(SnapshotError::DuplicateKeyRegistry { key: registry.key });
            }
            for asset in &registry.assets {
                if !registered.insert((registry.key, *asset)) {
                    return Err(SnapshotError::DuplicateRegistration {
                        key: Some(registry.key),
                        asset: *asset,
                    });
                }
                if !global.contains(asset) {
                    return Err(SnapshotError::MissingGlobalAsset { asset: *asset });
                }
            }
        }

        for entry in &self.entries {
            if !registered.contains(&(entry.key, entry.asset)) {
                return Err(SnapshotError::UnregisteredHolding {
                    key: entry.key,
                    asset: entry.asset,
                });
            }
        }

        let mut recorded: BTreeMap<AssetId, Amount> = BTreeMap::new();
        for row in &self.aggregate {
            if recorded.insert(row.asset, row.total).is_some() {
                return Err(SnapshotError::DuplicateRegistration {
                    key: None,
                    asset: row.asset,
                });
            }
            if !global.contains(&row.asset) {
                return Err(SnapshotError::MissingGlobalAsset { asset: row.asset });
            }
        }
        for asset in recorded.keys().chain(computed.keys()) {
            let stored = recorded.get(asset).copied().unwrap_or_default();
            let summed = computed.get(asset).copied().unwrap_or_default();
            if stored != summed {
                return Err(SnapshotError::AggregateMismatch {
                    asset: *asset,
                    recorded: stored,
                    computed: summed,
                });
            }
        }

        Ok(())
    }

    /// Verifies the snapshot and rebuilds the in-memory state from it.
    pub(crate) fn into_state(self) -> Result<LedgerState, SnapshotError> {
        self.verify()?;

        let mut state = LedgerState::new();
        for asset in &self.global_registry {
            state.registry.register_global_if_absent(*asset);
        }
        for registry in &self.key_registries {
            for asset in &registry.assets {
                state.registry.register_if_absent(registry.key, *asset);
            }
        }
        for entry in &self.entries {
            state
                .balances
                .credit(entry.key, &entry.asset, entry.amount)
                .map_err(|e| SnapshotError::Codec(e.to_string()))?;
        }
        for row in &self.aggregate {
            state
                .aggregate
                .add(&row.asset, row.total)
                .ok_or(SnapshotError::AggregateOverflow { asset: row.asset })?;
        }
        Ok(state)
    }

    // -- Codecs -------------------------------------------------------------

    /// Encodes as a version prefix followed by the bincode body.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        let mut out = self.layout_version.to_be_bytes().to_vec();
        bincode::serialize_into(&mut out, self).map_err(|e| SnapshotError::Codec(e.to_string()))?;
        Ok(out)
    }

    /// Decodes bytes written by [`to_bytes`](Self::to_bytes).
    ///
    /// Does not verify invariants; restoring a ledger does that.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        if bytes.len() < 2 {
            return Err(SnapshotError::Truncated);
        }
        let version = u16::from_be_bytes([bytes[0], bytes[1]]);
        check_version(version)?;

        let snapshot: Self =
            bincode::deserialize(&bytes[2..]).map_err(|e| SnapshotError::Codec(e.to_string()))?;
        if snapshot.layout_version != version {
            return Err(SnapshotError::Codec(format!(
                "prefix says layout {version}, body says {}",
                snapshot.layout_version
            )));
        }
        Ok(snapshot)
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        serde_json::to_string_pretty(self).map_err(|e| SnapshotError::Codec(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| SnapshotError::Codec(e.to_string()))?;
        check_version(snapshot.layout_version)?;
        Ok(snapshot)
    }

    /// BLAKE3 digest of the ledger content, excluding `captured_at`.
    pub fn digest(&self) -> Result<[u8; 32], SnapshotError> {
        let content = (
            self.layout_version,
            &self.entries,
            &self.key_registries,
            &self.global_registry,
            &self.aggregate,
            &self.peers,
        );
        let bytes = bincode::serialize(&content).map_err(|e| SnapshotError::Codec(e.to_string()))?;
        Ok(*blake3::hash(&bytes).as_bytes())
    }
}

fn check_version(found: u16) -> Result<(), SnapshotError> {
    if (MIN_SUPPORTED_LAYOUT_VERSION..=LAYOUT_VERSION).contains(&found) {
        Ok(())
    } else {
        Err(SnapshotError::UnsupportedVersion {
            found,
            min: MIN_SUPPORTED_LAYOUT_VERSION,
            max: LAYOUT_VERSION,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Ledger;

    fn peer() -> Address {
        Address::repeat_byte(0x01)
    }

    fn ether() -> AssetId {
        AssetId::from_label("ether").unwrap()
    }

    fn link() -> AssetId {
        AssetId::from_label("link").unwrap()
    }

    fn populated() -> Ledger {
        let ledger = Ledger::with_peers([peer()]);
        ledger.deposit(&peer(), KeyId(0), ether(), Amount::from(3u64)).unwrap();
        ledger.deposit(&peer(), KeyId(0), link(), Amount::from(1u64)).unwrap();
        ledger.deposit(&peer(), KeyId(1), ether(), Amount::from(2u64)).unwrap();
        ledger.withdrawal(&peer(), KeyId(0), link(), Amount::from(1u64)).unwrap();
        ledger
    }

    #[test]
    fn captured_snapshot_verifies() {
        let snapshot = populated().snapshot();
        assert_eq!(snapshot.layout_version, LAYOUT_VERSION);
        assert_eq!(snapshot.entries.len(), 2);
        assert_eq!(snapshot.global_registry, vec![ether(), link()]);
        assert_eq!(snapshot.peers, vec![peer()]);
        snapshot.verify().unwrap();
    }

    #[test]
    fn bytes_carry_version_prefix() {
        let snapshot = populated().snapshot();
        let bytes = snapshot.to_bytes().unwrap();
        assert_eq!(&bytes[..2], &LAYOUT_VERSION.to_be_bytes());
        assert_eq!(LedgerSnapshot::from_bytes(&bytes).unwrap(), snapshot);
    }

    #[test]
    fn unknown_version_refused_before_decoding() {
        let mut bytes = populated().snapshot().to_bytes().unwrap();
        bytes[..2].copy_from_slice(&(LAYOUT_VERSION + 1).to_be_bytes());
        assert!(matches!(
            LedgerSnapshot::from_bytes(&bytes),
            Err(SnapshotError::UnsupportedVersion { .. })
        ));
        assert_eq!(LedgerSnapshot::from_bytes(&[1]), Err(SnapshotError::Truncated));
    }

    #[test]
    fn json_is_readable() {
        let snapshot = populated().snapshot();
        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"layout_version\": 1"));
        assert_eq!(LedgerSnapshot::from_json(&json).unwrap(), snapshot);
    }

    #[test]
    fn digest_ignores_capture_time() {
        let ledger = populated();
        let a = ledger.snapshot();
        let mut b = ledger.snapshot();
        b.captured_at = a.captured_at + chrono::Duration::seconds(60);
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());

        b.aggregate[0].total = Amount::from(99u64);
        assert_ne!(a.digest().unwrap(), b.digest().unwrap());
    }

    #[test]
    fn aggregate_mismatch_detected() {
        let mut snapshot = populated().snapshot();
        let row = snapshot
            .aggregate
            .iter_mut()
            .find(|row| row.asset == ether())
            .unwrap();
        row.total = Amount::from(4u64);
        assert_eq!(
            snapshot.verify(),
            Err(SnapshotError::AggregateMismatch {
                asset: ether(),
                recorded: Amount::from(4u64),
                computed: Amount::from(5u64),
            })
        );
    }

    #[test]
    fn duplicate_registry_entry_detected() {
        let mut snapshot = populated().snapshot();
        snapshot.key_registries[0].assets.push(ether());
        assert_eq!(
            snapshot.verify(),
            Err(SnapshotError::DuplicateRegistration {
                key: Some(KeyId(0)),
                asset: ether()
            })
        );

        let mut snapshot = populated().snapshot();
        snapshot.global_registry.push(link());
        assert!(matches!(
            snapshot.verify(),
            Err(SnapshotError::DuplicateRegistration { key: None, .. })
        ));
    }

    #[test]
    fn holdings_must_be_registered() {
        let mut snapshot = populated().snapshot();
        snapshot.key_registries.retain(|r| r.key != KeyId(1));
        assert_eq!(
            snapshot.verify(),
            Err(SnapshotError::UnregisteredHolding {
                key: KeyId(1),
                asset: ether()
            })
        );
    }

    #[test]
    fn zero_and_duplicate_entries_detected() {
        let mut snapshot = populated().snapshot();
        snapshot.entries[0].amount = Amount::zero();
        assert!(matches!(snapshot.verify(), Err(SnapshotError::ZeroEntry { .. })));

        let mut snapshot = populated().snapshot();
        let first = snapshot.entries[0].clone();
        snapshot.entries.push(first);
        assert!(matches!(
            snapshot.verify(),
            Err(SnapshotError::DuplicateEntry { .. })
        ));
    }

    #[test]
    fn state_survives_round_trip() {
        let ledger = populated();
        let restored = LedgerSnapshot::from_bytes(&ledger.snapshot().to_bytes().unwrap())
            .unwrap()
            .into_state()
            .unwrap();

        ledger.read(|state| {
            assert_eq!(state.balances(), restored.balances());
            assert_eq!(state.aggregate(), restored.aggregate());
            assert_eq!(state.registry().global(), restored.registry().global());
            assert_eq!(
                state.registry().list(KeyId(0)),
                restored.registry().list(KeyId(0))
            );
        });
    }
}
