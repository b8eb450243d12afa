//! # Asset Registry
//!
//! Records which assets each key has ever been credited with, and which
//! assets the ledger as a whole has ever seen. Both lists keep first-seen
//! order and are append-only: a key whose balance drops back to zero keeps
//! the asset in its registry.
//!
//! Membership checks go through hash-set indexes so registering stays O(1)
//! regardless of how many assets a key has touched.

use std::collections::{BTreeMap, HashSet};

use crate::types::{AssetId, KeyId};

/// Per-key and global first-seen asset lists.
#[derive(Clone, Debug, Default)]
pub struct AssetRegistry {
    per_key: BTreeMap<KeyId, Vec<AssetId>>,
    per_key_index: HashSet<(KeyId, AssetId)>,
    global: Vec<AssetId>,
    global_index: HashSet<AssetId>,
}

impl AssetRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `asset` to `key`'s list unless already present.
    ///
    /// Returns `true` if the asset was newly registered for the key.
    pub fn register_if_absent(&mut self, key: KeyId, asset: AssetId) -> bool {
        if !self.per_key_index.insert((key, asset)) {
            return false;
        }
        self.per_key.entry(key).or_default().push(asset);
        true
    }

    /// Appends `asset` to the global list unless already present.
    ///
    /// Returns `true` if the asset was newly registered.
    pub fn register_global_if_absent(&mut self, asset: AssetId) -> bool {
        if !self.global_index.insert(asset) {
            return false;
        }
        self.global.push(asset);
        true
    }

    /// Assets ever credited to `key`, in first-seen order.
    pub fn list(&self, key: KeyId) -> &[AssetId] {
        self.per_key.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns `true` if `key` has ever been credited with `asset`.
    pub fn contains(&self, key: KeyId, asset: &AssetId) -> bool {
        self.per_key_index.contains(&(key, *asset))
    }

    /// Number of distinct assets ever deposited ledger-wide.
    pub fn count(&self) -> usize {
        self.global.len()
    }

    /// Returns `true` if `asset` has ever been deposited.
    pub fn is_registered(&self, asset: &AssetId) -> bool {
        self.global_index.contains(asset)
    }

    /// All assets ever deposited, in first-seen order.
    pub fn global(&self) -> &[AssetId] {
        &self.global
    }

    /// Every key with a non-empty registry, in key order.
    pub fn keys(&self) -> impl Iterator<Item = (KeyId, &[AssetId])> + '_ {
        self.per_key
            .iter()
            .map(|(key, assets)| (*key, assets.as_slice()))
    }
}
