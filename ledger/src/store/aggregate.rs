//! # Aggregate Accounting
//!
//! Per-asset totals across every key, maintained incrementally so
//! `global_balance_of` is a single map lookup. The ledger keeps
//! `total(a) == Σ_key balance(key, a)` for every asset; this type only does
//! the checked arithmetic.

use std::collections::HashMap;

use crate::types::{Amount, AssetId};

/// Running totals keyed by asset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AggregateBalances {
    totals: HashMap<AssetId, Amount>,
}

impl AggregateBalances {
    /// Creates an empty set of totals.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total of `asset` across all keys, zero if never deposited.
    pub fn total(&self, asset: &AssetId) -> Amount {
        self.totals.get(asset).copied().unwrap_or_default()
    }

    /// The total after adding `amount`, or `None` on overflow.
    pub fn preview_add(&self, asset: &AssetId, amount: Amount) -> Option<Amount> {
        self.total(asset).checked_add(amount)
    }

    /// The total after removing `amount`, or `None` on underflow.
    pub fn preview_sub(&self, asset: &AssetId, amount: Amount) -> Option<Amount> {
        self.total(asset).checked_sub(amount)
    }

    /// Adds `amount` to the total. Returns `None` and changes nothing on
    /// overflow.
    pub fn add(&mut self, asset: &AssetId, amount: Amount) -> Option<Amount> {
        let total = self.preview_add(asset, amount)?;
        self.totals.insert(*asset, total);
        Some(total)
    }

    /// Removes `amount` from the total. Returns `None` and changes nothing
    /// on underflow.
    pub fn sub(&mut self, asset: &AssetId, amount: Amount) -> Option<Amount> {
        let total = self.preview_sub(asset, amount)?;
        // Zero totals stay in the map: the asset is still registered.
        self.totals.insert(*asset, total);
        Some(total)
    }

    /// All tracked totals, sorted by asset for deterministic output.
    pub fn sorted(&self) -> Vec<(AssetId, Amount)> {
        let mut totals: Vec<(AssetId, Amount)> =
            self.totals.iter().map(|(a, t)| (*a, *t)).collect();
        totals.sort_by(|a, b| a.0.cmp(&b.0));
        totals
    }
}
