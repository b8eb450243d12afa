//! # Balance Store
//!
//! The authoritative `(KeyId, AssetId) -> Amount` mapping. Every read and
//! write of a sub-account balance goes through [`BalanceStore`], and the only
//! two ways to change a value are [`credit`](BalanceStore::credit) and
//! [`debit`](BalanceStore::debit). Both use checked 256-bit arithmetic.
//!
//! Absent entries read as zero, and an entry debited down to zero is removed
//! again, so the map only ever holds positive balances. Registry and
//! aggregate bookkeeping is deliberately not done here; the ledger layers
//! that on top.

use std::collections::BTreeMap;
use thiserror::Error;

use crate::types::{Amount, AssetId, KeyId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during balance operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BalanceError {
    /// Attempted to debit more than the current balance.
    #[error("insufficient balance at key {key} for {asset}: available {available}, requested {requested}")]
    InsufficientBalance {
        /// The key being debited.
        key: KeyId,
        /// The asset being debited.
        asset: AssetId,
        /// The current balance.
        available: Amount,
        /// The amount that was requested.
        requested: Amount,
    },

    /// The credit would exceed `U256::MAX`.
    #[error("balance overflow at key {key} for {asset}: current {current}, credit {credit}")]
    Overflow {
        /// The key being credited.
        key: KeyId,
        /// The asset being credited.
        asset: AssetId,
        /// The balance before the failed credit.
        current: Amount,
        /// The amount that caused the overflow.
        credit: Amount,
    },
}

// ---------------------------------------------------------------------------
// BalanceStore
// ---------------------------------------------------------------------------

/// Positive balances keyed by `(key, asset)`.
///
/// Backed by a `BTreeMap` so iteration (and therefore snapshots) come out in
/// a stable `(key, asset)` order. Not `Sync`-safe on its own; the owning
/// ledger serializes access.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BalanceStore {
    entries: BTreeMap<(KeyId, AssetId), Amount>,
}

impl BalanceStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Returns the balance of `asset` held by `key`, zero if never credited.
    pub fn get(&self, key: KeyId, asset: &AssetId) -> Amount {
        self.entries
            .get(&(key, *asset))
            .copied()
            .unwrap_or_default()
    }

    /// Computes the balance a credit would produce without applying it.
    pub fn preview_credit(
        &self,
        key: KeyId,
        asset: &AssetId,
        amount: Amount,
    ) -> Result<Amount, BalanceError> {
        let current = self.get(key, asset);
        current.checked_add(amount).ok_or(BalanceError::Overflow {
            key,
            asset: *asset,
            current,
            credit: amount,
        })
    }

    /// Computes the balance a debit would leave without applying it.
    pub fn preview_debit(
        &self,
        key: KeyId,
        asset: &AssetId,
        amount: Amount,
    ) -> Result<Amount, BalanceError> {
        let available = self.get(key, asset);
        available
            .checked_sub(amount)
            .ok_or(BalanceError::InsufficientBalance {
                key,
                asset: *asset,
                available,
                requested: amount,
            })
    }

    /// Adds `amount` to the balance and returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns [`BalanceError::Overflow`] if the sum exceeds `U256::MAX`.
    /// The stored value is untouched on error.
    pub fn credit(
        &mut self,
        key: KeyId,
        asset: &AssetId,
        amount: Amount,
    ) -> Result<Amount, BalanceError> {
        let new_amount = self.preview_credit(key, asset, amount)?;
        self.write(key, asset, new_amount);
        Ok(new_amount)
    }

    /// Subtracts `amount` from the balance and returns what remains.
    ///
    /// # Errors
    ///
    /// Returns [`BalanceError::InsufficientBalance`] if `amount` exceeds the
    /// current balance, including for pairs that were never credited.
    pub fn debit(
        &mut self,
        key: KeyId,
        asset: &AssetId,
        amount: Amount,
    ) -> Result<Amount, BalanceError> {
        let remaining = self.preview_debit(key, asset, amount)?;
        self.write(key, asset, remaining);
        Ok(remaining)
    }

    /// All positive balances in `(key, asset)` order.
    pub fn entries(&self) -> impl Iterator<Item = (KeyId, AssetId, Amount)> + '_ {
        self.entries
            .iter()
            .map(|((key, asset), amount)| (*key, *asset, *amount))
    }

    /// Number of `(key, asset)` pairs currently holding a positive balance.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no key holds anything.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn write(&mut self, key: KeyId, asset: &AssetId, amount: Amount) {
        if amount.is_zero() {
            self.entries.remove(&(key, *asset));
        } else {
            self.entries.insert((key, *asset), amount);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn amt(n: u64) -> Amount {
        Amount::from(n)
    }

    fn ether() -> AssetId {
        AssetId::from_label("ether").unwrap()
    }

    fn link() -> AssetId {
        AssetId::from_label("link").unwrap()
    }

    #[test]
    fn missing_entry_reads_zero() {
        let store = BalanceStore::new();
        assert_eq!(store.get(KeyId(0), &ether()), Amount::zero());
        assert!(store.is_empty());
    }

    #[test]
    fn credit_accumulates() {
        let mut store = BalanceStore::new();
        assert_eq!(store.credit(KeyId(0), &ether(), amt(500)).unwrap(), amt(500));
        assert_eq!(store.credit(KeyId(0), &ether(), amt(300)).unwrap(), amt(800));
        assert_eq!(store.get(KeyId(0), &ether()), amt(800));
    }

    #[test]
    fn credit_overflow_rejected_without_change() {
        let mut store = BalanceStore::new();
        store.credit(KeyId(0), &ether(), Amount::MAX).unwrap();

        let err = store.credit(KeyId(0), &ether(), Amount::one()).unwrap_err();
        assert!(matches!(err, BalanceError::Overflow { .. }));
        assert_eq!(store.get(KeyId(0), &ether()), Amount::MAX);
    }

    #[test]
    fn debit_reduces_balance() {
        let mut store = BalanceStore::new();
        store.credit(KeyId(1), &ether(), amt(1000)).unwrap();
        let remaining = store.debit(KeyId(1), &ether(), amt(400)).unwrap();
        assert_eq!(remaining, amt(600));
    }

    #[test]
    fn debit_to_zero_removes_entry() {
        let mut store = BalanceStore::new();
        store.credit(KeyId(1), &ether(), amt(500)).unwrap();
        let remaining = store.debit(KeyId(1), &ether(), amt(500)).unwrap();

        assert!(remaining.is_zero());
        assert!(store.is_empty());
        assert_eq!(store.get(KeyId(1), &ether()), Amount::zero());
    }

    #[test]
    fn debit_insufficient_balance_rejected() {
        let mut store = BalanceStore::new();
        store.credit(KeyId(0), &ether(), amt(100)).unwrap();

        let err = store.debit(KeyId(0), &ether(), amt(200)).unwrap_err();
        assert_eq!(
            err,
            BalanceError::InsufficientBalance {
                key: KeyId(0),
                asset: ether(),
                available: amt(100),
                requested: amt(200),
            }
        );
        assert_eq!(store.get(KeyId(0), &ether()), amt(100));
    }

    #[test]
    fn debit_never_credited_rejected() {
        let mut store = BalanceStore::new();
        let err = store.debit(KeyId(4), &link(), Amount::one()).unwrap_err();
        assert!(matches!(
            err,
            BalanceError::InsufficientBalance { available, .. } if available.is_zero()
        ));
    }

    #[test]
    fn keys_and_assets_are_isolated() {
        let mut store = BalanceStore::new();
        store.credit(KeyId(0), &ether(), amt(2)).unwrap();
        store.credit(KeyId(1), &link(), amt(7)).unwrap();

        assert_eq!(store.get(KeyId(1), &ether()), Amount::zero());
        assert_eq!(store.get(KeyId(0), &link()), Amount::zero());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn entries_come_out_ordered() {
        let mut store = BalanceStore::new();
        store.credit(KeyId(2), &ether(), amt(1)).unwrap();
        store.credit(KeyId(0), &link(), amt(1)).unwrap();
        store.credit(KeyId(0), &ether(), amt(1)).unwrap();

        let keys: Vec<KeyId> = store.entries().map(|(k, _, _)| k).collect();
        assert_eq!(keys, vec![KeyId(0), KeyId(0), KeyId(2)]);
    }

    #[test]
    fn previews_do_not_mutate() {
        let mut store = BalanceStore::new();
        store.credit(KeyId(0), &ether(), amt(10)).unwrap();

        assert_eq!(store.preview_credit(KeyId(0), &ether(), amt(5)).unwrap(), amt(15));
        assert_eq!(store.preview_debit(KeyId(0), &ether(), amt(4)).unwrap(), amt(6));
        assert_eq!(store.get(KeyId(0), &ether()), amt(10));
    }
}
