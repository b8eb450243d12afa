//! # Ledger Errors
//!
//! The failure taxonomy of the mutating operations. Every variant aborts the
//! whole operation; the ledger is left exactly as it was before the call.

use thiserror::Error;

use crate::store::BalanceError;
use crate::types::{Address, Amount, AssetId, KeyId};

/// Errors returned by [`Ledger`](crate::ledger::Ledger) operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// The amount was zero. Checked before any state is read.
    #[error("zero-amount operations are not permitted")]
    ZeroAmount,

    /// The caller is not a peer. Checked before anything else, so the
    /// rejection reveals nothing about balances or parameters.
    #[error("caller {caller} is not an authorized peer")]
    NotAuthorized {
        /// Identity that attempted the call.
        caller: Address,
    },

    /// A debit would drive the balance below zero.
    #[error("insufficient balance at key {key} for {asset}: available {available}, requested {requested}")]
    InsufficientBalance {
        /// Key being debited.
        key: KeyId,
        /// Asset being debited.
        asset: AssetId,
        /// Balance at the time of the call.
        available: Amount,
        /// Amount the caller asked for.
        requested: Amount,
    },

    /// A credit would exceed the 256-bit range. `key` is `None` when the
    /// per-asset aggregate is what overflowed.
    #[error("arithmetic overflow crediting {asset} (key {key:?})")]
    ArithmeticOverflow {
        /// Key being credited, if the overflow was per-key.
        key: Option<KeyId>,
        /// Asset being credited.
        asset: AssetId,
    },

    /// The per-asset total is smaller than a debit that the per-key balance
    /// allowed. Only reachable from a state that breaks the aggregate
    /// invariant.
    #[error("aggregate total for {asset} is below a committed per-key balance")]
    AggregateUnderflow {
        /// Asset whose total is inconsistent.
        asset: AssetId,
    },

    /// Source and destination of a move are the same key.
    #[error("source and destination key are both {0}")]
    SameKey(KeyId),
}

impl From<BalanceError> for LedgerError {
    fn from(err: BalanceError) -> Self {
        match err {
            BalanceError::InsufficientBalance {
                key,
                asset,
                available,
                requested,
            } => LedgerError::InsufficientBalance {
                key,
                asset,
                available,
                requested,
            },
            BalanceError::Overflow { key, asset, .. } => LedgerError::ArithmeticOverflow {
                key: Some(key),
                asset,
            },
        }
    }
}
