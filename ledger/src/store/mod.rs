//! # Store Module: In-Memory Ledger State
//!
//! The three pieces of state the ledger owns, each usable and testable on
//! its own:
//!
//! ```text
//! balance.rs: (key, asset) -> amount, checked credit/debit
//! registry.rs: append-only per-key and global asset lists
//! aggregate.rs: per-asset totals across all keys
//! ```
//!
//! None of these types lock or validate callers. They are composed and
//! guarded by [`Ledger`](crate::ledger::Ledger).

pub mod aggregate;
pub mod balance;
pub mod registry;

pub use aggregate::AggregateBalances;
pub use balance::{BalanceError, BalanceStore};
pub use registry::AssetRegistry;
