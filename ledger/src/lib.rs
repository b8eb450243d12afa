//! # Trust Ledger: Core Library
//!
//! A multi-asset balance ledger partitioned into numbered keys. Peers (an
//! authorized set of caller identities) deposit into keys, withdraw from
//! them, and move value between them. Anyone may query.
//!
//! ## Architecture
//!
//! - **types**: `KeyId`, `AssetId`, `Address`, and the 256-bit `Amount`.
//! - **store**: balance store, asset registry and aggregate totals. No
//!   access checks; pure checked bookkeeping.
//! - **access**: the `PeerPolicy` capability and the stock `PeerSet`.
//! - **ledger**: the operations (authorize, validate, commit, notify).
//! - **events**: notification payloads and sinks.
//! - **storage**: versioned snapshots and the sled snapshot store.
//! - **metrics**: Prometheus counters.
//! - **config**: layout constants and runtime knobs.
//!
//! ## Invariants
//!
//! 1. Every stored balance is positive.
//! 2. Registries are append-only and duplicate-free.
//! 3. `global_balance_of(a)` equals the sum of `balance_of(k, a)` over all keys.
//! 4. A failed operation changes nothing and emits nothing.
//!
//! ## Example
//!
//! ```
//! use trust_ledger::{Address, Amount, AssetId, KeyId, Ledger};
//!
//! let peer = Address::repeat_byte(0x01);
//! let ledger = Ledger::with_peers([peer]);
//! let ether = AssetId::from_label("ether").unwrap();
//!
//! ledger.deposit(&peer, KeyId(0), ether, Amount::from(3u64)).unwrap();
//! ledger.move_between(&peer, KeyId(0), KeyId(1), ether, Amount::from(1u64)).unwrap();
//!
//! assert_eq!(ledger.balance_of(KeyId(1), &ether), Amount::from(1u64));
//! assert_eq!(ledger.global_balance_of(&ether), Amount::from(3u64));
//! ```

pub mod access;
pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod metrics;
pub mod storage;
pub mod store;
pub mod types;

pub use access::{PeerPolicy, PeerSet};
pub use config::{LedgerConfig, SameKeyMoves};
pub use error::LedgerError;
pub use events::{BroadcastSink, EventSink, LedgerEvent, NullSink, RecordingSink};
pub use ledger::{Ledger, LedgerState};
pub use metrics::LedgerMetrics;
pub use storage::{LedgerDb, LedgerSnapshot, SnapshotError};
pub use types::{Address, Amount, AssetId, IdError, KeyId};
