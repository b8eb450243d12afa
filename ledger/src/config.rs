//! # Ledger Configuration & Constants
//!
//! Every fixed width, layout version and storage name the ledger depends on
//! lives here. The persisted layout constants are part of the on-disk
//! contract: a new logic revision may add fields behind a new
//! [`LAYOUT_VERSION`], it may never reinterpret an old one.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifier Widths
// ---------------------------------------------------------------------------

/// Width of an [`AssetId`](crate::types::AssetId) in bytes (a `bytes32`).
pub const ASSET_ID_LENGTH: usize = 32;

/// Width of an [`Address`](crate::types::Address) in bytes.
pub const ADDRESS_LENGTH: usize = 20;

// ---------------------------------------------------------------------------
// Persisted Layout
// ---------------------------------------------------------------------------

/// Version of the snapshot layout written by this build.
///
/// Bump when the shape of [`LedgerSnapshot`](crate::storage::LedgerSnapshot)
/// changes, and teach the decoder to read the previous version.
pub const LAYOUT_VERSION: u16 = 1;

/// Oldest snapshot layout this build can still read.
pub const MIN_SUPPORTED_LAYOUT_VERSION: u16 = 1;

/// sled tree holding the current snapshot.
pub const STATE_TREE: &str = "state";

/// sled tree holding bookkeeping values (revision counter, digest).
pub const METADATA_TREE: &str = "metadata";

// ---------------------------------------------------------------------------
// Events & Metrics
// ---------------------------------------------------------------------------

/// Capacity of the broadcast channel behind
/// [`BroadcastSink`](crate::events::BroadcastSink). Receivers that fall
/// further behind than this observe a lag error instead of blocking writers.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Prefix applied to every Prometheus metric name.
pub const METRICS_NAMESPACE: &str = "trust_ledger";

// ---------------------------------------------------------------------------
// Runtime Policy
// ---------------------------------------------------------------------------

/// What a move with identical source and destination keys does.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameKeyMoves {
    /// Fail with [`LedgerError::SameKey`](crate::error::LedgerError::SameKey).
    #[default]
    Reject,
    /// Validate as usual, change nothing, and still emit the event.
    AllowNoop,
}

/// Knobs that change ledger behavior without changing its state layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Policy for `move_between(k, k, ..)`.
    #[serde(default)]
    pub same_key_moves: SameKeyMoves,
}

impl LedgerConfig {
    /// Returns a config with the given same-key policy.
    pub fn with_same_key_moves(mut self, policy: SameKeyMoves) -> Self {
        self.same_key_moves = policy;
        self
    }
}
