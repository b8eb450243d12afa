//! # Peer Access Control
//!
//! Only peers may deposit, withdraw or move. The check is a capability
//! injected into the ledger as an `Arc<dyn PeerPolicy>`, so tests (or a
//! governance layer with its own rules) can swap it out without touching
//! the balance store.
//!
//! [`PeerSet`] is the stock policy: an explicit allow-list. Who gets added
//! to it is decided outside the ledger.

use parking_lot::RwLock;
use std::collections::BTreeSet;

use crate::error::LedgerError;
use crate::types::Address;

/// Decides which callers may invoke mutating operations.
pub trait PeerPolicy: Send + Sync {
    /// Returns `true` if `caller` may mutate balances.
    fn is_peer(&self, caller: &Address) -> bool;

    /// The identities this policy currently admits, for persistence.
    ///
    /// Policies that are not list-based may return an empty vector; their
    /// state then simply isn't carried in snapshots.
    fn members(&self) -> Vec<Address>;
}

/// Fails with [`LedgerError::NotAuthorized`] unless `caller` is a peer.
pub fn require_peer(policy: &dyn PeerPolicy, caller: &Address) -> Result<(), LedgerError> {
    if policy.is_peer(caller) {
        Ok(())
    } else {
        Err(LedgerError::NotAuthorized { caller: *caller })
    }
}

/// An explicit, mutable allow-list of peers.
///
/// Interior-locked so governance can grant and revoke through a shared
/// reference while the ledger holds the same `Arc`.
#[derive(Debug, Default)]
pub struct PeerSet {
    peers: RwLock<BTreeSet<Address>>,
}

impl PeerSet {
    /// Creates an empty set; no caller is authorized.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set admitting exactly `peers`.
    pub fn with_peers(peers: impl IntoIterator<Item = Address>) -> Self {
        Self {
            peers: RwLock::new(peers.into_iter().collect()),
        }
    }

    /// Admits `peer`. Returns `true` if it was not already a peer.
    pub fn grant(&self, peer: Address) -> bool {
        let added = self.peers.write().insert(peer);
        if added {
            tracing::info!(peer = %peer, "peer granted");
        }
        added
    }

    /// Removes `peer`. Returns `true` if it was a peer.
    pub fn revoke(&self, peer: &Address) -> bool {
        let removed = self.peers.write().remove(peer);
        if removed {
            tracing::info!(peer = %peer, "peer revoked");
        }
        removed
    }

    /// Number of peers.
    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    /// Returns `true` if nobody is authorized.
    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}

impl PeerPolicy for PeerSet {
    fn is_peer(&self, caller: &Address) -> bool {
        self.peers.read().contains(caller)
    }

    fn members(&self) -> Vec<Address> {
        self.peers.read().iter().copied().collect()
    }
}
