//! # Ledger: Transaction Operations
//!
//! [`Ledger`] composes the balance store, the asset registry and the
//! aggregate totals behind one ledger-wide `RwLock`, and guards every
//! mutation with the injected [`PeerPolicy`].
//!
//! ## Operation Pipeline
//!
//! ```text
//! require_peer(initiator)          -> NotAuthorized
//! amount != 0                      -> ZeroAmount
//! take write lock
//!   preview every fallible step    -> InsufficientBalance / ArithmeticOverflow / SameKey
//!   apply (cannot fail any more)
//!   publish event to the sink
//! release lock
//! ```
//!
//! Because all checked arithmetic runs before the first write, a failed call
//! leaves no trace, and readers (who take the read lock) only ever observe
//! the state before or after a whole operation.

use parking_lot::RwLock;
use std::fmt::Debug;
use std::sync::Arc;

use crate::access::{require_peer, PeerPolicy, PeerSet};
use crate::config::{LedgerConfig, SameKeyMoves};
use crate::error::LedgerError;
use crate::events::{Deposited, EventSink, LedgerEvent, Moved, NullSink, Withdrawn};
use crate::metrics::LedgerMetrics;
use crate::storage::{LedgerSnapshot, SnapshotError};
use crate::store::{AggregateBalances, AssetRegistry, BalanceStore};
use crate::types::{Address, Amount, AssetId, KeyId};

// ---------------------------------------------------------------------------
// LedgerState
// ---------------------------------------------------------------------------

/// Everything the ledger persists, minus the peer policy.
#[derive(Clone, Debug, Default)]
pub struct LedgerState {
    pub(crate) balances: BalanceStore,
    pub(crate) registry: AssetRegistry,
    pub(crate) aggregate: AggregateBalances,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balances(&self) -> &BalanceStore {
        &self.balances
    }

    pub fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    pub fn aggregate(&self) -> &AggregateBalances {
        &self.aggregate
    }

    fn deposit(
        &mut self,
        initiator: Address,
        beneficiary: Address,
        key: KeyId,
        asset: AssetId,
        amount: Amount,
    ) -> Result<Deposited, LedgerError> {
        let total = self
            .aggregate
            .preview_add(&asset, amount)
            .ok_or(LedgerError::ArithmeticOverflow { key: None, asset })?;
        let balance = self.balances.credit(key, &asset, amount)?;

        self.registry.register_if_absent(key, asset);
        self.registry.register_global_if_absent(asset);
        let committed = self.aggregate.add(&asset, amount);
        debug_assert_eq!(committed, Some(total));

        Ok(Deposited {
            initiator,
            beneficiary,
            key,
            asset,
            amount,
            balance,
        })
    }

    fn withdrawal(
        &mut self,
        initiator: Address,
        beneficiary: Address,
        key: KeyId,
        asset: AssetId,
        amount: Amount,
    ) -> Result<Withdrawn, LedgerError> {
        self.balances.preview_debit(key, &asset, amount)?;
        let total = self
            .aggregate
            .preview_sub(&asset, amount)
            .ok_or(LedgerError::AggregateUnderflow { asset })?;

        let balance = self.balances.debit(key, &asset, amount)?;
        let committed = self.aggregate.sub(&asset, amount);
        debug_assert_eq!(committed, Some(total));

        Ok(Withdrawn {
            initiator,
            beneficiary,
            key,
            asset,
            amount,
            balance,
        })
    }

    fn move_between(
        &mut self,
        initiator: Address,
        source_key: KeyId,
        dest_key: KeyId,
        asset: AssetId,
        amount: Amount,
        same_key_moves: SameKeyMoves,
    ) -> Result<Moved, LedgerError> {
        if source_key == dest_key {
            if same_key_moves == SameKeyMoves::Reject {
                return Err(LedgerError::SameKey(source_key));
            }
            self.balances.preview_debit(source_key, &asset, amount)?;
            let balance = self.balances.get(source_key, &asset);
            return Ok(Moved {
                initiator,
                source_key,
                dest_key,
                asset,
                amount,
                source_balance: balance,
                dest_balance: balance,
            });
        }

        self.balances.preview_debit(source_key, &asset, amount)?;
        self.balances.preview_credit(dest_key, &asset, amount)?;

        let source_balance = self.balances.debit(source_key, &asset, amount)?;
        let dest_balance = self.balances.credit(dest_key, &asset, amount)?;
        self.registry.register_if_absent(dest_key, asset);

        Ok(Moved {
            initiator,
            source_key,
            dest_key,
            asset,
            amount,
            source_balance,
            dest_balance,
        })
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// A multi-asset, peer-gated balance ledger.
///
/// Cheap to share: wrap it in an `Arc` and call operations through `&self`
/// from any thread.
pub struct Ledger {
    state: RwLock<LedgerState>,
    peers: Arc<dyn PeerPolicy>,
    sink: Arc<dyn EventSink>,
    metrics: Option<LedgerMetrics>,
    config: LedgerConfig,
}

impl Ledger {
    /// Creates an empty ledger guarded by `peers`.
    pub fn new(peers: Arc<dyn PeerPolicy>) -> Self {
        Self::from_state(LedgerState::new(), peers)
    }

    /// Creates an empty ledger whose only peers are `peers`.
    pub fn with_peers(peers: impl IntoIterator<Item = Address>) -> Self {
        Self::new(Arc::new(PeerSet::with_peers(peers)))
    }

    fn from_state(state: LedgerState, peers: Arc<dyn PeerPolicy>) -> Self {
        Self {
            state: RwLock::new(state),
            peers,
            sink: Arc::new(NullSink),
            metrics: None,
            config: LedgerConfig::default(),
        }
    }

    /// Routes committed events to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Records commits and rejections in `metrics`.
    pub fn with_metrics(mut self, metrics: LedgerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_config(mut self, config: LedgerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> LedgerConfig {
        self.config
    }

    pub fn peers(&self) -> &Arc<dyn PeerPolicy> {
        &self.peers
    }

    pub fn metrics(&self) -> Option<&LedgerMetrics> {
        self.metrics.as_ref()
    }

    // -----------------------------------------------------------------------
    // Mutating operations
    // -----------------------------------------------------------------------

    /// Credits `amount` of `asset` to `key`, with the initiator recorded as
    /// beneficiary.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotAuthorized`], [`LedgerError::ZeroAmount`],
    /// [`LedgerError::ArithmeticOverflow`].
    pub fn deposit(
        &self,
        initiator: &Address,
        key: KeyId,
        asset: AssetId,
        amount: Amount,
    ) -> Result<Deposited, LedgerError> {
        self.deposit_for(initiator, initiator, key, asset, amount)
    }

    /// Like [`deposit`](Self::deposit) but records `beneficiary` in the
    /// event.
    pub fn deposit_for(
        &self,
        initiator: &Address,
        beneficiary: &Address,
        key: KeyId,
        asset: AssetId,
        amount: Amount,
    ) -> Result<Deposited, LedgerError> {
        let (initiator, beneficiary) = (*initiator, *beneficiary);
        self.run("deposit", &initiator, amount, |state, _| {
            state.deposit(initiator, beneficiary, key, asset, amount)
        })
    }

    /// Debits `amount` of `asset` from `key`, paid out to the initiator.
    ///
    /// The asset stays in the key's registry even if the balance reaches
    /// zero.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotAuthorized`], [`LedgerError::ZeroAmount`],
    /// [`LedgerError::InsufficientBalance`].
    pub fn withdrawal(
        &self,
        initiator: &Address,
        key: KeyId,
        asset: AssetId,
        amount: Amount,
    ) -> Result<Withdrawn, LedgerError> {
        self.withdrawal_to(initiator, initiator, key, asset, amount)
    }

    /// Like [`withdrawal`](Self::withdrawal) but records `beneficiary` as
    /// the recipient.
    pub fn withdrawal_to(
        &self,
        initiator: &Address,
        beneficiary: &Address,
        key: KeyId,
        asset: AssetId,
        amount: Amount,
    ) -> Result<Withdrawn, LedgerError> {
        let (initiator, beneficiary) = (*initiator, *beneficiary);
        self.run("withdrawal", &initiator, amount, |state, _| {
            state.withdrawal(initiator, beneficiary, key, asset, amount)
        })
    }

    /// Moves `amount` of `asset` from `source_key` to `dest_key`.
    /// The per-asset total is unchanged.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotAuthorized`], [`LedgerError::ZeroAmount`],
    /// [`LedgerError::SameKey`] (unless the config allows no-op moves),
    /// [`LedgerError::InsufficientBalance`].
    pub fn move_between(
        &self,
        initiator: &Address,
        source_key: KeyId,
        dest_key: KeyId,
        asset: AssetId,
        amount: Amount,
    ) -> Result<Moved, LedgerError> {
        let initiator = *initiator;
        self.run("move", &initiator, amount, |state, config| {
            state.move_between(
                initiator,
                source_key,
                dest_key,
                asset,
                amount,
                config.same_key_moves,
            )
        })
    }

    fn run<T, F>(
        &self,
        kind: &'static str,
        initiator: &Address,
        amount: Amount,
        op: F,
    ) -> Result<T, LedgerError>
    where
        T: Clone + Debug + Into<LedgerEvent>,
        F: FnOnce(&mut LedgerState, &LedgerConfig) -> Result<T, LedgerError>,
    {
        match self.try_run(kind, initiator, amount, op) {
            Ok(event) => {
                tracing::debug!(kind, ?event, "ledger operation committed");
                Ok(event)
            }
            Err(err) => {
                tracing::warn!(kind, initiator = %initiator, error = %err, "ledger operation rejected");
                if let Some(metrics) = &self.metrics {
                    metrics.record_rejection(kind, &err);
                }
                Err(err)
            }
        }
    }

    fn try_run<T, F>(
        &self,
        kind: &'static str,
        initiator: &Address,
        amount: Amount,
        op: F,
    ) -> Result<T, LedgerError>
    where
        T: Clone + Into<LedgerEvent>,
        F: FnOnce(&mut LedgerState, &LedgerConfig) -> Result<T, LedgerError>,
    {
        require_peer(self.peers.as_ref(), initiator)?;
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }

        let mut state = self.state.write();
        let event = op(&mut *state, &self.config)?;

        self.sink.publish(&event.clone().into());
        if let Some(metrics) = &self.metrics {
            metrics.record_commit(kind, state.registry.count());
        }
        Ok(event)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Balance of `asset` at `key`; zero if never credited.
    pub fn balance_of(&self, key: KeyId, asset: &AssetId) -> Amount {
        self.state.read().balances.get(key, asset)
    }

    /// Balances of several assets at `key`, in the order asked for.
    pub fn balances_of(&self, key: KeyId, assets: &[AssetId]) -> Vec<Amount> {
        let state = self.state.read();
        assets
            .iter()
            .map(|asset| state.balances.get(key, asset))
            .collect()
    }

    /// Assets ever credited to `key`, in first-seen order.
    pub fn assets_of(&self, key: KeyId) -> Vec<AssetId> {
        self.state.read().registry.list(key).to_vec()
    }

    /// Number of distinct assets ever deposited.
    pub fn global_asset_count(&self) -> usize {
        self.state.read().registry.count()
    }

    /// Assets ever deposited, in first-seen order.
    pub fn global_assets(&self) -> Vec<AssetId> {
        self.state.read().registry.global().to_vec()
    }

    /// Total of `asset` across every key.
    pub fn global_balance_of(&self, asset: &AssetId) -> Amount {
        self.state.read().aggregate.total(asset)
    }

    pub fn is_global_asset_registered(&self, asset: &AssetId) -> bool {
        self.state.read().registry.is_registered(asset)
    }

    pub fn is_peer(&self, address: &Address) -> bool {
        self.peers.is_peer(address)
    }

    /// Runs `f` against a consistent view of the whole state.
    pub fn read<R>(&self, f: impl FnOnce(&LedgerState) -> R) -> R {
        f(&self.state.read())
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Captures the full state, including current peer members.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.state.read();
        LedgerSnapshot::capture(&state, self.peers.members())
    }

    /// Rebuilds a ledger from a verified snapshot, admitting the peers it
    /// lists.
    pub fn restore(snapshot: LedgerSnapshot, config: LedgerConfig) -> Result<Self, SnapshotError> {
        let peers = Arc::new(PeerSet::with_peers(snapshot.peers.iter().copied()));
        Self::restore_with_policy(snapshot, peers, config)
    }

    /// Rebuilds a ledger from a verified snapshot under a caller-supplied
    /// policy. The snapshot's peer list is ignored.
    pub fn restore_with_policy(
        snapshot: LedgerSnapshot,
        peers: Arc<dyn PeerPolicy>,
        config: LedgerConfig,
    ) -> Result<Self, SnapshotError> {
        let state = snapshot.into_state()?;
        tracing::info!(
            entries = state.balances.len(),
            assets = state.registry.count(),
            "ledger restored from snapshot"
        );
        Ok(Self::from_state(state, peers).with_config(config))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
