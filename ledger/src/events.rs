//! # Ledger Notifications
//!
//! Every successful mutating call produces exactly one [`LedgerEvent`]. The
//! ledger hands it to an [`EventSink`] while still holding its write lock,
//! so sinks observe events in commit order. Transport beyond that (web
//! sockets, queues, logs) is the sink's business.
//!
//! Sinks must not block. [`BroadcastSink`] fans out over a bounded
//! `tokio::sync::broadcast` channel; slow receivers lag rather than stall
//! the ledger.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::config::EVENT_CHANNEL_CAPACITY;
use crate::types::{Address, Amount, AssetId, KeyId};

// ---------------------------------------------------------------------------
// Event payloads
// ---------------------------------------------------------------------------

/// A credit into `key` committed by a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposited {
    pub initiator: Address,
    pub beneficiary: Address,
    pub key: KeyId,
    pub asset: AssetId,
    pub amount: Amount,
    /// Balance of `(key, asset)` after the credit.
    pub balance: Amount,
}

/// A debit from `key` committed by a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawn {
    pub initiator: Address,
    pub beneficiary: Address,
    pub key: KeyId,
    pub asset: AssetId,
    pub amount: Amount,
    /// Balance of `(key, asset)` after the debit.
    pub balance: Amount,
}

/// Value moved between two keys of the same ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Moved {
    pub initiator: Address,
    pub source_key: KeyId,
    pub dest_key: KeyId,
    pub asset: AssetId,
    pub amount: Amount,
    pub source_balance: Amount,
    pub dest_balance: Amount,
}

/// Outcome notification for one committed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    Deposited(Deposited),
    Withdrawn(Withdrawn),
    Moved(Moved),
}

impl LedgerEvent {
    /// Short operation name, used for logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerEvent::Deposited(_) => "deposit",
            LedgerEvent::Withdrawn(_) => "withdrawal",
            LedgerEvent::Moved(_) => "move",
        }
    }
}

impl From<Deposited> for LedgerEvent {
    fn from(event: Deposited) -> Self {
        LedgerEvent::Deposited(event)
    }
}

impl From<Withdrawn> for LedgerEvent {
    fn from(event: Withdrawn) -> Self {
        LedgerEvent::Withdrawn(event)
    }
}

impl From<Moved> for LedgerEvent {
    fn from(event: Moved) -> Self {
        LedgerEvent::Moved(event)
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Receives committed events. Called with the ledger's write lock held.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &LedgerEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: &LedgerEvent) {}
}

/// Keeps every event in memory, in commit order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LedgerEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out everything recorded so far.
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events.lock().clone()
    }

    /// Removes and returns everything recorded so far.
    pub fn drain(&self) -> Vec<LedgerEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: &LedgerEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Fans events out to any number of async subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<LedgerEvent>,
}

impl BroadcastSink {
    /// Creates a sink with [`EVENT_CHANNEL_CAPACITY`] slots.
    pub fn new() -> Self {
        Self::with_capacity(EVENT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// A new receiver that sees every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for BroadcastSink {
    fn publish(&self, event: &LedgerEvent) {
        // No subscribers is not an error.
        let _ = self.tx.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LedgerEvent {
        Deposited {
            initiator: Address::repeat_byte(1),
            beneficiary: Address::repeat_byte(1),
            key: KeyId(0),
            asset: AssetId::from_label("ether").unwrap(),
            amount: Amount::from(5u64),
            balance: Amount::from(5u64),
        }
        .into()
    }

    #[test]
    fn recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.publish(&sample());
        sink.publish(&sample());
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.drain().len(), 2);
        assert!(sink.is_empty());
    }

    #[test]
    fn events_are_tagged_in_json() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["type"], "deposited");
        assert_eq!(json["key"], 0);
        let back: LedgerEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, sample());
        assert_eq!(back.kind(), "deposit");
    }

    #[tokio::test]
    async fn broadcast_sink_delivers_to_subscribers() {
        let sink = BroadcastSink::with_capacity(4);
        let mut rx = sink.subscribe();
        sink.publish(&sample());
        assert_eq!(rx.recv().await.unwrap(), sample());
    }

    #[test]
    fn broadcast_without_subscribers_is_silent() {
        let sink = BroadcastSink::new();
        sink.publish(&sample());
    }
}
