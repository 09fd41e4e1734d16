// THEORY:
// The broker is the outbound seam of the engine. Every state-changing trace and
// every scheduler tick hands a fresh `FocalPointsSnapshot` to a `SnapshotSink`.
// The engine never holds a lock while publishing, so a slow consumer can lag
// behind but can never stall tracking.
//
// `SnapshotBus` is the standard sink: a `tokio::sync::broadcast` channel. Lagging
// receivers simply lose the oldest snapshots, which is fine because every
// snapshot is a complete picture.

use crate::core_modules::focal_point::FocalPointsSnapshot;
use tokio::sync::broadcast;

pub trait SnapshotSink: Send + Sync {
    fn publish(&self, snapshot: FocalPointsSnapshot);
}

#[derive(Clone)]
pub struct SnapshotBus {
    tx: broadcast::Sender<FocalPointsSnapshot>,
}

impl SnapshotBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel::<FocalPointsSnapshot>(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FocalPointsSnapshot> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl SnapshotSink for SnapshotBus {
    fn publish(&self, snapshot: FocalPointsSnapshot) {
        // No subscribers is not an error.
        let _ = self.tx.send(snapshot);
    }
}
