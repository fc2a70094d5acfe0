use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::Payment;
use crate::services::metrics;

/// A change to the payment collection, published after the write committed.
/// Delivery is at-least-once from the consumer's point of view: a consumer
/// that falls behind sees a lag error and resynchronizes, so it must treat
/// anything it receives as potentially stale or duplicated.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Insert { new: Payment },
    Update { old: Payment, new: Payment },
    Delete { old: Payment },
}

impl ChangeEvent {
    pub fn application_id(&self) -> Uuid {
        self.payment().application_id
    }

    /// The payment the event is about; `new` where one exists.
    pub fn payment(&self) -> &Payment {
        match self {
            ChangeEvent::Insert { new } => new,
            ChangeEvent::Update { new, .. } => new,
            ChangeEvent::Delete { old } => old,
        }
    }

    fn op(&self) -> &'static str {
        match self {
            ChangeEvent::Insert { .. } => "insert",
            ChangeEvent::Update { .. } => "update",
            ChangeEvent::Delete { .. } => "delete",
        }
    }
}

/// In-process fan-out of payment changes. Subscribers that cannot keep up
/// lose old events rather than blocking publishers; the broadcast receiver
/// reports the gap and the consumer refetches.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. A send error only means nobody is listening, which
    /// is normal when no stream is open.
    pub fn publish(&self, event: ChangeEvent) {
        metrics::FEED_EVENTS_TOTAL
            .with_label_values(&[event.op()])
            .inc();
        let _ = self.tx.send(event);
    }
}
