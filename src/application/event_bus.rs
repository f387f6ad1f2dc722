//! Batch event stream
//!
//! Thin wrapper over a tokio broadcast channel. Publishing never fails: with
//! no subscriber the event is simply dropped.

use tokio::sync::broadcast;
use tracing::trace;

use crate::domain::BatchEvent;

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BatchEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: BatchEvent) {
        trace!("📡 {}", event.name());
        if self.sender.send(event).is_err() {
            trace!("No event subscribers");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
