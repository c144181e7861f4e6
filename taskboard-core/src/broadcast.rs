/// Fan-out of board events to every subscriber.
///
/// Best effort: a subscriber that falls more than `capacity` events behind
/// loses the oldest ones and is expected to heal on the next signal.
use tokio::sync::broadcast;

use crate::events::BoardEvent;

#[derive(Clone)]
pub struct ChangeBroadcaster {
    tx: broadcast::Sender<BoardEvent>,
}

impl ChangeBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish to all current subscribers, the originator included.
    /// Returns the number of receivers the event was handed to.
    pub fn publish(&self, event: BoardEvent) -> usize {
        let kind = event.kind();
        match self.tx.send(event) {
            Ok(receivers) => {
                log::debug!(target: "taskboard.broadcast", "Published {} to {} receivers", kind, receivers);
                receivers
            }
            Err(_) => {
                log::debug!(target: "taskboard.broadcast", "Published {} with no receivers", kind);
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
