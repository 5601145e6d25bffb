use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::trace;

use crate::domain::events::CarebookEvent;
use crate::domain::ports::EventPublisher;

/// In-process fan-out of [`CarebookEvent`]s over `tokio::sync::broadcast`.
///
/// The channel is bounded: a subscriber that falls behind loses the oldest
/// events. Publishing with no subscribers is fine.
#[derive(Clone)]
pub struct BroadcastEvents {
    tx: broadcast::Sender<CarebookEvent>,
}

impl BroadcastEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CarebookEvent> {
        self.tx.subscribe()
    }

    /// Stream of events; lag errors are skipped.
    pub fn subscribe_stream(&self) -> impl Stream<Item = CarebookEvent> {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|res| async move { res.ok() })
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl EventPublisher<CarebookEvent> for BroadcastEvents {
    fn publish(&self, event: &CarebookEvent) {
        let delivered = self.tx.send(event.clone()).unwrap_or(0);
        trace!(?event, delivered, "event published");
    }
}
