use tokio::sync::broadcast;
use tracing::trace;

use crate::models::event::TrackingEvent;

/// Outbound tracking feed. `publish` must never block the caller.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: TrackingEvent);
}

/// Fans events out to every live subscriber. Events published with no
/// subscriber attached are dropped.
#[derive(Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<TrackingEvent>,
}

impl BroadcastSink {
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _unused_rx) = broadcast::channel(buffer_size.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackingEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn publish(&self, event: TrackingEvent) {
        if self.tx.send(event).is_err() {
            trace!("tracking event dropped: no subscribers");
        }
    }
}
