//! Status fan-out to live subscribers

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;

use crate::state::ServoState;
use crate::types::ServoId;

/// Default number of snapshots a slow subscriber may lag behind
pub const STATUS_BUFFER: usize = 32;

/// State of every servo at one instant, ordered by id
pub type StatusSnapshot = BTreeMap<ServoId, ServoState>;

#[derive(Debug, Clone)]
pub struct StatusPublisher {
    sender: broadcast::Sender<Arc<StatusSnapshot>>,
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new(STATUS_BUFFER)
    }
}

impl StatusPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Sends a snapshot to every subscriber; returns how many received it
    pub fn publish(&self, snapshot: StatusSnapshot) -> usize {
        match self.sender.send(Arc::new(snapshot)) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!("status published with no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<StatusSnapshot>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(angle: u8) -> StatusSnapshot {
        let mut state = ServoState::active(1, 13);
        state.current_angle = Some(angle);
        BTreeMap::from([(1, state)])
    }

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let publisher = StatusPublisher::default();
        let mut a = publisher.subscribe();
        let mut b = publisher.subscribe();
        assert_eq!(publisher.subscriber_count(), 2);

        assert_eq!(publisher.publish(snapshot(45)), 2);
        assert_eq!(a.recv().await.unwrap()[&1].current_angle, Some(45));
        assert_eq!(b.recv().await.unwrap()[&1].current_angle, Some(45));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let publisher = StatusPublisher::new(4);
        assert_eq!(publisher.publish(snapshot(10)), 0);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_not_counted() {
        let publisher = StatusPublisher::new(4);
        let a = publisher.subscribe();
        let mut b = publisher.subscribe();
        drop(a);

        assert_eq!(publisher.publish(snapshot(170)), 1);
        assert_eq!(b.recv().await.unwrap()[&1].current_angle, Some(170));
    }
}
