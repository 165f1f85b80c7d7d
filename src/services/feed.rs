use tokio::sync::broadcast;

use crate::models::feed::{ChangeEvent, ChangeKind, Collection};

pub const FEED_CAPACITY: usize = 1024;

/// Fan-out of committed writes to live subscribers.
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, collection: Collection, document_id: &str, kind: ChangeKind) {
        let event = ChangeEvent {
            collection,
            document_id: document_id.to_string(),
            kind,
        };

        // No subscribers is not an error.
        if self.sender.send(event).is_err() {
            log::trace!("No feed subscribers for {}.", collection.as_str());
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events_after_subscribing() {
        let feed = ChangeFeed::new(8);
        feed.publish(Collection::News, "before", ChangeKind::Created);

        let mut receiver = feed.subscribe();
        feed.publish(Collection::Deposits, "dep-1", ChangeKind::Updated);

        let event = receiver.recv().await.unwrap();
        assert_eq!(
            event,
            ChangeEvent {
                collection: Collection::Deposits,
                document_id: "dep-1".to_string(),
                kind: ChangeKind::Updated,
            }
        );
    }

    #[tokio::test]
    async fn lagging_subscriber_reports_skipped_events() {
        let feed = ChangeFeed::new(2);
        let mut receiver = feed.subscribe();

        for i in 0..5 {
            feed.publish(Collection::Chat, &i.to_string(), ChangeKind::Created);
        }

        assert!(matches!(
            receiver.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
        assert_eq!(receiver.recv().await.unwrap().document_id, "3");
    }
}
