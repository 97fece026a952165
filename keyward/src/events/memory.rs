//! In-process publisher using a tokio broadcast channel.
//!
//! Notifications only reach subscribers in the same process. Publishing with
//! no subscriber succeeds and drops the message.

use super::{Envelope, EventPublisher, PublishError, Topic};
use async_trait::async_trait;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// A notification as seen by a subscriber
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: Topic,
    pub envelope: Envelope,
}

pub struct MemoryPublisher {
    sender: broadcast::Sender<Published>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Receive every notification published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Published> {
        self.sender.subscribe()
    }
}

impl Default for MemoryPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish(&self, topic: Topic, envelope: &Envelope) -> Result<(), PublishError> {
        // Ignore error if no receivers (this is fine)
        let _ = self.sender.send(Published {
            topic,
            envelope: envelope.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Notification;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_and_subscribe() {
        let publisher = MemoryPublisher::new();
        let mut first = publisher.subscribe();
        let mut second = publisher.subscribe();

        let notification = Notification::new(Topic::RoleCreated, json!({"title": "ops"}));
        publisher
            .publish(notification.topic, &notification.envelope)
            .await
            .unwrap();

        let received = first.recv().await.unwrap();
        assert_eq!(received.topic, Topic::RoleCreated);
        assert_eq!(received.envelope.data["title"], "ops");
        assert_eq!(second.recv().await.unwrap(), received);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let publisher = MemoryPublisher::new();
        let notification = Notification::new(Topic::UserDeleted, json!({}));
        publisher
            .publish(notification.topic, &notification.envelope)
            .await
            .unwrap();
    }
}
