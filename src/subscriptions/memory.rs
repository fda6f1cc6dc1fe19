use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::StoreError;
use crate::subscriptions::repo::{SubscriptionStore, SELF_SUBSCRIPTION};
use crate::subscriptions::repo_types::Subscription;

#[derive(Default)]
pub struct InMemorySubscriptionStore {
    edges: RwLock<HashMap<(Uuid, Uuid), Subscription>>,
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn subscribe(&self, subscriber: Uuid, channel: Uuid) -> Result<Subscription, StoreError> {
        if subscriber == channel {
            return Err(StoreError::Invalid(SELF_SUBSCRIPTION.into()));
        }
        let mut edges = self.edges.write().unwrap();
        let sub = edges.entry((subscriber, channel)).or_insert_with(|| {
            let now = OffsetDateTime::now_utc();
            Subscription {
                id: Uuid::new_v4(),
                subscriber_id: subscriber,
                channel_id: channel,
                created_at: now,
                updated_at: now,
            }
        });
        Ok(sub.clone())
    }

    async fn unsubscribe(&self, subscriber: Uuid, channel: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .edges
            .write()
            .unwrap()
            .remove(&(subscriber, channel))
            .is_some())
    }

    async fn is_subscribed(&self, subscriber: Uuid, channel: Uuid) -> Result<bool, StoreError> {
        Ok(self.edges.read().unwrap().contains_key(&(subscriber, channel)))
    }

    async fn subscriber_count(&self, channel: Uuid) -> Result<i64, StoreError> {
        let edges = self.edges.read().unwrap();
        Ok(edges.keys().filter(|(_, c)| *c == channel).count() as i64)
    }

    async fn subscription_count(&self, subscriber: Uuid) -> Result<i64, StoreError> {
        let edges = self.edges.read().unwrap();
        Ok(edges.keys().filter(|(s, _)| *s == subscriber).count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_is_idempotent_per_pair() {
        let store = InMemorySubscriptionStore::default();
        let (fan, channel) = (Uuid::new_v4(), Uuid::new_v4());

        let first = store.subscribe(fan, channel).await.unwrap();
        let second = store.subscribe(fan, channel).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.subscriber_count(channel).await.unwrap(), 1);
        assert_eq!(store.subscription_count(fan).await.unwrap(), 1);
        // Direction matters.
        assert!(!store.is_subscribed(channel, fan).await.unwrap());
    }

    #[tokio::test]
    async fn unsubscribe_removes_edge_once() {
        let store = InMemorySubscriptionStore::default();
        let (fan, channel) = (Uuid::new_v4(), Uuid::new_v4());
        store.subscribe(fan, channel).await.unwrap();

        assert!(store.unsubscribe(fan, channel).await.unwrap());
        assert!(!store.unsubscribe(fan, channel).await.unwrap());
        assert!(!store.is_subscribed(fan, channel).await.unwrap());
        assert_eq!(store.subscriber_count(channel).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn self_subscription_is_rejected() {
        let store = InMemorySubscriptionStore::default();
        let me = Uuid::new_v4();
        let err = store.subscribe(me, me).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[tokio::test]
    async fn counts_separate_channels() {
        let store = InMemorySubscriptionStore::default();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store.subscribe(a, c).await.unwrap();
        store.subscribe(b, c).await.unwrap();
        store.subscribe(a, b).await.unwrap();
        assert_eq!(store.subscriber_count(c).await.unwrap(), 2);
        assert_eq!(store.subscriber_count(b).await.unwrap(), 1);
        assert_eq!(store.subscription_count(a).await.unwrap(), 2);
    }
}
