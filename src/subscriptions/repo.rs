use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::StoreError;
use crate::subscriptions::repo_types::Subscription;

pub(crate) const SELF_SUBSCRIPTION: &str = "Cannot subscribe to your own channel";

/// At most one edge per (subscriber, channel) pair.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Creates the edge, or returns the existing one.
    async fn subscribe(&self, subscriber: Uuid, channel: Uuid) -> Result<Subscription, StoreError>;

    /// Removes the edge. `false` when there was none.
    async fn unsubscribe(&self, subscriber: Uuid, channel: Uuid) -> Result<bool, StoreError>;

    async fn is_subscribed(&self, subscriber: Uuid, channel: Uuid) -> Result<bool, StoreError>;

    async fn subscriber_count(&self, channel: Uuid) -> Result<i64, StoreError>;

    async fn subscription_count(&self, subscriber: Uuid) -> Result<i64, StoreError>;
}

#[derive(Clone)]
pub struct PgSubscriptionStore {
    db: PgPool,
}

impl PgSubscriptionStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn subscribe(&self, subscriber: Uuid, channel: Uuid) -> Result<Subscription, StoreError> {
        if subscriber == channel {
            return Err(StoreError::Invalid(SELF_SUBSCRIPTION.into()));
        }
        // The no-op update makes RETURNING yield the existing row on conflict.
        let sub = sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (subscriber_id, channel_id)
            VALUES ($1, $2)
            ON CONFLICT (subscriber_id, channel_id)
                DO UPDATE SET updated_at = subscriptions.updated_at
            RETURNING id, subscriber_id, channel_id, created_at, updated_at
            "#,
        )
        .bind(subscriber)
        .bind(channel)
        .fetch_one(&self.db)
        .await
        .map_err(|e| StoreError::from_write(e, "Already subscribed"))?;
        Ok(sub)
    }

    async fn unsubscribe(&self, subscriber: Uuid, channel: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query(
            "DELETE FROM subscriptions WHERE subscriber_id = $1 AND channel_id = $2",
        )
        .bind(subscriber)
        .bind(channel)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn is_subscribed(&self, subscriber: Uuid, channel: Uuid) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM subscriptions WHERE subscriber_id = $1 AND channel_id = $2)",
        )
        .bind(subscriber)
        .bind(channel)
        .fetch_one(&self.db)
        .await?;
        Ok(exists)
    }

    async fn subscriber_count(&self, channel: Uuid) -> Result<i64, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions WHERE channel_id = $1")
            .bind(channel)
            .fetch_one(&self.db)
            .await?;
        Ok(n)
    }

    async fn subscription_count(&self, subscriber: Uuid) -> Result<i64, StoreError> {
        let n: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions WHERE subscriber_id = $1")
                .bind(subscriber)
                .fetch_one(&self.db)
                .await?;
        Ok(n)
    }
}
