use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::{
    entities::subscriptions::{
        InsertSubscriptionEntity, PatchSubscriptionEntity, ReplaceSubscriptionEntity,
        SubscriptionEntity,
    },
    value_objects::subscriptions::{Page, SubscriptionFilter},
};

/// Persistence for subscription rows. Every method is a single statement.
///
/// Lookups and writes against a specific id report a missing row as `None`/`false`
/// rather than as an error, so callers can tell "not found" from backend failures.
#[async_trait]
#[automock]
pub trait SubscriptionRepository {
    async fn create(&self, insert_subscription_entity: InsertSubscriptionEntity) -> Result<Uuid>;

    async fn find_by_id(&self, subscription_id: Uuid) -> Result<Option<SubscriptionEntity>>;

    async fn replace(
        &self,
        subscription_id: Uuid,
        replace_subscription_entity: ReplaceSubscriptionEntity,
    ) -> Result<Option<SubscriptionEntity>>;

    async fn patch(
        &self,
        subscription_id: Uuid,
        patch_subscription_entity: PatchSubscriptionEntity,
    ) -> Result<Option<SubscriptionEntity>>;

    async fn delete(&self, subscription_id: Uuid) -> Result<bool>;

    async fn list(&self, filter: SubscriptionFilter, page: Page) -> Result<Vec<SubscriptionEntity>>;
}
