use std::sync::Arc;

use anyhow::anyhow;
use crates::domain::{
    entities::subscriptions::SubscriptionEntity,
    repositories::subscriptions::SubscriptionRepository,
    value_objects::{
        months::{BillingMonth, overlap_months},
        subscriptions::{
            CreatedSubscriptionDto, ListSubscriptionsQuery, Page, SubscriptionDto,
            SubscriptionFilter, SubscriptionListDto, SubscriptionPatch, SubscriptionPayload,
            SubscriptionTotalDto, TotalSubscriptionsQuery, ValidationError,
        },
    },
};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("subscription not found")]
    NotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SubscriptionError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            SubscriptionError::Validation(_) => StatusCode::BAD_REQUEST,
            SubscriptionError::NotFound => StatusCode::NOT_FOUND,
            SubscriptionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, SubscriptionError>;

pub struct SubscriptionUseCase<S>
where
    S: SubscriptionRepository + Send + Sync + 'static,
{
    subscription_repo: Arc<S>,
    default_limit: i64,
}

impl<S> SubscriptionUseCase<S>
where
    S: SubscriptionRepository + Send + Sync + 'static,
{
    pub fn new(subscription_repo: Arc<S>, default_limit: i64) -> Self {
        Self {
            subscription_repo,
            default_limit,
        }
    }

    pub async fn create(&self, payload: SubscriptionPayload) -> UseCaseResult<CreatedSubscriptionDto> {
        let draft = payload.validate()?;
        let id = Uuid::new_v4();

        let id = self
            .subscription_repo
            .create(draft.into_insert_entity(id))
            .await?;

        info!(%id, "subscriptions: created");
        Ok(CreatedSubscriptionDto { id })
    }

    pub async fn find_by_id(&self, subscription_id: Uuid) -> UseCaseResult<SubscriptionDto> {
        self.subscription_repo
            .find_by_id(subscription_id)
            .await?
            .map(SubscriptionDto::from)
            .ok_or(SubscriptionError::NotFound)
    }

    pub async fn replace(
        &self,
        subscription_id: Uuid,
        payload: SubscriptionPayload,
    ) -> UseCaseResult<SubscriptionDto> {
        let draft = payload.validate()?;

        let replaced = self
            .subscription_repo
            .replace(subscription_id, draft.into_replace_entity())
            .await?
            .ok_or(SubscriptionError::NotFound)?;

        info!(%subscription_id, "subscriptions: replaced");
        Ok(SubscriptionDto::from(replaced))
    }

    pub async fn patch(
        &self,
        subscription_id: Uuid,
        fields: Map<String, Value>,
    ) -> UseCaseResult<SubscriptionDto> {
        let patch = SubscriptionPatch::from_fields(fields)?;

        let patched = self
            .subscription_repo
            .patch(subscription_id, patch.into_entity())
            .await?
            .ok_or(SubscriptionError::NotFound)?;

        info!(%subscription_id, "subscriptions: patched");
        Ok(SubscriptionDto::from(patched))
    }

    pub async fn delete(&self, subscription_id: Uuid) -> UseCaseResult<()> {
        if !self.subscription_repo.delete(subscription_id).await? {
            return Err(SubscriptionError::NotFound);
        }

        info!(%subscription_id, "subscriptions: deleted");
        Ok(())
    }

    pub async fn list(&self, query: ListSubscriptionsQuery) -> UseCaseResult<SubscriptionListDto> {
        let (filter, page) = query.into_filter_and_page(self.default_limit)?;
        debug!(?filter, ?page, "subscriptions: listing");

        let rows = self.subscription_repo.list(filter, page).await?;

        Ok(SubscriptionListDto {
            data: rows.into_iter().map(SubscriptionDto::from).collect(),
            limit: page.limit,
            offset: page.offset,
        })
    }

    pub async fn total(&self, query: TotalSubscriptionsQuery) -> UseCaseResult<SubscriptionTotalDto> {
        let filter = query.into_filter()?;
        self.total_as_of(filter, BillingMonth::current()).await
    }

    async fn total_as_of(
        &self,
        filter: SubscriptionFilter,
        as_of: BillingMonth,
    ) -> UseCaseResult<SubscriptionTotalDto> {
        let window_start = filter.start_date;
        let window_end = filter.end_date;

        let rows = self
            .subscription_repo
            .list(filter, Page::unbounded())
            .await?;

        let total = total_cost(&rows, window_start, window_end, as_of)?;
        debug!(rows = rows.len(), total, %as_of, "subscriptions: total computed");

        Ok(SubscriptionTotalDto { total })
    }
}

/// Sums `price × overlapping months` over the given rows.
fn total_cost(
    rows: &[SubscriptionEntity],
    window_start: Option<BillingMonth>,
    window_end: Option<BillingMonth>,
    as_of: BillingMonth,
) -> UseCaseResult<u64> {
    rows.iter().try_fold(0u64, |total, row| {
        let months = overlap_months(
            BillingMonth::from_datetime(row.start_date),
            row.end_date.map(BillingMonth::from_datetime),
            window_start,
            window_end,
            as_of,
        );
        let price = u64::try_from(row.price).unwrap_or_else(|_| {
            warn!(id = %row.id, price = row.price, "subscriptions: negative price ignored in total");
            0
        });

        price
            .checked_mul(months)
            .and_then(|cost| total.checked_add(cost))
            .ok_or_else(|| SubscriptionError::Internal(anyhow!("subscription total overflowed u64")))
    })
}
