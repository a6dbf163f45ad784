use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, delete, insert_into, pg::Pg, prelude::*, update};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::{
    domain,
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::subscriptions},
};
use domain::{
    entities::subscriptions::{
        InsertSubscriptionEntity, PatchSubscriptionEntity, ReplaceSubscriptionEntity,
        SubscriptionEntity,
    },
    repositories::subscriptions::SubscriptionRepository,
    value_objects::subscriptions::{Page, SubscriptionFilter},
};

pub struct SubscriptionPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SubscriptionPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }

    /// WHERE clause shared by list and total.
    ///
    /// A row matches the window when its `[start_date, end_date]` interval overlaps it;
    /// a NULL `end_date` is treated as running forever.
    fn filtered_query(filter: SubscriptionFilter) -> subscriptions::BoxedQuery<'static, Pg> {
        let mut query = subscriptions::table.into_boxed();

        if let Some(user_id) = filter.user_id {
            query = query.filter(subscriptions::user_id.eq(user_id));
        }
        if let Some(service_name) = filter.service_name {
            query = query.filter(subscriptions::service_name.eq(service_name));
        }
        if let Some(window_end) = filter.end_date {
            query = query.filter(subscriptions::start_date.le(window_end.starts_at()));
        }
        if let Some(window_start) = filter.start_date {
            query = query.filter(
                subscriptions::end_date
                    .ge(window_start.starts_at())
                    .or(subscriptions::end_date.is_null()),
            );
        }

        query
    }

    fn list_query(filter: SubscriptionFilter, page: Page) -> subscriptions::BoxedQuery<'static, Pg> {
        let mut query = Self::filtered_query(filter)
            .order((subscriptions::service_name.asc(), subscriptions::id.asc()))
            .offset(page.offset);

        if page.limit > 0 {
            query = query.limit(page.limit);
        }

        query
    }
}

#[async_trait]
impl SubscriptionRepository for SubscriptionPostgres {
    async fn create(&self, insert_subscription_entity: InsertSubscriptionEntity) -> Result<Uuid> {
        // Diesel is synchronous; run DB work on the blocking threadpool so the request
        // timeout and other requests keep being polled.
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<Uuid> {
            let mut conn = db_pool.get()?;

            let result = insert_into(subscriptions::table)
                .values(&insert_subscription_entity)
                .returning(subscriptions::id)
                .get_result::<Uuid>(&mut conn)?;

            Ok(result)
        })
        .await??)
    }

    async fn find_by_id(&self, subscription_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<Option<SubscriptionEntity>> {
            let mut conn = db_pool.get()?;

            let result = subscriptions::table
                .find(subscription_id)
                .select(SubscriptionEntity::as_select())
                .first::<SubscriptionEntity>(&mut conn)
                .optional()?;

            Ok(result)
        })
        .await??)
    }

    async fn replace(
        &self,
        subscription_id: Uuid,
        replace_subscription_entity: ReplaceSubscriptionEntity,
    ) -> Result<Option<SubscriptionEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<Option<SubscriptionEntity>> {
            let mut conn = db_pool.get()?;

            let result = update(subscriptions::table.find(subscription_id))
                .set(&replace_subscription_entity)
                .returning(SubscriptionEntity::as_returning())
                .get_result::<SubscriptionEntity>(&mut conn)
                .optional()?;

            Ok(result)
        })
        .await??)
    }

    async fn patch(
        &self,
        subscription_id: Uuid,
        patch_subscription_entity: PatchSubscriptionEntity,
    ) -> Result<Option<SubscriptionEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<Option<SubscriptionEntity>> {
            let mut conn = db_pool.get()?;

            let result = update(subscriptions::table.find(subscription_id))
                .set(&patch_subscription_entity)
                .returning(SubscriptionEntity::as_returning())
                .get_result::<SubscriptionEntity>(&mut conn)
                .optional()?;

            Ok(result)
        })
        .await??)
    }

    async fn delete(&self, subscription_id: Uuid) -> Result<bool> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<bool> {
            let mut conn = db_pool.get()?;

            let affected = delete(subscriptions::table.find(subscription_id)).execute(&mut conn)?;

            Ok(affected > 0)
        })
        .await??)
    }

    async fn list(&self, filter: SubscriptionFilter, page: Page) -> Result<Vec<SubscriptionEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<Vec<SubscriptionEntity>> {
            let mut conn = db_pool.get()?;

            let results = Self::list_query(filter, page).load::<SubscriptionEntity>(&mut conn)?;

            Ok(results)
        })
        .await??)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::months::BillingMonth;
    use diesel::debug_query;

    fn month(raw: &str) -> BillingMonth {
        BillingMonth::parse(raw).unwrap()
    }

    fn sql(filter: SubscriptionFilter, page: Page) -> String {
        let query = SubscriptionPostgres::list_query(filter, page);
        debug_query::<Pg, _>(&query).to_string()
    }

    #[test]
    fn unfiltered_list_has_no_where_clause_and_no_limit_when_unbounded() {
        let sql = sql(SubscriptionFilter::default(), Page::unbounded());
        assert!(!sql.contains("WHERE"), "got: {sql}");
        assert!(!sql.contains("LIMIT"), "got: {sql}");
        assert!(sql.contains("OFFSET"), "got: {sql}");
        assert!(
            sql.contains(r#"ORDER BY "subscriptions"."service_name" ASC, "subscriptions"."id" ASC"#),
            "got: {sql}"
        );
    }

    #[test]
    fn limit_is_emitted_only_when_positive() {
        let sql = sql(SubscriptionFilter::default(), Page { limit: 5, offset: 10 });
        assert!(sql.contains("LIMIT"), "got: {sql}");
        assert!(sql.contains("OFFSET"), "got: {sql}");
    }

    #[test]
    fn window_start_only_keeps_open_ended_rows() {
        let sql = sql(
            SubscriptionFilter {
                start_date: Some(month("01-2024")),
                ..Default::default()
            },
            Page::unbounded(),
        );
        assert!(sql.contains(r#""subscriptions"."end_date" >= $"#), "got: {sql}");
        assert!(sql.contains(r#""subscriptions"."end_date" IS NULL"#), "got: {sql}");
        assert!(sql.contains(" OR "), "got: {sql}");
        assert!(!sql.contains(r#""subscriptions"."start_date" <="#), "got: {sql}");
    }

    #[test]
    fn window_end_only_bounds_start_date() {
        let sql = sql(
            SubscriptionFilter {
                end_date: Some(month("06-2024")),
                ..Default::default()
            },
            Page::unbounded(),
        );
        assert!(sql.contains(r#""subscriptions"."start_date" <= $"#), "got: {sql}");
        assert!(!sql.contains("IS NULL"), "got: {sql}");
    }

    #[test]
    fn window_bounds_bind_to_the_opposite_columns() {
        let sql = sql(
            SubscriptionFilter {
                start_date: Some(month("01-2024")),
                end_date: Some(month("06-2024")),
                ..Default::default()
            },
            Page::unbounded(),
        );

        // A row ending exactly in the window's first month must still match.
        let predicate = sql.replace(r#""subscriptions"."#, "").replace('"', "");
        assert!(
            predicate.contains("(start_date <= $1) AND ((end_date >= $2) OR (end_date IS NULL))"),
            "got: {sql}"
        );

        let binds = &sql[sql.find("-- binds:").expect("debug_query lists binds")..];
        let window_end = binds.find("2024-06-01").expect("window end bound");
        let window_start = binds.find("2024-01-01").expect("window start bound");
        assert!(window_end < window_start, "got: {binds}");
    }

    #[test]
    fn full_filter_combines_every_predicate() {
        let sql = sql(
            SubscriptionFilter {
                user_id: Some(Uuid::new_v4()),
                service_name: Some("Netflix".to_string()),
                start_date: Some(month("01-2024")),
                end_date: Some(month("06-2024")),
            },
            Page { limit: 10, offset: 0 },
        );
        assert!(sql.contains(r#""subscriptions"."user_id" = $"#), "got: {sql}");
        assert!(sql.contains(r#""subscriptions"."service_name" = $"#), "got: {sql}");
        assert!(sql.contains(r#""subscriptions"."start_date" <= $"#), "got: {sql}");
        assert!(sql.contains(r#""subscriptions"."end_date" >= $"#), "got: {sql}");
        assert!(sql.contains(r#""subscriptions"."end_date" IS NULL"#), "got: {sql}");
        assert!(sql.contains("Netflix"), "binds should carry the service name: {sql}");
    }
}
