use crate::{
    axum_http::{default_routers, error_responses::AppError},
    config::config_model::DotEnvyConfig,
    usecases::subscriptions::{SubscriptionError, SubscriptionUseCase},
};
use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use crates::{
    domain::{
        repositories::subscriptions::SubscriptionRepository,
        value_objects::subscriptions::{
            CreatedSubscriptionDto, ListSubscriptionsQuery, SubscriptionDto, SubscriptionListDto,
            SubscriptionPayload, SubscriptionTotalDto, TotalSubscriptionsQuery,
        },
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::subscriptions::SubscriptionPostgres,
    },
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub fn routes(db_pool: Arc<PgPoolSquad>, config: Arc<DotEnvyConfig>) -> Router {
    let subscriptions_repository = SubscriptionPostgres::new(Arc::clone(&db_pool));
    let subscriptions_usecase = SubscriptionUseCase::new(
        Arc::new(subscriptions_repository),
        config.listing.default_limit,
    );

    router(Arc::new(subscriptions_usecase))
}

pub fn router<T>(subscriptions_usecase: Arc<SubscriptionUseCase<T>>) -> Router
where
    T: SubscriptionRepository + Send + Sync + 'static,
{
    Router::new()
        .route(
            "/subscription",
            get(list::<T>)
                .post(create::<T>)
                .head(default_routers::health_check),
        )
        .route(
            "/subscription/:id",
            get(read::<T>)
                .put(replace::<T>)
                .patch(patch::<T>)
                .delete(remove::<T>),
        )
        .route("/total", get(total::<T>))
        .with_state(subscriptions_usecase)
}

fn parse_id(raw_id: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw_id).map_err(|_| {
        warn!(raw_id, "subscriptions: invalid id in path");
        AppError::BadRequest("id must be a valid UUID".to_string())
    })
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload.map(|Json(value)| value).map_err(|rejection| {
        warn!(error = %rejection, "subscriptions: malformed JSON body");
        AppError::BadRequest(rejection.body_text())
    })
}

/// Logs with the severity the error deserves, then converts it for the client.
fn report(operation: &'static str, subscription_id: Option<Uuid>, err: SubscriptionError) -> AppError {
    let status = err.status_code().as_u16();
    match &err {
        SubscriptionError::Internal(source) => error!(
            operation,
            ?subscription_id,
            status,
            db_error = ?source,
            "subscriptions: request failed"
        ),
        _ => warn!(
            operation,
            ?subscription_id,
            status,
            error = %err,
            "subscriptions: request rejected"
        ),
    }
    AppError::from(err)
}

pub async fn create<T>(
    State(subscriptions_usecase): State<Arc<SubscriptionUseCase<T>>>,
    payload: Result<Json<SubscriptionPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedSubscriptionDto>), AppError>
where
    T: SubscriptionRepository + Send + Sync + 'static,
{
    info!("subscriptions: create request received");
    let payload = body(payload)?;

    let created = subscriptions_usecase
        .create(payload)
        .await
        .map_err(|err| report("create", None, err))?;

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn read<T>(
    State(subscriptions_usecase): State<Arc<SubscriptionUseCase<T>>>,
    Path(raw_id): Path<String>,
) -> Result<Json<SubscriptionDto>, AppError>
where
    T: SubscriptionRepository + Send + Sync + 'static,
{
    let subscription_id = parse_id(&raw_id)?;

    let subscription = subscriptions_usecase
        .find_by_id(subscription_id)
        .await
        .map_err(|err| report("read", Some(subscription_id), err))?;

    Ok(Json(subscription))
}

pub async fn replace<T>(
    State(subscriptions_usecase): State<Arc<SubscriptionUseCase<T>>>,
    Path(raw_id): Path<String>,
    payload: Result<Json<SubscriptionPayload>, JsonRejection>,
) -> Result<Json<SubscriptionDto>, AppError>
where
    T: SubscriptionRepository + Send + Sync + 'static,
{
    let subscription_id = parse_id(&raw_id)?;
    let payload = body(payload)?;

    let subscription = subscriptions_usecase
        .replace(subscription_id, payload)
        .await
        .map_err(|err| report("replace", Some(subscription_id), err))?;

    Ok(Json(subscription))
}

pub async fn patch<T>(
    State(subscriptions_usecase): State<Arc<SubscriptionUseCase<T>>>,
    Path(raw_id): Path<String>,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Json<SubscriptionDto>, AppError>
where
    T: SubscriptionRepository + Send + Sync + 'static,
{
    let subscription_id = parse_id(&raw_id)?;
    let fields = body(payload)?;

    let subscription = subscriptions_usecase
        .patch(subscription_id, fields)
        .await
        .map_err(|err| report("patch", Some(subscription_id), err))?;

    Ok(Json(subscription))
}

pub async fn remove<T>(
    State(subscriptions_usecase): State<Arc<SubscriptionUseCase<T>>>,
    Path(raw_id): Path<String>,
) -> Result<impl IntoResponse, AppError>
where
    T: SubscriptionRepository + Send + Sync + 'static,
{
    let subscription_id = parse_id(&raw_id)?;

    subscriptions_usecase
        .delete(subscription_id)
        .await
        .map_err(|err| report("delete", Some(subscription_id), err))?;

    Ok(StatusCode::OK)
}

pub async fn list<T>(
    State(subscriptions_usecase): State<Arc<SubscriptionUseCase<T>>>,
    Query(query): Query<ListSubscriptionsQuery>,
) -> Result<Json<SubscriptionListDto>, AppError>
where
    T: SubscriptionRepository + Send + Sync + 'static,
{
    let listed = subscriptions_usecase
        .list(query)
        .await
        .map_err(|err| report("list", None, err))?;

    Ok(Json(listed))
}

pub async fn total<T>(
    State(subscriptions_usecase): State<Arc<SubscriptionUseCase<T>>>,
    Query(query): Query<TotalSubscriptionsQuery>,
) -> Result<Json<SubscriptionTotalDto>, AppError>
where
    T: SubscriptionRepository + Send + Sync + 'static,
{
    let total = subscriptions_usecase
        .total(query)
        .await
        .map_err(|err| report("total", None, err))?;

    Ok(Json(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axum_http::error_responses::ErrorResponse;
    use anyhow::anyhow;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, Response, header::CONTENT_TYPE},
    };
    use crates::domain::{
        entities::subscriptions::SubscriptionEntity,
        repositories::subscriptions::MockSubscriptionRepository,
        value_objects::{
            months::BillingMonth,
            subscriptions::{Page, SubscriptionFilter},
        },
    };
    use mockall::predicate::eq;
    use serde::de::DeserializeOwned;
    use serde_json::json;
    use tower::ServiceExt;

    fn app(repo: MockSubscriptionRepository) -> Router {
        Router::new().nest(
            "/api/v1",
            router(Arc::new(SubscriptionUseCase::new(Arc::new(repo), 10))),
        )
    }

    async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> Response<Body> {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                request = request.header(CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        app.oneshot(request.body(body).unwrap()).await.unwrap()
    }

    async fn json_body<B: DeserializeOwned>(response: Response<Body>) -> B {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn month(raw: &str) -> BillingMonth {
        BillingMonth::parse(raw).unwrap()
    }

    fn row(id: Uuid, start: &str, end: Option<&str>) -> SubscriptionEntity {
        SubscriptionEntity {
            id,
            service_name: "Yandex Plus".to_string(),
            user_id: Uuid::new_v4(),
            price: 400,
            start_date: month(start).starts_at(),
            end_date: end.map(|raw| month(raw).starts_at()),
        }
    }

    #[tokio::test]
    async fn head_is_a_liveness_probe() {
        let response = send(
            app(MockSubscriptionRepository::new()),
            Method::HEAD,
            "/api/v1/subscription",
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_returns_201_with_id() {
        let mut repo = MockSubscriptionRepository::new();
        repo.expect_create()
            .returning(|entity| Box::pin(async move { Ok(entity.id) }));

        let response = send(
            app(repo),
            Method::POST,
            "/api/v1/subscription",
            Some(json!({
                "service_name": "Yandex Plus",
                "price": 400,
                "user_id": "60601fee-2bf1-4721-ae6f-7636e79a0cba",
                "start_date": "07-2025"
            })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::CREATED);
        let created: CreatedSubscriptionDto = json_body(response).await;
        assert!(!created.id.is_nil());
    }

    #[tokio::test]
    async fn create_with_missing_field_is_400_naming_it() {
        let response = send(
            app(MockSubscriptionRepository::new()),
            Method::POST,
            "/api/v1/subscription",
            Some(json!({
                "service_name": "Yandex Plus",
                "user_id": "60601fee-2bf1-4721-ae6f-7636e79a0cba",
                "start_date": "07-2025"
            })),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ErrorResponse = json_body(response).await;
        assert_eq!(error.code, 400);
        assert!(error.message.contains("price"), "got: {}", error.message);
    }

    #[tokio::test]
    async fn malformed_json_is_400_not_422() {
        let response = send(
            app(MockSubscriptionRepository::new()),
            Method::POST,
            "/api/v1/subscription",
            Some(json!({ "price": "four hundred" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn read_maps_not_found_and_bad_ids() {
        let id = Uuid::new_v4();
        let mut repo = MockSubscriptionRepository::new();
        repo.expect_find_by_id()
            .with(eq(id))
            .returning(|_| Box::pin(async { Ok(None) }));

        let app = app(repo);
        let response = send(
            app.clone(),
            Method::GET,
            &format!("/api/v1/subscription/{id}"),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(app, Method::GET, "/api/v1/subscription/not-a-uuid", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn read_formats_months_on_the_wire() {
        let id = Uuid::new_v4();
        let mut repo = MockSubscriptionRepository::new();
        repo.expect_find_by_id().returning(move |id| {
            let row = row(id, "03-2024", None);
            Box::pin(async move { Ok(Some(row)) })
        });

        let response = send(
            app(repo),
            Method::GET,
            &format!("/api/v1/subscription/{id}"),
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = json_body(response).await;
        assert_eq!(body["id"], id.to_string());
        assert_eq!(body["start_date"], "03-2024");
        assert!(body.get("end_date").is_none());
    }

    #[tokio::test]
    async fn storage_errors_are_500_without_details() {
        let mut repo = MockSubscriptionRepository::new();
        repo.expect_delete()
            .returning(|_| Box::pin(async { Err(anyhow!("password authentication failed")) }));

        let response = send(
            app(repo),
            Method::DELETE,
            &format!("/api/v1/subscription/{}", Uuid::new_v4()),
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let error: ErrorResponse = json_body(response).await;
        assert_eq!(error.message, "Internal server error");
    }

    #[tokio::test]
    async fn put_and_patch_on_missing_ids_are_404() {
        let mut repo = MockSubscriptionRepository::new();
        repo.expect_replace()
            .returning(|_, _| Box::pin(async { Ok(None) }));
        repo.expect_patch()
            .returning(|_, _| Box::pin(async { Ok(None) }));

        let app = app(repo);
        let uri = format!("/api/v1/subscription/{}", Uuid::new_v4());

        let response = send(
            app.clone(),
            Method::PUT,
            &uri,
            Some(json!({
                "service_name": "Netflix",
                "price": 799,
                "user_id": "60601fee-2bf1-4721-ae6f-7636e79a0cba",
                "start_date": "01-2024"
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(app, Method::PATCH, &uri, Some(json!({ "price": 500 }))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn patch_with_unknown_column_is_400() {
        let response = send(
            app(MockSubscriptionRepository::new()),
            Method::PATCH,
            &format!("/api/v1/subscription/{}", Uuid::new_v4()),
            Some(json!({ "price=0 WHERE true; --": 1 })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_parses_filters_and_echoes_effective_limit() {
        let user_id = Uuid::new_v4();
        let mut repo = MockSubscriptionRepository::new();
        repo.expect_list()
            .with(
                eq(SubscriptionFilter {
                    user_id: Some(user_id),
                    service_name: None,
                    start_date: Some(month("01-2024")),
                    end_date: Some(month("06-2024")),
                }),
                eq(Page {
                    limit: 10,
                    offset: 5,
                }),
            )
            .returning(|_, _| {
                Box::pin(async { Ok(vec![row(Uuid::new_v4(), "03-2024", None)]) })
            });

        let response = send(
            app(repo),
            Method::GET,
            &format!(
                "/api/v1/subscription?user_id={user_id}&start_date=01-2024&end_date=06-2024&offset=5"
            ),
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let listed: SubscriptionListDto = json_body(response).await;
        assert_eq!(listed.limit, 10);
        assert_eq!(listed.offset, 5);
        assert_eq!(listed.data.len(), 1);
    }

    #[tokio::test]
    async fn list_with_bad_date_is_400() {
        let response = send(
            app(MockSubscriptionRepository::new()),
            Method::GET,
            "/api/v1/subscription?start_date=2024-01",
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn total_sums_prorated_prices() {
        let mut repo = MockSubscriptionRepository::new();
        repo.expect_list().returning(|_, _| {
            Box::pin(async {
                Ok(vec![SubscriptionEntity {
                    price: 100,
                    ..row(Uuid::new_v4(), "01-2024", Some("03-2024"))
                }])
            })
        });

        let response = send(
            app(repo),
            Method::GET,
            "/api/v1/total?start_date=01-2024&end_date=12-2024",
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let total: SubscriptionTotalDto = json_body(response).await;
        assert_eq!(total.total, 300);
    }
}
