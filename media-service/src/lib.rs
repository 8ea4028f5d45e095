// ============================================================================
// Media Service
// ============================================================================
//
// Consumes `post.deleted` from the topic exchange and removes the referenced
// assets from remote storage and the asset catalog. The HTTP surface lists
// the caller's media and reports health and metrics.
//
// ============================================================================

pub mod context;
pub mod handlers;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use murmur_config::BrokerConfig;
use murmur_shared::broker::{Connector, SubscriptionSpec};
use murmur_types::POST_DELETED;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub use context::MediaServiceContext;

/// Durable named queue unless SUBSCRIPTION_EXCLUSIVE is set
pub fn subscription_spec(config: &BrokerConfig) -> SubscriptionSpec {
    if config.subscription_exclusive {
        SubscriptionSpec::exclusive(POST_DELETED)
    } else {
        SubscriptionSpec::durable(POST_DELETED, config.subscription_queue.clone())
    }
}

pub fn router<C: Connector>(context: Arc<MediaServiceContext<C>>) -> Router {
    Router::new()
        .route("/api/media/all", get(handlers::list_media::<C>))
        .route("/health", get(health_check))
        .route("/health/live", get(health_check))
        .route("/health/ready", get(readiness::<C>))
        .route("/metrics", get(murmur_shared::metrics::metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .into_inner(),
        )
        .with_state(context)
}

async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({"status": "ok", "service": "media"})),
    )
}

/// Ready once the broker channel is up
async fn readiness<C: Connector>(
    State(context): State<Arc<MediaServiceContext<C>>>,
) -> impl IntoResponse {
    let connected = context.connections.is_connected().await;
    let status = if connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if connected { "ready" } else { "broker_unavailable" },
            "service": "media",
            "subscription": context.subscription,
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::http::header::CONTENT_TYPE;
    use murmur_shared::broker::{ConnectionManager, InMemoryBroker, QueueIdentity};
    use murmur_shared::catalog::{AssetCatalog, MemoryAssetCatalog};
    use murmur_types::{AssetId, AssetRecord, UserId};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app_with(
        broker: &InMemoryBroker,
        assets: Arc<dyn AssetCatalog>,
    ) -> (Router, Arc<ConnectionManager<InMemoryBroker>>) {
        let connections = Arc::new(ConnectionManager::new(
            broker.clone(),
            "posts_exchange",
            Duration::from_millis(200),
        ));
        let app = router(Arc::new(MediaServiceContext::new(
            connections.clone(),
            "media-service.post.deleted[post.deleted]",
            assets,
            Duration::from_secs(1),
        )));
        (app, connections)
    }

    fn asset(id: &str, owner: &str) -> AssetRecord {
        AssetRecord {
            id: AssetId::new(id),
            external_storage_key: format!("uploads/{}.jpg", id),
            owner_id: UserId::new(owner),
        }
    }

    fn list_as(user: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/api/media/all");
        if let Some(user) = user {
            builder = builder.header("x-user-id", user);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_subscription_defaults_to_durable_queue() {
        let config = BrokerConfig::default();
        let spec = subscription_spec(&config);
        assert_eq!(
            spec.queue,
            QueueIdentity::Durable("media-service.post.deleted".to_string())
        );
        assert_eq!(spec.patterns, vec![POST_DELETED.to_string()]);

        let exclusive = BrokerConfig {
            subscription_exclusive: true,
            ..BrokerConfig::default()
        };
        assert_eq!(subscription_spec(&exclusive).queue, QueueIdentity::Exclusive);
    }

    #[tokio::test]
    async fn test_readiness_follows_broker() {
        let broker = InMemoryBroker::new();
        let (app, connections) = app_with(&broker, Arc::new(MemoryAssetCatalog::new()));
        let ready = || Request::builder().uri("/health/ready").body(Body::empty()).unwrap();

        let response = app.clone().oneshot(ready()).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        connections.ensure_channel().await.unwrap();
        let response = app.clone().oneshot(ready()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        broker.drop_connections();
        let response = app.oneshot(ready()).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_list_media_returns_only_callers_assets() {
        let catalog = MemoryAssetCatalog::with_assets([
            asset("a1", "u1"),
            asset("a2", "u1"),
            asset("b1", "u2"),
        ]);
        let (app, _) = app_with(&InMemoryBroker::new(), Arc::new(catalog));

        let response = app.oneshot(list_as(Some("u1"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("application/json"));

        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        let ids: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["a1", "a2"]);
    }

    #[tokio::test]
    async fn test_list_media_without_assets_is_not_found() {
        let catalog = MemoryAssetCatalog::with_assets([asset("b1", "u2")]);
        let (app, _) = app_with(&InMemoryBroker::new(), Arc::new(catalog));

        let response = app.oneshot(list_as(Some("u1"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_media_requires_caller() {
        let (app, _) = app_with(&InMemoryBroker::new(), Arc::new(MemoryAssetCatalog::new()));

        let response = app.oneshot(list_as(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_list_media_catalog_outage_is_server_error() {
        let catalog = Arc::new(MemoryAssetCatalog::with_assets([asset("a1", "u1")]));
        catalog.set_failing(true);
        let (app, _) = app_with(&InMemoryBroker::new(), catalog);

        let response = app.oneshot(list_as(Some("u1"))).await.unwrap();
        assert!(response.status().is_server_error());
    }
}
