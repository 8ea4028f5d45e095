use murmur_shared::broker::{ConnectionManager, Connector};
use murmur_shared::catalog::AssetCatalog;
use std::sync::Arc;
use std::time::Duration;

/// Shared state of the media service HTTP surface
pub struct MediaServiceContext<C: Connector> {
    pub connections: Arc<ConnectionManager<C>>,
    pub subscription: String,
    pub assets: Arc<dyn AssetCatalog>,
    pub catalog_timeout: Duration,
}

impl<C: Connector> MediaServiceContext<C> {
    pub fn new(
        connections: Arc<ConnectionManager<C>>,
        subscription: impl Into<String>,
        assets: Arc<dyn AssetCatalog>,
        catalog_timeout: Duration,
    ) -> Self {
        Self {
            connections,
            subscription: subscription.into(),
            assets,
            catalog_timeout,
        }
    }
}
