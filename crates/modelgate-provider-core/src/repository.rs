use async_trait::async_trait;

use crate::catalog::ModelCatalog;
use crate::errors::StoreResult;
use crate::provider::{Provider, ProviderFilter};
use crate::provider_model::{ProviderModel, ProviderModelFilter};

#[async_trait]
pub trait ProviderRepository: Send + Sync {
    /// Inserts the provider and returns it with its row id assigned.
    async fn create(&self, provider: Provider) -> StoreResult<Provider>;
    async fn update(&self, provider: &Provider) -> StoreResult<()>;
    async fn find_by_public_id(&self, public_id: &str) -> StoreResult<Option<Provider>>;
    /// Results are ordered by row id.
    async fn find_by_filter(&self, filter: &ProviderFilter) -> StoreResult<Vec<Provider>>;
    async fn count(&self, filter: &ProviderFilter) -> StoreResult<u64>;
}

#[async_trait]
pub trait ModelCatalogRepository: Send + Sync {
    async fn create(&self, catalog: ModelCatalog) -> StoreResult<ModelCatalog>;
    async fn update(&self, catalog: &ModelCatalog) -> StoreResult<()>;
    async fn find_by_public_id(&self, public_id: &str) -> StoreResult<Option<ModelCatalog>>;
}

#[async_trait]
pub trait ProviderModelRepository: Send + Sync {
    async fn create(&self, model: ProviderModel) -> StoreResult<ProviderModel>;
    async fn update(&self, model: &ProviderModel) -> StoreResult<()>;
    async fn find_by_filter(&self, filter: &ProviderModelFilter) -> StoreResult<Vec<ProviderModel>>;
    /// Sets `active` on every model of one provider; returns the rows touched.
    async fn set_active_for_provider(&self, provider_id: i64, active: bool) -> StoreResult<u64>;
}
