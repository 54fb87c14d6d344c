//! Process-local repositories backed by `tokio::sync::RwLock`.
//!
//! They enforce the same uniqueness rules as the database schema so that
//! registry logic behaves identically against either backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::catalog::ModelCatalog;
use crate::errors::{StoreError, StoreResult};
use crate::provider::{Provider, ProviderFilter};
use crate::provider_model::{ProviderModel, ProviderModelFilter};
use crate::repository::{ModelCatalogRepository, ProviderModelRepository, ProviderRepository};

struct Table<T> {
    next_id: i64,
    rows: BTreeMap<i64, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            next_id: 1,
            rows: BTreeMap::new(),
        }
    }
}

impl<T> Table<T> {
    fn allocate(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

#[derive(Default)]
pub struct MemoryProviderRepository {
    table: RwLock<Table<Provider>>,
}

#[async_trait]
impl ProviderRepository for MemoryProviderRepository {
    async fn create(&self, mut provider: Provider) -> StoreResult<Provider> {
        let mut table = self.table.write().await;
        if table
            .rows
            .values()
            .any(|row| row.public_id == provider.public_id || row.slug == provider.slug)
        {
            return Err(StoreError::Conflict(format!("provider {}", provider.slug)));
        }
        provider.id = table.allocate();
        table.rows.insert(provider.id, provider.clone());
        Ok(provider)
    }

    async fn update(&self, provider: &Provider) -> StoreResult<()> {
        let mut table = self.table.write().await;
        let row = table
            .rows
            .get_mut(&provider.id)
            .ok_or_else(|| StoreError::NotFound(format!("provider {}", provider.id)))?;
        *row = provider.clone();
        Ok(())
    }

    async fn find_by_public_id(&self, public_id: &str) -> StoreResult<Option<Provider>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .find(|row| row.public_id == public_id)
            .cloned())
    }

    async fn find_by_filter(&self, filter: &ProviderFilter) -> StoreResult<Vec<Provider>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect())
    }

    async fn count(&self, filter: &ProviderFilter) -> StoreResult<u64> {
        let table = self.table.read().await;
        Ok(table.rows.values().filter(|row| filter.matches(row)).count() as u64)
    }
}

#[derive(Default)]
pub struct MemoryModelCatalogRepository {
    table: RwLock<Table<ModelCatalog>>,
}

#[async_trait]
impl ModelCatalogRepository for MemoryModelCatalogRepository {
    async fn create(&self, mut catalog: ModelCatalog) -> StoreResult<ModelCatalog> {
        let mut table = self.table.write().await;
        if table.rows.values().any(|row| row.public_id == catalog.public_id) {
            return Err(StoreError::Conflict(format!("catalog {}", catalog.public_id)));
        }
        catalog.id = table.allocate();
        table.rows.insert(catalog.id, catalog.clone());
        Ok(catalog)
    }

    async fn update(&self, catalog: &ModelCatalog) -> StoreResult<()> {
        let mut table = self.table.write().await;
        let row = table
            .rows
            .get_mut(&catalog.id)
            .ok_or_else(|| StoreError::NotFound(format!("catalog {}", catalog.id)))?;
        *row = catalog.clone();
        Ok(())
    }

    async fn find_by_public_id(&self, public_id: &str) -> StoreResult<Option<ModelCatalog>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .find(|row| row.public_id == public_id)
            .cloned())
    }
}

#[derive(Default)]
pub struct MemoryProviderModelRepository {
    table: RwLock<Table<ProviderModel>>,
}

#[async_trait]
impl ProviderModelRepository for MemoryProviderModelRepository {
    async fn create(&self, mut model: ProviderModel) -> StoreResult<ProviderModel> {
        let mut table = self.table.write().await;
        if table.rows.values().any(|row| {
            row.public_id == model.public_id
                || (row.provider_id == model.provider_id && row.model_key == model.model_key)
        }) {
            return Err(StoreError::Conflict(format!(
                "provider model {}/{}",
                model.provider_id, model.model_key
            )));
        }
        model.id = table.allocate();
        table.rows.insert(model.id, model.clone());
        Ok(model)
    }

    async fn update(&self, model: &ProviderModel) -> StoreResult<()> {
        let mut table = self.table.write().await;
        let row = table
            .rows
            .get_mut(&model.id)
            .ok_or_else(|| StoreError::NotFound(format!("provider model {}", model.id)))?;
        *row = model.clone();
        Ok(())
    }

    async fn find_by_filter(&self, filter: &ProviderModelFilter) -> StoreResult<Vec<ProviderModel>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect())
    }

    async fn set_active_for_provider(&self, provider_id: i64, active: bool) -> StoreResult<u64> {
        let mut table = self.table.write().await;
        let mut touched = 0;
        for row in table.rows.values_mut().filter(|row| row.provider_id == provider_id) {
            row.active = active;
            touched += 1;
        }
        Ok(touched)
    }
}
