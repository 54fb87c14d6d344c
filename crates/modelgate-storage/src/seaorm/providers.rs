use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Select,
};
use time::OffsetDateTime;

use modelgate_provider_core::{
    CatalogStatus, ModelCatalog, ModelCatalogRepository, Provider, ProviderFilter, ProviderKind,
    ProviderModel, ProviderModelFilter, ProviderModelRepository, ProviderRepository, StoreError,
    StoreResult,
};

use super::SeaOrmStorage;
use crate::entities;
use crate::storage::store_error;

fn provider_from_row(row: entities::providers::Model) -> StoreResult<Provider> {
    Ok(Provider {
        id: row.id,
        public_id: row.public_id,
        slug: row.slug,
        organization_id: row.organization_id,
        project_id: row.project_id,
        display_name: row.display_name,
        kind: ProviderKind::parse(&row.kind),
        base_url: row.base_url,
        encrypted_api_key: row.encrypted_api_key,
        api_key_hint: row.api_key_hint,
        is_moderated: row.is_moderated,
        active: row.active,
        metadata: row.metadata.map(serde_json::from_value).transpose()?,
        last_synced_at: row.last_synced_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn provider_active(provider: &Provider) -> StoreResult<entities::providers::ActiveModel> {
    let metadata = provider
        .metadata
        .as_ref()
        .map(serde_json::to_value)
        .transpose()?;
    Ok(entities::providers::ActiveModel {
        public_id: ActiveValue::Set(provider.public_id.clone()),
        slug: ActiveValue::Set(provider.slug.clone()),
        organization_id: ActiveValue::Set(provider.organization_id),
        project_id: ActiveValue::Set(provider.project_id),
        display_name: ActiveValue::Set(provider.display_name.clone()),
        kind: ActiveValue::Set(provider.kind.as_str().to_string()),
        base_url: ActiveValue::Set(provider.base_url.clone()),
        encrypted_api_key: ActiveValue::Set(provider.encrypted_api_key.clone()),
        api_key_hint: ActiveValue::Set(provider.api_key_hint.clone()),
        is_moderated: ActiveValue::Set(provider.is_moderated),
        active: ActiveValue::Set(provider.active),
        metadata: ActiveValue::Set(metadata),
        last_synced_at: ActiveValue::Set(provider.last_synced_at),
        created_at: ActiveValue::Set(provider.created_at),
        updated_at: ActiveValue::Set(provider.updated_at),
        ..Default::default()
    })
}

fn provider_query(filter: &ProviderFilter) -> Select<entities::Providers> {
    use entities::providers::Column;

    let mut query = entities::Providers::find();
    if let Some(ids) = &filter.ids {
        query = query.filter(Column::Id.is_in(ids.clone()));
    }
    if let Some(public_id) = &filter.public_id {
        query = query.filter(Column::PublicId.eq(public_id.as_str()));
    }
    if let Some(slug) = &filter.slug {
        query = query.filter(Column::Slug.eq(slug.as_str()));
    }
    if let Some(org) = filter.organization_id {
        query = query.filter(Column::OrganizationId.eq(org));
    }
    if let Some(project) = filter.project_id {
        query = query.filter(Column::ProjectId.eq(project));
    }
    if let Some(projects) = &filter.project_ids {
        query = query.filter(Column::ProjectId.is_in(projects.clone()));
    }
    if filter.without_project {
        query = query.filter(Column::ProjectId.is_null());
    }
    if let Some(kind) = filter.kind {
        query = query.filter(Column::Kind.eq(kind.as_str()));
    }
    if let Some(active) = filter.active {
        query = query.filter(Column::Active.eq(active));
    }
    query.order_by_asc(Column::Id)
}

#[async_trait]
impl ProviderRepository for SeaOrmStorage {
    async fn create(&self, mut provider: Provider) -> StoreResult<Provider> {
        let row = provider_active(&provider)?
            .insert(&self.db)
            .await
            .map_err(store_error)?;
        provider.id = row.id;
        Ok(provider)
    }

    async fn update(&self, provider: &Provider) -> StoreResult<()> {
        let mut active = provider_active(provider)?;
        active.id = ActiveValue::Unchanged(provider.id);
        active.update(&self.db).await.map_err(store_error)?;
        Ok(())
    }

    async fn find_by_public_id(&self, public_id: &str) -> StoreResult<Option<Provider>> {
        entities::Providers::find()
            .filter(entities::providers::Column::PublicId.eq(public_id))
            .one(&self.db)
            .await
            .map_err(store_error)?
            .map(provider_from_row)
            .transpose()
    }

    async fn find_by_filter(&self, filter: &ProviderFilter) -> StoreResult<Vec<Provider>> {
        provider_query(filter)
            .all(&self.db)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(provider_from_row)
            .collect()
    }

    async fn count(&self, filter: &ProviderFilter) -> StoreResult<u64> {
        provider_query(filter)
            .count(&self.db)
            .await
            .map_err(store_error)
    }
}

fn catalog_from_row(row: entities::model_catalogs::Model) -> StoreResult<ModelCatalog> {
    let status = CatalogStatus::parse(&row.status)
        .ok_or_else(|| StoreError::Backend(format!("unknown catalog status '{}'", row.status)))?;
    Ok(ModelCatalog {
        id: row.id,
        public_id: row.public_id,
        supported_parameters: serde_json::from_value(row.supported_parameters)?,
        architecture: serde_json::from_value(row.architecture)?,
        tags: serde_json::from_value(row.tags)?,
        notes: row.notes,
        is_moderated: row.is_moderated,
        extras: serde_json::from_value(row.extras)?,
        status,
        last_synced_at: row.last_synced_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn catalog_active(catalog: &ModelCatalog) -> StoreResult<entities::model_catalogs::ActiveModel> {
    Ok(entities::model_catalogs::ActiveModel {
        public_id: ActiveValue::Set(catalog.public_id.clone()),
        supported_parameters: ActiveValue::Set(serde_json::to_value(&catalog.supported_parameters)?),
        architecture: ActiveValue::Set(serde_json::to_value(&catalog.architecture)?),
        tags: ActiveValue::Set(serde_json::to_value(&catalog.tags)?),
        notes: ActiveValue::Set(catalog.notes.clone()),
        is_moderated: ActiveValue::Set(catalog.is_moderated),
        extras: ActiveValue::Set(serde_json::Value::Object(catalog.extras.clone())),
        status: ActiveValue::Set(catalog.status.as_str().to_string()),
        last_synced_at: ActiveValue::Set(catalog.last_synced_at),
        created_at: ActiveValue::Set(catalog.created_at),
        updated_at: ActiveValue::Set(catalog.updated_at),
        ..Default::default()
    })
}

#[async_trait]
impl ModelCatalogRepository for SeaOrmStorage {
    async fn create(&self, mut catalog: ModelCatalog) -> StoreResult<ModelCatalog> {
        let row = catalog_active(&catalog)?
            .insert(&self.db)
            .await
            .map_err(store_error)?;
        catalog.id = row.id;
        Ok(catalog)
    }

    async fn update(&self, catalog: &ModelCatalog) -> StoreResult<()> {
        let mut active = catalog_active(catalog)?;
        active.id = ActiveValue::Unchanged(catalog.id);
        active.update(&self.db).await.map_err(store_error)?;
        Ok(())
    }

    async fn find_by_public_id(&self, public_id: &str) -> StoreResult<Option<ModelCatalog>> {
        entities::ModelCatalogs::find()
            .filter(entities::model_catalogs::Column::PublicId.eq(public_id))
            .one(&self.db)
            .await
            .map_err(store_error)?
            .map(catalog_from_row)
            .transpose()
    }
}

fn model_from_row(row: entities::provider_models::Model) -> StoreResult<ProviderModel> {
    Ok(ProviderModel {
        id: row.id,
        public_id: row.public_id,
        provider_id: row.provider_id,
        model_catalog_id: row.model_catalog_id,
        model_key: row.model_key,
        display_name: row.display_name,
        pricing: serde_json::from_value(row.pricing)?,
        token_limits: row.token_limits.map(serde_json::from_value).transpose()?,
        family: row.family,
        supports_images: row.supports_images,
        supports_embeddings: row.supports_embeddings,
        supports_reasoning: row.supports_reasoning,
        active: row.active,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn model_active(model: &ProviderModel) -> StoreResult<entities::provider_models::ActiveModel> {
    let token_limits = model
        .token_limits
        .as_ref()
        .map(serde_json::to_value)
        .transpose()?;
    Ok(entities::provider_models::ActiveModel {
        public_id: ActiveValue::Set(model.public_id.clone()),
        provider_id: ActiveValue::Set(model.provider_id),
        model_catalog_id: ActiveValue::Set(model.model_catalog_id),
        model_key: ActiveValue::Set(model.model_key.clone()),
        display_name: ActiveValue::Set(model.display_name.clone()),
        pricing: ActiveValue::Set(serde_json::to_value(&model.pricing)?),
        token_limits: ActiveValue::Set(token_limits),
        family: ActiveValue::Set(model.family.clone()),
        supports_images: ActiveValue::Set(model.supports_images),
        supports_embeddings: ActiveValue::Set(model.supports_embeddings),
        supports_reasoning: ActiveValue::Set(model.supports_reasoning),
        active: ActiveValue::Set(model.active),
        created_at: ActiveValue::Set(model.created_at),
        updated_at: ActiveValue::Set(model.updated_at),
        ..Default::default()
    })
}

#[async_trait]
impl ProviderModelRepository for SeaOrmStorage {
    async fn create(&self, mut model: ProviderModel) -> StoreResult<ProviderModel> {
        let row = model_active(&model)?
            .insert(&self.db)
            .await
            .map_err(store_error)?;
        model.id = row.id;
        Ok(model)
    }

    async fn update(&self, model: &ProviderModel) -> StoreResult<()> {
        let mut active = model_active(model)?;
        active.id = ActiveValue::Unchanged(model.id);
        active.update(&self.db).await.map_err(store_error)?;
        Ok(())
    }

    async fn find_by_filter(&self, filter: &ProviderModelFilter) -> StoreResult<Vec<ProviderModel>> {
        use entities::provider_models::Column;

        let mut query = entities::ProviderModels::find();
        if let Some(provider_id) = filter.provider_id {
            query = query.filter(Column::ProviderId.eq(provider_id));
        }
        if let Some(ids) = &filter.provider_ids {
            query = query.filter(Column::ProviderId.is_in(ids.clone()));
        }
        if let Some(catalog_id) = filter.model_catalog_id {
            query = query.filter(Column::ModelCatalogId.eq(catalog_id));
        }
        if let Some(key) = &filter.model_key {
            query = query.filter(Column::ModelKey.eq(key.as_str()));
        }
        if let Some(active) = filter.active {
            query = query.filter(Column::Active.eq(active));
        }
        query
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(model_from_row)
            .collect()
    }

    async fn set_active_for_provider(&self, provider_id: i64, active: bool) -> StoreResult<u64> {
        use entities::provider_models::Column;

        let result = entities::ProviderModels::update_many()
            .col_expr(Column::Active, Expr::value(active))
            .col_expr(Column::UpdatedAt, Expr::value(OffsetDateTime::now_utc()))
            .filter(Column::ProviderId.eq(provider_id))
            .exec(&self.db)
            .await
            .map_err(store_error)?;
        Ok(result.rows_affected)
    }
}
