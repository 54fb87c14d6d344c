use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "model_catalogs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique_key = "model_catalog_public_id")]
    pub public_id: String,
    pub supported_parameters: Json,
    pub architecture: Json,
    pub tags: Json,
    pub notes: Option<String>,
    pub is_moderated: Option<bool>,
    pub extras: Json,
    pub status: String,
    pub last_synced_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    #[sea_orm(has_many)]
    pub provider_models: HasMany<super::provider_models::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
