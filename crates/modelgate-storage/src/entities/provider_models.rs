use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "provider_models")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique_key = "provider_model_public_id")]
    pub public_id: String,
    #[sea_orm(unique_key = "provider_model_key")]
    pub provider_id: i64,
    pub model_catalog_id: Option<i64>,
    #[sea_orm(unique_key = "provider_model_key")]
    pub model_key: String,
    pub display_name: String,
    pub pricing: Json,
    pub token_limits: Option<Json>,
    pub family: Option<String>,
    pub supports_images: bool,
    pub supports_embeddings: bool,
    pub supports_reasoning: bool,
    pub active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    #[sea_orm(belongs_to, from = "provider_id", to = "id", on_delete = "Cascade")]
    pub provider: HasOne<super::providers::Entity>,
    #[sea_orm(
        belongs_to,
        from = "model_catalog_id",
        to = "id",
        on_delete = "SetNull"
    )]
    pub model_catalog: HasOne<super::model_catalogs::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
