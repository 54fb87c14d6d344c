use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "providers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique_key = "provider_public_id")]
    pub public_id: String,
    #[sea_orm(unique_key = "provider_slug")]
    pub slug: String,
    pub organization_id: i64,
    pub project_id: Option<i64>,
    pub display_name: String,
    pub kind: String,
    pub base_url: String,
    pub encrypted_api_key: Option<String>,
    pub api_key_hint: Option<String>,
    pub is_moderated: bool,
    pub active: bool,
    pub metadata: Option<Json>,
    pub last_synced_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    #[sea_orm(has_many)]
    pub models: HasMany<super::provider_models::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
