use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "conversations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique_key = "conversation_public_id")]
    pub public_id: String,
    pub organization_id: Option<i64>,
    pub project_id: Option<i64>,
    pub title: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    #[sea_orm(has_many)]
    pub items: HasMany<super::conversation_items::Entity>,
    #[sea_orm(has_many)]
    pub responses: HasMany<super::responses::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
