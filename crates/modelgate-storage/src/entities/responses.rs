use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "responses")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique_key = "response_public_id")]
    pub public_id: String,
    pub organization_id: Option<i64>,
    pub conversation_id: Option<i64>,
    pub model: String,
    pub status: String,
    pub input: Json,
    pub output: Option<Json>,
    pub usage: Option<Json>,
    pub error: Option<Json>,
    pub completed_at: Option<OffsetDateTime>,
    pub cancelled_at: Option<OffsetDateTime>,
    pub failed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    #[sea_orm(
        belongs_to,
        from = "conversation_id",
        to = "id",
        on_delete = "SetNull"
    )]
    pub conversation: HasOne<super::conversations::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
