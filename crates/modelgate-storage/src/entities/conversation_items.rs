use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "conversation_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique_key = "conversation_item_public_id")]
    pub public_id: String,
    pub conversation_id: i64,
    pub item_type: String,
    pub role: Option<String>,
    /// Content blocks as a JSON array.
    pub content: Json,
    pub status: String,
    pub response_id: Option<i64>,
    pub created_at: OffsetDateTime,
    #[sea_orm(
        belongs_to,
        from = "conversation_id",
        to = "id",
        on_delete = "Cascade"
    )]
    pub conversation: HasOne<super::conversations::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
