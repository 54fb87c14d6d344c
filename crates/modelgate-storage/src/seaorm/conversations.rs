use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, ActiveValue, ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use time::OffsetDateTime;

use modelgate_common::generate_public_id;
use modelgate_core::{
    Conversation, ConversationItem, ConversationItemStatus, ConversationItemType,
    ConversationStore, ItemRole, NewConversationItem, NewResponse, ResponseStore,
    ResponseUpdates, StoredResponse,
};
use modelgate_protocol::responses::ResponseStatus;
use modelgate_provider_core::{StoreError, StoreResult, TenantContext};

use super::SeaOrmStorage;
use crate::entities;
use crate::storage::store_error;

const CONVERSATION_ID_PREFIX: &str = "conv";
const ITEM_ID_PREFIX: &str = "msg";
const PUBLIC_ID_LEN: usize = 24;

fn malformed(column: &str, value: &str) -> StoreError {
    StoreError::Backend(format!("unknown {column} '{value}'"))
}

fn conversation_from_row(row: entities::conversations::Model) -> Conversation {
    Conversation {
        id: row.id,
        public_id: row.public_id,
        organization_id: row.organization_id,
        project_id: row.project_id,
        title: row.title,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn item_from_row(row: entities::conversation_items::Model) -> StoreResult<ConversationItem> {
    let item_type = ConversationItemType::parse(&row.item_type)
        .ok_or_else(|| malformed("item type", &row.item_type))?;
    let status = ConversationItemStatus::parse(&row.status)
        .ok_or_else(|| malformed("item status", &row.status))?;
    let role = match row.role.as_deref() {
        Some(role) => Some(ItemRole::parse(role).ok_or_else(|| malformed("item role", role))?),
        None => None,
    };
    Ok(ConversationItem {
        id: row.id,
        public_id: row.public_id,
        conversation_id: row.conversation_id,
        item_type,
        role,
        content: serde_json::from_value(row.content)?,
        status,
        response_id: row.response_id,
        created_at: row.created_at,
    })
}

#[async_trait]
impl ConversationStore for SeaOrmStorage {
    async fn create_conversation(
        &self,
        tenant: &TenantContext,
        title: Option<String>,
    ) -> StoreResult<Conversation> {
        let now = OffsetDateTime::now_utc();
        let row = entities::conversations::ActiveModel {
            public_id: ActiveValue::Set(generate_public_id(CONVERSATION_ID_PREFIX, PUBLIC_ID_LEN)),
            organization_id: ActiveValue::Set(tenant.effective_organization()),
            project_id: ActiveValue::Set(tenant.project_ids.first().copied()),
            title: ActiveValue::Set(title),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .map_err(store_error)?;
        Ok(conversation_from_row(row))
    }

    async fn find_conversation(&self, public_id: &str) -> StoreResult<Option<Conversation>> {
        let row = entities::Conversations::find()
            .filter(entities::conversations::Column::PublicId.eq(public_id))
            .one(&self.db)
            .await
            .map_err(store_error)?;
        Ok(row.map(conversation_from_row))
    }

    async fn append_item(
        &self,
        conversation: &Conversation,
        item: NewConversationItem,
    ) -> StoreResult<ConversationItem> {
        let exists = entities::Conversations::find_by_id(conversation.id)
            .one(&self.db)
            .await
            .map_err(store_error)?;
        if exists.is_none() {
            return Err(StoreError::NotFound(format!(
                "conversation {}",
                conversation.public_id
            )));
        }

        let row = entities::conversation_items::ActiveModel {
            public_id: ActiveValue::Set(generate_public_id(ITEM_ID_PREFIX, PUBLIC_ID_LEN)),
            conversation_id: ActiveValue::Set(conversation.id),
            item_type: ActiveValue::Set(item.item_type.as_str().to_string()),
            role: ActiveValue::Set(item.role.map(|role| role.as_str().to_string())),
            content: ActiveValue::Set(serde_json::to_value(&item.content)?),
            status: ActiveValue::Set(item.status.as_str().to_string()),
            response_id: ActiveValue::Set(item.response_id),
            created_at: ActiveValue::Set(OffsetDateTime::now_utc()),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .map_err(store_error)?;
        item_from_row(row)
    }

    async fn list_items(&self, conversation: &Conversation) -> StoreResult<Vec<ConversationItem>> {
        use entities::conversation_items::Column;

        entities::ConversationItems::find()
            .filter(Column::ConversationId.eq(conversation.id))
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(item_from_row)
            .collect()
    }
}

fn response_from_row(row: entities::responses::Model) -> StoreResult<StoredResponse> {
    let status =
        ResponseStatus::parse(&row.status).ok_or_else(|| malformed("response status", &row.status))?;
    Ok(StoredResponse {
        id: row.id,
        public_id: row.public_id,
        organization_id: row.organization_id,
        conversation_id: row.conversation_id,
        model: row.model,
        status,
        input: row.input,
        output: row.output.map(serde_json::from_value).transpose()?,
        usage: row.usage.map(serde_json::from_value).transpose()?,
        error: row.error.map(serde_json::from_value).transpose()?,
        completed_at: row.completed_at,
        cancelled_at: row.cancelled_at,
        failed_at: row.failed_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn optional_json<T: serde::Serialize>(value: Option<&T>) -> StoreResult<Option<serde_json::Value>> {
    Ok(value.map(serde_json::to_value).transpose()?)
}

#[async_trait]
impl ResponseStore for SeaOrmStorage {
    async fn create_response(&self, response: NewResponse) -> StoreResult<StoredResponse> {
        let now = OffsetDateTime::now_utc();
        let row = entities::responses::ActiveModel {
            public_id: ActiveValue::Set(response.public_id),
            organization_id: ActiveValue::Set(response.organization_id),
            conversation_id: ActiveValue::Set(response.conversation_id),
            model: ActiveValue::Set(response.model),
            status: ActiveValue::Set(ResponseStatus::Pending.as_str().to_string()),
            input: ActiveValue::Set(response.input),
            output: ActiveValue::Set(None),
            usage: ActiveValue::Set(None),
            error: ActiveValue::Set(None),
            completed_at: ActiveValue::Set(None),
            cancelled_at: ActiveValue::Set(None),
            failed_at: ActiveValue::Set(None),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .map_err(store_error)?;
        response_from_row(row)
    }

    async fn update_response(
        &self,
        id: i64,
        updates: ResponseUpdates,
    ) -> StoreResult<StoredResponse> {
        let row = entities::Responses::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(store_error)?
            .ok_or_else(|| StoreError::NotFound(format!("response {id}")))?;
        let mut response = response_from_row(row.clone())?;
        response.apply(&updates, OffsetDateTime::now_utc());

        let mut active: entities::responses::ActiveModel = row.into();
        active.status = ActiveValue::Set(response.status.as_str().to_string());
        active.output = ActiveValue::Set(optional_json(response.output.as_ref())?);
        active.usage = ActiveValue::Set(optional_json(response.usage.as_ref())?);
        active.error = ActiveValue::Set(optional_json(response.error.as_ref())?);
        active.completed_at = ActiveValue::Set(response.completed_at);
        active.cancelled_at = ActiveValue::Set(response.cancelled_at);
        active.failed_at = ActiveValue::Set(response.failed_at);
        active.updated_at = ActiveValue::Set(response.updated_at);
        active.update(&self.db).await.map_err(store_error)?;
        Ok(response)
    }

    async fn find_response(&self, public_id: &str) -> StoreResult<Option<StoredResponse>> {
        entities::Responses::find()
            .filter(entities::responses::Column::PublicId.eq(public_id))
            .one(&self.db)
            .await
            .map_err(store_error)?
            .map(response_from_row)
            .transpose()
    }
}
