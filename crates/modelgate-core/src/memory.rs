use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use modelgate_common::generate_public_id;
use modelgate_protocol::responses::ResponseStatus;
use modelgate_provider_core::{StoreError, StoreResult, TenantContext};

use crate::persistence::{
    Conversation, ConversationItem, ConversationStore, NewConversationItem, NewResponse,
    ResponseStore, ResponseUpdates, StoredResponse,
};

#[derive(Default)]
struct ConversationTables {
    next_id: i64,
    conversations: BTreeMap<i64, Conversation>,
    items: BTreeMap<i64, ConversationItem>,
}

/// Conversations kept in process memory.
#[derive(Default)]
pub struct MemoryConversationStore {
    tables: RwLock<ConversationTables>,
}

impl MemoryConversationStore {
    /// Number of conversations held.
    pub async fn len(&self) -> usize {
        self.tables.read().await.conversations.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn create_conversation(
        &self,
        tenant: &TenantContext,
        title: Option<String>,
    ) -> StoreResult<Conversation> {
        let mut tables = self.tables.write().await;
        tables.next_id += 1;
        let now = OffsetDateTime::now_utc();
        let conversation = Conversation {
            id: tables.next_id,
            public_id: generate_public_id("conv", 24),
            organization_id: tenant.effective_organization(),
            project_id: tenant.project_ids.first().copied(),
            title,
            created_at: now,
            updated_at: now,
        };
        tables
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn find_conversation(&self, public_id: &str) -> StoreResult<Option<Conversation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .conversations
            .values()
            .find(|row| row.public_id == public_id)
            .cloned())
    }

    async fn append_item(
        &self,
        conversation: &Conversation,
        item: NewConversationItem,
    ) -> StoreResult<ConversationItem> {
        let mut tables = self.tables.write().await;
        if !tables.conversations.contains_key(&conversation.id) {
            return Err(StoreError::NotFound(format!(
                "conversation {}",
                conversation.public_id
            )));
        }
        tables.next_id += 1;
        let created = ConversationItem {
            id: tables.next_id,
            public_id: generate_public_id("msg", 24),
            conversation_id: conversation.id,
            item_type: item.item_type,
            role: item.role,
            content: item.content,
            status: item.status,
            response_id: item.response_id,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.items.insert(created.id, created.clone());
        Ok(created)
    }

    async fn list_items(&self, conversation: &Conversation) -> StoreResult<Vec<ConversationItem>> {
        let tables = self.tables.read().await;
        Ok(tables
            .items
            .values()
            .filter(|item| item.conversation_id == conversation.id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct ResponseTable {
    next_id: i64,
    rows: BTreeMap<i64, StoredResponse>,
}

/// Responses kept in process memory.
#[derive(Default)]
pub struct MemoryResponseStore {
    table: RwLock<ResponseTable>,
}

#[async_trait]
impl ResponseStore for MemoryResponseStore {
    async fn create_response(&self, response: NewResponse) -> StoreResult<StoredResponse> {
        let mut table = self.table.write().await;
        if table.rows.values().any(|row| row.public_id == response.public_id) {
            return Err(StoreError::Conflict(format!("response {}", response.public_id)));
        }
        table.next_id += 1;
        let now = OffsetDateTime::now_utc();
        let stored = StoredResponse {
            id: table.next_id,
            public_id: response.public_id,
            organization_id: response.organization_id,
            conversation_id: response.conversation_id,
            model: response.model,
            status: ResponseStatus::Pending,
            input: response.input,
            output: None,
            usage: None,
            error: None,
            completed_at: None,
            cancelled_at: None,
            failed_at: None,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update_response(
        &self,
        id: i64,
        updates: ResponseUpdates,
    ) -> StoreResult<StoredResponse> {
        let mut table = self.table.write().await;
        let row = table
            .rows
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("response {id}")))?;
        row.apply(&updates, OffsetDateTime::now_utc());
        Ok(row.clone())
    }

    async fn find_response(&self, public_id: &str) -> StoreResult<Option<StoredResponse>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .find(|row| row.public_id == public_id)
            .cloned())
    }
}
