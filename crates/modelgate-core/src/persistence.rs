//! Persistence collaborators used by the completion paths.
//!
//! The relay only ever appends conversation items and applies response
//! updates; both are best-effort once bytes have reached the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use modelgate_protocol::responses::{OutputItem, ResponseError, ResponseStatus, ResponseUsage};
use modelgate_provider_core::{StoreResult, TenantContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationItemType {
    Message,
    FunctionCall,
    FunctionCallOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationItemStatus {
    InProgress,
    Completed,
    Incomplete,
    Failed,
    Cancelled,
}

macro_rules! str_enum {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)+
                }
            }

            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($name => Some($ty::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

str_enum!(ConversationItemType {
    Message => "message",
    FunctionCall => "function_call",
    FunctionCallOutput => "function_call_output",
});

str_enum!(ItemRole {
    System => "system",
    User => "user",
    Assistant => "assistant",
    Tool => "tool",
});

str_enum!(ConversationItemStatus {
    InProgress => "in_progress",
    Completed => "completed",
    Incomplete => "incomplete",
    Failed => "failed",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    InputText { text: String },
    OutputText { text: String },
    ReasoningText { text: String },
}

impl ContentBlock {
    pub fn text(&self) -> &str {
        match self {
            ContentBlock::InputText { text }
            | ContentBlock::OutputText { text }
            | ContentBlock::ReasoningText { text } => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conversation {
    #[serde(skip)]
    pub id: i64,
    pub public_id: String,
    pub organization_id: Option<i64>,
    pub project_id: Option<i64>,
    pub title: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationItem {
    #[serde(skip)]
    pub id: i64,
    pub public_id: String,
    #[serde(skip)]
    pub conversation_id: i64,
    #[serde(rename = "type")]
    pub item_type: ConversationItemType,
    pub role: Option<ItemRole>,
    pub content: Vec<ContentBlock>,
    pub status: ConversationItemStatus,
    /// Row id of the response that produced this item.
    #[serde(skip)]
    pub response_id: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConversationItem {
    pub item_type: ConversationItemType,
    pub role: Option<ItemRole>,
    pub content: Vec<ContentBlock>,
    pub status: ConversationItemStatus,
    pub response_id: Option<i64>,
}

impl NewConversationItem {
    pub fn message(
        role: ItemRole,
        content: Vec<ContentBlock>,
        status: ConversationItemStatus,
    ) -> Self {
        Self {
            item_type: ConversationItemType::Message,
            role: Some(role),
            content,
            status,
            response_id: None,
        }
    }

    pub fn for_response(mut self, response_id: Option<i64>) -> Self {
        self.response_id = response_id;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredResponse {
    pub id: i64,
    pub public_id: String,
    pub organization_id: Option<i64>,
    pub conversation_id: Option<i64>,
    pub model: String,
    pub status: ResponseStatus,
    pub input: Value,
    pub output: Option<Vec<OutputItem>>,
    pub usage: Option<ResponseUsage>,
    pub error: Option<ResponseError>,
    pub completed_at: Option<OffsetDateTime>,
    pub cancelled_at: Option<OffsetDateTime>,
    pub failed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl StoredResponse {
    /// Applies every populated update and stamps the matching terminal time.
    pub fn apply(&mut self, updates: &ResponseUpdates, now: OffsetDateTime) {
        if let Some(status) = updates.status {
            self.status = status;
            match status {
                ResponseStatus::Completed => self.completed_at = Some(now),
                ResponseStatus::Cancelled => self.cancelled_at = Some(now),
                ResponseStatus::Failed => self.failed_at = Some(now),
                ResponseStatus::Pending | ResponseStatus::InProgress => {}
            }
        }
        if let Some(output) = &updates.output {
            self.output = Some(output.clone());
        }
        if let Some(usage) = updates.usage {
            self.usage = Some(usage);
        }
        if let Some(error) = &updates.error {
            self.error = Some(error.clone());
        }
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewResponse {
    pub public_id: String,
    pub organization_id: Option<i64>,
    pub conversation_id: Option<i64>,
    pub model: String,
    pub input: Value,
}

/// Field updates written to a response row in one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseUpdates {
    pub status: Option<ResponseStatus>,
    pub output: Option<Vec<OutputItem>>,
    pub usage: Option<ResponseUsage>,
    pub error: Option<ResponseError>,
}

impl ResponseUpdates {
    pub fn status(status: ResponseStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn completed(output: Vec<OutputItem>, usage: ResponseUsage) -> Self {
        Self {
            status: Some(ResponseStatus::Completed),
            output: Some(output),
            usage: Some(usage),
            error: None,
        }
    }

    pub fn failed(status: ResponseStatus, code: &str, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            error: Some(ResponseError {
                code: code.to_string(),
                message: message.into(),
            }),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(
        &self,
        tenant: &TenantContext,
        title: Option<String>,
    ) -> StoreResult<Conversation>;
    async fn find_conversation(&self, public_id: &str) -> StoreResult<Option<Conversation>>;
    async fn append_item(
        &self,
        conversation: &Conversation,
        item: NewConversationItem,
    ) -> StoreResult<ConversationItem>;
    async fn list_items(&self, conversation: &Conversation) -> StoreResult<Vec<ConversationItem>>;
}

#[async_trait]
pub trait ResponseStore: Send + Sync {
    async fn create_response(&self, response: NewResponse) -> StoreResult<StoredResponse>;
    async fn update_response(
        &self,
        id: i64,
        updates: ResponseUpdates,
    ) -> StoreResult<StoredResponse>;
    async fn find_response(&self, public_id: &str) -> StoreResult<Option<StoredResponse>>;
}
