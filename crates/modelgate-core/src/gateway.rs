//! Request orchestration: resolve the provider, call upstream, relay, and
//! record the result.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use modelgate_protocol::chat::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ChatRole, CompletionUsage,
};
use modelgate_protocol::models::{ModelList, UpstreamModel};
use modelgate_protocol::responses::{
    ConversationMetadata, CreateResponseRequest, Response, ResponseInput, ResponseObjectType,
    ResponseStatus,
};
use modelgate_provider_core::{
    Provider, ProviderRegistry, StoreError, SyncedProvider, TenantContext,
};

use crate::error::{GatewayError, RelayError};
use crate::inference::{ClientFactory, InferenceClient};
use crate::output::{RESPONSE_ID_PREFIX, new_item_id, response_usage, unary_output};
use crate::persistence::{
    ContentBlock, Conversation, ConversationItemStatus, ConversationItemType, ConversationStore,
    ItemRole, NewConversationItem, NewResponse, ResponseStore, ResponseUpdates,
};
use crate::relay::{
    ChannelSink, PassthroughEmitter, RelayConfig, RelayContext, ResponsesEmitter,
    estimate_tokens, open_stream, relay,
};

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Request field naming the conversation a chat completion belongs to.
pub const CONVERSATION_FIELD: &str = "conversation";
const TITLE_CHARS: usize = 60;

/// How a request refers to a conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConversationRef {
    #[default]
    None,
    Existing(String),
    New,
}

impl ConversationRef {
    /// A conversation id selects that conversation and `true` starts a new one.
    pub fn from_value(value: Option<&Value>) -> GatewayResult<Self> {
        match value {
            None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(ConversationRef::None),
            Some(Value::Bool(true)) => Ok(ConversationRef::New),
            Some(Value::String(id)) if !id.trim().is_empty() => {
                Ok(ConversationRef::Existing(id.trim().to_string()))
            }
            Some(_) => Err(GatewayError::bad_request(
                "conversation must be a conversation id or true",
            )),
        }
    }

    pub fn from_id(id: Option<&str>) -> Self {
        match id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => ConversationRef::Existing(id.to_string()),
            None => ConversationRef::None,
        }
    }
}

/// Caller-facing frames of a streaming request plus the task producing them.
/// The task finishes after the result has been recorded.
pub struct RelayHandle {
    pub frames: mpsc::Receiver<Bytes>,
    pub task: JoinHandle<()>,
}

#[derive(Debug, Clone)]
struct BoundConversation {
    conversation: Conversation,
    created: bool,
}

/// Best-effort writer for one response row.
#[derive(Clone)]
struct ResponseTracker {
    store: Arc<dyn ResponseStore>,
    public_id: String,
    row: Option<i64>,
}

impl ResponseTracker {
    async fn create(store: Arc<dyn ResponseStore>, response: NewResponse) -> Self {
        let public_id = response.public_id.clone();
        let row = match store.create_response(response).await {
            Ok(row) => Some(row.id),
            Err(err) => {
                warn!(event = "persist_failed", response_id = %public_id, step = "create", error = %err);
                None
            }
        };
        Self {
            store,
            public_id,
            row,
        }
    }

    async fn update(&self, updates: ResponseUpdates) {
        let Some(id) = self.row else {
            return;
        };
        if let Err(err) = self.store.update_response(id, updates).await {
            warn!(event = "persist_failed", response_id = %self.public_id, step = "update", error = %err);
        }
    }

    async fn fail(&self, code: &str, message: String) {
        let status = if code == "cancelled" {
            ResponseStatus::Cancelled
        } else {
            ResponseStatus::Failed
        };
        self.update(ResponseUpdates::failed(status, code, message))
            .await;
    }
}

pub struct Gateway {
    registry: ProviderRegistry,
    clients: Arc<dyn ClientFactory>,
    conversations: Arc<dyn ConversationStore>,
    responses: Arc<dyn ResponseStore>,
    relay: RelayConfig,
    shutdown: CancellationToken,
}

impl Gateway {
    pub fn new(
        registry: ProviderRegistry,
        clients: Arc<dyn ClientFactory>,
        conversations: Arc<dyn ConversationStore>,
        responses: Arc<dyn ResponseStore>,
        relay: RelayConfig,
    ) -> Self {
        Self {
            registry,
            clients,
            conversations,
            responses,
            relay,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn relay_config(&self) -> &RelayConfig {
        &self.relay
    }

    /// Cancelling this token aborts every in-flight relay.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    fn context(&self) -> RelayContext {
        RelayContext::with_parent(&self.shutdown, self.relay.timeout)
    }

    async fn client_for_model(
        &self,
        model: &str,
        tenant: &TenantContext,
    ) -> GatewayResult<(Provider, Arc<dyn InferenceClient>)> {
        let provider = self.registry.get_provider_for_model(model, tenant).await?;
        let client = self.clients.client_for(&provider)?;
        debug!(event = "provider_resolved", provider = %provider.public_id, model = %model);
        Ok((provider, client))
    }

    pub async fn chat_completion(
        &self,
        tenant: &TenantContext,
        mut request: ChatCompletionRequest,
    ) -> GatewayResult<ChatCompletionResponse> {
        let selector = ConversationRef::from_value(request.extra.remove(CONVERSATION_FIELD).as_ref())?;
        let (provider, client) = self.client_for_model(&request.model, tenant).await?;
        let found = self.lookup_conversation(tenant, &selector).await?;

        let ctx = self.context();
        let mut response = ctx.run(client.create_chat_completion(&request)).await??;
        debug!(event = "chat_completed", provider = %provider.public_id, model = %request.model);

        let Some(bound) = self
            .bind_conversation(tenant, &selector, found, &request.messages)
            .await?
        else {
            return Ok(response);
        };
        let ask_item_id = append_messages(
            self.conversations.as_ref(),
            &bound.conversation,
            last_user_message(&request.messages).into_iter(),
            None,
        )
        .await;
        let completion_item_id = match response.first_message() {
            Some(message) => {
                append_answer(self.conversations.as_ref(), &bound.conversation, message, None).await
            }
            None => None,
        };
        response.metadata = Some(ConversationMetadata {
            conversation_id: bound.conversation.public_id,
            conversation_created: bound.created,
            conversation_title: bound.conversation.title,
            ask_item_id,
            completion_item_id,
        });
        Ok(response)
    }

    /// Pass-through streaming chat completion. Errors before the upstream
    /// stream is open are returned here; later ones arrive as a
    /// `response.error` frame.
    pub async fn stream_chat_completion(
        &self,
        tenant: &TenantContext,
        mut request: ChatCompletionRequest,
    ) -> GatewayResult<RelayHandle> {
        let selector = ConversationRef::from_value(request.extra.remove(CONVERSATION_FIELD).as_ref())?;
        request.stream = Some(true);
        let (provider, client) = self.client_for_model(&request.model, tenant).await?;
        let found = self.lookup_conversation(tenant, &selector).await?;

        let ctx = self.context();
        let upstream = open_stream(&ctx, client.as_ref(), &request).await?;
        let bound = self
            .bind_conversation(tenant, &selector, found, &request.messages)
            .await?;

        let metadata = match &bound {
            Some(bound) => {
                let ask_item_id = append_messages(
                    self.conversations.as_ref(),
                    &bound.conversation,
                    last_user_message(&request.messages).into_iter(),
                    None,
                )
                .await;
                Some(ConversationMetadata {
                    conversation_id: bound.conversation.public_id.clone(),
                    conversation_created: bound.created,
                    conversation_title: bound.conversation.title.clone(),
                    ask_item_id,
                    completion_item_id: None,
                })
            }
            None => None,
        };

        let (tx, rx) = mpsc::channel(self.relay.data_buffer.max(1));
        let config = self.relay.clone();
        let conversations = self.conversations.clone();
        let task = tokio::spawn(async move {
            let mut sink = ChannelSink::new(tx);
            let mut emitter = PassthroughEmitter::with_metadata(metadata);
            let outcome = relay(&ctx, &config, upstream, &mut emitter, &mut sink).await;
            if outcome.result.is_err() {
                return;
            }

            let response = outcome
                .accumulator
                .into_response(&request.model, &request.messages);
            info!(
                event = "chat_stream_completed",
                provider = %provider.public_id,
                model = %request.model,
                finish_reason = response.choices.first().and_then(|c| c.finish_reason.as_deref()).unwrap_or("stop"),
                total_tokens = response.usage.map(|u| u.total_tokens).unwrap_or_default(),
            );
            if let (Some(bound), Some(message)) = (bound, response.first_message()) {
                append_answer(conversations.as_ref(), &bound.conversation, message, None).await;
            }
        });

        Ok(RelayHandle { frames: rx, task })
    }

    pub async fn create_response(
        &self,
        tenant: &TenantContext,
        request: CreateResponseRequest,
    ) -> GatewayResult<Response> {
        let prepared = self.prepare_response(tenant, &request, false).await?;
        let ctx = self.context();

        let completion = match ctx
            .run(prepared.client.create_chat_completion(&prepared.chat))
            .await
        {
            Ok(Ok(completion)) => completion,
            Ok(Err(err)) => {
                prepared.tracker.fail(err.code(), err.to_string()).await;
                return Err(err.into());
            }
            Err(err) => {
                prepared.tracker.fail(err.code(), err.to_string()).await;
                return Err(err.into());
            }
        };

        let message = completion
            .first_message()
            .cloned()
            .unwrap_or_else(|| ChatMessage::text(ChatRole::Assistant, ""));
        let usage = completion.usage.unwrap_or_else(|| {
            let prompt_tokens = estimate_tokens(&prepared.chat.messages);
            let completion_tokens = estimate_tokens(std::slice::from_ref(&message));
            CompletionUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            }
        });
        let output = unary_output(&message);
        let usage = response_usage(usage);

        prepared
            .tracker
            .update(ResponseUpdates::completed(output.clone(), usage))
            .await;
        if let Some(bound) = &prepared.bound {
            append_answer(
                self.conversations.as_ref(),
                &bound.conversation,
                &message,
                prepared.tracker.row,
            )
            .await;
        }

        Ok(Response {
            id: prepared.tracker.public_id.clone(),
            object: ResponseObjectType::Response,
            created_at: if completion.created > 0 {
                completion.created
            } else {
                time::OffsetDateTime::now_utc().unix_timestamp()
            },
            model: if completion.model.is_empty() {
                request.model
            } else {
                completion.model
            },
            status: ResponseStatus::Completed,
            output,
            usage: Some(usage),
            error: None,
            conversation: prepared.bound.map(|bound| bound.conversation.public_id),
        })
    }

    /// Word-batched `response.*` event stream.
    pub async fn stream_response(
        &self,
        tenant: &TenantContext,
        request: CreateResponseRequest,
    ) -> GatewayResult<RelayHandle> {
        let prepared = self.prepare_response(tenant, &request, true).await?;
        let ctx = self.context();

        let upstream = match open_stream(&ctx, prepared.client.as_ref(), &prepared.chat).await {
            Ok(upstream) => upstream,
            Err(err) => {
                prepared.tracker.fail(err.code(), err.to_string()).await;
                return Err(err.into());
            }
        };

        let conversation_id = prepared
            .bound
            .as_ref()
            .map(|bound| bound.conversation.public_id.clone());
        let mut emitter = ResponsesEmitter::new(
            prepared.tracker.public_id.clone(),
            request.model.clone(),
            prepared.chat.messages.clone(),
            self.relay.min_batch_words,
        )
        .with_conversation(conversation_id);

        let (tx, rx) = mpsc::channel(self.relay.data_buffer.max(1));
        let config = self.relay.clone();
        let conversations = self.conversations.clone();
        let Prepared { tracker, bound, .. } = prepared;
        let task = tokio::spawn(async move {
            let mut sink = ChannelSink::new(tx);
            let outcome = relay(&ctx, &config, upstream, &mut emitter, &mut sink).await;
            match (&outcome.result, emitter.completed()) {
                (Ok(()), Some(response)) => {
                    tracker
                        .update(ResponseUpdates::completed(
                            response.output.clone(),
                            response.usage.unwrap_or_default(),
                        ))
                        .await;
                    if let Some(bound) = &bound {
                        append_answer(
                            conversations.as_ref(),
                            &bound.conversation,
                            &outcome.accumulator.message(),
                            tracker.row,
                        )
                        .await;
                    }
                }
                (Err(err), _) => tracker.fail(err.code(), err.to_string()).await,
                (Ok(()), None) => {
                    let err = RelayError::StreamRead("stream ended without completion".to_string());
                    tracker.fail(err.code(), err.to_string()).await;
                }
            }
        });

        Ok(RelayHandle { frames: rx, task })
    }

    /// Resolution, conversation binding, response row, and the ask items
    /// shared by both `/v1/responses` paths.
    async fn prepare_response(
        &self,
        tenant: &TenantContext,
        request: &CreateResponseRequest,
        stream: bool,
    ) -> GatewayResult<Prepared> {
        let input = input_messages(&request.input);
        if input.is_empty() {
            return Err(GatewayError::bad_request("input is required"));
        }
        let (provider, client) = self.client_for_model(&request.model, tenant).await?;
        let selector = ConversationRef::from_id(request.conversation.as_deref());
        let bound = self.lookup_conversation(tenant, &selector).await?;

        let mut messages = Vec::new();
        if let Some(instructions) = request
            .instructions
            .as_deref()
            .filter(|text| !text.trim().is_empty())
        {
            messages.push(ChatMessage::text(ChatRole::System, instructions));
        }
        if let Some(bound) = &bound {
            messages.extend(self.history(&bound.conversation).await?);
        }
        messages.extend(input.iter().cloned());
        let chat = chat_request(request, messages, stream);

        let tracker = ResponseTracker::create(
            self.responses.clone(),
            NewResponse {
                public_id: new_item_id(RESPONSE_ID_PREFIX),
                organization_id: tenant.effective_organization(),
                conversation_id: bound.as_ref().map(|bound| bound.conversation.id),
                model: request.model.clone(),
                input: serde_json::to_value(&request.input).map_err(StoreError::from)?,
            },
        )
        .await;
        if let Some(bound) = &bound {
            append_messages(
                self.conversations.as_ref(),
                &bound.conversation,
                input.iter(),
                tracker.row,
            )
            .await;
        }
        tracker
            .update(ResponseUpdates::status(ResponseStatus::InProgress))
            .await;
        info!(
            event = "response_started",
            response_id = %tracker.public_id,
            provider = %provider.public_id,
            model = %request.model,
            stream,
        );

        Ok(Prepared {
            client,
            chat,
            tracker,
            bound,
        })
    }

    /// Resolves a selected existing conversation. A conversation of another
    /// organization is reported as not found.
    async fn lookup_conversation(
        &self,
        tenant: &TenantContext,
        selector: &ConversationRef,
    ) -> GatewayResult<Option<BoundConversation>> {
        let ConversationRef::Existing(public_id) = selector else {
            return Ok(None);
        };
        let conversation = self
            .conversations
            .find_conversation(public_id)
            .await?
            .filter(|conversation| {
                conversation.organization_id.is_none()
                    || conversation.organization_id == tenant.effective_organization()
            })
            .ok_or_else(|| StoreError::NotFound(format!("conversation '{public_id}' not found")))?;
        Ok(Some(BoundConversation {
            conversation,
            created: false,
        }))
    }

    /// Settles the conversation once upstream has accepted the request,
    /// creating it when the caller asked for a new one.
    async fn bind_conversation(
        &self,
        tenant: &TenantContext,
        selector: &ConversationRef,
        found: Option<BoundConversation>,
        messages: &[ChatMessage],
    ) -> GatewayResult<Option<BoundConversation>> {
        if found.is_some() || *selector != ConversationRef::New {
            return Ok(found);
        }
        let title = messages
            .iter()
            .find(|message| message.role == ChatRole::User)
            .map(|message| conversation_title(&message.content_text()))
            .filter(|title| !title.is_empty());
        let conversation = self
            .conversations
            .create_conversation(tenant, title)
            .await?;
        info!(event = "conversation_created", conversation_id = %conversation.public_id);
        Ok(Some(BoundConversation {
            conversation,
            created: true,
        }))
    }

    /// Prior message items of `conversation` as chat messages.
    async fn history(&self, conversation: &Conversation) -> GatewayResult<Vec<ChatMessage>> {
        let items = self.conversations.list_items(conversation).await?;
        Ok(items
            .into_iter()
            .filter(|item| item.item_type == ConversationItemType::Message)
            .filter_map(|item| {
                let role = match item.role? {
                    ItemRole::System => ChatRole::System,
                    ItemRole::User => ChatRole::User,
                    ItemRole::Assistant => ChatRole::Assistant,
                    ItemRole::Tool => return None,
                };
                let text: String = item
                    .content
                    .iter()
                    .filter(|block| !matches!(block, ContentBlock::ReasoningText { .. }))
                    .map(ContentBlock::text)
                    .collect();
                Some(ChatMessage::text(role, text))
            })
            .collect())
    }

    pub async fn list_models(&self, tenant: &TenantContext) -> GatewayResult<ModelList> {
        let providers: HashMap<i64, String> = self
            .registry
            .list_accessible_providers(tenant)
            .await?
            .into_iter()
            .map(|provider| (provider.id, provider.slug))
            .collect();
        let models = self.registry.list_accessible_models(tenant).await?;

        let data = models
            .into_iter()
            .map(|model| {
                let mut raw = Map::new();
                raw.insert("object".to_string(), Value::from("model"));
                raw.insert(
                    "created".to_string(),
                    Value::from(model.created_at.unix_timestamp()),
                );
                raw.insert("display_name".to_string(), Value::from(model.display_name));
                if let Some(owner) = providers.get(&model.provider_id) {
                    raw.insert("owned_by".to_string(), Value::from(owner.as_str()));
                }
                raw.insert("id".to_string(), Value::from(model.model_key));
                UpstreamModel::from(raw)
            })
            .collect();
        Ok(ModelList::new(data))
    }

    /// Pulls the provider's upstream listing and upserts it.
    pub async fn sync_provider(&self, public_id: &str) -> GatewayResult<SyncedProvider> {
        let provider = self.registry.find_by_public_id(public_id).await?;
        let client = self.clients.client_for(&provider)?;
        let ctx = self.context();
        let upstream = ctx.run(client.list_models()).await??;
        Ok(self
            .registry
            .sync_provider_models(provider, &upstream)
            .await?)
    }
}

struct Prepared {
    client: Arc<dyn InferenceClient>,
    chat: ChatCompletionRequest,
    tracker: ResponseTracker,
    bound: Option<BoundConversation>,
}

fn last_user_message(messages: &[ChatMessage]) -> Option<&ChatMessage> {
    messages
        .iter()
        .rev()
        .find(|message| message.role == ChatRole::User)
}

fn conversation_title(text: &str) -> String {
    text.trim().chars().take(TITLE_CHARS).collect()
}

pub fn input_messages(input: &ResponseInput) -> Vec<ChatMessage> {
    match input {
        ResponseInput::Text(text) if text.trim().is_empty() => Vec::new(),
        ResponseInput::Text(text) => vec![ChatMessage::text(ChatRole::User, text.clone())],
        ResponseInput::Messages(messages) => messages
            .iter()
            .map(|message| ChatMessage {
                content: Some(message.content.clone()),
                ..ChatMessage::text(message.role, "")
            })
            .collect(),
    }
}

fn chat_request(
    request: &CreateResponseRequest,
    messages: Vec<ChatMessage>,
    stream: bool,
) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: request.model.clone(),
        messages,
        stream: Some(stream),
        temperature: request.temperature,
        top_p: request.top_p,
        max_tokens: request.max_output_tokens,
        stop: None,
        tools: request.tools.clone(),
        tool_choice: request.tool_choice.clone(),
        extra: request.extra.clone(),
    }
}

fn item_role(role: ChatRole) -> ItemRole {
    match role {
        ChatRole::System | ChatRole::Developer => ItemRole::System,
        ChatRole::User => ItemRole::User,
        ChatRole::Assistant => ItemRole::Assistant,
        ChatRole::Tool | ChatRole::Function => ItemRole::Tool,
    }
}

/// Appends caller messages; returns the public id of the last one written.
async fn append_messages<'a>(
    store: &dyn ConversationStore,
    conversation: &Conversation,
    messages: impl Iterator<Item = &'a ChatMessage>,
    response_id: Option<i64>,
) -> Option<String> {
    let mut last = None;
    for message in messages {
        let text = message.content_text();
        let block = if message.role == ChatRole::Assistant {
            ContentBlock::OutputText { text }
        } else {
            ContentBlock::InputText { text }
        };
        let item = NewConversationItem::message(
            item_role(message.role),
            vec![block],
            ConversationItemStatus::Completed,
        )
        .for_response(response_id);
        match store.append_item(conversation, item).await {
            Ok(item) => last = Some(item.public_id),
            Err(err) => {
                warn!(event = "persist_failed", conversation_id = %conversation.public_id, step = "append_ask", error = %err);
            }
        }
    }
    last
}

/// Appends the assistant message when it carries content or reasoning.
async fn append_answer(
    store: &dyn ConversationStore,
    conversation: &Conversation,
    message: &ChatMessage,
    response_id: Option<i64>,
) -> Option<String> {
    let mut content = Vec::new();
    if let Some(reasoning) = message
        .reasoning_content
        .as_deref()
        .filter(|text| !text.is_empty())
    {
        content.push(ContentBlock::ReasoningText {
            text: reasoning.to_string(),
        });
    }
    let text = message.content_text();
    if !text.is_empty() {
        content.push(ContentBlock::OutputText { text });
    }
    if content.is_empty() {
        return None;
    }

    let item = NewConversationItem::message(
        ItemRole::Assistant,
        content,
        ConversationItemStatus::Completed,
    )
    .for_response(response_id);
    match store.append_item(conversation, item).await {
        Ok(item) => Some(item.public_id),
        Err(err) => {
            warn!(event = "persist_failed", conversation_id = %conversation.public_id, step = "append_answer", error = %err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelgate_protocol::chat::MessageContent;
    use serde_json::json;

    #[test]
    fn conversation_selector_forms() {
        assert_eq!(ConversationRef::from_value(None).unwrap(), ConversationRef::None);
        assert_eq!(
            ConversationRef::from_value(Some(&json!(true))).unwrap(),
            ConversationRef::New
        );
        assert_eq!(
            ConversationRef::from_value(Some(&json!(" conv_1 "))).unwrap(),
            ConversationRef::Existing("conv_1".to_string())
        );
        assert!(ConversationRef::from_value(Some(&json!(7))).is_err());
    }

    #[test]
    fn text_input_becomes_one_user_message() {
        let messages = input_messages(&ResponseInput::Text("hi".to_string()));
        assert_eq!(messages, vec![ChatMessage::text(ChatRole::User, "hi")]);
        assert!(input_messages(&ResponseInput::Text("  ".to_string())).is_empty());
    }

    #[test]
    fn titles_are_truncated_on_char_boundaries() {
        let title = conversation_title(&"é".repeat(100));
        assert_eq!(title.chars().count(), TITLE_CHARS);
    }

    #[test]
    fn message_content_survives_input_conversion() {
        let input = ResponseInput::Messages(vec![modelgate_protocol::responses::InputMessage {
            kind: None,
            role: ChatRole::Developer,
            content: MessageContent::Text("be brief".to_string()),
        }]);
        let messages = input_messages(&input);
        assert_eq!(messages[0].role, ChatRole::Developer);
        assert_eq!(messages[0].content_text(), "be brief");
    }
}
