mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use modelgate_core::{
    ContentBlock, ConversationStore, Gateway, GatewayState, ItemRole, MemoryConversationStore,
    MemoryResponseStore, RelayConfig, RelayHandle, ResponseStore, gateway_router,
};
use modelgate_protocol::chat::{ChatCompletionRequest, ChatCompletionResponse};
use modelgate_protocol::models::UpstreamModel;
use modelgate_protocol::responses::{CreateResponseRequest, OutputItem, ResponseStatus};
use modelgate_provider_core::{
    MemoryModelCatalogRepository, MemoryProviderModelRepository, MemoryProviderRepository,
    ProviderRegistry, RegisterProviderInput, TenantContext,
};

use common::{StubClient, StubFactory, StubStream, content, done, events};

struct Harness {
    gateway: Arc<Gateway>,
    client: Arc<StubClient>,
    conversations: Arc<MemoryConversationStore>,
    responses: Arc<MemoryResponseStore>,
    provider_id: String,
}

fn tenant() -> TenantContext {
    TenantContext::new(Some(1), Vec::new())
}

async fn harness(mut client: StubClient) -> Harness {
    client.models = vec![UpstreamModel::from(
        json!({"id": "m", "object": "model"}).as_object().cloned().unwrap(),
    )];
    let client = Arc::new(client);
    let registry = ProviderRegistry::new(
        Arc::new(MemoryProviderRepository::default()),
        Arc::new(MemoryModelCatalogRepository::default()),
        Arc::new(MemoryProviderModelRepository::default()),
        None,
    );
    let conversations = Arc::new(MemoryConversationStore::default());
    let responses = Arc::new(MemoryResponseStore::default());
    let gateway = Arc::new(Gateway::new(
        registry,
        Arc::new(StubFactory(client.clone())),
        conversations.clone(),
        responses.clone(),
        RelayConfig::default(),
    ));

    let registered = gateway
        .registry()
        .register_provider(
            &tenant(),
            RegisterProviderInput {
                name: "Local".to_string(),
                vendor: "custom".to_string(),
                base_url: "http://localhost:9000/v1".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let provider_id = registered.provider.public_id;
    let synced = gateway.sync_provider(&provider_id).await.unwrap();
    assert_eq!(synced.models.len(), 1);

    Harness {
        gateway,
        client,
        conversations,
        responses,
        provider_id,
    }
}

fn chat_request(extra: Value) -> ChatCompletionRequest {
    let mut body = json!({
        "model": "m",
        "messages": [{"role": "user", "content": "hi"}],
        "stream": true,
    });
    if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        body.extend(extra.clone());
    }
    serde_json::from_value(body).unwrap()
}

fn response_request(stream: bool, conversation: Option<&str>) -> CreateResponseRequest {
    serde_json::from_value(json!({
        "model": "m",
        "input": "hi",
        "stream": stream,
        "conversation": conversation,
    }))
    .unwrap()
}

async fn drain(mut handle: RelayHandle) -> String {
    let mut text = String::new();
    while let Some(frame) = tokio::time::timeout(Duration::from_secs(5), handle.frames.recv())
        .await
        .unwrap()
    {
        text.push_str(&String::from_utf8_lossy(&frame));
    }
    handle.task.await.unwrap();
    text
}

fn hello_stream() -> StubClient {
    StubClient::new(StubStream::Chunks(vec![content("He"), content("llo"), done()]))
}

#[tokio::test]
async fn streamed_chat_completion_passes_upstream_through() {
    let h = harness(hello_stream()).await;
    let handle = h
        .gateway
        .stream_chat_completion(&tenant(), chat_request(json!({})))
        .await
        .unwrap();
    let text = drain(handle).await;

    let upstream = format!("{}{}{}", content("He"), content("llo"), done());
    assert_eq!(text, format!("{}\n", upstream.trim_end_matches('\n')));
    assert!(h.client.dropped.load(std::sync::atomic::Ordering::SeqCst));
}

#[tokio::test]
async fn chat_stream_with_new_conversation_records_both_turns() {
    let h = harness(hello_stream()).await;
    let handle = h
        .gateway
        .stream_chat_completion(&tenant(), chat_request(json!({"conversation": true})))
        .await
        .unwrap();
    let text = drain(handle).await;

    let (name, metadata) = events(&text).into_iter().next().unwrap();
    assert_eq!(name, "conversation.metadata");
    assert_eq!(metadata["conversation_created"], true);
    assert_eq!(metadata["conversation_title"], "hi");
    assert!(metadata["ask_item_id"].as_str().unwrap().starts_with("msg_"));

    let conversation = h
        .conversations
        .find_conversation(metadata["conversation_id"].as_str().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conversation.organization_id, Some(1));
    let items = h.conversations.list_items(&conversation).await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].role, Some(ItemRole::User));
    assert_eq!(items[1].role, Some(ItemRole::Assistant));
    assert_eq!(
        items[1].content,
        vec![ContentBlock::OutputText {
            text: "Hello".to_string()
        }]
    );
}

#[tokio::test]
async fn unknown_conversation_is_rejected_before_streaming() {
    let h = harness(hello_stream()).await;
    let err = h
        .gateway
        .stream_chat_completion(&tenant(), chat_request(json!({"conversation": "conv_missing"})))
        .await
        .err()
        .unwrap();
    assert_eq!(err.code(), "not_found");
    assert_eq!(h.client.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rejected_stream_leaves_no_new_conversation() {
    let h = harness(StubClient::new(StubStream::Status(500))).await;
    let err = h
        .gateway
        .stream_chat_completion(&tenant(), chat_request(json!({"conversation": true})))
        .await
        .err()
        .unwrap();
    assert_eq!(err.code(), "upstream_error");
    assert!(h.conversations.is_empty().await);
}

fn unary_client() -> StubClient {
    let mut client = StubClient::new(StubStream::Chunks(Vec::new()));
    client.unary = Some(
        serde_json::from_value(json!({
            "id": "chatcmpl-2",
            "created": 7,
            "model": "m",
            "choices": [{
                "index": 0,
                "finish_reason": "stop",
                "message": {"role": "assistant", "content": "Hello"}
            }]
        }))
        .unwrap(),
    );
    client
}

#[tokio::test]
async fn unary_chat_with_new_conversation_records_both_turns() {
    let h = harness(unary_client()).await;
    let response = h
        .gateway
        .chat_completion(
            &tenant(),
            chat_request(json!({"stream": false, "conversation": true})),
        )
        .await
        .unwrap();
    assert_eq!(response.first_message().unwrap().content_text(), "Hello");

    let metadata = response.metadata.unwrap();
    assert!(metadata.conversation_created);
    assert_eq!(metadata.conversation_title.as_deref(), Some("hi"));

    let conversation = h
        .conversations
        .find_conversation(&metadata.conversation_id)
        .await
        .unwrap()
        .unwrap();
    let items = h.conversations.list_items(&conversation).await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].role, Some(ItemRole::User));
    assert_eq!(metadata.ask_item_id.as_deref(), Some(items[0].public_id.as_str()));
    assert_eq!(
        metadata.completion_item_id.as_deref(),
        Some(items[1].public_id.as_str())
    );
    assert_eq!(
        items[1].content,
        vec![ContentBlock::OutputText {
            text: "Hello".to_string()
        }]
    );
}

#[tokio::test]
async fn unary_chat_appends_to_existing_conversation() {
    let h = harness(unary_client()).await;
    let conversation = h
        .conversations
        .create_conversation(&tenant(), None)
        .await
        .unwrap();

    let response = h
        .gateway
        .chat_completion(
            &tenant(),
            chat_request(json!({"stream": false, "conversation": conversation.public_id})),
        )
        .await
        .unwrap();

    let metadata = response.metadata.unwrap();
    assert_eq!(metadata.conversation_id, conversation.public_id);
    assert!(!metadata.conversation_created);
    assert_eq!(h.conversations.list_items(&conversation).await.unwrap().len(), 2);
}

#[tokio::test]
async fn unary_chat_without_conversation_is_untouched() {
    let h = harness(unary_client()).await;
    let response = h
        .gateway
        .chat_completion(&tenant(), chat_request(json!({"stream": false})))
        .await
        .unwrap();
    assert!(response.metadata.is_none());
    assert!(serde_json::to_value(&response).unwrap().get("metadata").is_none());
    assert!(h.conversations.is_empty().await);
}

#[tokio::test]
async fn unary_chat_rejects_malformed_conversation() {
    let h = harness(unary_client()).await;
    let err = h
        .gateway
        .chat_completion(
            &tenant(),
            chat_request(json!({"stream": false, "conversation": 7})),
        )
        .await
        .err()
        .unwrap();
    assert_eq!(err.code(), "validation_error");
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(h.client.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_unary_chat_leaves_no_new_conversation() {
    let h = harness(StubClient::new(StubStream::Chunks(Vec::new()))).await;
    let err = h
        .gateway
        .chat_completion(
            &tenant(),
            chat_request(json!({"stream": false, "conversation": true})),
        )
        .await
        .err()
        .unwrap();
    assert_eq!(err.code(), "upstream_error");
    assert!(h.conversations.is_empty().await);
}

#[tokio::test]
async fn streamed_response_is_persisted_as_completed() {
    let h = harness(hello_stream()).await;
    let conversation = h
        .conversations
        .create_conversation(&tenant(), None)
        .await
        .unwrap();

    let handle = h
        .gateway
        .stream_response(&tenant(), response_request(true, Some(&conversation.public_id)))
        .await
        .unwrap();
    let text = drain(handle).await;

    let events = events(&text);
    let created = &events[0].1["response"];
    assert_eq!(created["conversation"], conversation.public_id.as_str());
    let response_id = created["id"].as_str().unwrap();
    assert!(response_id.starts_with("resp_"));

    let stored = h.responses.find_response(response_id).await.unwrap().unwrap();
    assert_eq!(stored.status, ResponseStatus::Completed);
    assert!(stored.completed_at.is_some());
    assert_eq!(stored.conversation_id, Some(conversation.id));
    let usage = stored.usage.unwrap();
    assert_eq!((usage.input_tokens, usage.output_tokens), (1, 1));
    assert!(matches!(&stored.output.unwrap()[0], OutputItem::Message(_)));

    let items = h.conversations.list_items(&conversation).await.unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|item| item.response_id == Some(stored.id)));
}

#[tokio::test]
async fn upstream_rejection_before_streaming_is_an_http_error() {
    let h = harness(StubClient::new(StubStream::Status(500))).await;
    let err = h
        .gateway
        .stream_response(&tenant(), response_request(true, None))
        .await
        .err()
        .unwrap();
    assert_eq!(err.code(), "upstream_error");
    assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    assert!(err.to_string().contains("Stub: streaming request failed with status 500"));
}

#[tokio::test]
async fn unary_response_orders_reasoning_before_message() {
    let mut client = StubClient::new(StubStream::Chunks(Vec::new()));
    let completion: ChatCompletionResponse = serde_json::from_value(json!({
        "id": "chatcmpl-9",
        "created": 5,
        "model": "m-2025",
        "choices": [{
            "index": 0,
            "finish_reason": "stop",
            "message": {"role": "assistant", "content": "Hi there", "reasoning_content": "greet back"}
        }]
    }))
    .unwrap();
    client.unary = Some(completion);
    let h = harness(client).await;

    let response = h
        .gateway
        .create_response(&tenant(), response_request(false, None))
        .await
        .unwrap();

    assert_eq!(response.status, ResponseStatus::Completed);
    assert_eq!(response.model, "m-2025");
    assert_eq!(response.output.len(), 2);
    assert!(matches!(&response.output[0], OutputItem::Reasoning(_)));
    assert!(matches!(&response.output[1], OutputItem::Message(_)));
    let usage = response.usage.unwrap();
    assert_eq!((usage.input_tokens, usage.output_tokens, usage.total_tokens), (1, 2, 3));

    let stored = h.responses.find_response(&response.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ResponseStatus::Completed);
}

#[tokio::test]
async fn unresolvable_model_is_not_found() {
    let h = harness(hello_stream()).await;
    let mut request = chat_request(json!({}));
    request.model = "gpt-unknown".to_string();
    let err = h
        .gateway
        .stream_chat_completion(&tenant(), request)
        .await
        .err()
        .unwrap();
    assert_eq!(err.code(), "model_not_found");
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn model_listing_names_the_owning_provider() {
    let h = harness(hello_stream()).await;
    let list = h.gateway.list_models(&tenant()).await.unwrap();
    assert_eq!(list.data.len(), 1);
    assert_eq!(list.data[0].id, "m");
    assert_eq!(list.data[0].owned_by.as_deref(), Some("custom-local"));
    assert!(!h.provider_id.is_empty());
}

fn state(gateway: Arc<Gateway>) -> GatewayState {
    GatewayState {
        gateway,
        admin_key: Arc::from("admin-secret"),
        default_organization_id: None,
    }
}

#[tokio::test]
async fn routes_enforce_admin_key_and_tenant_headers() {
    let h = harness(hello_stream()).await;
    let app = gateway_router(state(h.gateway.clone()));

    let health = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    let denied = app
        .clone()
        .oneshot(
            Request::get("/admin/providers")
                .header("x-organization-id", "1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let listed = app
        .clone()
        .oneshot(
            Request::get("/admin/providers")
                .header("x-organization-id", "1")
                .header("authorization", "Bearer admin-secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(listed.status(), StatusCode::OK);
    let body = axum::body::to_bytes(listed.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["data"][0]["public_id"], h.provider_id.as_str());
    assert!(body["data"][0].get("encrypted_api_key").is_none());

    let models = app
        .clone()
        .oneshot(
            Request::get("/v1/models")
                .header("x-organization-id", "1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(models.status(), StatusCode::OK);

    let invalid = app
        .oneshot(
            Request::post("/v1/chat/completions")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
    let body = axum::body::to_bytes(invalid.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"]["code"], "validation_error");
}
