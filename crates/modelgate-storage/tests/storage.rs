use std::sync::Arc;

use serde_json::{Value, json};

use modelgate_core::{
    ContentBlock, ConversationItemStatus, ConversationStore, ItemRole, NewConversationItem,
    NewResponse, ResponseStore, ResponseUpdates,
};
use modelgate_protocol::models::UpstreamModel;
use modelgate_protocol::responses::{ResponseStatus, ResponseUsage};
use modelgate_provider_core::{
    PriceUnit, ProviderRegistry, ProviderRepository, RegisterProviderInput, StoreError,
    TenantContext, UpdateProviderInput,
};
use modelgate_storage::SeaOrmStorage;

async fn storage() -> Arc<SeaOrmStorage> {
    let storage = SeaOrmStorage::connect("sqlite::memory:").await.unwrap();
    storage.sync().await.unwrap();
    Arc::new(storage)
}

fn registry(storage: &Arc<SeaOrmStorage>) -> ProviderRegistry {
    ProviderRegistry::new(storage.clone(), storage.clone(), storage.clone(), None)
}

fn tenant() -> TenantContext {
    TenantContext::new(Some(1), Vec::new())
}

fn openrouter_model() -> UpstreamModel {
    UpstreamModel::from(
        json!({
            "id": "openai/gpt-4o-mini",
            "name": "OpenAI: GPT-4o mini",
            "context_length": 128000,
            "architecture": {
                "modality": "text+image->text",
                "input_modalities": ["text", "image"],
                "output_modalities": ["text"],
                "tokenizer": "GPT"
            },
            "pricing": {"lines": [
                {"unit": "per_1k_prompt_tokens", "amount": 0.5},
                {"unit": "per_image", "amount": "0.001"}
            ]},
            "top_provider": {"context_length": 128000, "max_completion_tokens": 16384},
            "supported_parameters": ["tools", "include_reasoning"]
        })
        .as_object()
        .cloned()
        .unwrap(),
    )
}

fn register_input(name: &str, vendor: &str) -> RegisterProviderInput {
    RegisterProviderInput {
        name: name.to_string(),
        vendor: vendor.to_string(),
        base_url: "https://openrouter.ai/api/v1".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn sync_again_is_harmless() {
    let storage = storage().await;
    storage.sync().await.unwrap();
    storage.health().await.unwrap();
}

#[tokio::test]
async fn registry_round_trips_providers_and_models() {
    let storage = storage().await;
    let registry = registry(&storage);

    let provider = registry
        .register_provider(&tenant(), register_input("Router", "openrouter"))
        .await
        .unwrap()
        .provider;
    assert!(provider.id > 0);

    let models = [openrouter_model()];
    let first = registry
        .sync_provider_models(provider, &models)
        .await
        .unwrap();
    let second = registry
        .sync_provider_models(first.provider.clone(), &models)
        .await
        .unwrap();
    assert_eq!(first.models[0].id, second.models[0].id);
    assert_eq!(first.models[0].model_catalog_id, second.models[0].model_catalog_id);

    let listed = registry.list_accessible_models(&tenant()).await.unwrap();
    assert_eq!(listed.len(), 1);
    let model = &listed[0];
    assert_eq!(model.model_key, "openai/gpt-4o-mini");
    assert!(model.supports_images);
    assert_eq!(model.token_limits.unwrap().max_completion_tokens, 16384);
    assert!(
        model
            .pricing
            .lines
            .iter()
            .any(|line| line.unit == PriceUnit::Per1kPromptTokens && line.amount.0 == 500_000)
    );

    let stored = storage
        .find_by_public_id(&second.provider.public_id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.last_synced_at.is_some());
    assert_eq!(stored.slug, second.provider.slug);

    let resolved = registry
        .get_provider_for_model("openai/gpt-4o-mini", &tenant())
        .await
        .unwrap();
    assert_eq!(resolved.id, stored.id);
}

#[tokio::test]
async fn deactivation_hides_models_from_resolution() {
    let storage = storage().await;
    let registry = registry(&storage);
    let provider = registry
        .register_provider(&tenant(), register_input("Router", "openrouter"))
        .await
        .unwrap()
        .provider;
    let synced = registry
        .sync_provider_models(provider, &[openrouter_model()])
        .await
        .unwrap();

    registry
        .update_provider(
            synced.provider,
            UpdateProviderInput {
                active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(registry.list_accessible_models(&tenant()).await.unwrap().is_empty());
    assert!(
        registry
            .get_provider_for_model("openai/gpt-4o-mini", &tenant())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn second_provider_of_same_vendor_in_scope_conflicts() {
    let storage = storage().await;
    let registry = registry(&storage);
    registry
        .register_provider(&tenant(), register_input("Router", "openrouter"))
        .await
        .unwrap();
    let err = registry
        .register_provider(&tenant(), register_input("Router Two", "openrouter"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "conflict");
}

#[tokio::test]
async fn conversation_items_are_listed_in_append_order() {
    let storage = storage().await;
    let conversation = storage
        .create_conversation(&tenant(), Some("hello".to_string()))
        .await
        .unwrap();
    assert!(conversation.public_id.starts_with("conv_"));
    assert_eq!(conversation.organization_id, Some(1));

    for (role, text) in [(ItemRole::User, "hi"), (ItemRole::Assistant, "hello there")] {
        let block = match role {
            ItemRole::User => ContentBlock::InputText { text: text.into() },
            _ => ContentBlock::OutputText { text: text.into() },
        };
        storage
            .append_item(
                &conversation,
                NewConversationItem::message(role, vec![block], ConversationItemStatus::Completed),
            )
            .await
            .unwrap();
    }

    let found = storage
        .find_conversation(&conversation.public_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.title.as_deref(), Some("hello"));

    let items = storage.list_items(&found).await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].role, Some(ItemRole::User));
    assert_eq!(items[1].content[0].text(), "hello there");
    assert!(items[0].public_id.starts_with("msg_"));

    assert!(storage.find_conversation("conv_missing").await.unwrap().is_none());
}

#[tokio::test]
async fn appending_to_unknown_conversation_is_not_found() {
    let storage = storage().await;
    let mut conversation = storage.create_conversation(&tenant(), None).await.unwrap();
    conversation.id += 100;
    let err = storage
        .append_item(
            &conversation,
            NewConversationItem::message(ItemRole::User, Vec::new(), ConversationItemStatus::Completed),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn response_lifecycle_is_persisted() {
    let storage = storage().await;
    let created = storage
        .create_response(NewResponse {
            public_id: "resp_abc".to_string(),
            organization_id: Some(1),
            conversation_id: None,
            model: "m".to_string(),
            input: Value::String("hi".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(created.status, ResponseStatus::Pending);

    storage
        .update_response(created.id, ResponseUpdates::status(ResponseStatus::InProgress))
        .await
        .unwrap();
    let usage = ResponseUsage {
        input_tokens: 1,
        output_tokens: 2,
        total_tokens: 3,
    };
    storage
        .update_response(created.id, ResponseUpdates::completed(Vec::new(), usage))
        .await
        .unwrap();

    let stored = storage.find_response("resp_abc").await.unwrap().unwrap();
    assert_eq!(stored.status, ResponseStatus::Completed);
    assert!(stored.completed_at.is_some());
    assert_eq!(stored.usage, Some(usage));
    assert_eq!(stored.output, Some(Vec::new()));
    assert_eq!(stored.input, Value::String("hi".to_string()));

    let duplicate = storage
        .create_response(NewResponse {
            public_id: "resp_abc".to_string(),
            organization_id: None,
            conversation_id: None,
            model: "m".to_string(),
            input: Value::Null,
        })
        .await
        .unwrap_err();
    assert!(matches!(duplicate, StoreError::Conflict(_)));

    let missing = storage
        .update_response(created.id + 1, ResponseUpdates::status(ResponseStatus::Failed))
        .await
        .unwrap_err();
    assert!(matches!(missing, StoreError::NotFound(_)));
}
