use std::sync::Arc;

use serde_json::{Value, json};

use modelgate_common::SecretCipher;
use modelgate_protocol::models::UpstreamModel;
use modelgate_provider_core::{
    CatalogService, CatalogStatus, MemoryModelCatalogRepository, MemoryProviderModelRepository,
    MemoryProviderRepository, ModelCatalogRepository, PriceUnit, ProviderError, ProviderKind,
    ProviderRegistry, RegisterProviderInput, TenantContext,
};

fn upstream(value: Value) -> UpstreamModel {
    UpstreamModel::from(value.as_object().cloned().unwrap())
}

fn openrouter_model() -> UpstreamModel {
    upstream(json!({
        "id": "openai/gpt-4o-mini",
        "canonical_slug": "openai/gpt-4o-mini-2024-07-18",
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
            {"unit": "per_image", "amount": "0.001"},
            {"unit": "per_request"}
        ]},
        "top_provider": {"context_length": 128000, "max_completion_tokens": 16384, "is_moderated": true},
        "supported_parameters": ["tools", "temperature", "include_reasoning"]
    }))
}

async fn registered(kind: &str) -> (ProviderRegistry, modelgate_provider_core::Provider) {
    let registry = ProviderRegistry::new(
        Arc::new(MemoryProviderRepository::default()),
        Arc::new(MemoryModelCatalogRepository::default()),
        Arc::new(MemoryProviderModelRepository::default()),
        Some(SecretCipher::new("sync-secret")),
    );
    let provider = registry
        .register_provider(
            &TenantContext::new(Some(1), Vec::new()),
            RegisterProviderInput {
                name: "Sync".to_string(),
                vendor: kind.to_string(),
                base_url: "https://openrouter.ai/api/v1".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .provider;
    (registry, provider)
}

#[tokio::test]
async fn sync_is_idempotent() {
    let (registry, provider) = registered("openrouter").await;
    let models = [openrouter_model()];

    let first = registry
        .sync_provider_models(provider, &models)
        .await
        .unwrap();
    let second = registry
        .sync_provider_models(first.provider.clone(), &models)
        .await
        .unwrap();

    assert_eq!(first.models.len(), 1);
    assert_eq!(second.models.len(), 1);
    assert_eq!(first.models[0].id, second.models[0].id);
    assert_eq!(first.models[0].public_id, second.models[0].public_id);
    assert_eq!(first.models[0].model_catalog_id, second.models[0].model_catalog_id);

    let tenant = TenantContext::new(Some(1), Vec::new());
    assert_eq!(registry.list_accessible_models(&tenant).await.unwrap().len(), 1);
}

#[tokio::test]
async fn synced_model_carries_pricing_limits_and_capabilities() {
    let (registry, provider) = registered("openrouter").await;
    let synced = registry
        .sync_provider_models(provider, &[openrouter_model()])
        .await
        .unwrap();
    let model = &synced.models[0];

    assert!(model.public_id.starts_with("pmdl_"));
    assert_eq!(model.model_key, "openai/gpt-4o-mini");
    assert_eq!(model.display_name, "OpenAI: GPT-4o mini");
    assert_eq!(model.family.as_deref(), Some("openai"));
    assert!(model.supports_images);
    assert!(model.supports_reasoning);
    assert!(model.active);

    let limits = model.token_limits.as_ref().unwrap();
    assert_eq!(limits.context_length, 128000);
    assert_eq!(limits.max_completion_tokens, 16384);

    let prompt = model
        .pricing
        .lines
        .iter()
        .find(|line| line.unit == PriceUnit::Per1kPromptTokens)
        .unwrap();
    assert_eq!(prompt.amount.0, 500_000);
    assert_eq!(model.pricing.lines.len(), 2);
    let image = model
        .pricing
        .lines
        .iter()
        .find(|line| line.unit == PriceUnit::PerImage)
        .unwrap();
    assert_eq!(image.amount.0, 1000);
}

#[tokio::test]
async fn settled_catalog_rows_are_not_regressed() {
    let repo = Arc::new(MemoryModelCatalogRepository::default());
    let service = CatalogService::new(repo.clone());
    let model = openrouter_model();

    let rich = service
        .upsert_catalog(ProviderKind::OpenRouter, &model)
        .await
        .unwrap();
    assert_eq!(rich.status, CatalogStatus::Filled);
    assert_eq!(rich.public_id, "openai-gpt-4o-mini-2024-07-18");

    let again = service
        .upsert_catalog(ProviderKind::OpenAi, &model)
        .await
        .unwrap();
    assert_eq!(again.id, rich.id);
    assert_eq!(again.status, CatalogStatus::Filled);

    let stored = repo
        .find_by_public_id(&rich.public_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, CatalogStatus::Filled);
    assert_eq!(stored.architecture.tokenizer, "GPT");
}

#[tokio::test]
async fn init_rows_are_upgraded_by_richer_vendors() {
    let repo = Arc::new(MemoryModelCatalogRepository::default());
    let service = CatalogService::new(repo.clone());
    let model = openrouter_model();

    let plain = service
        .upsert_catalog(ProviderKind::OpenAi, &model)
        .await
        .unwrap();
    assert_eq!(plain.status, CatalogStatus::Init);

    let upgraded = service
        .upsert_catalog(ProviderKind::OpenRouter, &model)
        .await
        .unwrap();
    assert_eq!(upgraded.id, plain.id);
    assert_eq!(upgraded.created_at, plain.created_at);
    assert_eq!(upgraded.status, CatalogStatus::Filled);
}

#[tokio::test]
async fn model_without_identifier_fails_the_sync() {
    let (registry, provider) = registered("openai").await;
    let err = registry
        .sync_provider_models(provider, &[upstream(json!({"id": "  "}))])
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::SyncFailed { .. }));
    assert_eq!(err.code(), "validation_error");
}
