use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use modelgate_common::generate_public_id;
use modelgate_protocol::models::UpstreamModel;

use crate::catalog::ModelCatalog;
use crate::errors::{ProviderError, ProviderResult};
use crate::extract;
use crate::provider::Provider;
use crate::repository::ProviderModelRepository;

pub const MICROS_PER_USD: i64 = 1_000_000;

/// Fixed-point price: 1,000,000 units are one US dollar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MicroUsd(pub i64);

impl MicroUsd {
    /// Multiplies by one million and truncates toward zero.
    pub fn from_usd(amount: f64) -> Self {
        MicroUsd((amount * MICROS_PER_USD as f64) as i64)
    }

    pub fn as_usd(self) -> f64 {
        self.0 as f64 / MICROS_PER_USD as f64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceUnit {
    #[serde(rename = "per_1k_prompt_tokens")]
    Per1kPromptTokens,
    #[serde(rename = "per_1k_completion_tokens")]
    Per1kCompletionTokens,
    PerRequest,
    PerImage,
    PerWebSearch,
    PerInternalReasoning,
    #[serde(untagged)]
    Other(String),
}

impl PriceUnit {
    pub fn parse(unit: &str) -> Self {
        match unit.trim().to_ascii_lowercase().as_str() {
            "per_1k_prompt_tokens" => PriceUnit::Per1kPromptTokens,
            "per_1k_completion_tokens" => PriceUnit::Per1kCompletionTokens,
            "per_request" => PriceUnit::PerRequest,
            "per_image" => PriceUnit::PerImage,
            "per_web_search" => PriceUnit::PerWebSearch,
            "per_internal_reasoning" => PriceUnit::PerInternalReasoning,
            other => PriceUnit::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLine {
    pub unit: PriceUnit,
    #[serde(rename = "amount_micro_usd")]
    pub amount: MicroUsd,
    pub currency: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pricing {
    #[serde(default)]
    pub lines: Vec<PriceLine>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenLimits {
    pub context_length: i64,
    pub max_completion_tokens: i64,
}

/// A provider's exposure of one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderModel {
    pub id: i64,
    pub public_id: String,
    pub provider_id: i64,
    pub model_catalog_id: Option<i64>,
    pub model_key: String,
    pub display_name: String,
    pub pricing: Pricing,
    pub token_limits: Option<TokenLimits>,
    pub family: Option<String>,
    pub supports_images: bool,
    pub supports_embeddings: bool,
    pub supports_reasoning: bool,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderModelFilter {
    pub provider_id: Option<i64>,
    pub provider_ids: Option<Vec<i64>>,
    pub model_catalog_id: Option<i64>,
    pub model_key: Option<String>,
    pub active: Option<bool>,
}

impl ProviderModelFilter {
    pub fn matches(&self, model: &ProviderModel) -> bool {
        if let Some(provider_id) = self.provider_id
            && model.provider_id != provider_id
        {
            return false;
        }
        if let Some(ids) = &self.provider_ids
            && !ids.contains(&model.provider_id)
        {
            return false;
        }
        if let Some(catalog_id) = self.model_catalog_id
            && model.model_catalog_id != Some(catalog_id)
        {
            return false;
        }
        if let Some(key) = &self.model_key
            && &model.model_key != key
        {
            return false;
        }
        if let Some(active) = self.active
            && model.active != active
        {
            return false;
        }
        true
    }
}

/// `pricing.lines[]`; lines without a numeric amount are skipped.
pub fn extract_pricing(value: Option<&Value>) -> Pricing {
    let lines = value
        .and_then(Value::as_object)
        .and_then(|pricing| pricing.get("lines"))
        .and_then(Value::as_array)
        .map(|lines| {
            lines
                .iter()
                .filter_map(Value::as_object)
                .filter_map(|line| {
                    let amount = extract::number(line.get("amount"))?;
                    let unit = line.get("unit").and_then(Value::as_str).unwrap_or_default();
                    Some(PriceLine {
                        unit: PriceUnit::parse(unit),
                        amount: MicroUsd::from_usd(amount),
                        currency: "USD".to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Pricing { lines }
}

/// Top-level `context_length` / `max_completion_tokens`, falling back to the
/// `top_provider` object. Unset when both are absent or zero.
pub fn extract_token_limits(raw: &Map<String, Value>) -> Option<TokenLimits> {
    let top = extract::object(raw, "top_provider");
    let read = |key: &str| {
        extract::number(raw.get(key))
            .or_else(|| top.and_then(|top| extract::number(top.get(key))))
            .map(|value| value as i64)
            .unwrap_or(0)
    };
    let limits = TokenLimits {
        context_length: read("context_length"),
        max_completion_tokens: read("max_completion_tokens"),
    };
    if limits.context_length == 0 && limits.max_completion_tokens == 0 {
        None
    } else {
        Some(limits)
    }
}

/// First path segment of `vendor/model` ids.
pub fn extract_family(model_id: &str) -> Option<String> {
    let (family, _) = model_id.split_once('/')?;
    Some(family.trim().to_string())
}

/// Rewrites every field derived from the upstream listing.
fn apply_upstream(
    target: &mut ProviderModel,
    provider: &Provider,
    catalog: Option<&ModelCatalog>,
    model: &UpstreamModel,
) {
    let raw = &model.raw;
    let input_modalities = extract::object(raw, "architecture")
        .map(|arch| extract::string_list(arch.get("input_modalities")))
        .unwrap_or_default();
    let supported = extract::string_list(raw.get("supported_parameters"));

    target.model_catalog_id = catalog.map(|catalog| catalog.id);
    target.display_name = model.resolved_display_name().to_string();
    target.pricing = extract_pricing(raw.get("pricing"));
    target.token_limits = extract_token_limits(raw);
    target.family = extract_family(&model.id);
    target.supports_images = extract::contains_ignore_case(&input_modalities, "image");
    target.supports_embeddings = model.id.to_lowercase().contains("embed");
    target.supports_reasoning = extract::contains_ignore_case(&supported, "include_reasoning");
    target.active = provider.active;
    target.updated_at = OffsetDateTime::now_utc();
}

#[derive(Clone)]
pub struct ProviderModelService {
    repo: Arc<dyn ProviderModelRepository>,
}

impl ProviderModelService {
    pub fn new(repo: Arc<dyn ProviderModelRepository>) -> Self {
        Self { repo }
    }

    pub async fn list_active_by_provider_ids(
        &self,
        provider_ids: &[i64],
    ) -> ProviderResult<Vec<ProviderModel>> {
        if provider_ids.is_empty() {
            return Ok(Vec::new());
        }
        let filter = ProviderModelFilter {
            provider_ids: Some(provider_ids.to_vec()),
            active: Some(true),
            ..Default::default()
        };
        Ok(self.repo.find_by_filter(&filter).await?)
    }

    pub async fn find_active_by_provider_ids_and_key(
        &self,
        provider_ids: &[i64],
        model_key: &str,
    ) -> ProviderResult<Vec<ProviderModel>> {
        if model_key.trim().is_empty() || provider_ids.is_empty() {
            return Ok(Vec::new());
        }
        let filter = ProviderModelFilter {
            provider_ids: Some(provider_ids.to_vec()),
            model_key: Some(model_key.to_string()),
            active: Some(true),
            ..Default::default()
        };
        Ok(self.repo.find_by_filter(&filter).await?)
    }

    pub async fn set_active_for_provider(&self, provider_id: i64, active: bool) -> ProviderResult<u64> {
        Ok(self.repo.set_active_for_provider(provider_id, active).await?)
    }

    pub async fn upsert_provider_model(
        &self,
        provider: &Provider,
        catalog: Option<&ModelCatalog>,
        model: &UpstreamModel,
    ) -> ProviderResult<ProviderModel> {
        let model_key = model.id.trim();
        if model_key.is_empty() {
            return Err(ProviderError::validation("model identifier missing"));
        }

        let filter = ProviderModelFilter {
            provider_id: Some(provider.id),
            model_key: Some(model_key.to_string()),
            ..Default::default()
        };
        if let Some(mut existing) = self.repo.find_by_filter(&filter).await?.into_iter().next() {
            apply_upstream(&mut existing, provider, catalog, model);
            self.repo.update(&existing).await?;
            return Ok(existing);
        }

        let now = OffsetDateTime::now_utc();
        let mut created = ProviderModel {
            id: 0,
            public_id: generate_public_id("pmdl", 32),
            provider_id: provider.id,
            model_catalog_id: None,
            model_key: model_key.to_string(),
            display_name: String::new(),
            pricing: Pricing::default(),
            token_limits: None,
            family: None,
            supports_images: false,
            supports_embeddings: false,
            supports_reasoning: false,
            active: provider.active,
            created_at: now,
            updated_at: now,
        };
        apply_upstream(&mut created, provider, catalog, model);
        Ok(self.repo.create(created).await?)
    }
}
