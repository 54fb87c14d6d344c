use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::debug;

use modelgate_common::slugify;
use modelgate_protocol::models::UpstreamModel;

use crate::errors::ProviderResult;
use crate::extract;
use crate::kind::ProviderKind;
use crate::repository::ModelCatalogRepository;

/// Lifecycle of a catalog row. Ordering is the upgrade order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogStatus {
    Init,
    Filled,
    Updated,
}

impl CatalogStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CatalogStatus::Init => "init",
            CatalogStatus::Filled => "filled",
            CatalogStatus::Updated => "updated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "init" => Some(CatalogStatus::Init),
            "filled" => Some(CatalogStatus::Filled),
            "updated" => Some(CatalogStatus::Updated),
            _ => None,
        }
    }

    /// `filled` and `updated` rows are never overwritten by a sync.
    pub fn is_settled(self) -> bool {
        self >= CatalogStatus::Filled
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupportedParameters {
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub default: BTreeMap<String, Option<Decimal>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Architecture {
    #[serde(default)]
    pub modality: String,
    #[serde(default)]
    pub input_modalities: Vec<String>,
    #[serde(default)]
    pub output_modalities: Vec<String>,
    #[serde(default)]
    pub tokenizer: String,
    #[serde(default)]
    pub instruct_type: Option<String>,
}

/// Vendor-agnostic metadata shared by every provider exposing the same model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCatalog {
    pub id: i64,
    pub public_id: String,
    pub supported_parameters: SupportedParameters,
    pub architecture: Architecture,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub is_moderated: Option<bool>,
    pub extras: Map<String, Value>,
    pub status: CatalogStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_synced_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Stable catalog key: slug of the canonical slug, else of the raw id.
pub fn catalog_public_id(model: &UpstreamModel) -> String {
    let canonical = model
        .canonical_slug
        .as_deref()
        .map(slugify)
        .unwrap_or_default();
    if !canonical.is_empty() {
        return canonical;
    }
    slugify(&model.id)
}

/// Builds a catalog row from a vendor listing entry. Ids and timestamps are
/// left for the caller to settle.
pub fn catalog_from_upstream(kind: ProviderKind, model: &UpstreamModel) -> ModelCatalog {
    let raw = &model.raw;
    let status = if kind.has_rich_metadata() {
        CatalogStatus::Filled
    } else {
        CatalogStatus::Init
    };

    let architecture = extract::object(raw, "architecture")
        .map(|arch| Architecture {
            modality: extract::string(arch, "modality").unwrap_or_default(),
            input_modalities: extract::string_list(arch.get("input_modalities")),
            output_modalities: extract::string_list(arch.get("output_modalities")),
            tokenizer: extract::string(arch, "tokenizer").unwrap_or_default(),
            instruct_type: extract::string(arch, "instruct_type"),
        })
        .unwrap_or_default();

    let is_moderated = extract::object(raw, "top_provider")
        .and_then(|top| top.get("is_moderated"))
        .and_then(Value::as_bool);

    let now = OffsetDateTime::now_utc();
    ModelCatalog {
        id: 0,
        public_id: catalog_public_id(model),
        supported_parameters: SupportedParameters {
            names: extract::string_list(raw.get("supported_parameters")),
            default: extract::default_parameters(raw.get("default_parameters")),
        },
        architecture,
        tags: Vec::new(),
        notes: extract::string(raw, "description"),
        is_moderated,
        extras: raw.clone(),
        status,
        last_synced_at: Some(now),
        created_at: now,
        updated_at: now,
    }
}

/// Idempotent catalog upserts that never regress a settled row.
#[derive(Clone)]
pub struct CatalogService {
    repo: Arc<dyn ModelCatalogRepository>,
}

impl CatalogService {
    pub fn new(repo: Arc<dyn ModelCatalogRepository>) -> Self {
        Self { repo }
    }

    pub async fn upsert_catalog(
        &self,
        kind: ProviderKind,
        model: &UpstreamModel,
    ) -> ProviderResult<ModelCatalog> {
        let mut catalog = catalog_from_upstream(kind, model);
        let Some(existing) = self.repo.find_by_public_id(&catalog.public_id).await? else {
            debug!(event = "catalog_created", catalog = %catalog.public_id, status = catalog.status.as_str());
            return Ok(self.repo.create(catalog).await?);
        };

        if existing.status.is_settled() {
            return Ok(existing);
        }

        catalog.id = existing.id;
        catalog.created_at = existing.created_at;
        catalog.status = catalog.status.max(existing.status);
        self.repo.update(&catalog).await?;
        debug!(event = "catalog_refreshed", catalog = %catalog.public_id, status = catalog.status.as_str());
        Ok(catalog)
    }
}
