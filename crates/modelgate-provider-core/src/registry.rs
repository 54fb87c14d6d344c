use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};

use modelgate_common::{
    SecretCipher, api_key_hint, generate_public_id, normalize_base_url, slugify,
};
use modelgate_protocol::models::UpstreamModel;

use crate::catalog::CatalogService;
use crate::errors::{ProviderError, ProviderResult};
use crate::kind::ProviderKind;
use crate::provider::{
    Provider, ProviderFilter, RegisterProviderInput, TenantContext, UpdateProviderInput,
    sanitize_metadata,
};
use crate::provider_model::{ProviderModel, ProviderModelService};
use crate::repository::{ModelCatalogRepository, ProviderModelRepository, ProviderRepository};

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredProvider {
    pub provider: Provider,
    /// Always empty at registration; populated by a later sync.
    pub models: Vec<ProviderModel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncedProvider {
    pub provider: Provider,
    pub models: Vec<ProviderModel>,
}

/// Provider lifecycle and per-tenant model resolution.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: Arc<dyn ProviderRepository>,
    catalogs: CatalogService,
    models: ProviderModelService,
    cipher: Option<SecretCipher>,
}

impl ProviderRegistry {
    pub fn new(
        providers: Arc<dyn ProviderRepository>,
        catalogs: Arc<dyn ModelCatalogRepository>,
        models: Arc<dyn ProviderModelRepository>,
        cipher: Option<SecretCipher>,
    ) -> Self {
        Self {
            providers,
            catalogs: CatalogService::new(catalogs),
            models: ProviderModelService::new(models),
            cipher,
        }
    }

    pub fn provider_models(&self) -> &ProviderModelService {
        &self.models
    }

    pub async fn register_provider(
        &self,
        tenant: &TenantContext,
        input: RegisterProviderInput,
    ) -> ProviderResult<RegisteredProvider> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(ProviderError::validation("provider name is required"));
        }
        let base_url = validate_base_url(&input.base_url)?;
        let organization_id = tenant
            .effective_organization()
            .ok_or_else(|| ProviderError::validation("organization is required"))?;
        let kind = ProviderKind::parse(&input.vendor);

        if !kind.is_custom() {
            self.ensure_scope_free(kind, organization_id, input.project_id, None)
                .await?;
        }

        let slug = self.unique_slug(kind, name).await?;
        let (encrypted_api_key, api_key_hint) = self.seal_api_key(input.api_key.as_deref())?;

        let now = OffsetDateTime::now_utc();
        let provider = Provider {
            id: 0,
            public_id: generate_public_id("prov", 24),
            slug,
            organization_id,
            project_id: input.project_id,
            display_name: name.to_string(),
            kind,
            base_url,
            encrypted_api_key,
            api_key_hint,
            is_moderated: false,
            active: input.active.unwrap_or(true),
            metadata: sanitize_metadata(input.metadata),
            last_synced_at: None,
            created_at: now,
            updated_at: now,
        };
        let provider = self.providers.create(provider).await?;
        info!(
            event = "provider_registered",
            provider = %provider.public_id,
            kind = %provider.kind,
            organization_id = provider.organization_id,
            project_id = ?provider.project_id,
        );
        Ok(RegisteredProvider {
            provider,
            models: Vec::new(),
        })
    }

    pub async fn update_provider(
        &self,
        mut provider: Provider,
        input: UpdateProviderInput,
    ) -> ProviderResult<Provider> {
        if let Some(name) = input.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(ProviderError::validation("provider name cannot be empty"));
            }
            provider.display_name = name.to_string();
        }
        if let Some(base_url) = input.base_url {
            if base_url.trim().is_empty() {
                return Err(ProviderError::validation("base url cannot be empty"));
            }
            provider.base_url = validate_base_url(&base_url)?;
        }
        if let Some(api_key) = input.api_key {
            let (sealed, hint) = self.seal_api_key(Some(&api_key))?;
            provider.encrypted_api_key = sealed;
            provider.api_key_hint = hint;
        }
        if let Some(metadata) = input.metadata {
            provider.metadata = sanitize_metadata(Some(metadata));
        }

        let mut mirror_active = None;
        if let Some(active) = input.active
            && active != provider.active
        {
            if active && !provider.kind.is_custom() {
                self.ensure_scope_free(
                    provider.kind,
                    provider.organization_id,
                    provider.project_id,
                    Some(provider.id),
                )
                .await?;
            }
            provider.active = active;
            mirror_active = Some(active);
        }

        provider.updated_at = OffsetDateTime::now_utc();
        self.providers.update(&provider).await?;
        if let Some(active) = mirror_active {
            let touched = self.models.set_active_for_provider(provider.id, active).await?;
            info!(event = "provider_models_mirrored", provider = %provider.public_id, active, models = touched);
        }
        Ok(provider)
    }

    pub async fn find_by_public_id(&self, public_id: &str) -> ProviderResult<Provider> {
        self.providers
            .find_by_public_id(public_id.trim())
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("provider '{public_id}' not found")))
    }

    /// Project-scoped, then organization-wide, then default-organization
    /// providers, de-duplicated. The order is the resolution priority.
    pub async fn list_accessible_providers(
        &self,
        tenant: &TenantContext,
    ) -> ProviderResult<Vec<Provider>> {
        let mut tiers = Vec::with_capacity(3);
        let organization = tenant.effective_organization();

        if let Some(org) = organization {
            if !tenant.project_ids.is_empty() {
                tiers.push(ProviderFilter {
                    organization_id: Some(org),
                    project_ids: Some(tenant.project_ids.clone()),
                    ..Default::default()
                });
            }
            tiers.push(ProviderFilter {
                organization_id: Some(org),
                without_project: true,
                ..Default::default()
            });
        }
        if let Some(default_org) = tenant.default_organization_id
            && Some(default_org) != organization
        {
            tiers.push(ProviderFilter {
                organization_id: Some(default_org),
                without_project: true,
                ..Default::default()
            });
        }

        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for filter in tiers {
            for provider in self.providers.find_by_filter(&filter).await? {
                if seen.insert(provider.id) {
                    result.push(provider);
                }
            }
        }
        Ok(result)
    }

    pub async fn get_provider_for_model(
        &self,
        model_key: &str,
        tenant: &TenantContext,
    ) -> ProviderResult<Provider> {
        let model_key = model_key.trim();
        if model_key.is_empty() {
            return Err(ProviderError::validation("model key is required"));
        }

        let providers: Vec<Provider> = self
            .list_accessible_providers(tenant)
            .await?
            .into_iter()
            .filter(|provider| provider.active)
            .collect();
        if providers.is_empty() {
            return Err(ProviderError::NoAccessibleProviders);
        }

        let ids: Vec<i64> = providers.iter().map(|provider| provider.id).collect();
        let matches = self
            .models
            .find_active_by_provider_ids_and_key(&ids, model_key)
            .await?;
        if matches.is_empty() {
            return Err(ProviderError::ModelNotFound(model_key.to_string()));
        }

        let serving: HashSet<i64> = matches.iter().map(|model| model.provider_id).collect();
        providers
            .into_iter()
            .find(|provider| serving.contains(&provider.id))
            .ok_or_else(|| ProviderError::NoValidProvider(model_key.to_string()))
    }

    /// Active models of every accessible provider, first provider winning on
    /// duplicate model keys.
    pub async fn list_accessible_models(
        &self,
        tenant: &TenantContext,
    ) -> ProviderResult<Vec<ProviderModel>> {
        let providers = self.list_accessible_providers(tenant).await?;
        let active: Vec<&Provider> = providers.iter().filter(|p| p.active).collect();
        let ids: Vec<i64> = active.iter().map(|provider| provider.id).collect();
        let models = self.models.list_active_by_provider_ids(&ids).await?;

        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for provider in active {
            for model in models.iter().filter(|model| model.provider_id == provider.id) {
                if seen.insert(model.model_key.clone()) {
                    result.push(model.clone());
                }
            }
        }
        Ok(result)
    }

    pub async fn sync_provider_models(
        &self,
        mut provider: Provider,
        upstream: &[UpstreamModel],
    ) -> ProviderResult<SyncedProvider> {
        let mut models = Vec::with_capacity(upstream.len());
        for model in upstream {
            let synced = self.sync_one(&provider, model).await.map_err(|source| {
                warn!(event = "provider_sync_failed", provider = %provider.public_id, model = %model.id, error = %source);
                ProviderError::SyncFailed {
                    model: model.id.clone(),
                    source: Box::new(source),
                }
            })?;
            models.push(synced);
        }

        let now = OffsetDateTime::now_utc();
        provider.last_synced_at = Some(now);
        provider.updated_at = now;
        self.providers.update(&provider).await?;
        info!(event = "provider_synced", provider = %provider.public_id, models = models.len());
        Ok(SyncedProvider { provider, models })
    }

    async fn sync_one(
        &self,
        provider: &Provider,
        model: &UpstreamModel,
    ) -> ProviderResult<ProviderModel> {
        if model.id.trim().is_empty() {
            return Err(ProviderError::validation("model identifier missing"));
        }
        let catalog = self.catalogs.upsert_catalog(provider.kind, model).await?;
        self.models
            .upsert_provider_model(provider, Some(&catalog), model)
            .await
    }

    /// Plaintext API key of a provider, if one is stored.
    pub fn decrypt_api_key(&self, provider: &Provider) -> ProviderResult<Option<String>> {
        let Some(sealed) = provider.encrypted_api_key.as_deref() else {
            return Ok(None);
        };
        let cipher = self
            .cipher
            .as_ref()
            .ok_or(ProviderError::SecretNotConfigured)?;
        Ok(Some(cipher.decrypt(sealed)?))
    }

    fn seal_api_key(
        &self,
        api_key: Option<&str>,
    ) -> ProviderResult<(Option<String>, Option<String>)> {
        let Some(api_key) = api_key.map(str::trim).filter(|key| !key.is_empty()) else {
            return Ok((None, None));
        };
        let cipher = self
            .cipher
            .as_ref()
            .ok_or(ProviderError::SecretNotConfigured)?;
        Ok((Some(cipher.encrypt(api_key)?), api_key_hint(api_key)))
    }

    /// Registration conflicts with any provider of `kind` in the scope,
    /// inactive ones included. Reactivating `except` only conflicts with
    /// active ones.
    async fn ensure_scope_free(
        &self,
        kind: ProviderKind,
        organization_id: i64,
        project_id: Option<i64>,
        except: Option<i64>,
    ) -> ProviderResult<()> {
        let filter = ProviderFilter {
            organization_id: Some(organization_id),
            project_id,
            without_project: project_id.is_none(),
            kind: Some(kind),
            active: except.map(|_| true),
            ..Default::default()
        };
        let occupied = match except {
            None => self.providers.count(&filter).await? > 0,
            Some(own) => self
                .providers
                .find_by_filter(&filter)
                .await?
                .iter()
                .any(|provider| provider.id != own),
        };
        if occupied {
            return Err(ProviderError::Conflict(format!(
                "a {} provider is already registered in this scope",
                kind.display_name()
            )));
        }
        Ok(())
    }

    async fn unique_slug(&self, kind: ProviderKind, name: &str) -> ProviderResult<String> {
        let mut base = slugify(&format!("{}-{}", kind.as_str(), name));
        if base.is_empty() {
            base = "provider".to_string();
        }
        let mut candidate = base.clone();
        let mut suffix = 2;
        loop {
            let filter = ProviderFilter {
                slug: Some(candidate.clone()),
                ..Default::default()
            };
            if self.providers.count(&filter).await? == 0 {
                return Ok(candidate);
            }
            candidate = format!("{base}-{suffix}");
            suffix += 1;
        }
    }
}

fn validate_base_url(raw: &str) -> ProviderResult<String> {
    let normalized = normalize_base_url(raw);
    if normalized.is_empty() {
        return Err(ProviderError::validation("base url is required"));
    }
    let parsed = url::Url::parse(&normalized)
        .map_err(|err| ProviderError::validation(format!("invalid base url: {err}")))?;
    if !parsed.has_host() {
        return Err(ProviderError::validation("invalid base url: missing host"));
    }
    Ok(normalized)
}
