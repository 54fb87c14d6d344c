use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::kind::ProviderKind;

/// A credential + endpoint binding to one vendor, scoped to an organization
/// and optionally a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    /// Store-assigned row id; `0` until persisted.
    pub id: i64,
    pub public_id: String,
    pub slug: String,
    pub organization_id: i64,
    pub project_id: Option<i64>,
    pub display_name: String,
    pub kind: ProviderKind,
    pub base_url: String,
    #[serde(skip_serializing, default)]
    pub encrypted_api_key: Option<String>,
    pub api_key_hint: Option<String>,
    pub is_moderated: bool,
    pub active: bool,
    pub metadata: Option<BTreeMap<String, String>>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_synced_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Narrowing criteria for provider lookups. Every populated field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderFilter {
    pub ids: Option<Vec<i64>>,
    pub public_id: Option<String>,
    pub slug: Option<String>,
    pub organization_id: Option<i64>,
    pub project_id: Option<i64>,
    pub project_ids: Option<Vec<i64>>,
    /// Only providers that are not bound to any project.
    pub without_project: bool,
    pub kind: Option<ProviderKind>,
    pub active: Option<bool>,
}

impl ProviderFilter {
    pub fn matches(&self, provider: &Provider) -> bool {
        if let Some(ids) = &self.ids
            && !ids.contains(&provider.id)
        {
            return false;
        }
        if let Some(public_id) = &self.public_id
            && &provider.public_id != public_id
        {
            return false;
        }
        if let Some(slug) = &self.slug
            && &provider.slug != slug
        {
            return false;
        }
        if let Some(org) = self.organization_id
            && provider.organization_id != org
        {
            return false;
        }
        if let Some(project) = self.project_id
            && provider.project_id != Some(project)
        {
            return false;
        }
        if let Some(projects) = &self.project_ids {
            match provider.project_id {
                Some(project) if projects.contains(&project) => {}
                _ => return false,
            }
        }
        if self.without_project && provider.project_id.is_some() {
            return false;
        }
        if let Some(kind) = self.kind
            && provider.kind != kind
        {
            return false;
        }
        if let Some(active) = self.active
            && provider.active != active
        {
            return false;
        }
        true
    }
}

/// Caller identity threaded through every registry and resolution call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantContext {
    pub organization_id: Option<i64>,
    pub project_ids: Vec<i64>,
    /// Organization whose providers serve as the global fallback.
    pub default_organization_id: Option<i64>,
}

impl TenantContext {
    pub fn new(organization_id: Option<i64>, project_ids: Vec<i64>) -> Self {
        Self {
            organization_id,
            project_ids,
            default_organization_id: None,
        }
    }

    pub fn with_default_organization(mut self, default_organization_id: Option<i64>) -> Self {
        self.default_organization_id = default_organization_id;
        self
    }

    /// The caller's organization, falling back to the default one.
    pub fn effective_organization(&self) -> Option<i64> {
        self.organization_id.or(self.default_organization_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RegisterProviderInput {
    pub name: String,
    pub vendor: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
    /// Defaults to active.
    #[serde(default)]
    pub active: Option<bool>,
}

/// Partial update. `None` leaves the field untouched; `Some("")` for the API
/// key clears the stored credential.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UpdateProviderInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub active: Option<bool>,
}

/// Trims keys and values, drops blank pairs, and collapses an empty result.
pub fn sanitize_metadata(
    metadata: Option<BTreeMap<String, String>>,
) -> Option<BTreeMap<String, String>> {
    let cleaned: BTreeMap<String, String> = metadata?
        .into_iter()
        .filter_map(|(key, value)| {
            let key = key.trim();
            let value = value.trim();
            if key.is_empty() || value.is_empty() {
                None
            } else {
                Some((key.to_string(), value.to_string()))
            }
        })
        .collect();
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_sanitizes_to_none_when_blank() {
        let mut raw = BTreeMap::new();
        raw.insert(" region ".to_string(), " us-east ".to_string());
        raw.insert("".to_string(), "x".to_string());
        raw.insert("empty".to_string(), "  ".to_string());
        let cleaned = sanitize_metadata(Some(raw)).unwrap();
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned.get("region").map(String::as_str), Some("us-east"));

        let mut blank = BTreeMap::new();
        blank.insert(" ".to_string(), "v".to_string());
        assert_eq!(sanitize_metadata(Some(blank)), None);
    }

    #[test]
    fn tenant_falls_back_to_default_org() {
        let tenant = TenantContext::new(None, vec![]).with_default_organization(Some(1));
        assert_eq!(tenant.effective_organization(), Some(1));
        let tenant = TenantContext::new(Some(7), vec![3]).with_default_organization(Some(1));
        assert_eq!(tenant.effective_organization(), Some(7));
    }
}
