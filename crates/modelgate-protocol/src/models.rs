use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entry of a vendor's `GET /models` listing.
///
/// The typed fields are read out of `raw`, which keeps the whole vendor
/// object (architecture, pricing, supported_parameters, top_provider, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct UpstreamModel {
    pub id: String,
    pub object: Option<String>,
    pub owned_by: Option<String>,
    pub created: Option<i64>,
    pub display_name: Option<String>,
    pub name: Option<String>,
    pub canonical_slug: Option<String>,
    pub raw: Map<String, Value>,
}

impl UpstreamModel {
    /// `display_name`, then `name`, then the id.
    pub fn resolved_display_name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .or(self.name.as_deref().filter(|value| !value.trim().is_empty()))
            .unwrap_or(&self.id)
    }
}

impl From<Map<String, Value>> for UpstreamModel {
    fn from(raw: Map<String, Value>) -> Self {
        let text = |key: &str| {
            raw.get(key)
                .and_then(Value::as_str)
                .map(|value| value.to_string())
        };
        Self {
            id: text("id").unwrap_or_default(),
            object: text("object"),
            owned_by: text("owned_by"),
            created: raw.get("created").and_then(Value::as_i64),
            display_name: text("display_name"),
            name: text("name"),
            canonical_slug: text("canonical_slug"),
            raw,
        }
    }
}

impl From<UpstreamModel> for Map<String, Value> {
    fn from(model: UpstreamModel) -> Self {
        let mut out = model.raw;
        out.insert("id".to_string(), Value::String(model.id));
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelList {
    #[serde(default = "list_object")]
    pub object: String,
    #[serde(default)]
    pub data: Vec<UpstreamModel>,
}

fn list_object() -> String {
    "list".to_string()
}

impl ModelList {
    pub fn new(data: Vec<UpstreamModel>) -> Self {
        Self {
            object: list_object(),
            data,
        }
    }
}
