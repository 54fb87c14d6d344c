use modelgate_common::SecretError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("stored value is malformed: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("no accessible providers found")]
    NoAccessibleProviders,
    #[error("model '{0}' not found in accessible providers")]
    ModelNotFound(String),
    #[error("no valid provider found for model '{0}'")]
    NoValidProvider(String),
    #[error("model provider secret is not configured")]
    SecretNotConfigured,
    #[error("credential cipher failed: {0}")]
    Secret(#[from] SecretError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("sync of model '{model}' failed: {source}")]
    SyncFailed {
        model: String,
        #[source]
        source: Box<ProviderError>,
    },
}

pub type ProviderResult<T> = Result<T, ProviderError>;

impl ProviderError {
    pub fn validation(message: impl Into<String>) -> Self {
        ProviderError::Validation(message.into())
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::Validation(_) => "validation_error",
            ProviderError::Conflict(_) => "conflict",
            ProviderError::NotFound(_) => "not_found",
            ProviderError::NoAccessibleProviders => "no_accessible_providers",
            ProviderError::ModelNotFound(_) => "model_not_found",
            ProviderError::NoValidProvider(_) => "no_valid_provider",
            ProviderError::SecretNotConfigured | ProviderError::Secret(_) => "config_error",
            ProviderError::Store(StoreError::Conflict(_)) => "conflict",
            ProviderError::Store(_) => "store_error",
            ProviderError::SyncFailed { source, .. } => source.code(),
        }
    }
}
