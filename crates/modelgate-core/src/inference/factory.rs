use std::sync::Arc;

use wreq::Client;

use modelgate_provider_core::{Provider, ProviderRegistry};

use super::upstream::{UpstreamClientConfig, WreqInferenceClient, build_http_client};
use super::{ClientFactory, InferenceClient};
use crate::error::InferenceError;

/// Shares one connection pool across every provider client and decrypts
/// the provider credential per request.
#[derive(Clone)]
pub struct WreqClientFactory {
    http: Client,
    registry: ProviderRegistry,
}

impl WreqClientFactory {
    pub fn new(
        config: &UpstreamClientConfig,
        registry: ProviderRegistry,
    ) -> Result<Self, InferenceError> {
        let http =
            build_http_client(config).map_err(|err| InferenceError::Client(err.to_string()))?;
        Ok(Self { http, registry })
    }
}

impl ClientFactory for WreqClientFactory {
    fn client_for(&self, provider: &Provider) -> Result<Arc<dyn InferenceClient>, InferenceError> {
        let api_key = self.registry.decrypt_api_key(provider)?;
        Ok(Arc::new(WreqInferenceClient::new(
            self.http.clone(),
            provider.kind.display_name(),
            &provider.base_url,
            api_key,
        )))
    }
}
