use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;

use modelgate_protocol::chat::{ChatCompletionRequest, ChatCompletionResponse};
use modelgate_protocol::models::UpstreamModel;
use modelgate_provider_core::Provider;

use crate::error::InferenceError;

mod factory;
mod upstream;

pub use factory::WreqClientFactory;
pub use upstream::{UpstreamClientConfig, WreqInferenceClient, build_http_client};

/// Raw upstream body, positioned at the first byte. Dropping it closes the
/// connection.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// One vendor endpoint bound to one base URL and credential.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Vendor display name used in error messages and logs.
    fn vendor(&self) -> &str;

    async fn create_chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, InferenceError>;

    async fn create_chat_completion_stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ByteStream, InferenceError>;

    async fn list_models(&self) -> Result<Vec<UpstreamModel>, InferenceError>;
}

/// Builds a client for a resolved provider.
pub trait ClientFactory: Send + Sync {
    fn client_for(&self, provider: &Provider) -> Result<Arc<dyn InferenceClient>, InferenceError>;
}
