use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{debug, info};
use wreq::header::{ACCEPT, ACCEPT_ENCODING, AUTHORIZATION, CONTENT_TYPE};
use wreq::{Client, Proxy, RequestBuilder};

use modelgate_common::GatewayConfig;
use modelgate_protocol::chat::{ChatCompletionRequest, ChatCompletionResponse};
use modelgate_protocol::models::{ModelList, UpstreamModel};

use super::{ByteStream, InferenceClient};
use crate::error::InferenceError;

#[derive(Debug, Clone)]
pub struct UpstreamClientConfig {
    pub proxy: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub read_timeout: Duration,
}

impl UpstreamClientConfig {
    pub fn from_gateway(config: &GatewayConfig) -> Self {
        Self {
            proxy: config.proxy.clone(),
            read_timeout: config.stream_timeout(),
            ..Self::default()
        }
    }
}

impl Default for UpstreamClientConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(600),
            read_timeout: Duration::from_secs(120),
        }
    }
}

pub fn build_http_client(config: &UpstreamClientConfig) -> Result<Client, wreq::Error> {
    let mut builder = Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .read_timeout(config.read_timeout);

    if let Some(proxy) = config
        .proxy
        .as_deref()
        .map(str::trim)
        .filter(|proxy| !proxy.is_empty())
    {
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    builder.build()
}

/// OpenAI-compatible `chat/completions` + `models` client.
#[derive(Clone)]
pub struct WreqInferenceClient {
    client: Client,
    vendor: String,
    base_url: String,
    api_key: Option<String>,
}

impl WreqInferenceClient {
    pub fn new(
        client: Client,
        vendor: impl Into<String>,
        base_url: &str,
        api_key: Option<String>,
    ) -> Self {
        // Keyless local vendors are commonly configured with the literal "none".
        let api_key = api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty() && !key.eq_ignore_ascii_case("none"));
        Self {
            client,
            vendor: vendor.into(),
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header(AUTHORIZATION, format!("Bearer {key}")),
            None => builder,
        }
    }

    fn transport_error(&self, err: wreq::Error) -> InferenceError {
        InferenceError::Transport {
            vendor: self.vendor.clone(),
            message: describe_wreq_error(&err),
        }
    }

    async fn send_json(
        &self,
        request: &ChatCompletionRequest,
        streaming: bool,
    ) -> Result<wreq::Response, InferenceError> {
        let body = serde_json::to_vec(request)?;
        let mut builder = self
            .client
            .post(self.endpoint("chat/completions"))
            .header(CONTENT_TYPE, "application/json");
        if streaming {
            builder = builder
                .header(ACCEPT, "text/event-stream")
                .header(ACCEPT_ENCODING, "identity");
        }
        let builder = self.authorize(builder).body(body);

        info!(
            event = "upstream_request",
            vendor = %self.vendor,
            model = %request.model,
            stream = streaming,
        );
        let response = builder
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = read_error_body(response).await;
            return Err(InferenceError::status(&self.vendor, streaming, status, body));
        }
        Ok(response)
    }
}

#[async_trait]
impl InferenceClient for WreqInferenceClient {
    fn vendor(&self) -> &str {
        &self.vendor
    }

    async fn create_chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, InferenceError> {
        let mut request = request.clone();
        request.stream = Some(false);
        let response = self.send_json(&request, false).await?;
        let body = response
            .bytes()
            .await
            .map_err(|err| self.transport_error(err))?;
        serde_json::from_slice(&body).map_err(|err| InferenceError::Decode {
            vendor: self.vendor.clone(),
            message: err.to_string(),
        })
    }

    async fn create_chat_completion_stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ByteStream, InferenceError> {
        let mut request = request.clone();
        request.stream = Some(true);
        let response = self.send_json(&request, true).await?;
        let stream = response
            .bytes_stream()
            .map(|item| item.map_err(|err| std::io::Error::other(describe_wreq_error(&err))));
        Ok(Box::pin(stream))
    }

    async fn list_models(&self) -> Result<Vec<UpstreamModel>, InferenceError> {
        let builder = self.authorize(self.client.get(self.endpoint("models")));
        let response = builder
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;
        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = read_error_body(response).await;
            return Err(InferenceError::status(&self.vendor, false, status, body));
        }
        let body = response
            .bytes()
            .await
            .map_err(|err| self.transport_error(err))?;
        let list: ModelList = serde_json::from_slice(&body).map_err(|err| InferenceError::Decode {
            vendor: self.vendor.clone(),
            message: err.to_string(),
        })?;
        debug!(event = "upstream_models_listed", vendor = %self.vendor, models = list.data.len());
        Ok(list.data)
    }
}

/// Body text of a failed response; read failures yield an empty string.
async fn read_error_body(response: wreq::Response) -> String {
    match response.bytes().await {
        Ok(body) => String::from_utf8_lossy(&body).trim().to_string(),
        Err(_) => String::new(),
    }
}

fn describe_wreq_error(err: &wreq::Error) -> String {
    let kind = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect error"
    } else if err.is_connection_reset() {
        "connection reset"
    } else {
        "transport error"
    };
    format!("{kind}: {err}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(api_key: Option<&str>) -> WreqInferenceClient {
        let http = build_http_client(&UpstreamClientConfig::default()).unwrap();
        WreqInferenceClient::new(
            http,
            "OpenAI",
            " https://api.openai.com/v1/ ",
            api_key.map(str::to_string),
        )
    }

    #[test]
    fn endpoints_join_onto_trimmed_base() {
        assert_eq!(
            client(None).endpoint("chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn placeholder_keys_are_not_forwarded() {
        assert!(client(Some("NONE")).api_key.is_none());
        assert!(client(Some("  ")).api_key.is_none());
        assert_eq!(client(Some("sk-1")).api_key.as_deref(), Some("sk-1"));
    }
}
