use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use modelgate_provider_core::{ProviderError, StoreError};

/// Failure talking to one upstream vendor.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("{vendor}: {request} failed with status {status}{}", body_suffix(.body))]
    Status {
        vendor: String,
        request: &'static str,
        status: u16,
        body: String,
    },
    #[error("{vendor}: {message}")]
    Transport { vendor: String, message: String },
    #[error("{vendor}: malformed response body: {message}")]
    Decode { vendor: String, message: String },
    #[error("request body could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("upstream client setup failed: {0}")]
    Client(String),
    #[error(transparent)]
    Credential(#[from] ProviderError),
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(": {body}")
    }
}

impl InferenceError {
    pub fn status(vendor: &str, streaming: bool, status: u16, body: String) -> Self {
        InferenceError::Status {
            vendor: vendor.to_string(),
            request: if streaming {
                "streaming request"
            } else {
                "request"
            },
            status,
            body,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            InferenceError::Credential(err) => err.code(),
            InferenceError::Client(_) => "config_error",
            _ => "upstream_error",
        }
    }
}

/// Terminal failure of a streaming relay. Each variant maps to a distinct
/// `response.error` code.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("stream exceeded its deadline")]
    Timeout,
    #[error("stream cancelled by the caller")]
    Cancelled,
    #[error("failed to read upstream stream: {0}")]
    StreamRead(String),
    #[error(transparent)]
    Upstream(#[from] InferenceError),
}

impl RelayError {
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::Timeout => "timeout",
            RelayError::Cancelled => "cancelled",
            RelayError::StreamRead(_) => "stream_read_error",
            RelayError::Upstream(_) => "upstream_error",
        }
    }
}

/// Error surfaced to HTTP callers before any response byte is committed.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GatewayError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        GatewayError::BadRequest(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::BadRequest(_) => "validation_error",
            GatewayError::Unauthorized => "unauthorized",
            GatewayError::Provider(err) => err.code(),
            GatewayError::Inference(err) => err.code(),
            GatewayError::Relay(err) => err.code(),
            GatewayError::Store(StoreError::NotFound(_)) => "not_found",
            GatewayError::Store(StoreError::Conflict(_)) => "conflict",
            GatewayError::Store(_) => "store_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.code() {
            "validation_error" => StatusCode::BAD_REQUEST,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "conflict" => StatusCode::CONFLICT,
            "not_found" | "no_accessible_providers" | "model_not_found" | "no_valid_provider" => {
                StatusCode::NOT_FOUND
            }
            "upstream_error" | "stream_read_error" => StatusCode::BAD_GATEWAY,
            "timeout" => StatusCode::GATEWAY_TIMEOUT,
            "cancelled" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_message_carries_vendor_status_and_body() {
        let err = InferenceError::status("OpenAI", false, 429, "rate limited".to_string());
        assert_eq!(
            err.to_string(),
            "OpenAI: request failed with status 429: rate limited"
        );
        let err = InferenceError::status("Groq", true, 500, String::new());
        assert_eq!(err.to_string(), "Groq: streaming request failed with status 500");
    }

    #[test]
    fn gateway_errors_map_to_http_statuses() {
        let cases = [
            (GatewayError::bad_request("bad"), StatusCode::BAD_REQUEST),
            (
                GatewayError::Provider(ProviderError::Conflict("dup".into())),
                StatusCode::CONFLICT,
            ),
            (
                GatewayError::Provider(ProviderError::ModelNotFound("m".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                GatewayError::Provider(ProviderError::SecretNotConfigured),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                GatewayError::Inference(InferenceError::status("x", false, 500, String::new())),
                StatusCode::BAD_GATEWAY,
            ),
            (GatewayError::Relay(RelayError::Timeout), StatusCode::GATEWAY_TIMEOUT),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{err}");
        }
    }
}
