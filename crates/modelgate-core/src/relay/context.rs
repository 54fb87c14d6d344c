use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use modelgate_common::{
    DEFAULT_DATA_BUFFER, DEFAULT_ERROR_BUFFER, DEFAULT_MIN_BATCH_WORDS, DEFAULT_STREAM_TIMEOUT,
    GatewayConfig,
};
use modelgate_protocol::sse::DEFAULT_MAX_LINE;

use crate::error::RelayError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub timeout: Duration,
    pub data_buffer: usize,
    pub error_buffer: usize,
    pub min_batch_words: usize,
    pub max_line: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_STREAM_TIMEOUT,
            data_buffer: DEFAULT_DATA_BUFFER,
            error_buffer: DEFAULT_ERROR_BUFFER,
            min_batch_words: DEFAULT_MIN_BATCH_WORDS,
            max_line: DEFAULT_MAX_LINE,
        }
    }
}

impl From<&GatewayConfig> for RelayConfig {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            timeout: config.stream_timeout(),
            data_buffer: config.data_buffer.max(1),
            error_buffer: config.error_buffer.max(1),
            min_batch_words: config.min_batch_words,
            max_line: DEFAULT_MAX_LINE,
        }
    }
}

/// Cancellation plus a fixed deadline governing one relay.
#[derive(Debug, Clone)]
pub struct RelayContext {
    token: CancellationToken,
    deadline: Instant,
}

impl RelayContext {
    pub fn new(timeout: Duration) -> Self {
        Self::with_parent(&CancellationToken::new(), timeout)
    }

    /// Cancelling `parent` also cancels this context.
    pub fn with_parent(parent: &CancellationToken, timeout: Duration) -> Self {
        Self {
            token: parent.child_token(),
            deadline: Instant::now() + timeout,
        }
    }

    /// A context that ends with this one but can also be cancelled alone.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Resolves with the reason once the context is cancelled or expired.
    pub async fn done(&self) -> RelayError {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => RelayError::Cancelled,
            _ = tokio::time::sleep_until(self.deadline) => RelayError::Timeout,
        }
    }

    /// Runs `future` unless the context finishes first.
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output, RelayError> {
        tokio::select! {
            biased;
            reason = self.done() => Err(reason),
            output = future => Ok(output),
        }
    }
}
