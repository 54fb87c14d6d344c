#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use serde_json::{Value, json};

use modelgate_core::{ByteStream, ClientFactory, InferenceClient, InferenceError};
use modelgate_protocol::chat::{ChatCompletionRequest, ChatCompletionResponse};
use modelgate_protocol::models::UpstreamModel;
use modelgate_provider_core::Provider;

/// Sets the flag when the upstream body is dropped.
pub struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// An upstream body made of `chunks`, optionally hanging (never ending)
/// after the last one.
pub fn byte_stream(chunks: Vec<String>, hang: bool, dropped: Option<Arc<AtomicBool>>) -> ByteStream {
    let guard = dropped.map(DropFlag);
    let items = stream::iter(
        chunks
            .into_iter()
            .map(|chunk| Ok::<_, std::io::Error>(Bytes::from(chunk))),
    );
    let tail = if hang {
        stream::pending::<Result<Bytes, std::io::Error>>().boxed()
    } else {
        stream::empty::<Result<Bytes, std::io::Error>>().boxed()
    };
    Box::pin(items.chain(tail).map(move |item| {
        let _guard = &guard;
        item
    }))
}

pub fn chunk(delta: Value) -> String {
    let body = json!({
        "id": "chatcmpl-1",
        "object": "chat.completion.chunk",
        "created": 1,
        "model": "m",
        "choices": [{"index": 0, "delta": delta}],
    });
    format!("data: {body}\n\n")
}

pub fn content(text: &str) -> String {
    chunk(json!({ "content": text }))
}

pub fn reasoning(text: &str) -> String {
    chunk(json!({ "reasoning_content": text }))
}

pub fn done() -> String {
    "data: [DONE]\n\n".to_string()
}

/// `(event, data)` pairs of every `event:` frame in `text`.
pub fn events(text: &str) -> Vec<(String, Value)> {
    text.split("\n\n")
        .filter_map(|frame| {
            let mut lines = frame.lines();
            let event = lines.next()?.strip_prefix("event: ")?.to_string();
            let data = lines.next()?.strip_prefix("data: ")?;
            Some((event, serde_json::from_str(data).ok()?))
        })
        .collect()
}

pub enum StubStream {
    Chunks(Vec<String>),
    Hang(Vec<String>),
    Status(u16),
}

pub struct StubClient {
    pub stream: StubStream,
    pub unary: Option<ChatCompletionResponse>,
    pub models: Vec<UpstreamModel>,
    pub dropped: Arc<AtomicBool>,
    pub calls: AtomicUsize,
}

impl StubClient {
    pub fn new(stream: StubStream) -> Self {
        Self {
            stream,
            unary: None,
            models: Vec::new(),
            dropped: Arc::new(AtomicBool::new(false)),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl InferenceClient for StubClient {
    fn vendor(&self) -> &str {
        "Stub"
    }

    async fn create_chat_completion(
        &self,
        _request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.unary
            .clone()
            .ok_or_else(|| InferenceError::status("Stub", false, 500, "no unary reply".to_string()))
    }

    async fn create_chat_completion_stream(
        &self,
        _request: &ChatCompletionRequest,
    ) -> Result<ByteStream, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.stream {
            StubStream::Chunks(chunks) => Ok(byte_stream(
                chunks.clone(),
                false,
                Some(self.dropped.clone()),
            )),
            StubStream::Hang(chunks) => Ok(byte_stream(
                chunks.clone(),
                true,
                Some(self.dropped.clone()),
            )),
            StubStream::Status(status) => Err(InferenceError::status(
                "Stub",
                true,
                *status,
                "upstream exploded".to_string(),
            )),
        }
    }

    async fn list_models(&self) -> Result<Vec<UpstreamModel>, InferenceError> {
        Ok(self.models.clone())
    }
}

pub struct StubFactory(pub Arc<StubClient>);

impl ClientFactory for StubFactory {
    fn client_for(&self, _provider: &Provider) -> Result<Arc<dyn InferenceClient>, InferenceError> {
        Ok(self.0.clone())
    }
}
