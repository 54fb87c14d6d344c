use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("downstream connection closed")]
pub struct SinkClosed;

/// The caller-facing side of a relay.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&mut self, frame: Bytes) -> Result<(), SinkClosed>;

    /// Resolves once the caller has gone away.
    async fn closed(&self);
}

/// Feeds an HTTP response body. Dropping the body closes the sink.
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn send(&mut self, frame: Bytes) -> Result<(), SinkClosed> {
        self.tx.send(frame).await.map_err(|_| SinkClosed)
    }

    async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Keeps every frame in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    frames: Vec<Bytes>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> &[Bytes] {
        &self.frames
    }

    pub fn text(&self) -> String {
        self.frames
            .iter()
            .map(|frame| String::from_utf8_lossy(frame))
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingSink {
    async fn send(&mut self, frame: Bytes) -> Result<(), SinkClosed> {
        self.frames.push(frame);
        Ok(())
    }

    async fn closed(&self) {
        std::future::pending::<()>().await
    }
}
