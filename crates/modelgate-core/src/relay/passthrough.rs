use bytes::Bytes;
use tracing::warn;

use modelgate_protocol::responses::ConversationMetadata;
use modelgate_protocol::sse::{passthrough_line_bytes, sse_event_bytes};

use super::{LineDelta, RelayEmitter, StreamAccumulator, error_frame};
use crate::error::RelayError;

/// Forwards every upstream line untouched, optionally preceded by a
/// `conversation.metadata` frame.
#[derive(Debug, Default)]
pub struct PassthroughEmitter {
    metadata: Option<ConversationMetadata>,
}

impl PassthroughEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(metadata: Option<ConversationMetadata>) -> Self {
        Self { metadata }
    }
}

impl RelayEmitter for PassthroughEmitter {
    fn start(&mut self, _acc: &mut StreamAccumulator) -> Vec<Bytes> {
        let Some(metadata) = self.metadata.take() else {
            return Vec::new();
        };
        match sse_event_bytes(ConversationMetadata::EVENT, &metadata) {
            Ok(frame) => vec![frame],
            Err(err) => {
                warn!(event = "frame_encode_failed", kind = ConversationMetadata::EVENT, error = %err);
                Vec::new()
            }
        }
    }

    fn on_line(
        &mut self,
        line: &str,
        _delta: &LineDelta,
        _acc: &mut StreamAccumulator,
    ) -> Vec<Bytes> {
        vec![passthrough_line_bytes(line)]
    }

    fn finish(&mut self, _acc: &mut StreamAccumulator) -> Vec<Bytes> {
        Vec::new()
    }

    fn fail(&mut self, error: &RelayError, acc: &mut StreamAccumulator) -> Vec<Bytes> {
        error_frame(error, acc).into_iter().collect()
    }
}
