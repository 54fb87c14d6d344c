//! Streaming completion relay.
//!
//! One relay runs a producer task that reads the upstream body line by line
//! and a consumer loop (the caller's task) that folds every line into a
//! [`StreamAccumulator`] and hands it to a [`RelayEmitter`] which decides
//! what the caller sees. The two halves meet only through bounded channels.

mod accumulator;
mod context;
mod passthrough;
mod responses;
mod sink;

use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use modelgate_protocol::chat::ChatCompletionRequest;
use modelgate_protocol::responses::{ResponseErrorEvent, ResponseStreamEvent};
use modelgate_protocol::sse::{LineDecoder, is_done_line, sse_event_bytes};

use crate::error::RelayError;
use crate::inference::{ByteStream, InferenceClient};

pub use accumulator::{CallFragment, LineDelta, StreamAccumulator, estimate_tokens};
pub use context::{RelayConfig, RelayContext};
pub use passthrough::PassthroughEmitter;
pub use responses::ResponsesEmitter;
pub use sink::{ChannelSink, CollectingSink, EventSink, SinkClosed};

/// Upper bound on delivering the terminal error frame once the relay is over.
const FAIL_WRITE_GRACE: Duration = Duration::from_secs(5);

/// Turns relay progress into caller-facing frames.
pub trait RelayEmitter: Send {
    /// Frames written before the first upstream line.
    fn start(&mut self, acc: &mut StreamAccumulator) -> Vec<Bytes>;

    /// Called after `line` has been folded into `acc`.
    fn on_line(&mut self, line: &str, delta: &LineDelta, acc: &mut StreamAccumulator)
    -> Vec<Bytes>;

    /// Called once when the upstream stream ended normally.
    fn finish(&mut self, acc: &mut StreamAccumulator) -> Vec<Bytes>;

    /// Called exactly once when the relay aborts.
    fn fail(&mut self, error: &RelayError, acc: &mut StreamAccumulator) -> Vec<Bytes>;
}

#[derive(Debug)]
pub struct RelayOutcome {
    pub accumulator: StreamAccumulator,
    pub result: Result<(), RelayError>,
}

/// Opens the upstream stream under the relay deadline.
pub async fn open_stream(
    ctx: &RelayContext,
    client: &dyn InferenceClient,
    request: &ChatCompletionRequest,
) -> Result<ByteStream, RelayError> {
    Ok(ctx.run(client.create_chat_completion_stream(request)).await??)
}

/// `event: response.error` frame shared by every emitter.
pub(crate) fn error_frame(error: &RelayError, acc: &mut StreamAccumulator) -> Option<Bytes> {
    let event = ResponseStreamEvent::Error(ResponseErrorEvent {
        code: error.code().to_string(),
        message: error.to_string(),
        sequence_number: acc.next_sequence(),
    });
    event_frame(&event)
}

pub(crate) fn event_frame(event: &ResponseStreamEvent) -> Option<Bytes> {
    match sse_event_bytes(event.event_type(), event) {
        Ok(frame) => Some(frame),
        Err(err) => {
            warn!(event = "frame_encode_failed", kind = event.event_type(), error = %err);
            None
        }
    }
}

enum Step {
    Line(String),
    Finished,
    Failed(RelayError),
}

/// Drives one relay to completion. Exactly one of `finish` or `fail` is
/// called on `emitter`, and the producer has exited when this returns.
pub async fn relay<E, S>(
    ctx: &RelayContext,
    config: &RelayConfig,
    upstream: ByteStream,
    emitter: &mut E,
    sink: &mut S,
) -> RelayOutcome
where
    E: RelayEmitter + ?Sized,
    S: EventSink + ?Sized,
{
    let scope = ctx.child();
    let mut acc = StreamAccumulator::new();
    let (data_tx, mut data_rx) = mpsc::channel::<String>(config.data_buffer.max(1));
    let (err_tx, mut err_rx) = mpsc::channel::<RelayError>(config.error_buffer.max(1));

    info!(event = "relay_started");
    let started = emitter.start(&mut acc);
    let mut result = write_frames(&scope, sink, started).await;

    let producer = spawn_producer(scope.clone(), config.max_line, upstream, data_tx, err_tx);

    if result.is_ok() {
        result = loop {
            let step = tokio::select! {
                biased;
                reason = scope.done() => Step::Failed(reason),
                _ = sink.closed() => Step::Failed(RelayError::Cancelled),
                line = data_rx.recv() => match line {
                    Some(line) => Step::Line(line),
                    None => match err_rx.try_recv() {
                        Ok(err) => Step::Failed(err),
                        Err(_) => Step::Finished,
                    },
                },
                Some(err) = err_rx.recv() => Step::Failed(err),
            };

            match step {
                Step::Line(line) => {
                    let delta = acc.apply_line(&line);
                    let frames = emitter.on_line(&line, &delta, &mut acc);
                    if let Err(err) = write_frames(&scope, sink, frames).await {
                        break Err(err);
                    }
                    if is_done_line(&line) {
                        break Ok(());
                    }
                }
                Step::Finished => break Ok(()),
                Step::Failed(err) => break Err(err),
            }
        };
    }

    if result.is_ok() {
        let frames = emitter.finish(&mut acc);
        if let Err(err) = write_frames(&scope, sink, frames).await {
            result = Err(err);
        }
    }

    if let Err(err) = &result {
        let frames = emitter.fail(err, &mut acc);
        let delivered = tokio::time::timeout(FAIL_WRITE_GRACE, async {
            for frame in frames {
                sink.send(frame).await?;
            }
            Ok::<_, SinkClosed>(())
        })
        .await;
        if !matches!(delivered, Ok(Ok(()))) {
            debug!(event = "relay_error_undelivered", code = err.code());
        }
    }

    scope.cancel();
    drop(data_rx);
    if let Err(err) = producer.await {
        warn!(event = "relay_producer_panicked", error = %err);
    }

    match &result {
        Ok(()) => info!(
            event = "relay_completed",
            content_len = acc.content().len(),
            reasoning_len = acc.reasoning().len(),
        ),
        Err(err) => warn!(event = "relay_error", code = err.code(), error = %err),
    }

    RelayOutcome {
        accumulator: acc,
        result,
    }
}

/// Writes `frames` in order. A closed caller counts as cancellation.
async fn write_frames<S: EventSink + ?Sized>(
    scope: &RelayContext,
    sink: &mut S,
    frames: Vec<Bytes>,
) -> Result<(), RelayError> {
    for frame in frames {
        match scope.run(sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(SinkClosed)) => return Err(RelayError::Cancelled),
            Err(reason) => return Err(reason),
        }
    }
    Ok(())
}

fn spawn_producer(
    scope: RelayContext,
    max_line: usize,
    upstream: ByteStream,
    data_tx: mpsc::Sender<String>,
    err_tx: mpsc::Sender<RelayError>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let outcome = produce(&scope, max_line, upstream, &data_tx).await;
        if let Err(err) = outcome {
            // The consumer may already be gone; dropping the error is fine then.
            let _ = err_tx.try_send(err);
        }
    })
}

/// Reads `upstream` to the end and forwards every line. The upstream body
/// is dropped (closing the connection) when this returns on any path.
async fn produce(
    scope: &RelayContext,
    max_line: usize,
    mut upstream: ByteStream,
    data_tx: &mpsc::Sender<String>,
) -> Result<(), RelayError> {
    let mut decoder = LineDecoder::new(max_line);

    loop {
        let next = tokio::select! {
            biased;
            reason = scope.done() => return Err(reason),
            next = upstream.next() => next,
        };

        let lines = match next {
            Some(Ok(chunk)) => decoder
                .push(&chunk)
                .map_err(|err| RelayError::StreamRead(err.to_string()))?,
            Some(Err(err)) => return Err(RelayError::StreamRead(err.to_string())),
            None => break,
        };
        for line in lines {
            if !forward(scope, data_tx, line).await? {
                return Ok(());
            }
        }
    }

    drop(upstream);
    if let Some(tail) = decoder.finish() {
        forward(scope, data_tx, tail).await?;
    }
    Ok(())
}

/// `Ok(false)` once the consumer stopped listening.
async fn forward(
    scope: &RelayContext,
    data_tx: &mpsc::Sender<String>,
    line: String,
) -> Result<bool, RelayError> {
    tokio::select! {
        biased;
        reason = scope.done() => Err(reason),
        sent = data_tx.send(line) => Ok(sent.is_ok()),
    }
}
