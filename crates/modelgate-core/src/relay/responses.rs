use bytes::Bytes;

use modelgate_protocol::chat::ChatMessage;
use modelgate_protocol::responses::{
    ContentPartEvent, ItemStatus, OutputContent, OutputItemEvent, OutputTextDeltaEvent,
    OutputTextDoneEvent, ReasoningSummaryPartEvent, ReasoningSummaryTextDeltaEvent,
    ReasoningSummaryTextDoneEvent, Response, ResponseLifecycleEvent, ResponseObjectType,
    ResponseStatus, ResponseStreamEvent, SummaryPart,
};
use modelgate_protocol::sse::sse_done_bytes;

use super::{LineDelta, RelayEmitter, StreamAccumulator, error_frame, event_frame};
use crate::error::RelayError;
use crate::output::{
    MESSAGE_ID_PREFIX, REASONING_ID_PREFIX, function_call_items, message_item, new_item_id,
    reasoning_item, response_usage,
};

const MESSAGE_INDEX: i64 = 0;
const REASONING_INDEX: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReasoningPhase {
    NotStarted,
    Open,
    Closed,
}

/// Emits the `response.*` event sequence, batching text into deltas of at
/// least `min_words` words.
///
/// Reasoning is streamed only until the first content delta goes out. Once
/// content starts, the reasoning item is closed and any later reasoning is
/// kept for the final response without being streamed.
#[derive(Debug)]
pub struct ResponsesEmitter {
    response: Response,
    prompt: Vec<ChatMessage>,
    message_id: String,
    reasoning_id: String,
    min_words: usize,
    content_buffer: String,
    content_started: bool,
    reasoning_buffer: String,
    reasoning_emitted: String,
    phase: ReasoningPhase,
    completed: Option<Response>,
}

impl ResponsesEmitter {
    pub fn new(
        response_id: impl Into<String>,
        model: impl Into<String>,
        prompt: Vec<ChatMessage>,
        min_words: usize,
    ) -> Self {
        Self {
            response: Response {
                id: response_id.into(),
                object: ResponseObjectType::Response,
                created_at: time::OffsetDateTime::now_utc().unix_timestamp(),
                model: model.into(),
                status: ResponseStatus::InProgress,
                output: Vec::new(),
                usage: None,
                error: None,
                conversation: None,
            },
            prompt,
            message_id: new_item_id(MESSAGE_ID_PREFIX),
            reasoning_id: new_item_id(REASONING_ID_PREFIX),
            min_words,
            content_buffer: String::new(),
            content_started: false,
            reasoning_buffer: String::new(),
            reasoning_emitted: String::new(),
            phase: ReasoningPhase::NotStarted,
            completed: None,
        }
    }

    pub fn with_conversation(mut self, conversation: Option<String>) -> Self {
        self.response.conversation = conversation;
        self
    }

    /// The response carried by `response.completed`, once emitted.
    pub fn completed(&self) -> Option<&Response> {
        self.completed.as_ref()
    }

    fn ready(&self, buffer: &str) -> bool {
        buffer.split_whitespace().count() >= self.min_words
    }

    fn push(frames: &mut Vec<Bytes>, event: ResponseStreamEvent) {
        frames.extend(event_frame(&event));
    }

    fn open_reasoning(&mut self, acc: &mut StreamAccumulator, frames: &mut Vec<Bytes>) {
        Self::push(
            frames,
            ResponseStreamEvent::OutputItemAdded(OutputItemEvent {
                output_index: REASONING_INDEX,
                item: reasoning_item(&self.reasoning_id, "", ItemStatus::InProgress),
                sequence_number: acc.next_sequence(),
            }),
        );
        Self::push(
            frames,
            ResponseStreamEvent::ReasoningSummaryPartAdded(ReasoningSummaryPartEvent {
                item_id: self.reasoning_id.clone(),
                output_index: REASONING_INDEX,
                summary_index: 0,
                part: SummaryPart::text(""),
                sequence_number: acc.next_sequence(),
            }),
        );
        self.phase = ReasoningPhase::Open;
    }

    fn flush_reasoning(&mut self, acc: &mut StreamAccumulator, frames: &mut Vec<Bytes>) {
        if self.reasoning_buffer.is_empty() {
            return;
        }
        let delta = std::mem::take(&mut self.reasoning_buffer);
        self.reasoning_emitted.push_str(&delta);
        Self::push(
            frames,
            ResponseStreamEvent::ReasoningSummaryTextDelta(ReasoningSummaryTextDeltaEvent {
                item_id: self.reasoning_id.clone(),
                output_index: REASONING_INDEX,
                summary_index: 0,
                delta,
                sequence_number: acc.next_sequence(),
            }),
        );
    }

    fn close_reasoning(&mut self, acc: &mut StreamAccumulator, frames: &mut Vec<Bytes>) {
        if self.phase != ReasoningPhase::Open {
            return;
        }
        self.flush_reasoning(acc, frames);
        let text = self.reasoning_emitted.clone();
        Self::push(
            frames,
            ResponseStreamEvent::ReasoningSummaryTextDone(ReasoningSummaryTextDoneEvent {
                item_id: self.reasoning_id.clone(),
                output_index: REASONING_INDEX,
                summary_index: 0,
                text: text.clone(),
                sequence_number: acc.next_sequence(),
            }),
        );
        Self::push(
            frames,
            ResponseStreamEvent::ReasoningSummaryPartDone(ReasoningSummaryPartEvent {
                item_id: self.reasoning_id.clone(),
                output_index: REASONING_INDEX,
                summary_index: 0,
                part: SummaryPart::text(text.clone()),
                sequence_number: acc.next_sequence(),
            }),
        );
        Self::push(
            frames,
            ResponseStreamEvent::OutputItemDone(OutputItemEvent {
                output_index: REASONING_INDEX,
                item: reasoning_item(&self.reasoning_id, &text, ItemStatus::Completed),
                sequence_number: acc.next_sequence(),
            }),
        );
        self.phase = ReasoningPhase::Closed;
    }

    fn flush_content(&mut self, acc: &mut StreamAccumulator, frames: &mut Vec<Bytes>) {
        if self.content_buffer.is_empty() {
            return;
        }
        let delta = std::mem::take(&mut self.content_buffer);
        self.content_started = true;
        Self::push(
            frames,
            ResponseStreamEvent::OutputTextDelta(OutputTextDeltaEvent {
                item_id: self.message_id.clone(),
                output_index: MESSAGE_INDEX,
                content_index: 0,
                delta,
                sequence_number: acc.next_sequence(),
            }),
        );
    }

    fn final_response(&self, acc: &StreamAccumulator) -> Response {
        let message = acc.message();
        let mut output = vec![message_item(
            &self.message_id,
            acc.content(),
            ItemStatus::Completed,
        )];
        if !acc.reasoning().is_empty() {
            output.push(reasoning_item(
                &self.reasoning_id,
                acc.reasoning(),
                ItemStatus::Completed,
            ));
        }
        output.extend(function_call_items(&message));

        let mut response = self.response.clone();
        response.status = ResponseStatus::Completed;
        response.output = output;
        response.usage = Some(response_usage(acc.usage(&self.prompt)));
        response
    }
}

impl RelayEmitter for ResponsesEmitter {
    fn start(&mut self, acc: &mut StreamAccumulator) -> Vec<Bytes> {
        let mut frames = Vec::new();
        Self::push(
            &mut frames,
            ResponseStreamEvent::Created(ResponseLifecycleEvent {
                response: self.response.clone(),
                sequence_number: acc.next_sequence(),
            }),
        );
        Self::push(
            &mut frames,
            ResponseStreamEvent::InProgress(ResponseLifecycleEvent {
                response: self.response.clone(),
                sequence_number: acc.next_sequence(),
            }),
        );
        Self::push(
            &mut frames,
            ResponseStreamEvent::OutputItemAdded(OutputItemEvent {
                output_index: MESSAGE_INDEX,
                item: message_item(&self.message_id, "", ItemStatus::InProgress),
                sequence_number: acc.next_sequence(),
            }),
        );
        Self::push(
            &mut frames,
            ResponseStreamEvent::ContentPartAdded(ContentPartEvent {
                item_id: self.message_id.clone(),
                output_index: MESSAGE_INDEX,
                content_index: 0,
                part: OutputContent::text(""),
                sequence_number: acc.next_sequence(),
            }),
        );
        frames
    }

    fn on_line(
        &mut self,
        _line: &str,
        delta: &LineDelta,
        acc: &mut StreamAccumulator,
    ) -> Vec<Bytes> {
        let mut frames = Vec::new();

        if !delta.reasoning.is_empty() && !self.content_started {
            if self.phase == ReasoningPhase::NotStarted {
                self.open_reasoning(acc, &mut frames);
            }
            if self.phase == ReasoningPhase::Open {
                self.reasoning_buffer.push_str(&delta.reasoning);
                if self.ready(&self.reasoning_buffer) {
                    self.flush_reasoning(acc, &mut frames);
                }
            }
        }

        if !delta.content.is_empty() {
            self.close_reasoning(acc, &mut frames);
            self.content_buffer.push_str(&delta.content);
            if self.ready(&self.content_buffer) {
                self.flush_content(acc, &mut frames);
            }
        }

        frames
    }

    fn finish(&mut self, acc: &mut StreamAccumulator) -> Vec<Bytes> {
        let mut frames = Vec::new();
        self.close_reasoning(acc, &mut frames);
        self.flush_content(acc, &mut frames);

        let text = acc.content().to_string();
        Self::push(
            &mut frames,
            ResponseStreamEvent::OutputTextDone(OutputTextDoneEvent {
                item_id: self.message_id.clone(),
                output_index: MESSAGE_INDEX,
                content_index: 0,
                text: text.clone(),
                sequence_number: acc.next_sequence(),
            }),
        );
        Self::push(
            &mut frames,
            ResponseStreamEvent::ContentPartDone(ContentPartEvent {
                item_id: self.message_id.clone(),
                output_index: MESSAGE_INDEX,
                content_index: 0,
                part: OutputContent::text(text.clone()),
                sequence_number: acc.next_sequence(),
            }),
        );
        Self::push(
            &mut frames,
            ResponseStreamEvent::OutputItemDone(OutputItemEvent {
                output_index: MESSAGE_INDEX,
                item: message_item(&self.message_id, &text, ItemStatus::Completed),
                sequence_number: acc.next_sequence(),
            }),
        );

        let response = self.final_response(acc);
        Self::push(
            &mut frames,
            ResponseStreamEvent::Completed(ResponseLifecycleEvent {
                response: response.clone(),
                sequence_number: acc.next_sequence(),
            }),
        );
        self.completed = Some(response);
        frames.push(sse_done_bytes());
        frames
    }

    fn fail(&mut self, error: &RelayError, acc: &mut StreamAccumulator) -> Vec<Bytes> {
        error_frame(error, acc).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelgate_protocol::chat::ChatRole;

    fn emitter(min_words: usize) -> ResponsesEmitter {
        ResponsesEmitter::new(
            "resp_test",
            "m",
            vec![ChatMessage::text(ChatRole::User, "hi")],
            min_words,
        )
    }

    fn event_names(frames: &[Bytes]) -> Vec<String> {
        frames
            .iter()
            .filter_map(|frame| {
                let text = std::str::from_utf8(frame).ok()?;
                text.strip_prefix("event: ")
                    .and_then(|rest| rest.split('\n').next())
                    .map(str::to_string)
            })
            .collect()
    }

    fn feed(
        emitter: &mut ResponsesEmitter,
        acc: &mut StreamAccumulator,
        content: &str,
        reasoning: &str,
    ) -> Vec<Bytes> {
        let delta = LineDelta {
            content: content.to_string(),
            reasoning: reasoning.to_string(),
        };
        emitter.on_line("", &delta, acc)
    }

    #[test]
    fn content_is_held_until_enough_words() {
        let mut acc = StreamAccumulator::new();
        let mut emitter = emitter(3);
        emitter.start(&mut acc);

        assert!(feed(&mut emitter, &mut acc, "one two ", "").is_empty());
        let frames = feed(&mut emitter, &mut acc, "three", "");
        assert_eq!(event_names(&frames), vec!["response.output_text.delta"]);
    }

    #[test]
    fn reasoning_closes_before_first_content_delta() {
        let mut acc = StreamAccumulator::new();
        let mut emitter = emitter(100);
        emitter.start(&mut acc);

        let opened = feed(&mut emitter, &mut acc, "", "let me think");
        assert_eq!(
            event_names(&opened),
            vec![
                "response.output_item.added",
                "response.reasoning_summary_part.added"
            ]
        );

        let closed = feed(&mut emitter, &mut acc, "answer", "");
        assert_eq!(
            event_names(&closed),
            vec![
                "response.reasoning_summary_text.delta",
                "response.reasoning_summary_text.done",
                "response.reasoning_summary_part.done",
                "response.output_item.done",
            ]
        );

        // Reasoning after content has been streamed is not re-opened.
        let mut late = StreamAccumulator::new();
        let mut emitter = self::emitter(1);
        emitter.start(&mut late);
        feed(&mut emitter, &mut late, "streamed", "");
        assert!(feed(&mut emitter, &mut late, "", "late thought").is_empty());
    }

    #[test]
    fn start_announces_message_item() {
        let mut acc = StreamAccumulator::new();
        let frames = emitter(6).start(&mut acc);
        assert_eq!(
            event_names(&frames),
            vec![
                "response.created",
                "response.in_progress",
                "response.output_item.added",
                "response.content_part.added",
            ]
        );
    }
}
