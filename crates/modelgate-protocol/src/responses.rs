use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::chat::{ChatRole, MessageContent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
    Failed,
}

impl ResponseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseStatus::Pending => "pending",
            ResponseStatus::InProgress => "in_progress",
            ResponseStatus::Completed => "completed",
            ResponseStatus::Cancelled => "cancelled",
            ResponseStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ResponseStatus::Pending),
            "in_progress" => Some(ResponseStatus::InProgress),
            "completed" => Some(ResponseStatus::Completed),
            "cancelled" => Some(ResponseStatus::Cancelled),
            "failed" => Some(ResponseStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    InProgress,
    Completed,
    Incomplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResponseObjectType {
    #[default]
    #[serde(rename = "response")]
    Response,
}

/// The normalized response object returned to callers and persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(default)]
    pub object: ResponseObjectType,
    pub created_at: i64,
    pub model: String,
    pub status: ResponseStatus,
    #[serde(default)]
    pub output: Vec<OutputItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ResponseUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Message(OutputMessage),
    Reasoning(ReasoningItem),
    FunctionCall(FunctionCallItem),
}

impl OutputItem {
    pub fn id(&self) -> &str {
        match self {
            OutputItem::Message(item) => &item.id,
            OutputItem::Reasoning(item) => &item.id,
            OutputItem::FunctionCall(item) => &item.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputMessage {
    pub id: String,
    pub status: ItemStatus,
    pub role: ChatRole,
    #[serde(default)]
    pub content: Vec<OutputContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputContent {
    OutputText(OutputTextContent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputTextContent {
    pub text: String,
    #[serde(default)]
    pub annotations: Vec<Value>,
}

impl OutputContent {
    pub fn text(text: impl Into<String>) -> Self {
        OutputContent::OutputText(OutputTextContent {
            text: text.into(),
            annotations: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ItemStatus>,
    #[serde(default)]
    pub summary: Vec<SummaryPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SummaryPart {
    SummaryText(SummaryTextContent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryTextContent {
    pub text: String,
}

impl SummaryPart {
    pub fn text(text: impl Into<String>) -> Self {
        SummaryPart::SummaryText(SummaryTextContent { text: text.into() })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallItem {
    pub id: String,
    pub call_id: String,
    pub name: String,
    pub arguments: String,
    pub status: ItemStatus,
}

/// Request body of `POST /v1/responses`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateResponseRequest {
    pub model: String,
    pub input: ResponseInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Public id of the conversation the exchange is appended to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseInput {
    Text(String),
    Messages(Vec<InputMessage>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputMessage {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub role: ChatRole,
    pub content: MessageContent,
}

/// Leading frame of the pass-through relay, sent before any upstream bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMetadata {
    pub conversation_id: String,
    pub conversation_created: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ask_item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_item_id: Option<String>,
}

impl ConversationMetadata {
    pub const EVENT: &'static str = "conversation.metadata";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseStreamEvent {
    #[serde(rename = "response.created")]
    Created(ResponseLifecycleEvent),
    #[serde(rename = "response.in_progress")]
    InProgress(ResponseLifecycleEvent),
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded(OutputItemEvent),
    #[serde(rename = "response.content_part.added")]
    ContentPartAdded(ContentPartEvent),
    #[serde(rename = "response.reasoning_summary_part.added")]
    ReasoningSummaryPartAdded(ReasoningSummaryPartEvent),
    #[serde(rename = "response.reasoning_summary_text.delta")]
    ReasoningSummaryTextDelta(ReasoningSummaryTextDeltaEvent),
    #[serde(rename = "response.reasoning_summary_text.done")]
    ReasoningSummaryTextDone(ReasoningSummaryTextDoneEvent),
    #[serde(rename = "response.reasoning_summary_part.done")]
    ReasoningSummaryPartDone(ReasoningSummaryPartEvent),
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta(OutputTextDeltaEvent),
    #[serde(rename = "response.output_text.done")]
    OutputTextDone(OutputTextDoneEvent),
    #[serde(rename = "response.content_part.done")]
    ContentPartDone(ContentPartEvent),
    #[serde(rename = "response.output_item.done")]
    OutputItemDone(OutputItemEvent),
    #[serde(rename = "response.completed")]
    Completed(ResponseLifecycleEvent),
    #[serde(rename = "response.error")]
    Error(ResponseErrorEvent),
}

impl ResponseStreamEvent {
    /// Value of the SSE `event:` line.
    pub fn event_type(&self) -> &'static str {
        match self {
            ResponseStreamEvent::Created(_) => "response.created",
            ResponseStreamEvent::InProgress(_) => "response.in_progress",
            ResponseStreamEvent::OutputItemAdded(_) => "response.output_item.added",
            ResponseStreamEvent::ContentPartAdded(_) => "response.content_part.added",
            ResponseStreamEvent::ReasoningSummaryPartAdded(_) => {
                "response.reasoning_summary_part.added"
            }
            ResponseStreamEvent::ReasoningSummaryTextDelta(_) => {
                "response.reasoning_summary_text.delta"
            }
            ResponseStreamEvent::ReasoningSummaryTextDone(_) => {
                "response.reasoning_summary_text.done"
            }
            ResponseStreamEvent::ReasoningSummaryPartDone(_) => {
                "response.reasoning_summary_part.done"
            }
            ResponseStreamEvent::OutputTextDelta(_) => "response.output_text.delta",
            ResponseStreamEvent::OutputTextDone(_) => "response.output_text.done",
            ResponseStreamEvent::ContentPartDone(_) => "response.content_part.done",
            ResponseStreamEvent::OutputItemDone(_) => "response.output_item.done",
            ResponseStreamEvent::Completed(_) => "response.completed",
            ResponseStreamEvent::Error(_) => "response.error",
        }
    }

    pub fn sequence_number(&self) -> i64 {
        match self {
            ResponseStreamEvent::Created(event)
            | ResponseStreamEvent::InProgress(event)
            | ResponseStreamEvent::Completed(event) => event.sequence_number,
            ResponseStreamEvent::OutputItemAdded(event)
            | ResponseStreamEvent::OutputItemDone(event) => event.sequence_number,
            ResponseStreamEvent::ContentPartAdded(event)
            | ResponseStreamEvent::ContentPartDone(event) => event.sequence_number,
            ResponseStreamEvent::ReasoningSummaryPartAdded(event)
            | ResponseStreamEvent::ReasoningSummaryPartDone(event) => event.sequence_number,
            ResponseStreamEvent::ReasoningSummaryTextDelta(event) => event.sequence_number,
            ResponseStreamEvent::ReasoningSummaryTextDone(event) => event.sequence_number,
            ResponseStreamEvent::OutputTextDelta(event) => event.sequence_number,
            ResponseStreamEvent::OutputTextDone(event) => event.sequence_number,
            ResponseStreamEvent::Error(event) => event.sequence_number,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseLifecycleEvent {
    pub response: Response,
    pub sequence_number: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputItemEvent {
    pub output_index: i64,
    pub item: OutputItem,
    pub sequence_number: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPartEvent {
    pub item_id: String,
    pub output_index: i64,
    pub content_index: i64,
    pub part: OutputContent,
    pub sequence_number: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningSummaryPartEvent {
    pub item_id: String,
    pub output_index: i64,
    pub summary_index: i64,
    pub part: SummaryPart,
    pub sequence_number: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningSummaryTextDeltaEvent {
    pub item_id: String,
    pub output_index: i64,
    pub summary_index: i64,
    pub delta: String,
    pub sequence_number: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningSummaryTextDoneEvent {
    pub item_id: String,
    pub output_index: i64,
    pub summary_index: i64,
    pub text: String,
    pub sequence_number: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputTextDeltaEvent {
    pub item_id: String,
    pub output_index: i64,
    pub content_index: i64,
    pub delta: String,
    pub sequence_number: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputTextDoneEvent {
    pub item_id: String,
    pub output_index: i64,
    pub content_index: i64,
    pub text: String,
    pub sequence_number: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseErrorEvent {
    pub code: String,
    pub message: String,
    pub sequence_number: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_tag_matches_event_line() {
        let event = ResponseStreamEvent::OutputTextDelta(OutputTextDeltaEvent {
            item_id: "msg_1".to_string(),
            output_index: 0,
            content_index: 0,
            delta: "Hello".to_string(),
            sequence_number: 4,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
        assert_eq!(json["sequence_number"], 4);
        assert_eq!(event.sequence_number(), 4);
    }

    #[test]
    fn responses_input_accepts_text_or_messages() {
        let text: CreateResponseRequest =
            serde_json::from_value(serde_json::json!({"model": "m", "input": "hi"})).unwrap();
        assert!(matches!(text.input, ResponseInput::Text(ref t) if t == "hi"));

        let messages: CreateResponseRequest = serde_json::from_value(serde_json::json!({
            "model": "m",
            "input": [{"role": "user", "content": [{"type": "input_text", "text": "yo"}]}],
            "stream": true
        }))
        .unwrap();
        match messages.input {
            ResponseInput::Messages(items) => assert_eq!(items[0].content.text(), "yo"),
            other => panic!("unexpected input {other:?}"),
        }
    }
}
