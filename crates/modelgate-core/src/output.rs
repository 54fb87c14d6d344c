//! Builders for normalized `output` items.

use modelgate_common::generate_public_id;
use modelgate_protocol::chat::{ChatMessage, ChatRole, CompletionUsage};
use modelgate_protocol::responses::{
    FunctionCallItem, ItemStatus, OutputContent, OutputItem, OutputMessage, ReasoningItem,
    ResponseUsage, SummaryPart,
};

pub const RESPONSE_ID_PREFIX: &str = "resp";
pub const MESSAGE_ID_PREFIX: &str = "msg";
pub const REASONING_ID_PREFIX: &str = "rs";
pub const FUNCTION_CALL_ID_PREFIX: &str = "fc";
const ID_LEN: usize = 24;

pub fn new_item_id(prefix: &str) -> String {
    generate_public_id(prefix, ID_LEN)
}

pub fn message_item(id: &str, text: &str, status: ItemStatus) -> OutputItem {
    OutputItem::Message(OutputMessage {
        id: id.to_string(),
        status,
        role: ChatRole::Assistant,
        content: if text.is_empty() && status == ItemStatus::InProgress {
            Vec::new()
        } else {
            vec![OutputContent::text(text)]
        },
    })
}

pub fn reasoning_item(id: &str, text: &str, status: ItemStatus) -> OutputItem {
    OutputItem::Reasoning(ReasoningItem {
        id: id.to_string(),
        status: Some(status),
        summary: if text.is_empty() {
            Vec::new()
        } else {
            vec![SummaryPart::text(text)]
        },
    })
}

/// One `function_call` item per completed tool call or legacy function call.
pub fn function_call_items(message: &ChatMessage) -> Vec<OutputItem> {
    let mut items = Vec::new();
    if let Some(call) = &message.function_call {
        items.push(OutputItem::FunctionCall(FunctionCallItem {
            id: new_item_id(FUNCTION_CALL_ID_PREFIX),
            call_id: call.name.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
            status: ItemStatus::Completed,
        }));
    }
    for call in message.tool_calls.iter().flatten() {
        items.push(OutputItem::FunctionCall(FunctionCallItem {
            id: new_item_id(FUNCTION_CALL_ID_PREFIX),
            call_id: call.id.clone(),
            name: call.function.name.clone(),
            arguments: call.function.arguments.clone(),
            status: ItemStatus::Completed,
        }));
    }
    items
}

/// Unary output order: reasoning (if any), the message, then calls.
pub fn unary_output(message: &ChatMessage) -> Vec<OutputItem> {
    let mut output = Vec::new();
    if let Some(reasoning) = message
        .reasoning_content
        .as_deref()
        .filter(|text| !text.is_empty())
    {
        output.push(reasoning_item(
            &new_item_id(REASONING_ID_PREFIX),
            reasoning,
            ItemStatus::Completed,
        ));
    }
    output.push(message_item(
        &new_item_id(MESSAGE_ID_PREFIX),
        &message.content_text(),
        ItemStatus::Completed,
    ));
    output.extend(function_call_items(message));
    output
}

pub fn response_usage(usage: CompletionUsage) -> ResponseUsage {
    ResponseUsage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelgate_protocol::chat::{FunctionCall, ToolCall};

    #[test]
    fn unary_output_puts_reasoning_first() {
        let mut message = ChatMessage::text(ChatRole::Assistant, "answer");
        message.reasoning_content = Some("thinking".to_string());
        message.tool_calls = Some(vec![ToolCall {
            id: "call_0".to_string(),
            kind: "function".to_string(),
            function: FunctionCall {
                name: "lookup".to_string(),
                arguments: "{}".to_string(),
            },
        }]);

        let output = unary_output(&message);
        assert_eq!(output.len(), 3);
        assert!(matches!(&output[0], OutputItem::Reasoning(item) if item.id.starts_with("rs_")));
        assert!(matches!(&output[1], OutputItem::Message(item) if item.id.starts_with("msg_")));
        assert!(
            matches!(&output[2], OutputItem::FunctionCall(item) if item.call_id == "call_0" && item.name == "lookup")
        );
    }

    #[test]
    fn empty_reasoning_is_omitted() {
        let mut message = ChatMessage::text(ChatRole::Assistant, "answer");
        message.reasoning_content = Some(String::new());
        let output = unary_output(&message);
        assert_eq!(output.len(), 1);
    }
}
