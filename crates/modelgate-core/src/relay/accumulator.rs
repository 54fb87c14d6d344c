use std::collections::BTreeMap;

use tracing::warn;

use modelgate_protocol::chat::{
    ChatChoice, ChatCompletionChunk, ChatCompletionObjectType, ChatCompletionResponse, ChatMessage,
    ChatRole, CompletionUsage, FunctionCall, FunctionCallDelta, MessageContent, ToolCall,
};
use modelgate_protocol::sse::{data_payload, is_done_line};

/// Text one upstream line contributed, across every choice it carried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineDelta {
    pub content: String,
    pub reasoning: String,
}

impl LineDelta {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.reasoning.is_empty()
    }
}

/// Streamed fragments of one function or tool call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallFragment {
    pub id: Option<String>,
    pub kind: Option<String>,
    pub name: String,
    pub arguments: String,
    complete: bool,
}

impl CallFragment {
    fn merge(&mut self, delta: &FunctionCallDelta) {
        if let Some(name) = delta.name.as_deref().filter(|name| !name.is_empty()) {
            self.name = name.to_string();
        }
        if let Some(arguments) = delta.arguments.as_deref() {
            self.arguments.push_str(arguments);
        }
        // Approximation: a trailing `}` is taken as the end of the JSON
        // arguments. Once complete, a fragment stays complete.
        if !self.name.is_empty() && !self.arguments.is_empty() && self.arguments.ends_with('}') {
            self.complete = true;
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

/// Request-scoped state reassembling a streamed completion.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    id: String,
    model: String,
    created: i64,
    content: String,
    reasoning: String,
    sequence: i64,
    function_calls: BTreeMap<i64, CallFragment>,
    tool_calls: BTreeMap<i64, CallFragment>,
    usage: Option<CompletionUsage>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current sequence number and advances the counter.
    pub fn next_sequence(&mut self) -> i64 {
        let current = self.sequence;
        self.sequence += 1;
        current
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn upstream_usage(&self) -> Option<&CompletionUsage> {
        self.usage.as_ref()
    }

    pub fn function_call(&self, index: i64) -> Option<&CallFragment> {
        self.function_calls.get(&index)
    }

    pub fn tool_call(&self, index: i64) -> Option<&CallFragment> {
        self.tool_calls.get(&index)
    }

    /// Parses one relayed line. Anything that is not a JSON `data:` frame
    /// contributes nothing; malformed JSON is logged and skipped.
    pub fn apply_line(&mut self, line: &str) -> LineDelta {
        let Some(payload) = data_payload(line) else {
            return LineDelta::default();
        };
        if payload.is_empty() || is_done_line(line) {
            return LineDelta::default();
        }
        match serde_json::from_str::<ChatCompletionChunk>(payload) {
            Ok(chunk) => self.apply_chunk(&chunk),
            Err(err) => {
                warn!(event = "chunk_parse_failed", error = %err);
                LineDelta::default()
            }
        }
    }

    pub fn apply_chunk(&mut self, chunk: &ChatCompletionChunk) -> LineDelta {
        if self.id.is_empty() && !chunk.id.is_empty() {
            self.id = chunk.id.clone();
        }
        if self.model.is_empty() && !chunk.model.is_empty() {
            self.model = chunk.model.clone();
        }
        if self.created == 0 {
            self.created = chunk.created;
        }
        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }

        let mut delta = LineDelta::default();
        for choice in &chunk.choices {
            if let Some(content) = choice.delta.content.as_deref() {
                delta.content.push_str(content);
            }
            if let Some(reasoning) = choice.delta.reasoning_text() {
                delta.reasoning.push_str(reasoning);
            }
            if let Some(function_call) = &choice.delta.function_call {
                self.function_calls
                    .entry(0)
                    .or_default()
                    .merge(function_call);
            }
            for tool_call in choice.delta.tool_calls.iter().flatten() {
                let slot = self.tool_calls.entry(tool_call.index).or_default();
                if slot.id.is_none() {
                    slot.id = tool_call.id.clone().filter(|id| !id.is_empty());
                }
                if slot.kind.is_none() {
                    slot.kind = tool_call.kind.clone().filter(|kind| !kind.is_empty());
                }
                if let Some(function) = &tool_call.function {
                    slot.merge(function);
                }
            }
        }
        self.content.push_str(&delta.content);
        self.reasoning.push_str(&delta.reasoning);
        delta
    }

    pub fn completed_function_call(&self) -> Option<FunctionCall> {
        self.function_calls
            .values()
            .find(|fragment| fragment.is_complete())
            .map(|fragment| FunctionCall {
                name: fragment.name.clone(),
                arguments: fragment.arguments.clone(),
            })
    }

    pub fn completed_tool_calls(&self) -> Vec<ToolCall> {
        self.tool_calls
            .iter()
            .filter(|(_, fragment)| fragment.is_complete())
            .map(|(index, fragment)| ToolCall {
                id: fragment
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("call_{index}")),
                kind: fragment
                    .kind
                    .clone()
                    .unwrap_or_else(|| "function".to_string()),
                function: FunctionCall {
                    name: fragment.name.clone(),
                    arguments: fragment.arguments.clone(),
                },
            })
            .collect()
    }

    /// `tool_calls` beats `function_call` beats `stop`.
    pub fn finish_reason(&self) -> &'static str {
        if self.tool_calls.values().any(CallFragment::is_complete) {
            "tool_calls"
        } else if self.function_calls.values().any(CallFragment::is_complete) {
            "function_call"
        } else {
            "stop"
        }
    }

    /// The assistant message reconstructed from every fragment seen so far.
    pub fn message(&self) -> ChatMessage {
        let tool_calls = self.completed_tool_calls();
        ChatMessage {
            role: ChatRole::Assistant,
            content: Some(MessageContent::Text(self.content.clone())),
            name: None,
            reasoning_content: (!self.reasoning.is_empty()).then(|| self.reasoning.clone()),
            function_call: self.completed_function_call(),
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            tool_call_id: None,
        }
    }

    /// Vendor-reported usage, else the word-count estimate.
    pub fn usage(&self, prompt: &[ChatMessage]) -> CompletionUsage {
        if let Some(usage) = self.usage {
            return usage;
        }
        let prompt_tokens = estimate_tokens(prompt);
        let completion_tokens = estimate_tokens(std::slice::from_ref(&self.message()));
        CompletionUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// One chat-completion-shaped response synthesized from the stream.
    /// Usage reported by the vendor wins over the word-count estimate.
    pub fn into_response(
        self,
        fallback_model: &str,
        prompt: &[ChatMessage],
    ) -> ChatCompletionResponse {
        let message = self.message();
        let usage = self.usage(prompt);
        let model = if self.model.is_empty() {
            fallback_model.to_string()
        } else {
            self.model.clone()
        };
        ChatCompletionResponse {
            id: self.id.clone(),
            object: ChatCompletionObjectType::default(),
            created: if self.created == 0 {
                time::OffsetDateTime::now_utc().unix_timestamp()
            } else {
                self.created
            },
            model,
            choices: vec![ChatChoice {
                index: 0,
                finish_reason: Some(self.finish_reason().to_string()),
                message,
            }],
            usage: Some(usage),
            system_fingerprint: None,
            metadata: None,
        }
    }
}

/// Whitespace-delimited word count over message text, call names, ids and
/// arguments. Not a tokenizer.
pub fn estimate_tokens(messages: &[ChatMessage]) -> i64 {
    let mut words = 0usize;
    let mut count = |text: &str| words += text.split_whitespace().count();
    for message in messages {
        count(&message.content_text());
        if let Some(function_call) = &message.function_call {
            count(&function_call.name);
            count(&function_call.arguments);
        }
        for tool_call in message.tool_calls.iter().flatten() {
            count(&tool_call.id);
            count(&tool_call.function.name);
            count(&tool_call.function.arguments);
        }
    }
    words as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(json: serde_json::Value) -> String {
        format!("data: {json}")
    }

    #[test]
    fn tool_call_completes_only_on_closing_brace() {
        let mut acc = StreamAccumulator::new();
        acc.apply_line(&data(serde_json::json!({
            "choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "id": "call_a", "type": "function", "function": {"name": "f"}}
            ]}}]
        })));
        acc.apply_line(&data(serde_json::json!({
            "choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "{\"a\":1"}}
            ]}}]
        })));
        assert!(!acc.tool_call(0).unwrap().is_complete());
        assert_eq!(acc.finish_reason(), "stop");

        acc.apply_line(&data(serde_json::json!({
            "choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "}"}}
            ]}}]
        })));
        let calls = acc.completed_tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].function.name, "f");
        assert_eq!(calls[0].function.arguments, "{\"a\":1}");
        assert_eq!(acc.finish_reason(), "tool_calls");
    }

    #[test]
    fn legacy_function_call_sets_its_finish_reason() {
        let mut acc = StreamAccumulator::new();
        acc.apply_line(&data(serde_json::json!({
            "choices": [{"delta": {"function_call": {"name": "lookup", "arguments": "{\"q\":"}}}]
        })));
        acc.apply_line(&data(serde_json::json!({
            "choices": [{"delta": {"function_call": {"arguments": "\"x\"}"}}}]
        })));
        assert_eq!(acc.finish_reason(), "function_call");
        let call = acc.completed_function_call().unwrap();
        assert_eq!(call.name, "lookup");
        assert_eq!(call.arguments, "{\"q\":\"x\"}");
    }

    #[test]
    fn nameless_call_never_completes() {
        let mut acc = StreamAccumulator::new();
        acc.apply_line(&data(serde_json::json!({
            "choices": [{"delta": {"tool_calls": [{"index": 2, "function": {"arguments": "{}"}}]}}]
        })));
        assert!(acc.completed_tool_calls().is_empty());
    }

    #[test]
    fn content_and_reasoning_merge_across_choices() {
        let mut acc = StreamAccumulator::new();
        let delta = acc.apply_line(&data(serde_json::json!({
            "id": "chatcmpl-1",
            "model": "m",
            "choices": [
                {"index": 0, "delta": {"content": "He", "reasoning_content": "think"}},
                {"index": 1, "delta": {"content": "y"}}
            ]
        })));
        assert_eq!(delta.content, "Hey");
        assert_eq!(delta.reasoning, "think");
        assert_eq!(acc.content(), "Hey");
        assert_eq!(acc.reasoning(), "think");
    }

    #[test]
    fn malformed_and_control_lines_contribute_nothing() {
        let mut acc = StreamAccumulator::new();
        assert!(acc.apply_line("data: {not json").is_empty());
        assert!(acc.apply_line("data: [DONE]").is_empty());
        assert!(acc.apply_line(": keep-alive").is_empty());
        assert!(acc.apply_line("").is_empty());
        assert_eq!(acc.content(), "");
    }

    #[test]
    fn synthesized_response_estimates_usage() {
        let mut acc = StreamAccumulator::new();
        acc.apply_line(&data(serde_json::json!({"choices": [{"delta": {"content": "He"}}]})));
        acc.apply_line(&data(serde_json::json!({"choices": [{"delta": {"content": "llo world"}}]})));
        let prompt = vec![ChatMessage::text(ChatRole::User, "say hi please")];

        let response = acc.into_response("m", &prompt);
        let choice = &response.choices[0];
        assert_eq!(response.model, "m");
        assert_eq!(choice.message.content_text(), "Hello world");
        assert_eq!(choice.finish_reason.as_deref(), Some("stop"));
        let usage = response.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 3);
        assert_eq!(usage.completion_tokens, 2);
        assert_eq!(usage.total_tokens, 5);
    }

    #[test]
    fn sequence_numbers_increase_from_zero() {
        let mut acc = StreamAccumulator::new();
        assert_eq!(acc.next_sequence(), 0);
        assert_eq!(acc.next_sequence(), 1);
        assert_eq!(acc.next_sequence(), 2);
    }
}
