//! A single OpenAI-compatible chat-completions adapter.
//!
//! Works against OpenAI, Ollama, vLLM, LM Studio, Together, and any other
//! endpoint that follows the OpenAI chat completions wire contract. The
//! engine never sees the wire format directly — only [`ChatRequest`] /
//! [`ChatResponse`] / [`StreamEvent`].

use crate::config::ProviderConfig;
use crate::retry::{is_transient_status, is_transient_transport_error, with_fixed_schedule};
use crate::traits::{ChatRequest, ChatResponse, LlmProvider, ToolChoice};
use crate::util::{from_reqwest, resolve_api_key};
use tf_domain::capability::LlmCapabilities;
use tf_domain::error::{Error, Result};
use tf_domain::stream::{BoxStream, StreamEvent, Usage};
use tf_domain::tool::{ContentPart, Message, MessageContent, Role, ToolCall, ToolDefinition};
use tf_domain::trace::TraceEvent;
use serde_json::Value;
use std::time::Instant;

/// An LLM provider adapter for an OpenAI-compatible API endpoint.
pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: String,
    default_model: String,
    capabilities: LlmCapabilities,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new provider from config, resolving the API key from the
    /// environment variable it names.
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self> {
        let api_key = resolve_api_key(&cfg.api_key_env)?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: cfg.id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model: cfg.default_model.clone(),
            capabilities: LlmCapabilities::default(),
            client,
        })
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
    }

    fn effective_model(&self, req: &ChatRequest) -> String {
        req.model.clone().unwrap_or_else(|| self.default_model.clone())
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_chat_body(&self, req: &ChatRequest, stream: bool) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_openai).collect();

        let mut body = serde_json::json!({
            "model": self.effective_model(req),
            "messages": messages,
            "stream": stream,
        });

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_openai).collect();
            body["tools"] = Value::Array(tools);
            body["tool_choice"] = tool_choice_to_openai(&req.tool_choice);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        if stream {
            body["stream_options"] = serde_json::json!({"include_usage": true});
        }
        body
    }

    /// POST `url` with `body`, retrying transient failures on the fixed
    /// schedule. Non-transient HTTP errors are returned immediately as
    /// `Error::Provider`.
    async fn post_with_retry(&self, url: &str, body: &Value) -> Result<reqwest::Response> {
        with_fixed_schedule(&self.id, || async {
            let resp = self
                .authed_post(url)
                .json(body)
                .send()
                .await
                .map_err(|e| {
                    let transient = is_transient_transport_error(&e);
                    (from_reqwest(e), transient)
                })?;

            let status = resp.status();
            if status.is_success() {
                Ok(resp)
            } else {
                let transient = is_transient_status(status);
                let provider = self.id.clone();
                // Body must be read before returning, otherwise it's lost;
                // the caller only sees the status via this error.
                let text = resp.text().await.unwrap_or_default();
                Err((
                    Error::Provider {
                        provider,
                        message: format!("HTTP {} - {}", status.as_u16(), text),
                    },
                    transient,
                ))
            }
        })
        .await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn msg_to_openai(msg: &Message) -> Value {
    match msg.role {
        Role::Tool => tool_result_to_openai(msg),
        Role::Assistant => assistant_to_openai(msg),
        _ => {
            let text = msg.content.extract_all_text();
            serde_json::json!({
                "role": role_to_str(msg.role),
                "content": text,
            })
        }
    }
}

fn assistant_to_openai(msg: &Message) -> Value {
    let mut obj = serde_json::json!({"role": "assistant"});
    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<Value> = Vec::new();

    match &msg.content {
        MessageContent::Text(t) => text_parts.push(t.clone()),
        MessageContent::Parts(parts) => {
            for part in parts {
                match part {
                    ContentPart::Text { text } => text_parts.push(text.clone()),
                    ContentPart::ToolUse { id, name, input } => {
                        tool_calls.push(serde_json::json!({
                            "id": id,
                            "type": "function",
                            "function": {
                                "name": name,
                                "arguments": input.to_string(),
                            }
                        }));
                    }
                    _ => {}
                }
            }
        }
    }

    obj["content"] = if text_parts.is_empty() {
        Value::Null
    } else {
        Value::String(text_parts.join("\n"))
    };
    if !tool_calls.is_empty() {
        obj["tool_calls"] = Value::Array(tool_calls);
    }
    obj
}

fn tool_result_to_openai(msg: &Message) -> Value {
    match &msg.content {
        MessageContent::Parts(parts) => {
            for part in parts {
                if let ContentPart::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } = part
                {
                    return serde_json::json!({
                        "role": "tool",
                        "tool_call_id": tool_use_id,
                        "content": content,
                    });
                }
            }
            serde_json::json!({"role": "tool", "tool_call_id": "", "content": ""})
        }
        MessageContent::Text(t) => serde_json::json!({
            "role": "tool",
            "tool_call_id": "",
            "content": t,
        }),
    }
}

fn tool_to_openai(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

fn tool_choice_to_openai(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => Value::String("auto".into()),
        ToolChoice::Required => Value::String("required".into()),
        ToolChoice::Named(name) => serde_json::json!({
            "type": "function",
            "function": {"name": name}
        }),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_chat_response(body: &Value) -> Result<ChatResponse> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Provider {
            provider: "openai_compat".into(),
            message: "no choices in response".into(),
        })?;

    let message = choice.get("message").ok_or_else(|| Error::Provider {
        provider: "openai_compat".into(),
        message: "no message in choice".into(),
    })?;

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let finish_reason = choice
        .get("finish_reason")
        .and_then(|v| v.as_str())
        .map(String::from);

    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    let tool_calls = parse_openai_tool_calls(message);
    let usage = body.get("usage").and_then(parse_openai_usage);

    Ok(ChatResponse {
        content,
        tool_calls,
        usage,
        model,
        finish_reason,
    })
}

fn parse_openai_tool_calls(message: &Value) -> Vec<ToolCall> {
    let arr = match message.get("tool_calls").and_then(|v| v.as_array()) {
        Some(a) => a,
        None => return Vec::new(),
    };
    arr.iter()
        .filter_map(|tc| {
            let call_id = tc.get("id")?.as_str()?.to_string();
            let func = tc.get("function")?;
            let tool_name = func.get("name")?.as_str()?.to_string();
            let args_str = func.get("arguments")?.as_str().unwrap_or("{}");
            let arguments: Value =
                serde_json::from_str(args_str).unwrap_or(Value::Object(Default::default()));
            Some(ToolCall {
                call_id,
                tool_name,
                arguments,
            })
        })
        .collect()
}

fn parse_openai_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE streaming helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Accumulates fragmented tool-call deltas across an SSE stream.
///
/// OpenAI-compatible streams key a tool call by its `index` in every chunk;
/// the provider's real `id` appears only on the first chunk for that index.
/// `ToolCallStarted`/`ToolCallDelta` are keyed by `index` (stable across the
/// whole call); the real `id` is carried separately and attached to the
/// `ToolCallFinished` event once `finish_reason`/`[DONE]` arrives and the
/// arguments are known to be complete JSON.
#[derive(Default)]
struct ToolCallBuffer {
    id: Option<String>,
    tool_name: String,
    args: String,
}

#[derive(Default)]
struct SseState {
    tool_calls: std::collections::HashMap<u64, ToolCallBuffer>,
}

impl SseState {
    fn parse(&mut self, data: &str) -> Vec<Result<StreamEvent>> {
        if data.trim() == "[DONE]" {
            let mut events = self.finish_pending_tool_calls();
            events.push(Ok(StreamEvent::Done {
                usage: None,
                finish_reason: Some("stop".into()),
            }));
            return events;
        }

        let v: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => return vec![Err(Error::Json(e))],
        };

        let choice = v
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|a| a.first());

        // Usage-only chunk (stream_options.include_usage).
        let choice = match choice {
            Some(c) => c,
            None => {
                return v
                    .get("usage")
                    .and_then(parse_openai_usage)
                    .map(|usage| {
                        vec![Ok(StreamEvent::Done {
                            usage: Some(usage),
                            finish_reason: None,
                        })]
                    })
                    .unwrap_or_default();
            }
        };

        let delta = choice.get("delta").unwrap_or(&Value::Null);
        let mut events = Vec::new();

        if let Some(tc_arr) = delta.get("tool_calls").and_then(|v| v.as_array()) {
            for tc in tc_arr {
                let index = tc.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
                let id = tc.get("id").and_then(|v| v.as_str());
                let name = tc
                    .get("function")
                    .and_then(|f| f.get("name"))
                    .and_then(|v| v.as_str());
                let args_fragment = tc
                    .get("function")
                    .and_then(|f| f.get("arguments"))
                    .and_then(|v| v.as_str());

                let is_new = !self.tool_calls.contains_key(&index);
                let buf = self.tool_calls.entry(index).or_default();
                if let Some(id) = id {
                    buf.id = Some(id.to_string());
                }
                if let Some(name) = name {
                    buf.tool_name = name.to_string();
                }
                if is_new {
                    events.push(Ok(StreamEvent::ToolCallStarted {
                        call_id: index.to_string(),
                        tool_name: buf.tool_name.clone(),
                    }));
                }
                if let Some(fragment) = args_fragment {
                    if !fragment.is_empty() {
                        buf.args.push_str(fragment);
                        events.push(Ok(StreamEvent::ToolCallDelta {
                            call_id: index.to_string(),
                            delta: fragment.to_string(),
                        }));
                    }
                }
            }
        }

        if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
            if !text.is_empty() {
                events.push(Ok(StreamEvent::Token {
                    text: text.to_string(),
                }));
            }
        }

        if let Some(fr) = choice.get("finish_reason").and_then(|f| f.as_str()) {
            events.extend(self.finish_pending_tool_calls());
            let usage = v.get("usage").and_then(parse_openai_usage);
            events.push(Ok(StreamEvent::Done {
                usage,
                finish_reason: Some(fr.to_string()),
            }));
        }

        events
    }

    /// Drain every buffered tool call, sorted by `index` so dispatch order
    /// matches the order the provider finalized them in, and emit each as a
    /// `ToolCallFinished` keyed by its real provider `id` (falling back to
    /// the index if the provider never sent one).
    fn finish_pending_tool_calls(&mut self) -> Vec<Result<StreamEvent>> {
        let mut buffered: Vec<(u64, ToolCallBuffer)> = self.tool_calls.drain().collect();
        buffered.sort_unstable_by_key(|(index, _)| *index);

        buffered
            .into_iter()
            .map(|(index, buf)| {
                let arguments = if buf.args.trim().is_empty() {
                    Value::Object(Default::default())
                } else {
                    serde_json::from_str(&buf.args).unwrap_or_else(|_| Value::Object(Default::default()))
                };
                Ok(StreamEvent::ToolCallFinished {
                    call_id: buf.id.unwrap_or_else(|| index.to_string()),
                    tool_name: buf.tool_name,
                    arguments,
                })
            })
            .collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let url = self.chat_url();
        let body = self.build_chat_body(req, false);
        let model = self.effective_model(req);

        tracing::debug!(provider = %self.id, url = %url, "openai_compat chat request");

        let started = Instant::now();
        let resp = self.post_with_retry(&url, &body).await?;
        let resp_text = resp.text().await.map_err(from_reqwest)?;
        let resp_json: Value = serde_json::from_str(&resp_text)?;
        let parsed = parse_chat_response(&resp_json);

        TraceEvent::LlmRequest {
            provider: self.id.clone(),
            model,
            streaming: false,
            duration_ms: started.elapsed().as_millis() as u64,
            prompt_tokens: parsed.as_ref().ok().and_then(|r| r.usage.as_ref()).map(|u| u.prompt_tokens),
            completion_tokens: parsed.as_ref().ok().and_then(|r| r.usage.as_ref()).map(|u| u.completion_tokens),
        }
        .emit();

        parsed
    }

    async fn chat_stream(&self, req: &ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let url = self.chat_url();
        let body = self.build_chat_body(req, true);
        let provider = self.id.clone();
        let model = self.effective_model(req);

        tracing::debug!(provider = %provider, url = %url, "openai_compat stream request");

        // Retry applies only to establishing the stream; once bytes start
        // arriving, a mid-stream failure surfaces as `StreamEvent::Error`
        // rather than retrying (the orchestrator decides what to do with a
        // partially-received turn).
        let started = Instant::now();
        let resp = self.post_with_retry(&url, &body).await?;

        let mut state = SseState::default();
        Ok(crate::sse::sse_response_stream(resp, move |data| {
            let events = state.parse(data);
            for event in &events {
                if let Ok(StreamEvent::Done { usage, .. }) = event {
                    TraceEvent::LlmRequest {
                        provider: provider.clone(),
                        model: model.clone(),
                        streaming: true,
                        duration_ms: started.elapsed().as_millis() as u64,
                        prompt_tokens: usage.as_ref().map(|u| u.prompt_tokens),
                        completion_tokens: usage.as_ref().map(|u| u.completion_tokens),
                    }
                    .emit();
                }
            }
            events
        }))
    }

    fn capabilities(&self) -> &LlmCapabilities {
        &self.capabilities
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_choice_auto_serializes_as_string() {
        assert_eq!(tool_choice_to_openai(&ToolChoice::Auto), Value::String("auto".into()));
    }

    #[test]
    fn tool_choice_named_serializes_as_function_object() {
        let v = tool_choice_to_openai(&ToolChoice::Named("moveToLocation".into()));
        assert_eq!(v["type"], "function");
        assert_eq!(v["function"]["name"], "moveToLocation");
    }

    #[test]
    fn parse_sse_done_sentinel() {
        let mut state = SseState::default();
        let events = state.parse("[DONE]");
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Ok(StreamEvent::Done { .. })));
    }

    #[test]
    fn parse_sse_token_delta() {
        let data = r#"{"choices":[{"delta":{"content":"hello"}}]}"#;
        let mut state = SseState::default();
        let events = state.parse(data);
        assert_eq!(events.len(), 1);
        match events[0].as_ref().unwrap() {
            StreamEvent::Token { text } => assert_eq!(text, "hello"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn parse_sse_tool_call_started_then_delta_keyed_by_index() {
        let mut state = SseState::default();

        let started = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"advanceTime","arguments":""}}]}}]}"#;
        let events = state.parse(started);
        match events[0].as_ref().unwrap() {
            StreamEvent::ToolCallStarted { call_id, tool_name } => {
                assert_eq!(call_id, "0");
                assert_eq!(tool_name, "advanceTime");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let delta = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"ticks\":1}"}}]}}]}"#;
        let events = state.parse(delta);
        match events[0].as_ref().unwrap() {
            StreamEvent::ToolCallDelta { call_id, delta } => {
                assert_eq!(call_id, "0");
                assert_eq!(delta, "{\"ticks\":1}");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn finish_reason_emits_tool_call_finished_with_complete_arguments() {
        let mut state = SseState::default();
        state.parse(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"advanceTime","arguments":""}}]}}]}"#);
        state.parse(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"ticks\":1}"}}]}}]}"#);
        let events = state.parse(r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#);

        let finished = events
            .iter()
            .find_map(|e| match e {
                Ok(StreamEvent::ToolCallFinished { call_id, tool_name, arguments }) => {
                    Some((call_id.clone(), tool_name.clone(), arguments.clone()))
                }
                _ => None,
            })
            .expect("expected a ToolCallFinished event");
        assert_eq!(finished.0, "call_1");
        assert_eq!(finished.1, "advanceTime");
        assert_eq!(finished.2, serde_json::json!({"ticks": 1}));
        assert!(events.iter().any(|e| matches!(e, Ok(StreamEvent::Done { .. }))));
    }

    #[test]
    fn multiple_interleaved_tool_calls_finish_independently() {
        let mut state = SseState::default();
        state.parse(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"advanceTime","arguments":""}}]}}]}"#);
        state.parse(r#"{"choices":[{"delta":{"tool_calls":[{"index":1,"id":"call_2","function":{"name":"moveToLocation","arguments":""}}]}}]}"#);
        state.parse(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"ticks\":2}"}}]}}]}"#);
        state.parse(r#"{"choices":[{"delta":{"tool_calls":[{"index":1,"function":{"arguments":"{\"destination\":\"Market\"}"}}]}}]}"#);
        let events = state.parse("[DONE]");

        let finished: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Ok(StreamEvent::ToolCallFinished { call_id, arguments, .. }) => Some((call_id.clone(), arguments.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(finished.len(), 2);
        assert_eq!(finished[0], ("call_1".to_string(), serde_json::json!({"ticks": 2})));
        assert_eq!(finished[1], ("call_2".to_string(), serde_json::json!({"destination": "Market"})));
    }

    #[test]
    fn assistant_message_with_tool_calls_round_trips_content_null() {
        let msg = Message {
            role: Role::Assistant,
            content: MessageContent::Parts(vec![ContentPart::ToolUse {
                id: "c1".into(),
                name: "advanceTime".into(),
                input: serde_json::json!({"ticks": 1}),
            }]),
        };
        let v = assistant_to_openai(&msg);
        assert!(v["content"].is_null());
        assert_eq!(v["tool_calls"][0]["function"]["name"], "advanceTime");
    }
}
