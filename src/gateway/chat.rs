//! `POST /v1/chat/completions`.
//!
//! Grounded on `api/chat.go`'s `hdrChatCompletions` (request/response
//! shapes, the Chinese-role-marker prompt template, `---` message
//! separators). Streams genuine per-token deltas straight off the
//! orchestrator's channel rather than chunking a single complete reply
//! after the fact.

use super::AppState;
use crate::adapters::Toggle;
use crate::error::AppError;
use crate::message::NormalizedMessage;
use crate::orchestrator::{ChatHandler, ChatOptions};
use crate::tokenizer;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessageIn>,
    #[serde(default)]
    pub stream: bool,
    /// `{"type": "auto"|"enabled"|"disabled"}`; only `"disabled"` turns off
    /// the vendor's deep-think mode, matching the original's
    /// `options.Thinking != "disabled"` gate. Absent entirely leaves it on.
    #[serde(default)]
    pub thinking: Option<ThinkingConfig>,
    #[serde(default)]
    pub websearch: Option<String>,
    #[serde(default)]
    pub tools: Vec<ChatTool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ThinkingConfig {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ChatToolFunction,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatToolFunction {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatMessageIn {
    pub role: String,
    pub content: MessageContent,
}

/// Message content is either a plain string or an ordered list of parts
/// (text or image URL) — the OpenAI vision-request shape.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImageUrl {
    pub url: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub detail: Option<String>,
}

impl MessageContent {
    /// An array is joined with `\n` per spec; image parts render as their
    /// URL since the vendor only ever receives this as plain text typed
    /// into a chat box, not a multimodal attachment.
    fn render(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => text.clone(),
                    ContentPart::ImageUrl { image_url } => image_url.url.clone(),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Serialize, Default)]
pub struct ChatMessageOut {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "reasoning_content")]
    reasoning_content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionResponse {
    id: String,
    object: &'static str,
    created: u64,
    model: String,
    choices: Vec<ChatChoice>,
    usage: ChatUsage,
}

#[derive(Debug, Serialize)]
struct ChatChoice {
    index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<ChatMessageOut>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delta: Option<ChatMessageOut>,
    finish_reason: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct ChatUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}

/// `POST /v1/chat/completions`.
pub async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ChatCompletionRequest>, axum::extract::rejection::JsonRejection>,
) -> impl IntoResponse {
    if let Err(e) = super::authorize(&state, &headers) {
        return e.into_response();
    }

    let Json(request) = match body {
        Ok(b) => b,
        Err(e) => return AppError::validation(format!("invalid request body: {e}")).into_response(),
    };

    if !state.orchestrator.model_exists(&request.model) {
        return AppError::not_found(format!("unknown model: {}", request.model)).into_response();
    }
    if request.messages.is_empty() {
        return AppError::validation("messages must not be empty").into_response();
    }

    let prompt = render_prompt(&request.messages, &request.tools);
    let options = ChatOptions {
        thinking: toggle_from(request.thinking.as_ref().map(|t| t.kind.as_str())),
        websearch: toggle_from(request.websearch.as_deref()),
    };

    let handler = match state.orchestrator.handle_chat(&request.model, &prompt, options).await {
        Ok(h) => h,
        Err(e) => return e.into_response(),
    };

    let id = format!("chatcmpl-{}", handler.id);
    let created = unix_timestamp();
    let model = request.model.clone();

    if request.stream {
        stream_response(id, created, model, handler)
    } else {
        buffered_response(id, created, model, prompt, handler).await
    }
}

fn toggle_from(value: Option<&str>) -> Toggle {
    if value == Some("disabled") {
        Toggle::Disabled
    } else {
        Toggle::Enabled
    }
}

/// One `---`-separated line per message, role tagged with the original's
/// Chinese markers so the vendor model sees a conventional chat transcript
/// even though it only ever receives a single text box of input. Any
/// declared tools are appended after a `~~~` separator, one function per
/// `---`-separated block, since the vendor UIs have no native tool-call
/// protocol to hand them to.
fn render_prompt(messages: &[ChatMessageIn], tools: &[ChatTool]) -> String {
    let mut out = String::new();
    for (index, message) in messages.iter().enumerate() {
        if index > 0 {
            out.push_str("---\n");
        }
        let marker = match message.role.as_str() {
            "system" => "【系统】",
            "assistant" => "【助手】",
            "tool" => "【工具】",
            _ => "【用户】",
        };
        out.push_str(marker);
        out.push_str(&message.content.render());
        out.push('\n');
    }
    if !tools.is_empty() {
        out.push_str("~~~\n");
        for (index, tool) in tools.iter().enumerate() {
            if index > 0 {
                out.push_str("---\n");
            }
            out.push_str(&format!("{} ({})\n", tool.function.name, tool.function.description));
            out.push_str(&tool.function.parameters.to_string());
            out.push('\n');
        }
    }
    out
}

async fn buffered_response(
    id: String,
    created: u64,
    model: String,
    prompt: String,
    handler: ChatHandler,
) -> Response {
    let result = handler.wait_finish().await;
    let prompt_tokens = tokenizer::count_tokens(&prompt);
    let completion_tokens =
        tokenizer::count_tokens(&result.content) + tokenizer::count_tokens(&result.reasoning);

    let response = ChatCompletionResponse {
        id,
        object: "chat.completion",
        created,
        model,
        choices: vec![ChatChoice {
            index: 0,
            message: Some(ChatMessageOut {
                role: Some("assistant"),
                content: Some(result.content),
                reasoning_content: if result.reasoning.is_empty() { None } else { Some(result.reasoning) },
            }),
            delta: None,
            finish_reason: Some("stop"),
        }],
        usage: ChatUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        },
    };
    Json(response).into_response()
}

fn stream_response(id: String, created: u64, model: String, handler: ChatHandler) -> Response {
    let mut sent_role = false;
    let body_stream = ReceiverStream::new(handler.into_stream()).map(move |msg| {
        let mut frame = String::new();
        if !sent_role {
            sent_role = true;
            frame.push_str(&sse_frame(&stream_chunk(
                &id,
                created,
                &model,
                ChatMessageOut { role: Some("assistant"), ..Default::default() },
                None,
            )));
        }
        match msg {
            NormalizedMessage::Content(text) => frame.push_str(&sse_frame(&stream_chunk(
                &id,
                created,
                &model,
                ChatMessageOut { content: Some(text), ..Default::default() },
                None,
            ))),
            NormalizedMessage::Reasoning(text) => frame.push_str(&sse_frame(&stream_chunk(
                &id,
                created,
                &model,
                ChatMessageOut { reasoning_content: Some(text), ..Default::default() },
                None,
            ))),
            NormalizedMessage::Finish => {
                frame.push_str(&sse_frame(&stream_chunk(
                    &id,
                    created,
                    &model,
                    ChatMessageOut::default(),
                    Some("stop"),
                )));
                frame.push_str("data: [DONE]\n\n");
            }
        }
        Ok::<_, std::convert::Infallible>(axum::body::Bytes::from(frame))
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(axum::body::Body::from_stream(body_stream))
        .unwrap()
}

#[derive(Serialize)]
struct StreamChunk<'a> {
    id: &'a str,
    object: &'static str,
    created: u64,
    model: &'a str,
    choices: Vec<ChatChoice>,
}

fn stream_chunk(
    id: &str,
    created: u64,
    model: &str,
    delta: ChatMessageOut,
    finish_reason: Option<&'static str>,
) -> String {
    let chunk = StreamChunk {
        id,
        object: "chat.completion.chunk",
        created,
        model,
        choices: vec![ChatChoice { index: 0, message: None, delta: Some(delta), finish_reason }],
    };
    serde_json::to_string(&chunk).unwrap_or_else(|_| "{}".to_string())
}

fn sse_frame(json: &str) -> String {
    format!("data: {json}\n\n")
}

fn unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_prompt_inserts_separators_and_role_markers() {
        let messages = vec![
            ChatMessageIn { role: "system".into(), content: MessageContent::Text("be helpful".into()) },
            ChatMessageIn { role: "user".into(), content: MessageContent::Text("hi".into()) },
        ];
        let prompt = render_prompt(&messages, &[]);
        assert_eq!(prompt, "【系统】be helpful\n---\n【用户】hi\n");
    }

    #[test]
    fn render_prompt_single_message_has_no_separator() {
        let messages = vec![ChatMessageIn { role: "user".into(), content: MessageContent::Text("hi".into()) }];
        assert_eq!(render_prompt(&messages, &[]), "【用户】hi\n");
    }

    #[test]
    fn render_prompt_joins_array_content_parts_with_newline() {
        let messages = vec![ChatMessageIn {
            role: "user".into(),
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: "look at this".into() },
                ContentPart::ImageUrl { image_url: ImageUrl { url: "https://example.com/a.png".into(), detail: None } },
            ]),
        }];
        assert_eq!(render_prompt(&messages, &[]), "【用户】look at this\nhttps://example.com/a.png\n");
    }

    #[test]
    fn render_prompt_appends_tool_block_after_separator() {
        let messages = vec![ChatMessageIn { role: "user".into(), content: MessageContent::Text("hi".into()) }];
        let tools = vec![ChatTool {
            kind: "function".into(),
            function: ChatToolFunction {
                name: "get_weather".into(),
                description: "fetch current weather".into(),
                parameters: serde_json::json!({"type": "object"}),
            },
        }];
        let prompt = render_prompt(&messages, &tools);
        assert_eq!(
            prompt,
            "【用户】hi\n~~~\nget_weather (fetch current weather)\n{\"type\":\"object\"}\n"
        );
    }

    #[test]
    fn toggle_from_disabled_string_disables() {
        assert_eq!(toggle_from(Some("disabled")), Toggle::Disabled);
        assert_eq!(toggle_from(None), Toggle::Enabled);
        assert_eq!(toggle_from(Some("enabled")), Toggle::Enabled);
    }

    #[test]
    fn stream_chunk_omits_absent_fields() {
        let json = stream_chunk("chatcmpl-1", 0, "doubao", ChatMessageOut::default(), None);
        assert!(!json.contains("\"role\""));
        assert!(!json.contains("\"content\""));
        assert!(json.contains("\"finish_reason\":null"));
    }

    #[test]
    fn oai_request_deserializes_minimal() {
        let json = r#"{"model":"doubao","messages":[{"role":"user","content":"hi"}]}"#;
        let req: ChatCompletionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.model, "doubao");
        assert!(!req.stream);
        assert!(req.tools.is_empty());
        assert!(req.thinking.is_none());
    }

    #[test]
    fn oai_request_deserializes_array_content_object_thinking_and_tools() {
        let json = r#"{
            "model": "doubao",
            "messages": [{"role": "user", "content": [
                {"type": "text", "text": "describe this"},
                {"type": "image_url", "image_url": {"url": "https://example.com/a.png"}}
            ]}],
            "thinking": {"type": "disabled"},
            "tools": [{"type": "function", "function": {"name": "lookup", "description": "look things up", "parameters": {}}}]
        }"#;
        let req: ChatCompletionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.thinking.unwrap().kind, "disabled");
        assert_eq!(req.tools.len(), 1);
        assert_eq!(req.tools[0].function.name, "lookup");
        match &req.messages[0].content {
            MessageContent::Parts(parts) => assert_eq!(parts.len(), 2),
            MessageContent::Text(_) => panic!("expected array content"),
        }
    }
}
