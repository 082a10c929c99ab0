use super::{AdapterOptions, ChatAdapter};
use crate::error::AppError;
use crate::message::NormalizedMessage;
use async_trait::async_trait;
use fantoccini::{Client, Locator};
use serde::Deserialize;
use std::time::Duration;

#[derive(Default)]
pub struct DoubaoAdapter {
    client: Option<Client>,
    reasoning_open: bool,
}

impl DoubaoAdapter {
    fn client(&self) -> Result<&Client, AppError> {
        self.client.as_ref().ok_or_else(|| AppError::internal("doubao adapter not set up"))
    }
}

#[async_trait]
impl ChatAdapter for DoubaoAdapter {
    fn name(&self) -> &'static str {
        "doubao"
    }

    fn url(&self) -> &'static str {
        "https://www.doubao.com/chat/"
    }

    async fn setup(&mut self, options: AdapterOptions) {
        self.client = Some(options.client);
    }

    async fn input(&mut self, prompt: &str) -> Result<(), AppError> {
        let client = self.client()?;

        let create = client
            .wait()
            .at_most(Duration::from_secs(5))
            .for_element(Locator::Css(r#"[data-testid="create_conversation_button"]"#))
            .await
            .or(client
                .wait()
                .at_most(Duration::from_secs(5))
                .for_element(Locator::Css(r#"button[class*="create-chat-"]"#))
                .await)?;
        create.click().await?;

        let chat_input = client
            .wait()
            .at_most(Duration::from_secs(10))
            .for_element(Locator::Css(r#"[data-testid="chat_input"]"#))
            .await?;
        let textarea = chat_input.find(Locator::Css("textarea")).await?;
        textarea.clear().await?;
        textarea.send_keys(prompt).await?;

        Ok(())
    }

    async fn send(&mut self) -> Result<(), AppError> {
        let client = self.client()?;
        let chat_input = client.find(Locator::Css(r#"[data-testid="chat_input"]"#)).await?;
        let send_btn =
            chat_input.find(Locator::Css(r#"[data-testid="chat_input_send_button"]"#)).await?;
        send_btn.click().await?;
        Ok(())
    }

    fn unmarshal(&mut self, raw: &str) -> Option<NormalizedMessage> {
        let raw = raw.trim().strip_prefix("data:").unwrap_or(raw).trim();
        if raw.is_empty() {
            return None;
        }
        let event: DoubaoEvent = serde_json::from_str(raw).ok()?;
        let data: DoubaoEventData = serde_json::from_str(&event.event_data).ok()?;
        if data.message.content.is_empty() {
            return None;
        }
        match data.message.content_type {
            2001 | 10000 => {
                let content: DoubaoEventContent = serde_json::from_str(&data.message.content).ok()?;
                if content.content_type == 0 && !content.text.is_empty() {
                    if self.reasoning_open {
                        Some(NormalizedMessage::Reasoning(content.text))
                    } else {
                        Some(NormalizedMessage::Content(content.text))
                    }
                } else {
                    None
                }
            }
            10040 => {
                self.reasoning_open = !data.message.is_finish;
                None
            }
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct DoubaoEvent {
    #[serde(default, rename = "event_id")]
    #[allow(dead_code)]
    event_id: String,
    #[serde(rename = "event_data")]
    event_data: String,
}

#[derive(Deserialize)]
struct DoubaoEventData {
    message: DoubaoMessage,
}

#[derive(Deserialize)]
struct DoubaoMessage {
    #[serde(rename = "content_type")]
    content_type: i64,
    #[serde(default)]
    content: String,
    #[serde(default, rename = "is_finish")]
    is_finish: bool,
}

#[derive(Deserialize)]
struct DoubaoEventContent {
    #[serde(default, rename = "type")]
    content_type: i64,
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmarshal_extracts_body_text_for_2001_and_10000() {
        let mut a = DoubaoAdapter::default();
        let raw = r#"data:{"event_id":"1","event_type":1,"event_data":"{\"message\":{\"content_type\":2001,\"content\":\"{\\\"text\\\":\\\"Hello\\\"}\"}}"}"#;
        let msg = a.unmarshal(raw);
        assert_eq!(msg, Some(NormalizedMessage::Content("Hello".to_string())));
    }

    #[test]
    fn unmarshal_toggles_reasoning_without_emitting() {
        let mut a = DoubaoAdapter::default();
        let open = r#"{"event_id":"1","event_type":1,"event_data":"{\"message\":{\"content_type\":10040,\"content\":\"{\\\"finish_title\\\":\\\"t\\\"}\",\"is_finish\":false}}"}"#;
        assert_eq!(a.unmarshal(open), None);
        assert!(a.reasoning_open);

        let close = r#"{"event_id":"1","event_type":1,"event_data":"{\"message\":{\"content_type\":10040,\"content\":\"{\\\"finish_title\\\":\\\"t\\\"}\",\"is_finish\":true}}"}"#;
        assert_eq!(a.unmarshal(close), None);
        assert!(!a.reasoning_open);
    }

    #[test]
    fn unmarshal_routes_10000_text_to_reasoning_while_phase_is_open() {
        let mut a = DoubaoAdapter::default();
        let open = r#"{"event_id":"1","event_type":1,"event_data":"{\"message\":{\"content_type\":10040,\"content\":\"{\\\"finish_title\\\":\\\"t\\\"}\",\"is_finish\":false}}"}"#;
        assert_eq!(a.unmarshal(open), None);

        let thinking = r#"data:{"event_id":"2","event_type":1,"event_data":"{\"message\":{\"content_type\":10000,\"content\":\"{\\\"text\\\":\\\"pondering\\\"}\"}}"}"#;
        assert_eq!(a.unmarshal(thinking), Some(NormalizedMessage::Reasoning("pondering".to_string())));

        let close = r#"{"event_id":"3","event_type":1,"event_data":"{\"message\":{\"content_type\":10040,\"content\":\"{\\\"finish_title\\\":\\\"t\\\"}\",\"is_finish\":true}}"}"#;
        assert_eq!(a.unmarshal(close), None);

        let answer = r#"data:{"event_id":"4","event_type":1,"event_data":"{\"message\":{\"content_type\":2001,\"content\":\"{\\\"text\\\":\\\"Hello\\\"}\"}}"}"#;
        assert_eq!(a.unmarshal(answer), Some(NormalizedMessage::Content("Hello".to_string())));
    }

    #[test]
    fn unmarshal_ignores_suggestion_content_type() {
        let mut a = DoubaoAdapter::default();
        let raw = r#"data:{"event_id":"1","event_type":1,"event_data":"{\"message\":{\"content_type\":2002,\"content\":\"{\\\"suggest\\\":\\\"x\\\"}\"}}"}"#;
        assert_eq!(a.unmarshal(raw), None);
    }
}
