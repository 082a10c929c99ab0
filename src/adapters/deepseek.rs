use super::{AdapterOptions, ChatAdapter};
use crate::error::AppError;
use crate::message::NormalizedMessage;
use async_trait::async_trait;
use fantoccini::{Client, Locator};
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct DeepSeekAdapter {
    client: Option<Client>,
    reasoning: AtomicBool,
}

impl DeepSeekAdapter {
    fn client(&self) -> Result<&Client, AppError> {
        self.client.as_ref().ok_or_else(|| AppError::internal("deepseek adapter not set up"))
    }
}

#[async_trait]
impl ChatAdapter for DeepSeekAdapter {
    fn name(&self) -> &'static str {
        "deepseek"
    }

    fn url(&self) -> &'static str {
        "https://chat.deepseek.com/"
    }

    async fn setup(&mut self, options: AdapterOptions) {
        self.client = Some(options.client);
    }

    async fn input(&mut self, prompt: &str) -> Result<(), AppError> {
        let client = self.client()?;
        let textarea = client
            .wait()
            .at_most(Duration::from_secs(10))
            .for_element(Locator::Css("textarea#chat-input"))
            .await?;
        textarea.clear().await?;
        textarea.send_keys(prompt).await?;
        Ok(())
    }

    async fn send(&mut self) -> Result<(), AppError> {
        let client = self.client()?;
        let textarea = client.find(Locator::Css("textarea#chat-input")).await?;
        let send_btn = textarea
            .find(Locator::XPath("following::input[@type='file'][1]/following-sibling::div[1]"))
            .await?;
        send_btn.click().await?;
        Ok(())
    }

    /// `v` arrives either as a bare string (content continuing the current
    /// reasoning phase) or as an array of `{id,type,content}` frames that set
    /// the phase explicitly. The phase is sticky across calls, which is why
    /// this adapter needs a fresh instance per session.
    fn unmarshal(&mut self, raw: &str) -> Option<NormalizedMessage> {
        let raw = raw.trim().strip_prefix("data:").unwrap_or(raw).trim();
        if raw.is_empty() || raw == "[DONE]" {
            return None;
        }
        let event: DeepSeekEvent = serde_json::from_str(raw).ok()?;
        match event.v {
            Value::String(s) => {
                if s.is_empty() {
                    return None;
                }
                if self.reasoning.load(Ordering::Relaxed) {
                    Some(NormalizedMessage::Reasoning(s))
                } else {
                    Some(NormalizedMessage::Content(s))
                }
            }
            Value::Array(frames) => {
                let mut last = None;
                for frame in frames {
                    let frame: DeepSeekFrame = serde_json::from_value(frame).ok()?;
                    self.reasoning.store(frame.frame_type == "THINK", Ordering::Relaxed);
                    if !frame.content.is_empty() {
                        last = Some(if frame.frame_type == "THINK" {
                            NormalizedMessage::Reasoning(frame.content)
                        } else {
                            NormalizedMessage::Content(frame.content)
                        });
                    }
                }
                last
            }
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct DeepSeekEvent {
    v: Value,
    #[serde(default)]
    #[allow(dead_code)]
    p: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    o: Option<String>,
}

#[derive(Deserialize)]
struct DeepSeekFrame {
    #[serde(default)]
    #[allow(dead_code)]
    id: i64,
    #[serde(rename = "type")]
    frame_type: String,
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_frame_sets_reasoning_phase_and_emits() {
        let mut a = DeepSeekAdapter::default();
        let raw = r#"{"v":[{"id":1,"type":"THINK","content":"pondering"}]}"#;
        assert_eq!(a.unmarshal(raw), Some(NormalizedMessage::Reasoning("pondering".to_string())));
        assert!(a.reasoning.load(Ordering::Relaxed));
    }

    #[test]
    fn string_frame_inherits_sticky_phase() {
        let mut a = DeepSeekAdapter::default();
        a.reasoning.store(true, Ordering::Relaxed);
        let raw = r#"{"v":"more thought"}"#;
        assert_eq!(a.unmarshal(raw), Some(NormalizedMessage::Reasoning("more thought".to_string())));
    }

    #[test]
    fn response_frame_switches_phase_off() {
        let mut a = DeepSeekAdapter::default();
        a.reasoning.store(true, Ordering::Relaxed);
        let raw = r#"{"v":[{"id":2,"type":"RESPONSE","content":"answer"}]}"#;
        assert_eq!(a.unmarshal(raw), Some(NormalizedMessage::Content("answer".to_string())));
        assert!(!a.reasoning.load(Ordering::Relaxed));
    }
}
