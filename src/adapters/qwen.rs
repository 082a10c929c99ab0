use super::{AdapterOptions, ChatAdapter};
use crate::error::AppError;
use crate::message::NormalizedMessage;
use async_trait::async_trait;
use fantoccini::{Client, Locator};
use serde::Deserialize;
use std::time::Duration;

#[derive(Default)]
pub struct QwenAdapter {
    client: Option<Client>,
    thinking: super::Toggle,
    websearch: super::Toggle,
}

impl QwenAdapter {
    fn client(&self) -> Result<&Client, AppError> {
        self.client.as_ref().ok_or_else(|| AppError::internal("qwen adapter not set up"))
    }
}

#[async_trait]
impl ChatAdapter for QwenAdapter {
    fn name(&self) -> &'static str {
        "qwen"
    }

    fn url(&self) -> &'static str {
        "https://chat.qwen.ai/"
    }

    async fn setup(&mut self, options: AdapterOptions) {
        self.thinking = options.thinking;
        self.websearch = options.websearch;
        self.client = Some(options.client);
    }

    async fn input(&mut self, prompt: &str) -> Result<(), AppError> {
        let client = self.client()?;

        // The sidebar sometimes covers the new-chat button on first load;
        // give it up to 10s to close on its own before giving up on it.
        let _ = client
            .wait()
            .at_most(Duration::from_secs(10))
            .for_element(Locator::Css("button.slide-switch"))
            .await;
        let _ = client
            .wait()
            .at_most(Duration::from_secs(10))
            .for_element(Locator::Css("button#sidebar-toggle-button"))
            .await;

        let new_chat = client
            .wait()
            .at_most(Duration::from_secs(5))
            .for_element(Locator::Css("button#new-chat-button"))
            .await?;
        new_chat.click().await?;

        let _root = client
            .wait()
            .at_most(Duration::from_secs(10))
            .for_element(Locator::Css("div#chat-message-input"))
            .await?;

        if self.thinking.is_enabled() {
            if let Ok(btn) = client.find(Locator::Css("button.common-btn-padding")).await {
                btn.click().await?;
            }
        }
        if self.websearch.is_enabled() {
            if let Ok(btn) = client.find(Locator::Css("button.websearch_button")).await {
                btn.click().await?;
            }
        }

        let textarea = client
            .wait()
            .at_most(Duration::from_secs(5))
            .for_element(Locator::Css("textarea#chat-input"))
            .await?;
        textarea.clear().await?;
        textarea.send_keys(prompt).await?;

        Ok(())
    }

    async fn send(&mut self) -> Result<(), AppError> {
        let client = self.client()?;
        let send_btn = client.find(Locator::Css("button#send-message-button")).await?;
        send_btn.click().await?;
        Ok(())
    }

    fn unmarshal(&mut self, raw: &str) -> Option<NormalizedMessage> {
        let raw = raw.trim().strip_prefix("data:").unwrap_or(raw).trim();
        if raw.is_empty() || raw == "[DONE]" {
            return None;
        }
        let event: QwenEvent = serde_json::from_str(raw).ok()?;
        let choice = event.choices.into_iter().next()?;
        if choice.delta.content.is_empty() {
            return None;
        }
        match choice.delta.phase.as_str() {
            "think" => Some(NormalizedMessage::Reasoning(choice.delta.content)),
            "answer" => Some(NormalizedMessage::Content(choice.delta.content)),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct QwenEvent {
    choices: Vec<QwenChoice>,
}

#[derive(Deserialize)]
struct QwenChoice {
    delta: QwenDelta,
}

#[derive(Deserialize)]
struct QwenDelta {
    #[serde(default)]
    #[allow(dead_code)]
    role: String,
    #[serde(default)]
    phase: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    #[allow(dead_code)]
    status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn think_phase_yields_reasoning() {
        let mut a = QwenAdapter::default();
        let raw = r#"{"choices":[{"delta":{"role":"assistant","phase":"think","content":"hmm","status":"typing"}}]}"#;
        assert_eq!(a.unmarshal(raw), Some(NormalizedMessage::Reasoning("hmm".to_string())));
    }

    #[test]
    fn answer_phase_yields_content() {
        let mut a = QwenAdapter::default();
        let raw = r#"{"choices":[{"delta":{"role":"assistant","phase":"answer","content":"hi","status":"typing"}}]}"#;
        assert_eq!(a.unmarshal(raw), Some(NormalizedMessage::Content("hi".to_string())));
    }

    #[test]
    fn empty_content_yields_none() {
        let mut a = QwenAdapter::default();
        let raw = r#"{"choices":[{"delta":{"role":"assistant","phase":"answer","content":"","status":"typing"}}]}"#;
        assert_eq!(a.unmarshal(raw), None);
    }
}
