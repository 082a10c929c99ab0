use super::{AdapterOptions, ChatAdapter};
use crate::error::AppError;
use crate::message::NormalizedMessage;
use async_trait::async_trait;
use fantoccini::{Client, Locator};
use serde::Deserialize;
use std::time::Duration;

#[derive(Default)]
pub struct ZhiPuAdapter {
    client: Option<Client>,
    websearch: super::Toggle,
    blocks: Vec<String>,
}

impl ZhiPuAdapter {
    fn client(&self) -> Result<&Client, AppError> {
        self.client.as_ref().ok_or_else(|| AppError::internal("zhipu adapter not set up"))
    }

    /// `delta_content` is a genuine append; `edit_content` instead carries a
    /// full rewrite of the tail, so the true delta is whatever follows the
    /// longest suffix of the last three accumulated blocks found inside it.
    fn resolve_delta(&mut self, delta: &str, edit: &str) -> Option<String> {
        if !delta.is_empty() {
            self.blocks.push(delta.to_string());
            return Some(delta.to_string());
        }
        if edit.is_empty() {
            return None;
        }
        let tail_start = self.blocks.len().saturating_sub(3);
        let joined = self.blocks[tail_start..].join("");
        if joined.is_empty() {
            return None;
        }
        match edit.rfind(joined.as_str()) {
            Some(idx) => {
                let rest = &edit[idx + joined.len()..];
                if rest.is_empty() {
                    None
                } else {
                    Some(rest.to_string())
                }
            }
            None => None,
        }
    }
}

#[async_trait]
impl ChatAdapter for ZhiPuAdapter {
    fn name(&self) -> &'static str {
        "zhipu"
    }

    fn url(&self) -> &'static str {
        "https://chatglm.cn/"
    }

    async fn setup(&mut self, options: AdapterOptions) {
        self.websearch = options.websearch;
        self.client = Some(options.client);
    }

    async fn input(&mut self, prompt: &str) -> Result<(), AppError> {
        let client = self.client()?;

        let new_chat = client
            .wait()
            .at_most(Duration::from_secs(5))
            .for_element(Locator::Css("button#new-chat-button"))
            .await?;
        new_chat.click().await?;

        if self.websearch.is_enabled() {
            if let Ok(tools) =
                client.find(Locator::XPath("//button[contains(., '工具')]")).await
            {
                tools.click().await?;
                if let Ok(web_search) = client
                    .wait()
                    .at_most(Duration::from_secs(3))
                    .for_element(Locator::XPath("//button[contains(., '全网搜索')]"))
                    .await
                {
                    web_search.click().await?;
                }
                if let Ok(tools) =
                    client.find(Locator::XPath("//button[contains(., '工具')]")).await
                {
                    tools.click().await?;
                }
            }
        }

        let textarea = client
            .wait()
            .at_most(Duration::from_secs(10))
            .for_element(Locator::Css("textarea#chat-input"))
            .await?;
        textarea.click().await?;
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
        if raw.is_empty() {
            return None;
        }
        let event: ZhiPuEvent = serde_json::from_str(raw).ok()?;
        let delta = self.resolve_delta(&event.data.delta_content, &event.data.edit_content)?;
        match event.data.phase.as_str() {
            "thinking" => Some(NormalizedMessage::Reasoning(delta)),
            "answer" => Some(NormalizedMessage::Content(delta)),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct ZhiPuEvent {
    #[serde(default, rename = "type")]
    #[allow(dead_code)]
    event_type: String,
    data: ZhiPuData,
}

#[derive(Deserialize)]
struct ZhiPuData {
    #[serde(default)]
    phase: String,
    #[serde(default)]
    delta_content: String,
    #[serde(default)]
    edit_content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_content_appends_and_emits_as_is() {
        let mut a = ZhiPuAdapter::default();
        let raw = r#"{"type":"chat","data":{"phase":"answer","delta_content":"Hello","edit_content":""}}"#;
        assert_eq!(a.unmarshal(raw), Some(NormalizedMessage::Content("Hello".to_string())));
        assert_eq!(a.blocks, vec!["Hello".to_string()]);
    }

    #[test]
    fn edit_content_yields_only_the_new_tail() {
        let mut a = ZhiPuAdapter::default();
        a.blocks = vec!["Hello".to_string(), " wor".to_string()];
        let raw = r#"{"type":"chat","data":{"phase":"answer","delta_content":"","edit_content":"Hello wor ld!"}}"#;
        assert_eq!(a.unmarshal(raw), Some(NormalizedMessage::Content(" ld!".to_string())));
    }

    #[test]
    fn edit_content_with_no_match_is_dropped() {
        let mut a = ZhiPuAdapter::default();
        a.blocks = vec!["Hello".to_string()];
        let raw = r#"{"type":"chat","data":{"phase":"answer","delta_content":"","edit_content":"completely different"}}"#;
        assert_eq!(a.unmarshal(raw), None);
    }
}
