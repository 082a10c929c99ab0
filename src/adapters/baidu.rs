use super::{AdapterOptions, ChatAdapter};
use crate::error::AppError;
use crate::message::NormalizedMessage;
use async_trait::async_trait;
use fantoccini::{Client, Locator};
use serde::Deserialize;
use std::time::Duration;

#[derive(Default)]
pub struct BaiduAdapter {
    client: Option<Client>,
}

impl BaiduAdapter {
    fn client(&self) -> Result<&Client, AppError> {
        self.client.as_ref().ok_or_else(|| AppError::internal("baidu adapter not set up"))
    }
}

#[async_trait]
impl ChatAdapter for BaiduAdapter {
    fn name(&self) -> &'static str {
        "baidu"
    }

    fn url(&self) -> &'static str {
        "https://yiyan.baidu.com/"
    }

    async fn setup(&mut self, options: AdapterOptions) {
        self.client = Some(options.client);
    }

    async fn input(&mut self, prompt: &str) -> Result<(), AppError> {
        let client = self.client()?;
        let editor = client
            .wait()
            .at_most(Duration::from_secs(10))
            .for_element(Locator::Css("div.yc-editor"))
            .await?;
        editor.click().await?;
        editor.send_keys(prompt).await?;
        Ok(())
    }

    async fn send(&mut self) -> Result<(), AppError> {
        let client = self.client()?;
        let send_btn = client.find(Locator::Css(r#"div[class^="send_"]"#)).await?;
        send_btn.click().await?;
        Ok(())
    }

    fn unmarshal(&mut self, raw: &str) -> Option<NormalizedMessage> {
        let raw = raw.trim().strip_prefix("data:").unwrap_or(raw).trim();
        if raw.is_empty() {
            return None;
        }
        let event: BaiduEvent = serde_json::from_str(raw).ok()?;
        if let Some(thought_index) = event.thought_index {
            if event.thoughts.is_empty() {
                return None;
            }
            let mut thoughts = event.thoughts;
            let step_number: Option<u32> =
                event.step_id.strip_prefix("step-").and_then(|n| n.parse().ok());
            if thought_index == 0 && step_number.is_some_and(|n| n > 1) {
                thoughts = format!("\n\n{thoughts}");
            }
            Some(NormalizedMessage::Reasoning(thoughts))
        } else if !event.data.content.is_empty() {
            Some(NormalizedMessage::Content(event.data.content))
        } else {
            None
        }
    }
}

#[derive(Deserialize)]
struct BaiduEvent {
    #[serde(default, rename = "thought_index")]
    thought_index: Option<i64>,
    #[serde(default, rename = "step_id")]
    step_id: String,
    #[serde(default)]
    thoughts: String,
    #[serde(default)]
    data: BaiduData,
}

#[derive(Deserialize, Default)]
struct BaiduData {
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thought_path_takes_precedence_over_content() {
        let mut a = BaiduAdapter::default();
        let raw = r#"{"thought_index":0,"step_id":"step-1","thoughts":"thinking","data":{"content":""}}"#;
        assert_eq!(a.unmarshal(raw), Some(NormalizedMessage::Reasoning("thinking".to_string())));
    }

    #[test]
    fn later_step_with_index_zero_gets_paragraph_break() {
        let mut a = BaiduAdapter::default();
        let raw = r#"{"thought_index":0,"step_id":"step-2","thoughts":"next paragraph","data":{"content":""}}"#;
        assert_eq!(
            a.unmarshal(raw),
            Some(NormalizedMessage::Reasoning("\n\nnext paragraph".to_string()))
        );
    }

    #[test]
    fn content_path_used_when_no_thought_index() {
        let mut a = BaiduAdapter::default();
        let raw = r#"{"step_id":"step-3","thoughts":"","data":{"content":"final answer"}}"#;
        assert_eq!(a.unmarshal(raw), Some(NormalizedMessage::Content("final answer".to_string())));
    }
}
