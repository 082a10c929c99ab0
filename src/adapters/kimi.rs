use super::{AdapterOptions, ChatAdapter};
use crate::error::AppError;
use crate::message::NormalizedMessage;
use async_trait::async_trait;
use fantoccini::{Client, Locator};
use serde::Deserialize;
use std::time::Duration;

#[derive(Default)]
pub struct KimiAdapter {
    client: Option<Client>,
}

impl KimiAdapter {
    fn client(&self) -> Result<&Client, AppError> {
        self.client.as_ref().ok_or_else(|| AppError::internal("kimi adapter not set up"))
    }
}

#[async_trait]
impl ChatAdapter for KimiAdapter {
    fn name(&self) -> &'static str {
        "kimi"
    }

    fn url(&self) -> &'static str {
        "https://www.kimi.com/"
    }

    async fn setup(&mut self, options: AdapterOptions) {
        self.client = Some(options.client);
    }

    async fn input(&mut self, prompt: &str) -> Result<(), AppError> {
        let client = self.client()?;
        let editor = client
            .wait()
            .at_most(Duration::from_secs(10))
            .for_element(Locator::Css("div.chat-editor"))
            .await?;
        let textbox = editor.find(Locator::XPath(".//*[@role='textbox']")).await?;
        textbox.click().await?;
        textbox.send_keys(prompt).await?;
        Ok(())
    }

    async fn send(&mut self) -> Result<(), AppError> {
        let client = self.client()?;
        let send_btn = client.find(Locator::Css("div.send-button")).await?;
        send_btn.click().await?;
        Ok(())
    }

    fn unmarshal(&mut self, raw: &str) -> Option<NormalizedMessage> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let event: KimiEvent = serde_json::from_str(raw).ok()?;
        if event.op != "add" && event.op != "update" {
            return None;
        }
        let block = event.block?;
        match event.mask.as_str() {
            "block.think.content" => {
                let content = block.think?.content;
                if content.is_empty() {
                    None
                } else {
                    Some(NormalizedMessage::Reasoning(content))
                }
            }
            "block.text.content" => {
                let content = block.text?.content;
                if content.is_empty() {
                    None
                } else {
                    Some(NormalizedMessage::Content(content))
                }
            }
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct KimiEvent {
    #[serde(default)]
    op: String,
    #[serde(default)]
    mask: String,
    #[serde(default, rename = "eventOffset")]
    #[allow(dead_code)]
    event_offset: i64,
    block: Option<KimiBlock>,
}

#[derive(Deserialize)]
struct KimiBlock {
    #[serde(default)]
    #[allow(dead_code)]
    id: String,
    think: Option<KimiText>,
    text: Option<KimiText>,
}

#[derive(Deserialize)]
struct KimiText {
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn think_mask_yields_reasoning() {
        let mut a = KimiAdapter::default();
        let raw = r#"{"op":"add","mask":"block.think.content","eventOffset":1,"block":{"id":"b1","think":{"content":"mulling"}}}"#;
        assert_eq!(a.unmarshal(raw), Some(NormalizedMessage::Reasoning("mulling".to_string())));
    }

    #[test]
    fn text_mask_yields_content() {
        let mut a = KimiAdapter::default();
        let raw = r#"{"op":"update","mask":"block.text.content","eventOffset":2,"block":{"id":"b1","text":{"content":"answer"}}}"#;
        assert_eq!(a.unmarshal(raw), Some(NormalizedMessage::Content("answer".to_string())));
    }

    #[test]
    fn unknown_op_is_ignored() {
        let mut a = KimiAdapter::default();
        let raw = r#"{"op":"delete","mask":"block.text.content","eventOffset":3,"block":{"id":"b1","text":{"content":"x"}}}"#;
        assert_eq!(a.unmarshal(raw), None);
    }
}
