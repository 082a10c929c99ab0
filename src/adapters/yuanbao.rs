use super::{AdapterOptions, ChatAdapter};
use crate::error::AppError;
use crate::message::NormalizedMessage;
use async_trait::async_trait;
use fantoccini::{Client, Locator};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Default)]
pub struct YuanbaoAdapter {
    client: Option<Client>,
}

impl YuanbaoAdapter {
    fn client(&self) -> Result<&Client, AppError> {
        self.client.as_ref().ok_or_else(|| AppError::internal("yuanbao adapter not set up"))
    }
}

#[async_trait]
impl ChatAdapter for YuanbaoAdapter {
    fn name(&self) -> &'static str {
        "yuanbao"
    }

    fn url(&self) -> &'static str {
        "https://yuanbao.tencent.com/chat"
    }

    async fn setup(&mut self, options: AdapterOptions) {
        self.client = Some(options.client);
    }

    async fn input(&mut self, prompt: &str) -> Result<(), AppError> {
        let client = self.client()?;
        if let Ok(new_chat) =
            client.wait().at_most(Duration::from_secs(5)).for_element(Locator::Css("span.icon-yb-ic_newchat_20")).await
        {
            new_chat.click().await?;
        }

        client
            .wait()
            .at_most(Duration::from_secs(10))
            .for_element(Locator::Css("div.yb-input-box-textarea"))
            .await?;

        // The editor only accepts paragraph-wrapped HTML, not plain
        // send_keys text, so each line is wrapped and injected directly.
        let html: String =
            prompt.split('\n').map(|line| format!("<p>{}</p>", html_escape(line))).collect();
        client
            .execute(
                "document.querySelector('div.yb-input-box-textarea div.ql-editor p')?.parentElement.innerHTML = arguments[0]",
                vec![json!(html)],
            )
            .await?;
        Ok(())
    }

    async fn send(&mut self) -> Result<(), AppError> {
        let client = self.client()?;
        let send_btn = client.find(Locator::Css("a#yuanbao-send-btn")).await?;
        send_btn.click().await?;
        Ok(())
    }

    fn unmarshal(&mut self, raw: &str) -> Option<NormalizedMessage> {
        let raw = raw.trim().strip_prefix("data:").unwrap_or(raw).trim();
        if raw.is_empty() {
            return None;
        }
        let event: YuanbaoEvent = serde_json::from_str(raw).ok()?;
        match event.event_type.as_str() {
            "think" => {
                if event.content.is_empty() {
                    None
                } else {
                    Some(NormalizedMessage::Reasoning(event.content))
                }
            }
            "text" => {
                if event.msg.is_empty() {
                    None
                } else {
                    Some(NormalizedMessage::Content(event.msg))
                }
            }
            _ => None,
        }
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[derive(Deserialize)]
struct YuanbaoEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn think_event_reads_content_field() {
        let mut a = YuanbaoAdapter::default();
        let raw = r#"{"type":"think","msg":"","content":"reasoning text"}"#;
        assert_eq!(a.unmarshal(raw), Some(NormalizedMessage::Reasoning("reasoning text".to_string())));
    }

    #[test]
    fn text_event_reads_msg_field() {
        let mut a = YuanbaoAdapter::default();
        let raw = r#"{"type":"text","msg":"hello","content":""}"#;
        assert_eq!(a.unmarshal(raw), Some(NormalizedMessage::Content("hello".to_string())));
    }

    #[test]
    fn multiline_prompt_wraps_each_line_in_a_paragraph() {
        let html: String =
            "a\nb".split('\n').map(|line| format!("<p>{}</p>", html_escape(line))).collect();
        assert_eq!(html, "<p>a</p><p>b</p>");
    }
}
