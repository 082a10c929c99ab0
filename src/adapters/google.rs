use super::{AdapterOptions, ChatAdapter};
use crate::error::AppError;
use crate::message::NormalizedMessage;
use async_trait::async_trait;
use fantoccini::{Client, Locator};
use serde_json::Value;
use std::time::Duration;

#[derive(Default)]
pub struct GoogleAdapter {
    client: Option<Client>,
}

impl GoogleAdapter {
    fn client(&self) -> Result<&Client, AppError> {
        self.client.as_ref().ok_or_else(|| AppError::internal("google adapter not set up"))
    }
}

#[async_trait]
impl ChatAdapter for GoogleAdapter {
    fn name(&self) -> &'static str {
        "google"
    }

    fn url(&self) -> &'static str {
        "https://aistudio.google.com/"
    }

    async fn setup(&mut self, options: AdapterOptions) {
        self.client = Some(options.client);
    }

    async fn input(&mut self, prompt: &str) -> Result<(), AppError> {
        let client = self.client()?;
        let new_chat =
            client.wait().at_most(Duration::from_secs(5)).for_element(Locator::XPath("//a[@aria-label='Chat' or .//span[text()='Chat']]")).await?;
        new_chat.click().await?;

        let wrapper = client
            .wait()
            .at_most(Duration::from_secs(10))
            .for_element(Locator::Css("ms-prompt-input-wrapper"))
            .await?;
        let textarea = wrapper.find(Locator::Css("ms-autosize-textarea textarea")).await?;
        textarea.click().await?;
        textarea.send_keys(prompt).await?;
        Ok(())
    }

    async fn send(&mut self) -> Result<(), AppError> {
        let client = self.client()?;
        let send_btn = client.find(Locator::Css("run-button button")).await?;
        send_btn.click().await?;
        Ok(())
    }

    /// The tee'd body is one giant JSON array, not line-delimited SSE — the
    /// proxy hands this adapter each fully-parsed top-level array element in
    /// turn. A frame only carries content when the chain
    /// `frame[0][0][0][0][0]` resolves to an array of at least two entries
    /// whose second entry is a string; an entry count of 13+ marks reasoning.
    fn unmarshal(&mut self, raw: &str) -> Option<NormalizedMessage> {
        let root: Value = serde_json::from_str(raw).ok()?;
        let mut node = &root;
        for _ in 0..5 {
            node = node.get(0)?;
        }
        let arr = node.as_array()?;
        if arr.len() < 2 {
            return None;
        }
        let text = arr.get(1)?.as_str()?;
        if text.is_empty() {
            return None;
        }
        if arr.len() >= 13 {
            Some(NormalizedMessage::Reasoning(text.to_string()))
        } else {
            Some(NormalizedMessage::Content(text.to_string()))
        }
    }
}
