//! Chat orchestrator: wires a vendor adapter to its proxy-tee channel for
//! the lifetime of one turn.
//!
//! Grounded on `browser/chat_handler.go`'s `HandleChat` control flow:
//! page acquire, adapter setup/input/send, a consumer loop draining the
//! proxy channel through the adapter's `unmarshal`, and an idle cutoff that
//! ends the turn if the vendor goes quiet. The original's separate
//! poll-based watchdog goroutine (driven by an `atomic.Int64` timestamp) is
//! replaced here by a single `tokio::time::timeout` wrapped around each
//! `recv`, which gives the same 30s inactivity cutoff without a second task.

use crate::adapters::{self, AdapterOptions, ChatAdapter, Toggle};
use crate::browser::Browser;
use crate::error::AppError;
use crate::message::NormalizedMessage;
use crate::proxy::ProxyEvent;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

const MAX_CONSECUTIVE_ERRORS: u32 = 3;
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const FINISH_GRACE: Duration = Duration::from_millis(200);
const HANDLER_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct ChatOptions {
    pub thinking: Toggle,
    pub websearch: Toggle,
}

/// The receiving half of one chat turn's normalized output.
pub struct ChatHandler {
    pub id: Uuid,
    rx: mpsc::Receiver<NormalizedMessage>,
}

#[derive(Debug, Default)]
pub struct ChatResult {
    pub content: String,
    pub reasoning: String,
}

impl ChatHandler {
    /// Buffers the whole turn, for the non-streaming API path.
    pub async fn wait_finish(mut self) -> ChatResult {
        let mut result = ChatResult::default();
        while let Some(msg) = self.rx.recv().await {
            match msg {
                NormalizedMessage::Content(s) => result.content.push_str(&s),
                NormalizedMessage::Reasoning(s) => result.reasoning.push_str(&s),
                NormalizedMessage::Finish => break,
            }
        }
        result
    }

    /// Hands back the raw channel, for the streaming API path.
    pub fn into_stream(self) -> mpsc::Receiver<NormalizedMessage> {
        self.rx
    }
}

pub struct Orchestrator {
    browser: Arc<Browser>,
    receivers: Arc<Mutex<HashMap<&'static str, mpsc::Receiver<ProxyEvent>>>>,
    error_counts: Arc<Mutex<HashMap<&'static str, u32>>>,
    /// The supervisor mutex from spec.md §5: a single process-wide lock held
    /// from page acquisition through channel close, so only one chat session
    /// is ever in flight, mirroring `chat_handler.go`'s `s.mu.Lock()` /
    /// `finish` pairing. This is deliberately one global lock rather than
    /// one per vendor — every adapter drives the same `fantoccini::Client`,
    /// a single WebDriver session whose "current window" is process-global
    /// state, so two sessions for two *different* vendors racing on it would
    /// be just as unsafe as two sessions for the same vendor. A second
    /// concurrent request queues on this lock rather than failing.
    session_lock: Arc<tokio::sync::Mutex<()>>,
}

impl Orchestrator {
    pub fn new(
        browser: Arc<Browser>,
        receivers: HashMap<&'static str, mpsc::Receiver<ProxyEvent>>,
    ) -> Self {
        Self {
            browser,
            receivers: Arc::new(Mutex::new(receivers)),
            error_counts: Arc::new(Mutex::new(HashMap::new())),
            session_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn models(&self) -> Vec<&'static str> {
        adapters::models()
    }

    pub fn model_exists(&self, model: &str) -> bool {
        adapters::exists(model)
    }

    pub async fn handle_chat(
        &self,
        model: &str,
        prompt: &str,
        options: ChatOptions,
    ) -> Result<ChatHandler, AppError> {
        let mut adapter =
            adapters::make(model).ok_or_else(|| AppError::not_found(format!("unknown model: {model}")))?;
        let vendor = adapter.name();

        // Blocks until whatever session is currently running finishes and
        // drops its guard; this is the queuing behavior, not a failure.
        let guard = self.session_lock.clone().lock_owned().await;

        let mut proxy_rx = self.receivers.lock().remove(vendor).ok_or_else(|| {
            AppError::internal(format!("{vendor} channel missing while holding the supervisor lock"))
        })?;

        if self.error_count(vendor) >= MAX_CONSECUTIVE_ERRORS {
            warn!(vendor, "resetting pages after repeated failures");
            let _ = self.browser.reset_pages(adapter.url()).await;
            self.reset_error_count(vendor);
        }

        if let Err(e) = self.browser.open_page(adapter.url()).await {
            self.bump_error_count(vendor);
            self.receivers.lock().insert(vendor, proxy_rx);
            return Err(e);
        }

        adapter
            .setup(AdapterOptions {
                client: self.browser.client(),
                thinking: options.thinking,
                websearch: options.websearch,
            })
            .await;

        if let Err(e) = adapter.input(prompt).await {
            self.bump_error_count(vendor);
            self.receivers.lock().insert(vendor, proxy_rx);
            return Err(e);
        }

        if let Err(e) = adapter.send().await {
            self.bump_error_count(vendor);
            self.receivers.lock().insert(vendor, proxy_rx);
            return Err(e);
        }

        self.reset_error_count(vendor);

        let id = Uuid::now_v7();
        let (tx, rx) = mpsc::channel(HANDLER_CHANNEL_CAPACITY);
        let receivers = self.receivers.clone();

        tokio::spawn(async move {
            loop {
                match tokio::time::timeout(IDLE_TIMEOUT, proxy_rx.recv()).await {
                    Ok(Some(ProxyEvent::Open)) => continue,
                    Ok(Some(ProxyEvent::Raw(raw))) => {
                        if let Some(msg) = adapter.unmarshal(&raw) {
                            if tx.send(msg).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Some(ProxyEvent::Close)) | Ok(None) => break,
                    Err(_) => {
                        warn!(vendor, "chat session idle for 30s, ending turn");
                        break;
                    }
                }
            }
            let _ = tx.send(NormalizedMessage::Finish).await;
            tokio::time::sleep(FINISH_GRACE).await;
            receivers.lock().insert(vendor, proxy_rx);
            drop(guard);
        });

        Ok(ChatHandler { id, rx })
    }

    fn error_count(&self, vendor: &'static str) -> u32 {
        *self.error_counts.lock().get(vendor).unwrap_or(&0)
    }

    fn bump_error_count(&self, vendor: &'static str) {
        *self.error_counts.lock().entry(vendor).or_insert(0) += 1;
    }

    fn reset_error_count(&self, vendor: &'static str) {
        self.error_counts.lock().insert(vendor, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_result_accumulates_content_and_reasoning_separately() {
        let mut result = ChatResult::default();
        result.content.push_str("hello ");
        result.content.push_str("world");
        result.reasoning.push_str("thinking");
        assert_eq!(result.content, "hello world");
        assert_eq!(result.reasoning, "thinking");
    }

    #[test]
    fn default_chat_options_enable_both_toggles() {
        let options = ChatOptions::default();
        assert!(options.thinking.is_enabled());
        assert!(options.websearch.is_enabled());
    }
}
