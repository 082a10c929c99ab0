//! Browser session supervisor.
//!
//! A single long-lived WebDriver session is shared across all chat sessions;
//! each vendor gets a dedicated browser window that is reused (by URL-prefix
//! match) rather than recreated on every turn, mirroring the original's
//! `openPage`/`resetPages` pair.
//!
//! The mutex here only covers window bookkeeping (`windows`/`switch_to_window`/
//! `current_url`, milliseconds at most) against concurrent calls to
//! [`open_page`](Browser::open_page)/[`reset_pages`](Browser::reset_pages)
//! themselves. It is NOT the supervisor mutex that spec.md §5 describes —
//! the one serializing an entire chat session from page acquisition through
//! channel close lives on `Orchestrator` (`session_lock`), since only the
//! orchestrator knows where a session actually ends.

use crate::error::AppError;
use fantoccini::{Client, ClientBuilder};
use std::time::Duration;
use tokio::time::sleep;

pub struct Browser {
    client: Client,
    mutex: tokio::sync::Mutex<()>,
}

impl Browser {
    pub async fn connect(webdriver_url: &str) -> Result<Self, AppError> {
        let client = ClientBuilder::rustls()
            .map_err(|e| AppError::internal(format!("failed to build webdriver tls client: {e}")))?
            .connect(webdriver_url)
            .await
            .map_err(|e| AppError::internal(format!("failed to connect to webdriver: {e}")))?;
        Ok(Self { client, mutex: tokio::sync::Mutex::new(()) })
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// Opens (or reuses) a window navigated to a URL with the given prefix.
    /// Reuses a blank window if one exists, then an already-matching window;
    /// otherwise opens a fresh tab and navigates it.
    pub async fn open_page(&self, url: &str) -> Result<(), AppError> {
        let _guard = self.mutex.lock().await;

        for handle in self.client.windows().await? {
            self.client.switch_to_window(handle.clone()).await?;
            let current = self.client.current_url().await?;
            if current.as_str() == "about:blank" || current.as_str().starts_with(url) {
                if current.as_str().starts_with(url) {
                    return Ok(());
                }
                self.navigate(url).await?;
                return Ok(());
            }
        }

        let new_window = self.client.new_window(true).await?;
        self.client.switch_to_window(new_window.handle).await?;
        self.navigate(url).await?;
        Ok(())
    }

    /// Navigates every window whose URL starts with `url` back to a blank
    /// page — used after repeated adapter failures to force a clean retry.
    pub async fn reset_pages(&self, url: &str) -> Result<(), AppError> {
        let _guard = self.mutex.lock().await;
        for handle in self.client.windows().await? {
            self.client.switch_to_window(handle.clone()).await?;
            let current = self.client.current_url().await?;
            if current.as_str().starts_with(url) {
                self.client.goto("about:blank").await?;
            }
        }
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<(), AppError> {
        tokio::time::timeout(Duration::from_secs(30), self.client.goto(url))
            .await
            .map_err(|_| AppError::page_acquire_failed(format!("timed out loading {url}")))??;
        sleep(Duration::from_secs(1)).await;
        Ok(())
    }

    pub async fn close(&self) -> Result<(), AppError> {
        self.client.clone().close().await?;
        Ok(())
    }
}
