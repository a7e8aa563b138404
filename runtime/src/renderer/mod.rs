//! Headless browser abstraction.
//!
//! A [`Renderer`] owns a browser process and hands out isolated
//! [`RenderContext`]s (incognito-equivalent: no cookies or storage shared
//! between contexts). The rendered fetcher and the session pool only see
//! these traits; `chromium` provides the production backend.

pub mod chromium;

pub use chromium::{ChromiumRenderer, ChromiumSettings};

use anyhow::Result;
use async_trait::async_trait;

/// Outcome of a page navigation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigationResult {
    pub final_url: String,
    pub status: u16,
    pub load_time_ms: u64,
}

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Open a fresh isolated browser context.
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;

    /// Tear down the browser process.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Open a new page in this context and navigate it to `url`.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;

    /// Evaluate a JavaScript expression on the current page.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;

    /// Serialized DOM of the current page.
    async fn content(&self) -> Result<String>;

    /// User agent for pages opened after this call.
    async fn set_user_agent(&mut self, user_agent: &str) -> Result<()>;

    /// Close the page and dispose of the context.
    async fn close(self: Box<Self>) -> Result<()>;
}
