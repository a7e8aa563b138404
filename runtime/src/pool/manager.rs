//! Pool manager for browser sessions.
//!
//! Caps how many isolated browser contexts exist at once. A session is
//! leased as a [`ContextHandle`]; its slot is returned on every exit
//! path, including cancellation, because the permit lives in the handle.

use crate::renderer::{RenderContext, Renderer};
use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// A leased browser session.
pub struct ContextHandle {
    context: Option<Box<dyn RenderContext>>,
    _permit: tokio::sync::OwnedSemaphorePermit,
    active_count: Arc<AtomicUsize>,
}

impl ContextHandle {
    /// Get a reference to the render context.
    pub fn context(&self) -> &dyn RenderContext {
        self.context.as_ref().expect("context already taken").as_ref()
    }

    /// Get a mutable reference to the render context.
    pub fn context_mut(&mut self) -> &mut dyn RenderContext {
        self.context
            .as_mut()
            .expect("context already taken")
            .as_mut()
    }

    /// Close the browser context and give the slot back.
    pub async fn release(mut self) -> Result<()> {
        match self.context.take() {
            Some(context) => context.close().await,
            None => Ok(()),
        }
    }
}

impl Drop for ContextHandle {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);

        // Dropped without `release` (timeout, cancellation, panic): the
        // slot is already free, close the context in the background.
        if let Some(context) = self.context.take() {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    if let Err(e) = context.close().await {
                        debug!("closing abandoned browser context: {e:#}");
                    }
                });
            }
        }
    }
}

/// Manages browser sessions with a concurrency limit.
pub struct PoolManager {
    renderer: Arc<dyn Renderer>,
    semaphore: Arc<Semaphore>,
    max_contexts: usize,
    active_count: Arc<AtomicUsize>,
    acquired_total: AtomicUsize,
}

impl PoolManager {
    pub fn new(renderer: Arc<dyn Renderer>, max_contexts: usize) -> Self {
        let max_contexts = max_contexts.max(1);
        Self {
            renderer,
            semaphore: Arc::new(Semaphore::new(max_contexts)),
            max_contexts,
            active_count: Arc::new(AtomicUsize::new(0)),
            acquired_total: AtomicUsize::new(0),
        }
    }

    /// Lease a session. Waits while all slots are taken.
    pub async fn acquire(&self) -> Result<ContextHandle> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|e| anyhow::anyhow!("semaphore closed: {}", e))?;

        let context = self.renderer.new_context().await?;
        self.active_count.fetch_add(1, Ordering::SeqCst);
        self.acquired_total.fetch_add(1, Ordering::SeqCst);

        Ok(ContextHandle {
            context: Some(context),
            _permit: permit,
            active_count: Arc::clone(&self.active_count),
        })
    }

    /// Number of currently leased sessions.
    pub fn active(&self) -> usize {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Sessions leased since the pool was created.
    pub fn acquired_total(&self) -> usize {
        self.acquired_total.load(Ordering::SeqCst)
    }

    pub fn max_contexts(&self) -> usize {
        self.max_contexts
    }

    /// Free slots.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.semaphore.close();
        self.renderer.shutdown().await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory renderer serving canned HTML.

    use super::*;
    use crate::renderer::NavigationResult;
    use async_trait::async_trait;
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct FakeRenderer {
        pub pages: HashMap<String, String>,
        /// Document status per URL; 200 when absent.
        pub statuses: HashMap<String, u16>,
        pub opened: AtomicUsize,
        pub closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Renderer for FakeRenderer {
        async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeContext {
                pages: self.pages.clone(),
                statuses: self.statuses.clone(),
                current: None,
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    pub struct FakeContext {
        pages: HashMap<String, String>,
        statuses: HashMap<String, u16>,
        current: Option<String>,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RenderContext for FakeContext {
        async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
            let html = self
                .pages
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("net::ERR_NAME_NOT_RESOLVED at {url}"))?;
            self.current = Some(html);
            Ok(NavigationResult {
                final_url: url.to_string(),
                status: self.statuses.get(url).copied().unwrap_or(200),
                load_time_ms: 1,
            })
        }

        async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
            let html = self.current.as_deref().unwrap_or("");
            if script.contains("scrollHeight") {
                return Ok(serde_json::json!(1000));
            }
            // Readiness probes: ready when the probed token appears in the page.
            let ready = script
                .split('"')
                .nth(1)
                .map(|token| html.contains(token.trim_start_matches('.').trim_start_matches('#')))
                .unwrap_or(false);
            Ok(serde_json::Value::Bool(ready))
        }

        async fn content(&self) -> Result<String> {
            Ok(self.current.clone().unwrap_or_default())
        }

        async fn set_user_agent(&mut self, _user_agent: &str) -> Result<()> {
            Ok(())
        }

        async fn close(self: Box<Self>) -> Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
