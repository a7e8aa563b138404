//! chromiumoxide-backed renderer.

use super::{NavigationResult, RenderContext, Renderer};
use crate::stealth::{stealth_script, DEFAULT_USER_AGENT};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ChromiumSettings {
    /// Browser binary; chromiumoxide searches the usual locations when unset.
    pub executable: Option<PathBuf>,
    pub user_agent: String,
    pub proxy: Option<String>,
    pub launch_timeout: Duration,
}

impl Default for ChromiumSettings {
    fn default() -> Self {
        Self {
            executable: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: None,
            launch_timeout: Duration::from_secs(30),
        }
    }
}

/// One headless Chromium process shared by all rendered sessions.
pub struct ChromiumRenderer {
    browser: Arc<Mutex<Browser>>,
    handler: JoinHandle<()>,
    user_agent: String,
}

impl ChromiumRenderer {
    /// Launch the browser and start its CDP event loop.
    pub async fn launch(settings: &ChromiumSettings) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(settings.launch_timeout)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled");
        if let Some(path) = &settings.executable {
            builder = builder.chrome_executable(path);
        }
        if let Some(proxy) = &settings.proxy {
            builder = builder.arg(format!("--proxy-server={proxy}"));
        }
        let config = builder.build().map_err(|e| anyhow!("browser config: {e}"))?;

        let (browser, mut handler) = tokio::time::timeout(settings.launch_timeout, Browser::launch(config))
            .await
            .map_err(|_| anyhow!("browser did not start within {:?}", settings.launch_timeout))?
            .context("launching headless browser")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler event error: {e}");
                }
            }
        });

        info!("headless browser started");

        Ok(Self {
            browser: Arc::new(Mutex::new(browser)),
            handler,
            user_agent: settings.user_agent.clone(),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let response = self
            .browser
            .lock()
            .await
            .execute(CreateBrowserContextParams::default())
            .await
            .context("creating browser context")?;

        Ok(Box::new(ChromiumContext {
            browser: Arc::clone(&self.browser),
            context_id: response.result.browser_context_id.clone(),
            page: None,
            user_agent: self.user_agent.clone(),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        browser.close().await.context("closing browser")?;
        let _ = browser.wait().await;
        self.handler.abort();
        Ok(())
    }
}

/// Main-document status. Navigations without a network response
/// (`about:`, `data:`, cache hits without headers) count as 200.
fn document_status(status: Option<i64>) -> u16 {
    status
        .and_then(|s| u16::try_from(s).ok())
        .filter(|s| *s > 0)
        .unwrap_or(200)
}

struct ChromiumContext {
    browser: Arc<Mutex<Browser>>,
    context_id: BrowserContextId,
    page: Option<Page>,
    user_agent: String,
}

impl ChromiumContext {
    fn page(&self) -> Result<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| anyhow!("no page open in this context"))
    }

    async fn open_page(&self) -> Result<Page> {
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(self.context_id.clone())
            .build()
            .map_err(|e| anyhow!("target params: {e}"))?;

        let page = self
            .browser
            .lock()
            .await
            .new_page(params)
            .await
            .context("opening page")?;

        page.execute(SetUserAgentOverrideParams::new(self.user_agent.clone()))
            .await
            .context("setting user agent")?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(stealth_script()))
            .await
            .context("injecting stealth script")?;
        Ok(page)
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        if let Some(previous) = self.page.take() {
            let _ = previous.close().await;
        }

        let page = self.open_page().await?;
        let started = Instant::now();
        let navigation = async {
            page.goto(url).await?;
            page.wait_for_navigation_response().await
        };
        let request = tokio::time::timeout(Duration::from_millis(timeout_ms), navigation)
            .await
            .map_err(|_| anyhow!("navigation to {url} timed out after {timeout_ms}ms"))?
            .with_context(|| format!("navigating to {url}"))?;
        let status = document_status(
            request
                .as_ref()
                .and_then(|req| req.response.as_ref())
                .map(|response| response.status),
        );
        let load_time_ms = started.elapsed().as_millis() as u64;

        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| url.to_string());
        self.page = Some(page);

        Ok(NavigationResult {
            final_url,
            status,
            load_time_ms,
        })
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        let result = self.page()?.evaluate(script).await.context("evaluating script")?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn content(&self) -> Result<String> {
        self.page()?.content().await.context("reading page content")
    }

    async fn set_user_agent(&mut self, user_agent: &str) -> Result<()> {
        self.user_agent = user_agent.to_string();
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let this = *self;
        if let Some(page) = this.page {
            let _ = page.close().await;
        }
        this.browser
            .lock()
            .await
            .execute(DisposeBrowserContextParams::new(this.context_id))
            .await
            .context("disposing browser context")?;
        Ok(())
    }
}
