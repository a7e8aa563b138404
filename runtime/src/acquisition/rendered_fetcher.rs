//! Rendered strategy: load the page in a leased browser session.

use super::{FetchRequest, FetchResponse, Fetcher, HostLimiter, Readiness, RenderPlan, ScrollPlan};
use crate::error::FetchError;
use crate::pool::ContextHandle;
use crate::renderer::RenderContext;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

const SCROLL_SCRIPT: &str =
    "(() => { window.scrollTo(0, document.body.scrollHeight); return document.body.scrollHeight; })()";
const HEIGHT_SCRIPT: &str = "document.body ? document.body.scrollHeight : 0";

/// Fetcher bound to one browser session for the duration of a recipe run.
///
/// Every `get` opens a fresh page in the session's isolated context, waits
/// for the plan's readiness predicate, optionally scrolls to force lazy
/// content, and returns the serialized DOM.
pub struct RenderedFetcher {
    session: Mutex<Option<ContextHandle>>,
    plan: RenderPlan,
    limiter: Arc<HostLimiter>,
}

impl RenderedFetcher {
    /// Wrap a leased session, applying a recipe-specific user agent.
    pub async fn open(
        mut session: ContextHandle,
        plan: RenderPlan,
        limiter: Arc<HostLimiter>,
        user_agent: Option<&str>,
    ) -> Result<Self, FetchError> {
        if let Some(ua) = user_agent {
            session
                .context_mut()
                .set_user_agent(ua)
                .await
                .map_err(|e| FetchError::Browser(format!("{e:#}")))?;
        }
        Ok(Self {
            session: Mutex::new(Some(session)),
            plan,
            limiter,
        })
    }

    async fn load(
        &self,
        context: &mut dyn RenderContext,
        url: &str,
        budget: Duration,
    ) -> Result<FetchResponse, FetchError> {
        let deadline = Instant::now() + budget;
        let transport = |e: anyhow::Error| FetchError::Transport {
            url: url.to_string(),
            message: format!("{e:#}"),
        };
        let timed_out = || FetchError::Timeout {
            url: url.to_string(),
            after: budget,
        };

        let nav = tokio::time::timeout_at(
            deadline,
            context.navigate(url, budget.as_millis() as u64),
        )
        .await
        .map_err(|_| timed_out())?
        .map_err(transport)?;

        // Error and challenge pages never reach readiness; hand them back as is.
        if !(200..300).contains(&nav.status) {
            let body = tokio::time::timeout_at(deadline, context.content())
                .await
                .map_err(|_| timed_out())?
                .map_err(transport)?;
            tracing::debug!(url, status = nav.status, "rendered fetch returned error page");
            return Ok(FetchResponse {
                status: nav.status,
                final_url: nav.final_url,
                bytes: body.as_bytes().to_vec(),
                body,
            });
        }

        let ready_deadline = deadline.min(Instant::now() + self.plan.ready_timeout);
        wait_until_ready(&*context, &self.plan.ready, ready_deadline, url, self.plan.ready_timeout)
            .await?;

        if let Some(scroll) = &self.plan.scroll {
            tokio::time::timeout_at(deadline, scroll_to_end(&*context, scroll))
                .await
                .map_err(|_| timed_out())?
                .map_err(transport)?;
        }

        let body = tokio::time::timeout_at(deadline, context.content())
            .await
            .map_err(|_| timed_out())?
            .map_err(transport)?;

        tracing::debug!(url, final_url = %nav.final_url, load_ms = nav.load_time_ms, "rendered fetch");

        Ok(FetchResponse {
            status: nav.status,
            final_url: nav.final_url,
            bytes: body.as_bytes().to_vec(),
            body,
        })
    }
}

#[async_trait]
impl Fetcher for RenderedFetcher {
    async fn get(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let budget = request
            .timeout
            .unwrap_or(self.plan.total_budget)
            .min(self.plan.total_budget);
        let _host = self.limiter.acquire(&request.url).await;

        let mut session = self.session.lock().await;
        let handle = session
            .as_mut()
            .ok_or_else(|| FetchError::Browser("session already released".into()))?;
        self.load(handle.context_mut(), &request.url, budget).await
    }

    async fn release(self: Box<Self>) {
        let this = *self;
        if let Some(handle) = this.session.into_inner() {
            if let Err(e) = handle.release().await {
                tracing::debug!("releasing browser session: {e:#}");
            }
        }
    }
}

async fn wait_until_ready(
    context: &dyn RenderContext,
    ready: &Readiness,
    deadline: Instant,
    url: &str,
    ready_timeout: Duration,
) -> Result<(), FetchError> {
    if let Readiness::Delay { millis } = ready {
        tokio::time::sleep_until(deadline.min(Instant::now() + Duration::from_millis(*millis))).await;
        return Ok(());
    }
    let Some(probe) = ready.probe_script() else {
        return Ok(());
    };

    loop {
        let value = context
            .execute_js(&probe)
            .await
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                message: format!("readiness probe: {e:#}"),
            })?;
        if value.as_bool() == Some(true) {
            return Ok(());
        }
        if Instant::now() + POLL_INTERVAL > deadline {
            return Err(FetchError::Timeout {
                url: url.to_string(),
                after: ready_timeout,
            });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Scroll until the document stops growing or the round limit is hit.
async fn scroll_to_end(context: &dyn RenderContext, plan: &ScrollPlan) -> anyhow::Result<()> {
    let mut last_height = context.execute_js(HEIGHT_SCRIPT).await?.as_f64().unwrap_or(0.0);
    for _ in 0..plan.max_rounds {
        context.execute_js(SCROLL_SCRIPT).await?;
        tokio::time::sleep(Duration::from_millis(plan.pause_ms)).await;
        let height = context.execute_js(HEIGHT_SCRIPT).await?.as_f64().unwrap_or(0.0);
        if height <= last_height {
            break;
        }
        last_height = height;
    }
    Ok(())
}
