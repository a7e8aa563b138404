//! Hands each recipe run a fetcher matching its declared strategy.

use super::{Fetcher, HostLimiter, HttpSettings, RenderedFetcher, StaticFetcher};
use crate::error::FetchError;
use crate::pool::PoolManager;
use crate::recipe::{Descriptor, Strategy};
use async_trait::async_trait;
use std::sync::Arc;

/// Source of per-run fetchers. The runner calls `acquire` once per attempt
/// and `Fetcher::release` when the attempt ends.
#[async_trait]
pub trait FetcherSource: Send + Sync {
    async fn acquire(&self, descriptor: &Descriptor) -> Result<Box<dyn Fetcher>, FetchError>;

    /// Whether rendered recipes can be served at all.
    fn supports_rendered(&self) -> bool;
}

/// Production source: reqwest for static recipes, the browser pool for
/// rendered ones.
pub struct Fetchers {
    http: HttpSettings,
    limiter: Arc<HostLimiter>,
    pool: Option<Arc<PoolManager>>,
}

impl Fetchers {
    pub fn new(http: HttpSettings, limiter: Arc<HostLimiter>) -> Self {
        Self {
            http,
            limiter,
            pool: None,
        }
    }

    pub fn with_pool(mut self, pool: Arc<PoolManager>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn limiter(&self) -> &Arc<HostLimiter> {
        &self.limiter
    }

    pub fn pool(&self) -> Option<&Arc<PoolManager>> {
        self.pool.as_ref()
    }
}

#[async_trait]
impl FetcherSource for Fetchers {
    async fn acquire(&self, descriptor: &Descriptor) -> Result<Box<dyn Fetcher>, FetchError> {
        match &descriptor.strategy {
            Strategy::Static => {
                let mut settings = self.http.clone();
                if let Some(ua) = &descriptor.user_agent {
                    settings.user_agent = ua.clone();
                }
                let fetcher = StaticFetcher::new(settings, Arc::clone(&self.limiter))?;
                Ok(Box::new(fetcher))
            }
            Strategy::Rendered(plan) => {
                let pool = self
                    .pool
                    .as_ref()
                    .ok_or_else(|| FetchError::Browser("no browser configured".into()))?;
                let session = pool
                    .acquire()
                    .await
                    .map_err(|e| FetchError::Browser(format!("{e:#}")))?;
                let fetcher = RenderedFetcher::open(
                    session,
                    plan.clone(),
                    Arc::clone(&self.limiter),
                    descriptor.user_agent.as_deref(),
                )
                .await?;
                Ok(Box::new(fetcher))
            }
        }
    }

    fn supports_rendered(&self) -> bool {
        self.pool.is_some()
    }
}
