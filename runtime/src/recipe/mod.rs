//! Recipe interface: an immutable descriptor plus a `collect` function.

pub mod registry;

pub use registry::{Registry, RegistryBuilder, Selection};

use crate::acquisition::{Fetcher, RenderPlan};
use crate::audit::RecipeLog;
use crate::error::RecipeError;
use crate::listing::Kind;
pub use crate::listing::RawRecord;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How a recipe's pages must be loaded.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    Static,
    Rendered(RenderPlan),
}

impl Strategy {
    pub fn is_rendered(&self) -> bool {
        matches!(self, Strategy::Rendered(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Static => "static",
            Strategy::Rendered(_) => "rendered",
        }
    }
}

/// Immutable metadata for one (builder, community, kind) recipe.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub builder: String,
    pub community: String,
    pub sub_community: Option<String>,
    pub kind: Kind,
    pub strategy: Strategy,
    /// URLs or URL templates; `{page}` is replaced with the page number.
    pub targets: Vec<String>,
    /// Overrides the run's per-recipe timeout.
    pub timeout: Option<Duration>,
    /// Overrides the run's retry count.
    pub retries: Option<u32>,
    /// HTTP statuses this site uses for transient throttling.
    pub retry_on_status: Vec<u16>,
    pub user_agent: Option<String>,
}

impl Descriptor {
    pub fn new(builder: &str, community: &str, kind: Kind) -> Self {
        Self {
            builder: builder.to_string(),
            community: community.to_string(),
            sub_community: None,
            kind,
            strategy: Strategy::Static,
            targets: Vec::new(),
            timeout: None,
            retries: None,
            retry_on_status: Vec::new(),
            user_agent: None,
        }
    }

    pub fn target(mut self, url: &str) -> Self {
        self.targets.push(url.to_string());
        self
    }

    pub fn sub_community(mut self, name: &str) -> Self {
        self.sub_community = Some(name.to_string());
        self
    }

    pub fn rendered(mut self, plan: RenderPlan) -> Self {
        self.strategy = Strategy::Rendered(plan);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn retry_on_status(mut self, statuses: &[u16]) -> Self {
        self.retry_on_status = statuses.to_vec();
        self
    }

    pub fn user_agent(mut self, ua: &str) -> Self {
        self.user_agent = Some(ua.to_string());
        self
    }

    /// Registry key, lowercased.
    pub fn key(&self) -> (String, String, Kind) {
        (
            self.community.to_lowercase(),
            self.builder.to_lowercase(),
            self.kind,
        )
    }

    pub fn log(&self) -> RecipeLog {
        RecipeLog::new(&self.builder, &self.community, self.kind.as_str())
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {} / {}", self.community, self.builder, self.kind)
    }
}

/// The extraction step of a recipe.
///
/// Implementations must use only the fetcher passed in, log and skip
/// per-card problems, and return [`RecipeError::Parse`] only when the page
/// structure is unusable.
#[async_trait]
pub trait Collect: Send + Sync {
    async fn collect(
        &self,
        descriptor: &Descriptor,
        fetcher: &dyn Fetcher,
        log: &RecipeLog,
    ) -> Result<Vec<RawRecord>, RecipeError>;
}

/// A registered recipe.
#[derive(Clone)]
pub struct Recipe {
    pub descriptor: Descriptor,
    collector: Arc<dyn Collect>,
}

impl Recipe {
    pub fn new(descriptor: Descriptor, collector: impl Collect + 'static) -> Self {
        Self {
            descriptor,
            collector: Arc::new(collector),
        }
    }

    pub async fn collect(
        &self,
        fetcher: &dyn Fetcher,
        log: &RecipeLog,
    ) -> Result<Vec<RawRecord>, RecipeError> {
        self.collector.collect(&self.descriptor, fetcher, log).await
    }
}

impl fmt::Debug for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recipe")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Expand a target template into concrete page URLs.
pub fn page_url(template: &str, page: u32) -> String {
    template.replace("{page}", &page.to_string())
}
