//! Page acquisition: one [`Fetcher`] interface over static HTTP and
//! headless-browser rendering.
//!
//! Recipes see only `Fetcher::get`. Which implementation backs it is
//! decided by the recipe's declared strategy through a
//! [`FetcherSource`]. Both implementations go through the shared
//! [`HostLimiter`] so no builder host sees more than a few concurrent
//! requests, whichever pool they come from.

pub mod host_limiter;
pub mod http_fetcher;
pub mod rendered_fetcher;
pub mod source;

pub use host_limiter::{HostGuard, HostLimiter};
pub use http_fetcher::{HttpSettings, StaticFetcher};
pub use rendered_fetcher::RenderedFetcher;
pub use source::{FetcherSource, Fetchers};

use crate::error::{FetchError, RecipeError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single GET issued by a recipe.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Overrides the fetcher's default timeout.
    pub timeout: Option<Duration>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            timeout: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

impl From<&str> for FetchRequest {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for FetchRequest {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

/// What came back. Non-200 statuses are returned here, not as errors.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status: u16,
    /// URL after redirects.
    pub final_url: String,
    pub body: String,
    pub bytes: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    /// Promote a non-200 status to [`FetchError::Status`].
    pub fn ensure_success(self) -> Result<Self, FetchError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(FetchError::Status {
                url: self.final_url,
                status: self.status,
            })
        }
    }

    /// Decode the body as JSON. A body that does not parse is a structural
    /// mismatch, not a transport problem.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, RecipeError> {
        serde_json::from_slice(&self.bytes)
            .map_err(|e| RecipeError::parse(format!("invalid JSON from {}: {e}", self.final_url)))
    }
}

/// The one operation recipes may use to reach the network.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;

    /// Return held resources (browser sessions) to their pool.
    async fn release(self: Box<Self>) {}
}

/// Condition a rendered page must satisfy before its DOM is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Readiness {
    /// Navigation finished; nothing else to wait for.
    Load,
    /// An element with this DOM id exists.
    ElementId { id: String },
    /// At least `min` elements match `selector`.
    SelectorCount { selector: String, min: usize },
    /// Fixed settle time after navigation.
    Delay { millis: u64 },
}

impl Readiness {
    /// JavaScript expression evaluating to `true` once ready, for the
    /// predicates that need polling.
    pub fn probe_script(&self) -> Option<String> {
        match self {
            Readiness::ElementId { id } => Some(format!(
                "document.getElementById({}) !== null",
                js_string(id)
            )),
            Readiness::SelectorCount { selector, min } => Some(format!(
                "document.querySelectorAll({}).length >= {min}",
                js_string(selector)
            )),
            Readiness::Load | Readiness::Delay { .. } => None,
        }
    }
}

fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Scroll-to-bottom loop that forces lazy-loaded cards to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrollPlan {
    pub max_rounds: u32,
    pub pause_ms: u64,
}

impl Default for ScrollPlan {
    fn default() -> Self {
        Self {
            max_rounds: 10,
            pause_ms: 750,
        }
    }
}

/// How a rendered recipe's pages are loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPlan {
    pub ready: Readiness,
    pub scroll: Option<ScrollPlan>,
    pub ready_timeout: Duration,
    pub total_budget: Duration,
}

impl RenderPlan {
    pub fn new(ready: Readiness) -> Self {
        Self {
            ready,
            ..Self::default()
        }
    }

    pub fn with_scroll(mut self, scroll: ScrollPlan) -> Self {
        self.scroll = Some(scroll);
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }
}

impl Default for RenderPlan {
    fn default() -> Self {
        Self {
            ready: Readiness::Load,
            scroll: None,
            ready_timeout: Duration::from_secs(30),
            total_budget: Duration::from_secs(120),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_scripts_escape_selectors() {
        let ready = Readiness::SelectorCount {
            selector: r#"div[data-kind="home"]"#.into(),
            min: 3,
        };
        assert_eq!(
            ready.probe_script().unwrap(),
            r#"document.querySelectorAll("div[data-kind=\"home\"]").length >= 3"#
        );
        let ready = Readiness::ElementId { id: "homes".into() };
        assert_eq!(
            ready.probe_script().unwrap(),
            r#"document.getElementById("homes") !== null"#
        );
        assert!(Readiness::Load.probe_script().is_none());
    }

    #[test]
    fn test_ensure_success() {
        let ok = FetchResponse {
            status: 200,
            final_url: "https://a.test/".into(),
            body: String::new(),
            bytes: Vec::new(),
        };
        assert!(ok.clone().ensure_success().is_ok());

        let blocked = FetchResponse { status: 403, ..ok };
        assert_eq!(
            blocked.ensure_success(),
            Err(FetchError::Status {
                url: "https://a.test/".into(),
                status: 403
            })
        );
    }

    #[test]
    fn test_request_builder() {
        let req = FetchRequest::new("https://a.test/")
            .header("Accept", "application/json")
            .timeout(Duration::from_secs(5));
        assert!(req.has_header("accept"));
        assert_eq!(req.timeout, Some(Duration::from_secs(5)));
        assert_eq!(FetchRequest::from("https://b.test/").url, "https://b.test/");
    }

    #[test]
    fn test_render_plan_defaults() {
        let plan = RenderPlan::default();
        assert_eq!(plan.ready_timeout, Duration::from_secs(30));
        assert_eq!(plan.total_budget, Duration::from_secs(120));
    }
}
