//! Error taxonomy shared by fetchers, recipes, the runner and the CLI.

use std::time::Duration;
use thiserror::Error;

/// A failed request made through a [`Fetcher`](crate::acquisition::Fetcher).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    /// Transport failure: DNS, TLS, connection reset.
    #[error("transport error fetching {url}: {message}")]
    Transport { url: String, message: String },
    /// The recipe asked for something that is not a fetchable URL.
    #[error("invalid URL `{url}`: {message}")]
    InvalidUrl { url: String, message: String },
    /// Per-request or browser-readiness timeout.
    #[error("timed out after {}ms fetching {url}", after.as_millis())]
    Timeout { url: String, after: Duration },
    /// Non-200 response promoted to an error by the recipe.
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    /// Browser session could not be launched or acquired.
    #[error("browser unavailable: {0}")]
    Browser(String),
}

impl FetchError {
    /// Whether the runner may retry a recipe that failed with this error.
    ///
    /// `retry_on_status` lists the HTTP codes the recipe treats as transient.
    pub fn is_transient(&self, retry_on_status: &[u16]) -> bool {
        match self {
            FetchError::Transport { .. } | FetchError::Timeout { .. } | FetchError::Browser(_) => {
                true
            }
            FetchError::Status { status, .. } => retry_on_status.contains(status),
            FetchError::InvalidUrl { .. } => false,
        }
    }

    /// Short category name used in report tallies.
    pub fn category(&self) -> &'static str {
        match self {
            FetchError::Transport { .. } => "fetch_error",
            FetchError::InvalidUrl { .. } => "invalid_url",
            FetchError::Timeout { .. } => "fetch_timeout",
            FetchError::Status { .. } => "fetch_status",
            FetchError::Browser(_) => "browser_unavailable",
        }
    }
}

/// A recipe-level failure surfaced from `collect`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RecipeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// The page structure did not match at all (e.g. top-level container missing).
    #[error("parse error: {0}")]
    Parse(String),
}

impl RecipeError {
    pub fn parse(message: impl Into<String>) -> Self {
        RecipeError::Parse(message.into())
    }

    /// Parse failures are never retried.
    pub fn is_transient(&self, retry_on_status: &[u16]) -> bool {
        match self {
            RecipeError::Fetch(e) => e.is_transient(retry_on_status),
            RecipeError::Parse(_) => false,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            RecipeError::Fetch(e) => e.category(),
            RecipeError::Parse(_) => "parse_error",
        }
    }
}

/// Invalid arguments or registry contents. Fatal for the whole run.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("duplicate recipe for ({community}, {builder}, {kind})")]
    DuplicateRecipe {
        community: String,
        builder: String,
        kind: String,
    },
    #[error("no recipe registered for ({community}, {builder}, {kind})")]
    UnknownRecipe {
        community: String,
        builder: String,
        kind: String,
    },
    #[error("no recipes match the selection")]
    EmptySelection,
}
