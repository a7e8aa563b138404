//! Settings read from the environment.

use crate::acquisition::HttpSettings;
use crate::error::ConfigError;
use crate::renderer::ChromiumSettings;
use crate::stealth::DEFAULT_USER_AGENT;
use std::path::{Path, PathBuf};

pub const ENV_BROWSER: &str = "HOMESCRAPE_BROWSER";
pub const ENV_PROXY: &str = "HOMESCRAPE_PROXY";
pub const ENV_USER_AGENT: &str = "HOMESCRAPE_USER_AGENT";
pub const ENV_BROWSER_SESSIONS: &str = "HOMESCRAPE_BROWSER_SESSIONS";

/// Default number of concurrent browser sessions.
pub const DEFAULT_BROWSER_SESSIONS: usize = 2;

const BROWSER_NAMES: [&str; 5] = [
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Browser binary; `None` when none was configured or found.
    pub browser: Option<PathBuf>,
    pub proxy: Option<String>,
    pub user_agent: String,
    pub browser_sessions: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            browser: None,
            proxy: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            browser_sessions: DEFAULT_BROWSER_SESSIONS,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok(), find_browser_on_path)
    }

    /// Build settings from an arbitrary variable source. `search` locates
    /// a browser when none is configured.
    pub fn from_lookup(
        var: impl Fn(&str) -> Option<String>,
        search: impl Fn() -> Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let var = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let browser = match var(ENV_BROWSER) {
            Some(path) => Some(resolve_browser(&path)?),
            None => search(),
        };

        let proxy = var(ENV_PROXY)
            .or_else(|| var("HTTPS_PROXY"))
            .or_else(|| var("https_proxy"));

        let browser_sessions = match var(ENV_BROWSER_SESSIONS) {
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidArgument(format!(
                        "{ENV_BROWSER_SESSIONS} must be a positive integer, got `{raw}`"
                    )))
                }
            },
            None => DEFAULT_BROWSER_SESSIONS,
        };

        Ok(Self {
            browser,
            proxy,
            user_agent: var(ENV_USER_AGENT).unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            browser_sessions,
        })
    }

    pub fn http(&self) -> HttpSettings {
        HttpSettings {
            user_agent: self.user_agent.clone(),
            proxy: self.proxy.clone(),
            ..HttpSettings::default()
        }
    }

    pub fn chromium(&self) -> ChromiumSettings {
        ChromiumSettings {
            executable: self.browser.clone(),
            user_agent: self.user_agent.clone(),
            proxy: self.proxy.clone(),
            ..ChromiumSettings::default()
        }
    }
}

/// A configured browser may be a path or a command name on PATH.
fn resolve_browser(value: &str) -> Result<PathBuf, ConfigError> {
    let path = Path::new(value);
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    which::which(value).map_err(|_| {
        ConfigError::InvalidArgument(format!("{ENV_BROWSER}: browser `{value}` not found"))
    })
}

/// First Chromium-family browser on PATH.
pub fn find_browser_on_path() -> Option<PathBuf> {
    BROWSER_NAMES
        .iter()
        .find_map(|name| which::which(name).ok())
}
