//! Static strategy: a single HTTP GET per call.

use super::{FetchRequest, FetchResponse, Fetcher, HostLimiter};
use crate::error::FetchError;
use crate::stealth::DEFAULT_USER_AGENT;
use async_trait::async_trait;
use reqwest::header::ACCEPT_ENCODING;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub redirect_limit: usize,
    pub user_agent: String,
    /// Proxy URL applied to every scheme.
    pub proxy: Option<String>,
    /// Send `Accept-Encoding: identity`. Several builder sites return
    /// garbled bodies under compression.
    pub identity_encoding: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(10),
            redirect_limit: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: None,
            identity_encoding: true,
        }
    }
}

/// Plain HTTP fetcher. Built fresh for every recipe run, so no cookies or
/// connections are shared across recipes.
pub struct StaticFetcher {
    client: reqwest::Client,
    settings: HttpSettings,
    limiter: Arc<HostLimiter>,
}

impl StaticFetcher {
    pub fn new(settings: HttpSettings, limiter: Arc<HostLimiter>) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .connect_timeout(settings.connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(settings.redirect_limit));

        if let Some(proxy) = &settings.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str()).map_err(|e| FetchError::Transport {
                url: proxy.clone(),
                message: format!("invalid proxy: {e}"),
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| FetchError::Transport {
            url: String::new(),
            message: format!("building HTTP client: {e}"),
        })?;

        Ok(Self {
            client,
            settings,
            limiter,
        })
    }

    pub fn settings(&self) -> &HttpSettings {
        &self.settings
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn get(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let url = reqwest::Url::parse(&request.url).map_err(|e| FetchError::InvalidUrl {
            url: request.url.clone(),
            message: e.to_string(),
        })?;
        let timeout = request.timeout.unwrap_or(self.settings.timeout);

        let _host = self.limiter.acquire(url.as_str()).await;

        let mut builder = self.client.get(url);
        if self.settings.identity_encoding && !request.has_header(ACCEPT_ENCODING.as_str()) {
            builder = builder.header(ACCEPT_ENCODING, "identity");
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let exchange = async {
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let final_url = response.url().to_string();
            let bytes = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, final_url, bytes.to_vec()))
        };

        let (status, final_url, bytes) = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| FetchError::Timeout {
                url: request.url.clone(),
                after: timeout,
            })?
            .map_err(|e| map_reqwest_error(&request.url, timeout, e))?;

        tracing::debug!(url = %request.url, status, bytes = bytes.len(), "static fetch");

        Ok(FetchResponse {
            status,
            final_url,
            body: String::from_utf8_lossy(&bytes).into_owned(),
            bytes,
        })
    }
}

fn map_reqwest_error(url: &str, timeout: Duration, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
            after: timeout,
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}
