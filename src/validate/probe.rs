use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMethod {
    Head,
    Get,
}

impl ProbeMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Head => "HEAD",
            Self::Get => "GET",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// Timeouts, refused or reset connections. Worth another attempt.
    #[error("transient network failure: {0}")]
    Transient(String),
    #[error("request failed: {0}")]
    Fatal(String),
}

impl ProbeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[async_trait]
pub trait HttpProbe: Send + Sync {
    /// Issues one request and returns the final status code after redirects.
    async fn probe(&self, method: ProbeMethod, url: &Url) -> Result<u16, ProbeError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestProbe {
    client: reqwest::Client,
    user_agent: String,
}

impl ReqwestProbe {
    pub fn new(timeout: Duration, max_redirects: usize, user_agent: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(max_redirects))
            .build()
            .context("build url probe http client")?;
        Ok(Self {
            client,
            user_agent: user_agent.to_owned(),
        })
    }
}

#[async_trait]
impl HttpProbe for ReqwestProbe {
    async fn probe(&self, method: ProbeMethod, url: &Url) -> Result<u16, ProbeError> {
        let request = match method {
            ProbeMethod::Head => self.client.head(url.clone()),
            ProbeMethod::Get => self.client.get(url.clone()),
        };
        let response = request
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        Ok(response.status().as_u16())
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> ProbeError {
    let message = format!("{err:#}");
    if err.is_timeout() || err.is_connect() || (err.is_request() && !err.is_builder()) {
        ProbeError::Transient(message)
    } else {
        ProbeError::Fatal(message)
    }
}

/// Answers 200 for everything without touching the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProbe;

#[async_trait]
impl HttpProbe for NoopProbe {
    async fn probe(&self, _method: ProbeMethod, _url: &Url) -> Result<u16, ProbeError> {
        Ok(200)
    }
}

/// Status codes that mean the server refuses the lightweight method.
pub fn head_is_blocked(status: u16) -> bool {
    matches!(status, 400 | 403 | 405 | 406 | 429 | 501)
}
