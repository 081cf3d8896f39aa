pub mod cache;
pub mod probe;
pub mod rules;
pub mod video;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::clock::Clock;
use crate::config::{ValidatorConfig, VideoApiKind};
use crate::model::ValidationResult;

use self::cache::ValidationCache;
use self::probe::{HttpProbe, NoopProbe, ProbeError, ProbeMethod, ReqwestProbe};
use self::rules::{RejectionRules, RuleVerdict, normalize_url};
use self::video::{
    NoopVideoApi, OEmbedVideoApi, VideoStatus, VideoStatusApi, YouTubeDataApi,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Static rules, then live HTTP probes and video lookups.
    Http,
    /// Static rules only; anything they let through is accepted.
    Noop,
}

#[derive(Debug, thiserror::Error)]
#[error("batch of {len} urls exceeds the cap of {cap}; split it into several batches")]
pub struct BatchTooLarge {
    pub len: usize,
    pub cap: usize,
}

#[derive(Clone)]
pub struct UrlValidator {
    rules: Arc<RejectionRules>,
    probe: Arc<dyn HttpProbe>,
    video_api: Option<Arc<dyn VideoStatusApi>>,
    cache: ValidationCache,
    clock: Arc<dyn Clock>,
    batch_size: usize,
    max_retries: u32,
    retry_backoff: Duration,
}

impl std::fmt::Debug for UrlValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlValidator")
            .field("cache", &self.cache)
            .field("has_video_api", &self.video_api.is_some())
            .field("batch_size", &self.batch_size)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl UrlValidator {
    pub fn new(config: &ValidatorConfig, probe: Arc<dyn HttpProbe>, clock: Arc<dyn Clock>) -> Self {
        Self {
            rules: Arc::new(RejectionRules::new(&config.deny, &config.heuristics)),
            probe,
            video_api: None,
            cache: ValidationCache::new(config.cache_ttl(), Arc::clone(&clock)),
            clock,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff(),
        }
    }

    /// Builds the probe and video backend that `config` and `mode` ask for.
    pub fn from_config(
        config: &ValidatorConfig,
        mode: ValidationMode,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        if mode == ValidationMode::Noop {
            return Ok(Self::new(config, Arc::new(NoopProbe), clock)
                .with_video_api(Arc::new(NoopVideoApi)));
        }

        let probe = ReqwestProbe::new(
            config.probe_timeout(),
            config.max_redirects,
            &config.user_agent,
        )
        .context("build http probe")?;
        let validator = Self::new(config, Arc::new(probe), clock);

        let video_api: Option<Arc<dyn VideoStatusApi>> = match config.video_api {
            VideoApiKind::None => None,
            VideoApiKind::Oembed => Some(Arc::new(
                OEmbedVideoApi::new(config.probe_timeout(), &config.user_agent)
                    .context("build oembed video api")?,
            )),
            VideoApiKind::DataApi => match config.youtube_api_key.as_deref() {
                Some(key) => Some(Arc::new(
                    YouTubeDataApi::new(key, config.probe_timeout())
                        .context("build youtube data api")?,
                )),
                None => {
                    tracing::warn!(
                        "video_api=data_api but YOUTUBE_API_KEY is not set; video links will be rejected"
                    );
                    None
                }
            },
        };

        Ok(match video_api {
            Some(api) => validator.with_video_api(api),
            None => validator,
        })
    }

    pub fn with_video_api(mut self, api: Arc<dyn VideoStatusApi>) -> Self {
        self.video_api = Some(api);
        self
    }

    pub fn cache(&self) -> &ValidationCache {
        &self.cache
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub async fn validate(&self, url: &str) -> ValidationResult {
        let key = normalize_url(url);
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(url, valid = hit.is_valid, "url verdict served from cache");
            return hit;
        }
        let result = self.check(url).await;
        self.cache.insert(key, result.clone());
        result
    }

    /// Validates up to `batch_size` urls concurrently.
    ///
    /// Every input gets an entry in the returned map, keyed by the input
    /// string as given.
    pub async fn validate_batch(
        &self,
        urls: &[String],
    ) -> Result<HashMap<String, ValidationResult>, BatchTooLarge> {
        if urls.len() > self.batch_size {
            return Err(BatchTooLarge {
                len: urls.len(),
                cap: self.batch_size,
            });
        }
        Ok(self.run_batch(urls).await)
    }

    /// Validates any number of urls, one cap-sized batch after another.
    pub async fn validate_all(&self, urls: &[String]) -> HashMap<String, ValidationResult> {
        let mut results = HashMap::with_capacity(urls.len());
        for (batch_index, batch) in batch_plan(urls, self.batch_size).enumerate() {
            tracing::debug!(batch_index, size = batch.len(), "validate url batch");
            results.extend(self.run_batch(batch).await);
        }
        results
    }

    async fn run_batch(&self, urls: &[String]) -> HashMap<String, ValidationResult> {
        let mut results: HashMap<String, ValidationResult> = HashMap::with_capacity(urls.len());
        let mut pending: HashMap<String, Vec<String>> = HashMap::new();
        let mut cache_hits = 0usize;

        for url in urls {
            if results.contains_key(url) {
                continue;
            }
            let key = normalize_url(url);
            if let Some(hit) = self.cache.get(&key) {
                cache_hits += 1;
                results.insert(url.clone(), hit);
                continue;
            }
            let inputs = pending.entry(key).or_default();
            if !inputs.contains(url) {
                inputs.push(url.clone());
            }
        }

        let checked = pending.len();
        let mut join_set = tokio::task::JoinSet::new();
        for (key, inputs) in pending {
            let validator = self.clone();
            join_set.spawn(async move {
                let result = validator.check(&inputs[0]).await;
                (key, inputs, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((key, inputs, result)) => {
                    self.cache.insert(key, result.clone());
                    for input in inputs {
                        results.insert(input, result.clone());
                    }
                }
                Err(err) => {
                    tracing::error!(?err, "url validation task failed");
                }
            }
        }

        for url in urls {
            if !results.contains_key(url) {
                results.insert(
                    url.clone(),
                    ValidationResult::invalid("validation task failed", self.clock.now()),
                );
            }
        }

        let invalid = results.values().filter(|r| !r.is_valid).count();
        tracing::info!(
            size = urls.len(),
            cache_hits,
            checked,
            invalid,
            "url batch validated"
        );
        results
    }

    async fn check(&self, input: &str) -> ValidationResult {
        let result = match self.rules.evaluate(input) {
            RuleVerdict::Reject(reason) => ValidationResult::invalid(reason, self.clock.now()),
            RuleVerdict::Video { video_id, .. } => self.check_video(&video_id).await,
            RuleVerdict::Probe(url) => self.check_http(&url).await,
        };
        tracing::debug!(
            url = input,
            valid = result.is_valid,
            status = ?result.status_code,
            error = ?result.error,
            "url verdict"
        );
        result
    }

    async fn check_video(&self, video_id: &str) -> ValidationResult {
        let Some(api) = self.video_api.as_ref() else {
            return ValidationResult::invalid(
                "video availability cannot be verified",
                self.clock.now(),
            );
        };
        match api.status(video_id).await {
            Ok(VideoStatus::Available) => ValidationResult::valid(None, self.clock.now()),
            Ok(VideoStatus::Unavailable(reason)) => {
                ValidationResult::invalid(reason, self.clock.now())
            }
            Err(err) => {
                tracing::warn!(video_id, ?err, "video lookup failed; treating link as invalid");
                ValidationResult::invalid(format!("video lookup failed: {err:#}"), self.clock.now())
            }
        }
    }

    async fn check_http(&self, url: &Url) -> ValidationResult {
        let outcome = match self.probe_with_retries(ProbeMethod::Head, url).await {
            Ok(status) if probe::head_is_blocked(status) => {
                tracing::debug!(%url, status, "HEAD rejected; retrying with GET");
                self.probe_with_retries(ProbeMethod::Get, url).await
            }
            other => other,
        };

        let now = self.clock.now();
        match outcome {
            Ok(status) if (200..300).contains(&status) => ValidationResult::valid(Some(status), now),
            Ok(status) => ValidationResult::invalid(format!("HTTP {status}"), now).with_status(status),
            Err(err) => ValidationResult::invalid(err.to_string(), now),
        }
    }

    async fn probe_with_retries(&self, method: ProbeMethod, url: &Url) -> Result<u16, ProbeError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.probe.probe(method, url).await {
                Ok(status) => return Ok(status),
                Err(err) if err.is_transient() && attempt <= self.max_retries => {
                    tracing::debug!(
                        %url,
                        method = method.as_str(),
                        attempt,
                        retries = self.max_retries,
                        %err,
                        "transient probe failure; retrying"
                    );
                    tokio::time::sleep(self.retry_backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Splits `urls` into the physical batches `validate_all` issues.
pub fn batch_plan(urls: &[String], cap: usize) -> std::slice::Chunks<'_, String> {
    urls.chunks(cap.max(1))
}
