use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub validator: ValidatorConfig,
    pub regeneration: RegenerationConfig,
    pub generator: GeneratorConfig,
}

impl Settings {
    /// Loads settings from an optional YAML file, then applies env overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut settings = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("read config: {}", path.display()))?;
                Self::from_yaml(&raw).with_context(|| format!("parse config: {}", path.display()))?
            }
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).context("deserialize settings yaml")
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| var(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        if let Some(key) = non_empty("YOUTUBE_API_KEY") {
            self.validator.youtube_api_key = Some(key);
        }
        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.generator.api_key = Some(key);
        }
        if let Some(base_url) = non_empty("OPENAI_BASE_URL") {
            self.generator.base_url = base_url;
        }
        if let Some(model) = non_empty("ROADMAPIFY_OPENAI_MODEL") {
            self.generator.model = model;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoApiKind {
    None,
    Oembed,
    DataApi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub batch_size: usize,
    pub probe_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub cache_ttl_secs: u64,
    pub max_redirects: usize,
    pub user_agent: String,
    pub video_api: VideoApiKind,
    #[serde(skip_serializing)]
    pub youtube_api_key: Option<String>,
    pub deny: DenyList,
    pub heuristics: HeuristicRules,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            probe_timeout_secs: 10,
            max_retries: 2,
            retry_backoff_ms: 250,
            cache_ttl_secs: 24 * 60 * 60,
            max_redirects: 10,
            user_agent: format!("roadmapify/{}", env!("CARGO_PKG_VERSION")),
            video_api: VideoApiKind::Oembed,
            youtube_api_key: None,
            deny: DenyList::default(),
            heuristics: HeuristicRules::default(),
        }
    }
}

impl ValidatorConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn cache_ttl(&self) -> chrono::TimeDelta {
        i64::try_from(self.cache_ttl_secs)
            .ok()
            .and_then(chrono::TimeDelta::try_seconds)
            .unwrap_or(chrono::TimeDelta::MAX)
    }
}

/// Links known to be dead, consulted before any network call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DenyList {
    pub urls: Vec<String>,
    pub video_ids: Vec<String>,
    pub hosts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicRules {
    pub blocked_tlds: Vec<String>,
    pub placeholder_hosts: Vec<String>,
    pub placeholder_segments: Vec<String>,
    pub rejected_tokens: Vec<String>,
    pub min_video_id_len: usize,
}

impl Default for HeuristicRules {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| (*s).to_owned()).collect::<Vec<_>>();
        Self {
            blocked_tlds: owned(&["example", "invalid", "local", "localhost", "test"]),
            placeholder_hosts: owned(&[
                "example.com",
                "example.net",
                "example.org",
                "yourdomain.com",
                "domain.com",
            ]),
            placeholder_segments: owned(&[
                "link", "url", "path", "resource", "placeholder", "...", "tbd", "todo",
            ]),
            rejected_tokens: owned(&["unavailable", "expired", "removed", "deleted", "placeholder"]),
            min_video_id_len: 11,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegenerationConfig {
    pub persist_batch_size: usize,
}

impl Default for RegenerationConfig {
    fn default() -> Self {
        Self {
            persist_batch_size: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_owned(),
            model: "gpt-4.1-mini".to_owned(),
            temperature: 0.4,
            timeout_secs: 300,
            api_key: None,
        }
    }
}
