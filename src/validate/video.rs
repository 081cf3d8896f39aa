use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use reqwest::header::USER_AGENT;
use url::Url;

static VIDEO_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static video id regex"));

const WATCH_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtube-nocookie.com",
    "www.youtube-nocookie.com",
];
const SHARE_HOSTS: &[&str] = &["youtu.be", "www.youtu.be"];
const ID_PATH_PREFIXES: &[&str] = &["embed", "shorts", "live", "v"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoLink {
    /// Not a watch or share link; probed like any other page.
    NotVideo,
    /// A watch or share link whose id could not be extracted.
    Unrecognized,
    Watch(String),
}

/// Recognizes video watch/share links and extracts their id.
pub fn classify(url: &Url) -> VideoLink {
    let Some(host) = url.host_str().map(|h| h.to_ascii_lowercase()) else {
        return VideoLink::NotVideo;
    };
    let segments = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect::<Vec<_>>())
        .unwrap_or_default();

    let candidate = if SHARE_HOSTS.contains(&host.as_str()) {
        segments.first().map(|s| (*s).to_owned())
    } else if WATCH_HOSTS.contains(&host.as_str()) {
        match segments.as_slice() {
            ["watch", ..] => url
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned()),
            [prefix, id, ..] if ID_PATH_PREFIXES.contains(prefix) => Some((*id).to_owned()),
            [prefix] if ID_PATH_PREFIXES.contains(prefix) => None,
            _ => return VideoLink::NotVideo,
        }
    } else {
        return VideoLink::NotVideo;
    };

    match candidate {
        Some(id) if VIDEO_ID_RE.is_match(&id) => VideoLink::Watch(id),
        _ => VideoLink::Unrecognized,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoStatus {
    Available,
    /// Private, removed, not yet processed, or otherwise not watchable.
    Unavailable(String),
}

#[async_trait]
pub trait VideoStatusApi: Send + Sync {
    async fn status(&self, video_id: &str) -> anyhow::Result<VideoStatus>;
}

/// Treats every well-formed video id as available.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopVideoApi;

#[async_trait]
impl VideoStatusApi for NoopVideoApi {
    async fn status(&self, _video_id: &str) -> anyhow::Result<VideoStatus> {
        Ok(VideoStatus::Available)
    }
}

/// Keyless lookup through the public oEmbed endpoint.
#[derive(Debug, Clone)]
pub struct OEmbedVideoApi {
    client: reqwest::Client,
    endpoint: String,
    user_agent: String,
}

impl OEmbedVideoApi {
    pub const DEFAULT_ENDPOINT: &'static str = "https://www.youtube.com/oembed";

    pub fn new(timeout: Duration, user_agent: &str) -> anyhow::Result<Self> {
        Self::with_endpoint(Self::DEFAULT_ENDPOINT, timeout, user_agent)
    }

    pub fn with_endpoint(endpoint: &str, timeout: Duration, user_agent: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build oembed http client")?;
        Ok(Self {
            client,
            endpoint: endpoint.to_owned(),
            user_agent: user_agent.to_owned(),
        })
    }
}

#[async_trait]
impl VideoStatusApi for OEmbedVideoApi {
    async fn status(&self, video_id: &str) -> anyhow::Result<VideoStatus> {
        let watch_url = format!("https://www.youtube.com/watch?v={video_id}");
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("url", watch_url.as_str()), ("format", "json")])
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
            .with_context(|| format!("GET {} for video {video_id}", self.endpoint))?;

        match response.status() {
            status if status.is_success() => Ok(VideoStatus::Available),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Ok(VideoStatus::Unavailable("video is private or embedding is disabled".to_owned()))
            }
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => {
                Ok(VideoStatus::Unavailable("video not found".to_owned()))
            }
            status => anyhow::bail!("oembed lookup failed ({status})"),
        }
    }
}

/// Lookup through the Data API `videos` resource; needs an API key.
#[derive(Debug, Clone)]
pub struct YouTubeDataApi {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl YouTubeDataApi {
    pub const DEFAULT_ENDPOINT: &'static str = "https://www.googleapis.com/youtube/v3/videos";

    pub fn new(api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        Self::with_endpoint(Self::DEFAULT_ENDPOINT, api_key, timeout)
    }

    pub fn with_endpoint(endpoint: &str, api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        if api_key.trim().is_empty() {
            anyhow::bail!("youtube data api key is empty");
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build youtube data api http client")?;
        Ok(Self {
            client,
            endpoint: endpoint.to_owned(),
            api_key: api_key.trim().to_owned(),
        })
    }
}

#[async_trait]
impl VideoStatusApi for YouTubeDataApi {
    async fn status(&self, video_id: &str) -> anyhow::Result<VideoStatus> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("part", "status"), ("id", video_id), ("key", self.api_key.as_str())])
            .send()
            .await
            .with_context(|| format!("GET {} for video {video_id}", self.endpoint))?;

        let status = response.status();
        let raw = response.text().await.context("read youtube data api body")?;
        if !status.is_success() {
            anyhow::bail!("youtube data api error ({status}): {raw}");
        }
        let value: serde_json::Value =
            serde_json::from_str(&raw).context("parse youtube data api response")?;
        Ok(status_from_videos_response(&value))
    }
}

fn status_from_videos_response(value: &serde_json::Value) -> VideoStatus {
    let Some(item) = value
        .get("items")
        .and_then(|v| v.as_array())
        .and_then(|items| items.first())
    else {
        return VideoStatus::Unavailable("video not found".to_owned());
    };

    let privacy = item
        .pointer("/status/privacyStatus")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    let upload = item
        .pointer("/status/uploadStatus")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");

    if privacy == "public" && upload == "processed" {
        VideoStatus::Available
    } else {
        VideoStatus::Unavailable(format!("video is {privacy} ({upload})"))
    }
}
