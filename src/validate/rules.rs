use std::collections::HashSet;

use url::{Host, Url};

use crate::config::{DenyList, HeuristicRules};
use crate::validate::video::{self, VideoLink};

/// What the static rules concluded about a URL, before any network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleVerdict {
    Reject(String),
    Video { url: Url, video_id: String },
    Probe(Url),
}

/// Adds `https://` when the input carries no scheme.
pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.contains("://") {
        trimmed.to_owned()
    } else {
        format!("https://{}", trimmed.trim_start_matches('/'))
    }
}

#[derive(Debug, Clone)]
pub struct RejectionRules {
    denied_urls: HashSet<String>,
    denied_video_ids: HashSet<String>,
    denied_hosts: HashSet<String>,
    blocked_tlds: HashSet<String>,
    placeholder_hosts: HashSet<String>,
    placeholder_segments: HashSet<String>,
    rejected_tokens: Vec<String>,
    min_video_id_len: usize,
}

impl RejectionRules {
    pub fn new(deny: &DenyList, heuristics: &HeuristicRules) -> Self {
        let lower_set = |items: &[String]| {
            items
                .iter()
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect::<HashSet<_>>()
        };
        Self {
            denied_urls: deny
                .urls
                .iter()
                .map(|u| deny_key(&normalize_url(u)))
                .collect(),
            denied_video_ids: deny.video_ids.iter().map(|id| id.trim().to_owned()).collect(),
            denied_hosts: lower_set(&deny.hosts),
            blocked_tlds: lower_set(&heuristics.blocked_tlds),
            placeholder_hosts: lower_set(&heuristics.placeholder_hosts),
            placeholder_segments: lower_set(&heuristics.placeholder_segments),
            rejected_tokens: heuristics
                .rejected_tokens
                .iter()
                .map(|t| t.trim().to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
            min_video_id_len: heuristics.min_video_id_len,
        }
    }

    /// Runs every check that needs no network access.
    pub fn evaluate(&self, input: &str) -> RuleVerdict {
        let raw = input.trim();
        if raw.is_empty() {
            return RuleVerdict::Reject("empty url".to_owned());
        }
        // Brackets mean an unexpanded markdown link or template slot.
        if raw.contains(['[', ']', '{', '}', '<', '>']) {
            return RuleVerdict::Reject("url contains template or markdown brackets".to_owned());
        }

        let normalized = normalize_url(raw);
        let url = match Url::parse(&normalized) {
            Ok(url) => url,
            Err(err) => return RuleVerdict::Reject(format!("malformed url: {err}")),
        };
        if url.scheme() != "http" && url.scheme() != "https" {
            return RuleVerdict::Reject(format!("unsupported scheme: {}", url.scheme()));
        }
        let Some(host) = url.host() else {
            return RuleVerdict::Reject("url has no host".to_owned());
        };

        if self.denied_urls.contains(&deny_key(url.as_str())) {
            return RuleVerdict::Reject("url is on the deny list".to_owned());
        }

        if let Host::Domain(domain) = host {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            if let Some(reason) = self.check_domain(&domain) {
                return RuleVerdict::Reject(reason);
            }
        }

        let lowered = url.as_str().to_ascii_lowercase();
        if let Some(token) = self.rejected_tokens.iter().find(|t| lowered.contains(t.as_str())) {
            return RuleVerdict::Reject(format!("url contains placeholder token: {token}"));
        }

        let segments = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect::<Vec<_>>())
            .unwrap_or_default();
        if let [only] = segments.as_slice()
            && self.placeholder_segments.contains(&only.to_ascii_lowercase())
        {
            return RuleVerdict::Reject(format!("placeholder path: /{only}"));
        }

        match video::classify(&url) {
            VideoLink::NotVideo => RuleVerdict::Probe(url),
            VideoLink::Unrecognized => {
                RuleVerdict::Reject("could not extract video id from video link".to_owned())
            }
            VideoLink::Watch(video_id) => {
                if video_id.len() < self.min_video_id_len {
                    RuleVerdict::Reject(format!("video id too short: {video_id}"))
                } else if self.denied_video_ids.contains(&video_id) {
                    RuleVerdict::Reject(format!("video id is on the deny list: {video_id}"))
                } else {
                    RuleVerdict::Video { url, video_id }
                }
            }
        }
    }

    fn check_domain(&self, domain: &str) -> Option<String> {
        if self.denied_hosts.contains(domain)
            || self
                .denied_hosts
                .iter()
                .any(|denied| domain.ends_with(&format!(".{denied}")))
        {
            return Some(format!("host is on the deny list: {domain}"));
        }
        let Some((_, tld)) = domain.rsplit_once('.') else {
            return Some(format!("host has no top-level domain: {domain}"));
        };
        if self.blocked_tlds.contains(tld) {
            return Some(format!("disallowed top-level domain: .{tld}"));
        }
        let bare = domain.strip_prefix("www.").unwrap_or(domain);
        if self.placeholder_hosts.contains(bare) {
            return Some(format!("placeholder host: {domain}"));
        }
        None
    }
}

fn deny_key(url: &str) -> String {
    url.trim_end_matches('/').to_ascii_lowercase()
}
