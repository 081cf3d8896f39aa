mod http_stub;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use roadmapify::clock::{Clock, ManualClock};
use roadmapify::config::{ValidatorConfig, VideoApiKind};
use roadmapify::validate::video::OEmbedVideoApi;
use roadmapify::validate::{UrlValidator, ValidationMode};

use http_stub::{HttpStub, Reply};

fn config() -> ValidatorConfig {
    ValidatorConfig {
        probe_timeout_secs: 5,
        max_retries: 1,
        retry_backoff_ms: 10,
        video_api: VideoApiKind::None,
        ..ValidatorConfig::default()
    }
}

fn site() -> HttpStub {
    HttpStub::spawn(|method, url, _body| match (method, url) {
        (_, "/docs/guide") => Reply::status(200),
        (_, "/gone") => Reply::status(404),
        (tiny_http::Method::Head, "/no-head") => Reply::status(405),
        (_, "/no-head") => Reply::status(200),
        (_, "/moved") => Reply::redirect("/docs/guide"),
        (_, "/broken") => Reply::status(503),
        _ => Reply::status(404),
    })
}

fn validator(clock: Arc<dyn Clock>) -> anyhow::Result<UrlValidator> {
    UrlValidator::from_config(&config(), ValidationMode::Http, clock)
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

#[tokio::test]
async fn reachable_pages_are_valid_and_missing_ones_are_not() -> anyhow::Result<()> {
    let stub = site();
    let validator = validator(Arc::new(ManualClock::new(epoch())))?;

    let ok = validator.validate(&stub.url("/docs/guide")).await;
    assert!(ok.is_valid, "{ok:?}");
    assert_eq!(ok.status_code, Some(200));

    let gone = validator.validate(&stub.url("/gone")).await;
    assert!(!gone.is_valid);
    assert_eq!(gone.status_code, Some(404));

    let broken = validator.validate(&stub.url("/broken")).await;
    assert!(!broken.is_valid);
    assert_eq!(broken.status_code, Some(503));
    Ok(())
}

#[tokio::test]
async fn head_refusal_falls_back_to_get() -> anyhow::Result<()> {
    let stub = site();
    let validator = validator(Arc::new(ManualClock::new(epoch())))?;

    let result = validator.validate(&stub.url("/no-head")).await;
    assert!(result.is_valid, "{result:?}");

    let methods = stub
        .seen()
        .into_iter()
        .map(|seen| seen.method)
        .collect::<Vec<_>>();
    assert_eq!(methods, vec!["HEAD", "GET"]);
    Ok(())
}

#[tokio::test]
async fn redirects_are_followed() -> anyhow::Result<()> {
    let stub = site();
    let validator = validator(Arc::new(ManualClock::new(epoch())))?;

    let result = validator.validate(&stub.url("/moved")).await;
    assert!(result.is_valid, "{result:?}");
    assert_eq!(result.status_code, Some(200));
    Ok(())
}

#[tokio::test]
async fn cached_verdicts_skip_the_network_until_expiry() -> anyhow::Result<()> {
    let stub = site();
    let clock = Arc::new(ManualClock::new(epoch()));
    let validator = validator(clock.clone())?;
    let url = stub.url("/docs/guide");

    let first = validator.validate(&url).await;
    let hits = stub.hits();
    let second = validator.validate(&url).await;
    assert_eq!(first, second);
    assert_eq!(stub.hits(), hits);

    clock.advance(TimeDelta::days(2));
    let third = validator.validate(&url).await;
    assert!(third.is_valid);
    assert!(stub.hits() > hits);
    Ok(())
}

#[tokio::test]
async fn batch_validates_every_input() -> anyhow::Result<()> {
    let stub = site();
    let validator = validator(Arc::new(ManualClock::new(epoch())))?;
    let urls = vec![
        stub.url("/docs/guide"),
        stub.url("/gone"),
        "https://example.com/tutorial".to_owned(),
    ];

    let results = validator.validate_batch(&urls).await?;
    assert_eq!(results.len(), 3);
    assert!(results[&urls[0]].is_valid);
    assert!(!results[&urls[1]].is_valid);
    assert!(!results[&urls[2]].is_valid);
    Ok(())
}

#[tokio::test]
async fn unreachable_hosts_are_invalid_after_retries() -> anyhow::Result<()> {
    let dead_url = {
        let stub = site();
        stub.url("/docs/guide")
    };
    let validator = validator(Arc::new(ManualClock::new(epoch())))?;

    let result = validator.validate(&dead_url).await;
    assert!(!result.is_valid);
    assert!(result.error.is_some());
    Ok(())
}

#[tokio::test]
async fn video_links_follow_the_oembed_verdict() -> anyhow::Result<()> {
    let oembed = HttpStub::spawn(|_method, url, _body| {
        if url.contains("dQw4w9WgXcQ") {
            Reply::json(r#"{"title":"A video","type":"video"}"#.to_owned())
        } else if url.contains("privatevid1") {
            Reply::status(401)
        } else {
            Reply::status(404)
        }
    });
    let api = OEmbedVideoApi::with_endpoint(&oembed.url("/oembed"), Duration::from_secs(5), "test")?;
    let validator = validator(Arc::new(ManualClock::new(epoch())))?.with_video_api(Arc::new(api));

    let public = validator
        .validate("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
        .await;
    assert!(public.is_valid, "{public:?}");

    let private = validator.validate("https://youtu.be/privatevid1").await;
    assert!(!private.is_valid);

    let missing = validator
        .validate("https://www.youtube.com/embed/nosuchvideo")
        .await;
    assert!(!missing.is_valid);

    let seen = oembed.seen();
    assert!(seen.iter().all(|s| s.url.starts_with("/oembed?")));
    assert!(seen[0].url.contains("format=json"));
    Ok(())
}

#[tokio::test]
async fn video_links_fail_closed_when_lookup_errors() -> anyhow::Result<()> {
    let oembed = HttpStub::spawn(|_method, _url, _body| Reply::status(500));
    let api = OEmbedVideoApi::with_endpoint(&oembed.url("/oembed"), Duration::from_secs(5), "test")?;
    let validator = validator(Arc::new(ManualClock::new(epoch())))?.with_video_api(Arc::new(api));

    let result = validator
        .validate("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
        .await;
    assert!(!result.is_valid);
    Ok(())
}
