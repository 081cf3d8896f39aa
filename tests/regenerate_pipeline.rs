mod http_stub;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use roadmapify::clock::{Clock, ManualClock};
use roadmapify::config::{GeneratorConfig, RegenerationConfig, ValidatorConfig};
use roadmapify::fallback::FallbackResourceGenerator;
use roadmapify::generator::{GenerationRequest, OpenAiGenerator};
use roadmapify::ids::SequentialIdGenerator;
use roadmapify::parser::RoadmapParser;
use roadmapify::regenerate::{
    RegenerateOptions, RegenerationError, RegenerationStatus, Regenerator,
};
use roadmapify::store::{Filter, LocalFsStore, RoadmapStore};
use roadmapify::validate::{UrlValidator, ValidationMode};

use http_stub::{HttpStub, Reply, responses_body};

const FIRST_CYCLE: &str = r#"# Week 1: Intro to Loops
Repeat work with `for`, `while` and `loop`.

### Objectives:
- Iterate over a range
- Break out of a loop early

### Resources:
- [Article] [Reference] [Free] "Control Flow" - The Book chapter on loops - https://doc.rust-lang.org/book/ch03-05-control-flow.html
- [Video] [Tutorial] [Free] "Loops explained" - A placeholder video - https://www.youtube.com/watch?v=short

### Exercise:
Print FizzBuzz up to 100.

# Week 2: Error Handling
Result, Option and the `?` operator.

### Resources:
- [Article] [Tutorial] [Free] "Recoverable errors" - Chapter 9.2 - https://doc.rust-lang.org/book/ch09-02-recoverable-errors-with-result.html
"#;

const SECOND_CYCLE: &str = r#"# Week 1: Intro To Loops
A duplicate of the kept topic.

# Week 2: Iterators
Lazy adapters and consumers.

### Resources:
- [Article] [Reference] [Free] "Iterators" - Chapter 13.2 - https://doc.rust-lang.org/book/ch13-02-iterators.html
"#;

fn regenerator(store: Arc<dyn RoadmapStore>) -> anyhow::Result<Regenerator> {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(DateTime::<Utc>::UNIX_EPOCH));
    let validator =
        UrlValidator::from_config(&ValidatorConfig::default(), ValidationMode::Noop, clock.clone())?;
    let parser = RoadmapParser::new(validator, Arc::new(SequentialIdGenerator::new("id")), clock);
    Ok(Regenerator::new(
        store,
        parser,
        &RegenerationConfig {
            persist_batch_size: 2,
        },
    ))
}

#[tokio::test]
async fn kept_topic_keeps_identity_across_cycles() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let store = Arc::new(LocalFsStore::new(temp.path()));
    let regenerator = regenerator(store.clone())?;

    let first = regenerator
        .regenerate("rust-basics", FIRST_CYCLE, &RegenerateOptions::default())
        .await?;
    assert_eq!(first.status, RegenerationStatus::Succeeded);
    assert_eq!(first.topics_parsed, 2);
    assert_eq!(first.invalid_resources, 1);
    assert_eq!(first.fallback_topics, 0);

    let loops = store
        .select_topics("rust-basics", &Filter::All)
        .await?
        .into_iter()
        .find(|t| t.title == "Intro to Loops")
        .ok_or_else(|| anyhow::anyhow!("loops topic missing"))?;
    assert!(!loops.completed);

    let options = RegenerateOptions {
        kept_topic_ids: HashSet::from([loops.id.clone()]),
        total_weeks_hint: None,
    };
    let second = regenerator
        .regenerate("rust-basics", SECOND_CYCLE, &options)
        .await?;
    assert_eq!(second.status, RegenerationStatus::Succeeded);
    assert_eq!(second.topics_kept, 1);
    assert_eq!(second.skipped_topics, 1);

    let reopened = LocalFsStore::new(temp.path());
    let topics = reopened.select_topics("rust-basics", &Filter::All).await?;
    let titles = topics.iter().map(|t| t.title.as_str()).collect::<Vec<_>>();
    assert_eq!(titles, vec!["Intro to Loops", "Iterators"]);
    assert_eq!(topics[0].id, loops.id);
    assert_eq!(topics[0].completed, loops.completed);

    let topic_ids = topics.iter().map(|t| t.id.as_str()).collect::<HashSet<_>>();
    let resources = reopened.select_resources("rust-basics", &Filter::All).await?;
    assert!(resources.iter().all(|r| topic_ids.contains(r.topic_id.as_str())));
    assert!(!resources.iter().any(|r| r.title == "Recoverable errors"));
    Ok(())
}

#[tokio::test]
async fn topics_without_valid_links_get_fallbacks() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let store = Arc::new(LocalFsStore::new(temp.path()));
    let document = "# Week 1: Pattern Matching\n`match` and `if let`.\n\n### Resources:\n- [Article] [Reference] [Free] \"Patterns\" - dead link - https://yourdomain.com/patterns\n";

    let report = regenerator(store.clone())?
        .regenerate("rm", document, &RegenerateOptions::default())
        .await?;
    assert_eq!(report.invalid_resources, 1);
    assert_eq!(report.fallback_topics, 1);

    let resources = store.select_resources("rm", &Filter::All).await?;
    assert_eq!(resources.len(), FallbackResourceGenerator::COUNT);
    assert!(resources.iter().all(|r| r.url_validated));
    Ok(())
}

#[tokio::test]
async fn rejected_document_leaves_store_untouched() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let store = Arc::new(LocalFsStore::new(temp.path()));
    let regenerator = regenerator(store.clone())?;
    regenerator
        .regenerate("rm", FIRST_CYCLE, &RegenerateOptions::default())
        .await?;
    let before = store.select_topics("rm", &Filter::All).await?;

    let err = regenerator
        .regenerate("rm", "I could not produce a roadmap.", &RegenerateOptions::default())
        .await
        .expect_err("document without weeks is rejected");
    assert!(matches!(err, RegenerationError::Rejected { .. }));
    assert_eq!(err.raw_document(), Some("I could not produce a roadmap."));

    let after = store.select_topics("rm", &Filter::All).await?;
    assert_eq!(before, after);
    Ok(())
}

#[tokio::test]
async fn openai_generated_document_is_persisted() -> anyhow::Result<()> {
    let stub = HttpStub::spawn(|method, url, body| {
        if method != &tiny_http::Method::Post || url != "/v1/responses" {
            return Reply::status(404);
        }
        let Ok(request) = serde_json::from_str::<serde_json::Value>(body) else {
            return Reply::status(400);
        };
        let input = request.get("input").and_then(|v| v.as_str()).unwrap_or("");
        if !input.contains("Learning goal: Rust") {
            return Reply::status(400);
        }
        Reply::json(responses_body(SECOND_CYCLE))
    });

    let temp = tempfile::TempDir::new()?;
    let store = Arc::new(LocalFsStore::new(temp.path()));
    let generator = OpenAiGenerator::from_config(&GeneratorConfig {
        base_url: format!("{}/v1", stub.base_url),
        api_key: Some("test-key".to_owned()),
        ..GeneratorConfig::default()
    })?;
    let request = GenerationRequest {
        goal: "Rust".to_owned(),
        ..GenerationRequest::default()
    };

    let report = regenerator(store.clone())?
        .generate_and_regenerate(&generator, "rm", request, &RegenerateOptions::default())
        .await?;
    assert_eq!(report.raw_document, SECOND_CYCLE);
    assert_eq!(report.topics_parsed, 2);

    let seen = stub.seen();
    assert_eq!(seen.len(), 1);
    let sent: serde_json::Value = serde_json::from_str(&seen[0].body)?;
    assert_eq!(sent["store"], serde_json::json!(false));
    assert!(sent["instructions"].as_str().unwrap_or("").contains("# Week N"));
    Ok(())
}

#[tokio::test]
async fn openai_errors_surface_as_generation_failures() -> anyhow::Result<()> {
    let stub = HttpStub::spawn(|_method, _url, _body| Reply {
        status: 401,
        body: r#"{"error":{"message":"invalid api key"}}"#.to_owned(),
        location: None,
        content_type: "application/json",
    });
    let temp = tempfile::TempDir::new()?;
    let store = Arc::new(LocalFsStore::new(temp.path()));
    let generator = OpenAiGenerator::from_config(&GeneratorConfig {
        base_url: format!("{}/v1", stub.base_url),
        api_key: Some("bad".to_owned()),
        ..GeneratorConfig::default()
    })?;

    let err = regenerator(store)?
        .generate_and_regenerate(
            &generator,
            "rm",
            GenerationRequest {
                goal: "Rust".to_owned(),
                ..GenerationRequest::default()
            },
            &RegenerateOptions::default(),
        )
        .await
        .expect_err("generation fails");
    assert!(matches!(err, RegenerationError::Generation(_)));
    assert!(err.to_string().contains("invalid api key"));
    Ok(())
}
