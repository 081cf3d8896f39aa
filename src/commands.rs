use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;

use crate::cli::{CommonArgs, ParseArgs, RegenerateArgs, ValidateArgs};
use crate::clock::{Clock, SystemClock};
use crate::config::Settings;
use crate::generator::{GenerationRequest, OpenAiGenerator};
use crate::ids::UuidIdGenerator;
use crate::model::Topic;
use crate::parser::RoadmapParser;
use crate::regenerate::{RegenerateOptions, RegenerationStatus, Regenerator};
use crate::store::LocalFsStore;
use crate::validate::UrlValidator;

fn load_settings(common: &CommonArgs) -> anyhow::Result<Settings> {
    Settings::load(common.config.as_deref().map(Path::new)).context("load settings")
}

fn build_parser(settings: &Settings, common: &CommonArgs) -> anyhow::Result<RoadmapParser> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let validator = UrlValidator::from_config(&settings.validator, common.validation, clock.clone())
        .context("build url validator")?;
    Ok(RoadmapParser::new(validator, Arc::new(UuidIdGenerator), clock))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{json}");
    Ok(())
}

pub async fn parse(args: ParseArgs) -> anyhow::Result<()> {
    let settings = load_settings(&args.common)?;
    let document = std::fs::read_to_string(&args.input)
        .with_context(|| format!("read input: {}", args.input))?;
    let kept: Vec<Topic> = match &args.kept {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("read kept topics: {path}"))?;
            serde_json::from_str(&raw).with_context(|| format!("parse kept topics: {path}"))?
        }
        None => Vec::new(),
    };

    let parser = build_parser(&settings, &args.common)?;
    let output = parser.parse(&document, args.total_weeks, &kept).await;
    if output.topics.is_empty() {
        anyhow::bail!("document contains no week topics: {}", args.input);
    }
    print_json(&output)
}

pub async fn validate(args: ValidateArgs) -> anyhow::Result<()> {
    let settings = load_settings(&args.common)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let validator = UrlValidator::from_config(&settings.validator, args.common.validation, clock)
        .context("build url validator")?;

    let verdicts = validator.validate_all(&args.urls).await;
    for url in &args.urls {
        let Some(verdict) = verdicts.get(url) else {
            continue;
        };
        let line = serde_json::json!({ "url": url, "result": verdict });
        println!("{line}");
    }
    Ok(())
}

pub async fn regenerate(args: RegenerateArgs) -> anyhow::Result<()> {
    let settings = load_settings(&args.common)?;
    let parser = build_parser(&settings, &args.common)?;
    let store = Arc::new(LocalFsStore::new(&args.store));
    let regenerator = Regenerator::new(store, parser, &settings.regeneration);
    let options = RegenerateOptions {
        kept_topic_ids: args.keep.iter().cloned().collect::<HashSet<_>>(),
        total_weeks_hint: args.total_weeks,
    };

    let result = match (&args.input, &args.goal) {
        (Some(input), _) => {
            let document = std::fs::read_to_string(input)
                .with_context(|| format!("read input: {input}"))?;
            regenerator.regenerate(&args.roadmap, &document, &options).await
        }
        (None, Some(goal)) => {
            let previous_document = match &args.previous {
                Some(path) => Some(
                    std::fs::read_to_string(path)
                        .with_context(|| format!("read previous roadmap: {path}"))?,
                ),
                None => None,
            };
            let generator =
                OpenAiGenerator::from_config(&settings.generator).context("build generator")?;
            let request = GenerationRequest {
                goal: goal.clone(),
                preferences: args.preferences.clone(),
                feedback: args.feedback.clone(),
                previous_document,
                total_weeks: args.total_weeks,
                ..GenerationRequest::default()
            };
            regenerator
                .generate_and_regenerate(&generator, &args.roadmap, request, &options)
                .await
        }
        (None, None) => anyhow::bail!("either --input or --goal is required"),
    };

    let report = match result {
        Ok(report) => report,
        Err(err) => {
            if let Some(document) = err.raw_document() {
                eprintln!("--- document ---\n{document}\n--- end document ---");
            }
            return Err(err).with_context(|| format!("regenerate roadmap {}", args.roadmap));
        }
    };

    print_json(&report)?;
    if report.status == RegenerationStatus::PartiallyFailed {
        anyhow::bail!(
            "roadmap {} was only partially saved ({} failed batches)",
            args.roadmap,
            report.persistence.failures.len()
        );
    }
    Ok(())
}
