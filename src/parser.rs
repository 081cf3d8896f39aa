//! Turns a generated weekly roadmap document into topics and resources.
//!
//! The document is read line by line. A week header opens a block; labeled
//! subsections inside the block switch what the following lines mean:
//!
//! ```text
//! SeekingWeekHeader -> InDescription -> InObjectives | InResources | InExercise
//! ```
//!
//! Lines that do not fit the state they arrive in are skipped, never fatal.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;

use crate::clock::Clock;
use crate::fallback::FallbackResourceGenerator;
use crate::ids::IdGenerator;
use crate::model::{
    Resource, ResourceDraft, ResourceFormat, ResourceType, Section, Topic, title_key,
};
use crate::validate::UrlValidator;
use crate::validate::rules::normalize_url;

static WEEK_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*#{1,3}\s*week(?:\s*(?P<number>\d+))?\b\s*[:.\-–—]?\s*(?P<title>.*)$")
        .expect("static week header regex")
});

static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?P<hashes>#{1,6})?\s*(?P<bold>\*\*|__)?\s*(?:(?P<qualifier>[a-z]+)\s+)?(?P<label>description|overview|learning\s+objectives?|objectives?|goals|resources?|practical\s+exercises?|exercises?|practice)\b\s*(?P<colon>:)?\s*(?:\*\*|__)?\s*(?P<colon_after>:)?\s*(?P<rest>.*)$",
    )
    .expect("static subsection label regex")
});

static ID_ANNOTATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*[(\[{]\s*(?:topic[\s_-]*)?id\s*[:=#]\s*[^)\]}]*[)\]}]")
        .expect("static id annotation regex")
});

static BULLET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*+•]|\d+[.)])\s+(?:\[[ xX]\]\s+)?").expect("static bullet regex")
});

static RESOURCE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)^\s*(?:(?:[-*+•]|\d+[.)])\s*)?\[(?P<format>[^\]]+)\]\s*\[(?P<kind>[^\]]+)\]\s*\[(?P<cost>free|paid)(?:\s*[:\-]?\s*(?P<price>[^\]]*))?\]\s*[-–—:]?\s*["“](?P<title>[^"”]+)["”]\s*(?:[-–—:|]\s*)?(?P<description>.*?)\s*(?:[-–—:|]\s*)?[<(]?(?P<url>(?:https?://|www\.)(?:[^\s<>()]|\([^\s<>()]*\))+|[a-z0-9][a-z0-9.-]*\.[a-z]{2,}/(?:[^\s<>()]|\([^\s<>()]*\))*)[>)]?\s*[.,;]?\s*$"#,
    )
    .expect("static resource line regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    SeekingWeekHeader,
    InDescription,
    InObjectives,
    InResources,
    InExercise,
    /// Under a heading with no known meaning; lines are ignored.
    Skipping,
}

#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    WeekHeader { number: Option<u32>, title: &'a str },
    Label { state: ParseState, rest: &'a str },
    OtherHeading,
    Rule,
    Blank,
    Text(&'a str),
}

fn classify_line(line: &str) -> Line<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Line::Blank;
    }
    if trimmed.chars().all(|c| matches!(c, '-' | '*' | '_' | '=')) && trimmed.len() >= 3 {
        return Line::Rule;
    }
    if let Some(caps) = WEEK_HEADER_RE.captures(line) {
        let number = caps
            .name("number")
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .filter(|n| *n > 0);
        let title = caps.name("title").map_or("", |m| m.as_str());
        return Line::WeekHeader { number, title };
    }
    if let Some(caps) = LABEL_RE.captures(line) {
        let marked = caps.name("hashes").is_some() || caps.name("bold").is_some();
        let has_colon = caps.name("colon").is_some() || caps.name("colon_after").is_some();
        let rest = caps.name("rest").map_or("", |m| m.as_str().trim());
        // "Additional Resources" is a label only under a heading or bold marker.
        let qualified = caps.name("qualifier").is_some();
        if (marked || has_colon) && (has_colon || rest.is_empty()) && (marked || !qualified) {
            let label = caps
                .name("label")
                .map_or(String::new(), |m| m.as_str().to_ascii_lowercase());
            let state = if label.starts_with("description") || label.starts_with("overview") {
                ParseState::InDescription
            } else if label.contains("objective") || label.starts_with("goals") {
                ParseState::InObjectives
            } else if label.starts_with("resource") {
                ParseState::InResources
            } else {
                ParseState::InExercise
            };
            return Line::Label { state, rest };
        }
    }
    if trimmed.starts_with('#') {
        return Line::OtherHeading;
    }
    Line::Text(trimmed)
}

/// One week block as written in the document, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineTopic {
    /// 1-based order of the block in the document.
    pub position: u32,
    pub week_number: u32,
    pub title: String,
    pub description: String,
    pub objectives: Vec<String>,
    pub exercises: Vec<String>,
    pub resources: Vec<ResourceDraft>,
    pub section: Section,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Outline {
    pub topics: Vec<OutlineTopic>,
    pub total_weeks: u32,
    pub duplicate_titles: usize,
    pub unparsed_resource_lines: usize,
}

impl Outline {
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

#[derive(Debug, Default)]
struct BlockBuilder {
    position: u32,
    declared_week: Option<u32>,
    raw_title: String,
    description: Vec<String>,
    description_done: bool,
    objectives: Vec<String>,
    exercises: Vec<String>,
    resources: Vec<ResourceDraft>,
    unparsed_resource_lines: usize,
}

impl BlockBuilder {
    fn push(&mut self, state: ParseState, text: &str) {
        match state {
            ParseState::SeekingWeekHeader | ParseState::Skipping => {}
            ParseState::InDescription => {
                if !self.description_done {
                    self.description.push(text.to_owned());
                }
            }
            ParseState::InObjectives => {
                let item = strip_bullet(text);
                if !item.is_empty() {
                    self.objectives.push(item.to_owned());
                }
            }
            ParseState::InExercise => {
                let item = clean_exercise(strip_bullet(text));
                if !item.is_empty() {
                    self.exercises.push(item.to_owned());
                }
            }
            ParseState::InResources => match parse_resource_line(text) {
                Some(draft) => self.resources.push(draft),
                None => {
                    tracing::debug!(line = text, "skipping unparseable resource line");
                    self.unparsed_resource_lines += 1;
                }
            },
        }
    }

    fn end_paragraph(&mut self, state: ParseState) {
        if state == ParseState::InDescription && !self.description.is_empty() {
            self.description_done = true;
        }
    }
}

/// Reads every week block of `document`.
///
/// Never fails: malformed blocks and lines are skipped, and a document with no
/// week headers yields an empty outline.
pub fn outline(document: &str, total_weeks_hint: Option<u32>) -> Outline {
    let mut blocks: Vec<BlockBuilder> = Vec::new();
    let mut state = ParseState::SeekingWeekHeader;
    let mut position = 0u32;

    for line in document.lines() {
        match classify_line(line) {
            Line::WeekHeader { number, title } => {
                position += 1;
                blocks.push(BlockBuilder {
                    position,
                    declared_week: number,
                    raw_title: title.to_owned(),
                    ..BlockBuilder::default()
                });
                state = ParseState::InDescription;
            }
            _ if state == ParseState::SeekingWeekHeader => {}
            Line::Label {
                state: next_state,
                rest,
            } => {
                if let Some(block) = blocks.last_mut() {
                    block.end_paragraph(state);
                    state = next_state;
                    if !rest.is_empty() {
                        block.push(state, rest);
                    }
                }
            }
            Line::Blank | Line::Rule => {
                if let Some(block) = blocks.last_mut() {
                    block.end_paragraph(state);
                }
            }
            Line::OtherHeading => {
                if let Some(block) = blocks.last_mut() {
                    block.end_paragraph(state);
                }
                state = ParseState::Skipping;
            }
            Line::Text(text) => {
                if let Some(block) = blocks.last_mut() {
                    block.push(state, text);
                }
            }
        }
    }

    let block_count = position;
    let mut seen = HashSet::new();
    let mut duplicate_titles = 0usize;
    let mut unparsed_resource_lines = 0usize;
    let mut topics = Vec::with_capacity(blocks.len());

    for block in blocks {
        unparsed_resource_lines += block.unparsed_resource_lines;

        let mut title = clean_title(&block.raw_title);
        if title.is_empty() {
            title = format!("Week {} Topic", block.position);
        }
        if !seen.insert(title_key(&title)) {
            tracing::debug!(title = %title, position = block.position, "skipping duplicate week title");
            duplicate_titles += 1;
            continue;
        }

        topics.push(OutlineTopic {
            position: block.position,
            week_number: block.declared_week.unwrap_or(block.position),
            title,
            description: block.description.join(" "),
            objectives: block.objectives,
            exercises: block.exercises,
            resources: block.resources,
            section: Section::for_week(1, 1),
        });
    }

    let max_week = topics.iter().map(|t| t.week_number).max().unwrap_or(0);
    let total_weeks = total_weeks_hint
        .filter(|weeks| *weeks > 0)
        .unwrap_or_else(|| max_week.max(block_count))
        .max(1);
    for topic in &mut topics {
        topic.section = Section::for_week(topic.week_number, total_weeks);
    }
    // Stable, so equal week numbers keep document order.
    topics.sort_by_key(|t| t.week_number);

    Outline {
        topics,
        total_weeks,
        duplicate_titles,
        unparsed_resource_lines,
    }
}

/// Strips echoed identifier annotations and emphasis from a header title.
pub fn clean_title(raw: &str) -> String {
    let without_ids = ID_ANNOTATION_RE.replace_all(raw, "");
    let trimmed = without_ids
        .trim()
        .trim_matches(|c: char| matches!(c, '*' | '_' | '`' | ':' | '#') || c.is_whitespace());
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_bullet(text: &str) -> &str {
    match BULLET_RE.find(text) {
        Some(m) => text[m.end()..].trim(),
        None => text.trim(),
    }
}

fn clean_exercise(text: &str) -> &str {
    text.trim_end_matches(|c: char| {
        matches!(c, '*' | '_' | '`' | '#' | '|' | '~' | ',' | ';' | ':') || c.is_whitespace()
    })
    .trim_start()
}

/// Parses `- [Format] [Type] [Free|Paid: $N] "Title" - description - URL`.
pub fn parse_resource_line(line: &str) -> Option<ResourceDraft> {
    let caps = RESOURCE_LINE_RE.captures(line)?;
    let text = |name: &str| caps.name(name).map_or("", |m| m.as_str().trim());

    let url = text("url").trim_end_matches(['.', ',', ';', '*', '_']);
    let title = text("title");
    if url.is_empty() || title.is_empty() {
        return None;
    }

    let is_free = text("cost").eq_ignore_ascii_case("free");
    let price = if is_free {
        None
    } else {
        Some(text("price"))
            .map(|p| p.trim_matches(|c: char| c == ':' || c.is_whitespace()))
            .filter(|p| !p.is_empty())
            .map(str::to_owned)
    };
    let description = text("description")
        .trim_matches(|c: char| matches!(c, '-' | '–' | '—' | ':' | '|') || c.is_whitespace());

    Some(ResourceDraft {
        title: title.to_owned(),
        description: description.to_owned(),
        url: normalize_url(url),
        format: ResourceFormat::from_tag(text("format")),
        kind: ResourceType::from_tag(text("kind")),
        is_free,
        price,
    })
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseOutput {
    pub topics: Vec<Topic>,
    pub resources: Vec<Resource>,
    pub invalid_resources: usize,
    pub fallback_topics: usize,
}

#[derive(Clone)]
pub struct RoadmapParser {
    validator: UrlValidator,
    fallback: FallbackResourceGenerator,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl RoadmapParser {
    pub fn new(validator: UrlValidator, ids: Arc<dyn IdGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self {
            validator,
            fallback: FallbackResourceGenerator,
            ids,
            clock,
        }
    }

    /// Parses, validates and binds in one go.
    pub async fn parse(
        &self,
        document: &str,
        total_weeks_hint: Option<u32>,
        kept: &[Topic],
    ) -> ParseOutput {
        let outline = outline(document, total_weeks_hint);
        self.resolve(outline, kept).await
    }

    /// Validates every link of `outline` and binds topics and resources.
    ///
    /// Topics whose title matches a `kept` topic (case-insensitively) reuse its
    /// id and completion state. Links are validated in batches before any
    /// resource is attached; topics left with no valid links get fallbacks.
    pub async fn resolve(&self, outline: Outline, kept: &[Topic]) -> ParseOutput {
        let mut urls = Vec::new();
        let mut seen_urls = HashSet::new();
        for draft in outline.topics.iter().flat_map(|t| &t.resources) {
            if seen_urls.insert(draft.url.as_str()) {
                urls.push(draft.url.clone());
            }
        }
        let verdicts = self.validator.validate_all(&urls).await;

        let mut kept_by_title = HashMap::new();
        for topic in kept {
            kept_by_title.entry(topic.title_key()).or_insert(topic);
        }

        let mut output = ParseOutput::default();
        for item in outline.topics {
            let (id, completed, keep) = match kept_by_title.get(&title_key(&item.title)) {
                Some(previous) => (previous.id.clone(), previous.completed, true),
                None => (self.ids.next_id(), false, false),
            };

            let mut attached = 0usize;
            for draft in item.resources {
                match verdicts.get(&draft.url) {
                    Some(verdict) if verdict.is_valid => {
                        output.resources.push(Resource::validated(
                            self.ids.next_id(),
                            id.clone(),
                            draft,
                            verdict,
                        ));
                        attached += 1;
                    }
                    verdict => {
                        tracing::debug!(
                            url = %draft.url,
                            topic = %item.title,
                            error = ?verdict.and_then(|v| v.error.as_deref()),
                            "dropping resource with invalid url"
                        );
                        output.invalid_resources += 1;
                    }
                }
            }

            if attached == 0 {
                let now = self.clock.now();
                output.fallback_topics += 1;
                for draft in self.fallback.generate(&item.title, &item.description) {
                    output
                        .resources
                        .push(Resource::trusted(self.ids.next_id(), id.clone(), draft, now));
                }
            }

            output.topics.push(Topic {
                id,
                title: item.title,
                description: item.description,
                objectives: item.objectives,
                exercises: item.exercises,
                week_number: item.week_number,
                section: item.section,
                keep,
                completed,
            });
        }

        tracing::info!(
            topics = output.topics.len(),
            resources = output.resources.len(),
            invalid_resources = output.invalid_resources,
            fallback_topics = output.fallback_topics,
            duplicate_titles = outline.duplicate_titles,
            unparsed_resource_lines = outline.unparsed_resource_lines,
            "roadmap parsed"
        );
        output
    }
}
