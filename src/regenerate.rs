use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::config::RegenerationConfig;
use crate::generator::{GenerationRequest, RoadmapGenerator};
use crate::parser::{self, RoadmapParser};
use crate::reconcile::{self, ApplyReport, ExistingState, PersistOutcome};
use crate::store::RoadmapStore;

/// States of one regeneration cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegenerationPhase {
    Idle,
    Parsing,
    Validating,
    Reconciling,
    Persisting,
    Succeeded,
    PartiallyFailed,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegenerationStatus {
    Succeeded,
    /// Some persistence batches failed. The roadmap is not complete.
    PartiallyFailed,
}

#[derive(Debug, Clone, Default)]
pub struct RegenerateOptions {
    pub kept_topic_ids: HashSet<String>,
    pub total_weeks_hint: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegenerationReport {
    pub roadmap_id: String,
    pub status: RegenerationStatus,
    pub phases: Vec<RegenerationPhase>,
    pub topics_parsed: usize,
    pub topics_kept: usize,
    pub skipped_topics: usize,
    pub invalid_resources: usize,
    pub fallback_topics: usize,
    pub persistence: ApplyReport,
    pub raw_document: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RegenerationError {
    #[error("roadmap document contains no week topics; nothing was stored")]
    Rejected { raw_document: String },
    #[error("every persistence batch failed; existing records were left in place")]
    PersistenceFailed { report: Box<RegenerationReport> },
    #[error("roadmap store: {0:#}")]
    Store(anyhow::Error),
    #[error("roadmap generation: {0:#}")]
    Generation(anyhow::Error),
}

impl RegenerationError {
    /// The document that was being processed, kept for diagnosis.
    pub fn raw_document(&self) -> Option<&str> {
        match self {
            Self::Rejected { raw_document } => Some(raw_document),
            Self::PersistenceFailed { report } => Some(&report.raw_document),
            Self::Store(_) | Self::Generation(_) => None,
        }
    }
}

struct PhaseTrail {
    roadmap_id: String,
    phases: Vec<RegenerationPhase>,
}

impl PhaseTrail {
    fn new(roadmap_id: &str) -> Self {
        Self {
            roadmap_id: roadmap_id.to_owned(),
            phases: vec![RegenerationPhase::Idle],
        }
    }

    fn enter(&mut self, phase: RegenerationPhase) {
        tracing::info!(roadmap_id = %self.roadmap_id, ?phase, "regeneration phase");
        self.phases.push(phase);
    }
}

/// Runs parse, validate, reconcile and persist for one roadmap.
#[derive(Clone)]
pub struct Regenerator {
    store: Arc<dyn RoadmapStore>,
    parser: RoadmapParser,
    persist_batch_size: usize,
}

impl Regenerator {
    pub fn new(
        store: Arc<dyn RoadmapStore>,
        parser: RoadmapParser,
        config: &RegenerationConfig,
    ) -> Self {
        Self {
            store,
            parser,
            persist_batch_size: config.persist_batch_size.max(1),
        }
    }

    /// Replaces the non-kept topics of `roadmap_id` with those of `document`.
    ///
    /// A document without week topics is rejected before the store is read.
    /// Persistence is best effort per batch: a partial failure returns a
    /// report with [`RegenerationStatus::PartiallyFailed`], a total one an
    /// error.
    pub async fn regenerate(
        &self,
        roadmap_id: &str,
        document: &str,
        options: &RegenerateOptions,
    ) -> Result<RegenerationReport, RegenerationError> {
        let mut trail = PhaseTrail::new(roadmap_id);

        trail.enter(RegenerationPhase::Parsing);
        let outline = parser::outline(document, options.total_weeks_hint);
        if outline.is_empty() {
            trail.enter(RegenerationPhase::Rejected);
            tracing::warn!(
                roadmap_id,
                document_len = document.len(),
                "regeneration rejected: no topics parsed"
            );
            return Err(RegenerationError::Rejected {
                raw_document: document.to_owned(),
            });
        }
        let topics_parsed = outline.topics.len();

        let existing = ExistingState::load(self.store.as_ref(), roadmap_id)
            .await
            .map_err(RegenerationError::Store)?;
        let kept = existing.kept_topics(&options.kept_topic_ids);

        trail.enter(RegenerationPhase::Validating);
        let parsed = self.parser.resolve(outline, &kept).await;

        trail.enter(RegenerationPhase::Reconciling);
        let plan = reconcile::reconcile(
            &existing,
            &options.kept_topic_ids,
            parsed.topics,
            parsed.resources,
        );

        trail.enter(RegenerationPhase::Persisting);
        let persistence =
            reconcile::apply_plan(self.store.as_ref(), roadmap_id, &plan, self.persist_batch_size)
                .await;
        let outcome = persistence.outcome();
        let status = match outcome {
            PersistOutcome::Complete => RegenerationStatus::Succeeded,
            PersistOutcome::Partial | PersistOutcome::Failed => RegenerationStatus::PartiallyFailed,
        };
        trail.enter(match status {
            RegenerationStatus::Succeeded => RegenerationPhase::Succeeded,
            RegenerationStatus::PartiallyFailed => RegenerationPhase::PartiallyFailed,
        });

        let report = RegenerationReport {
            roadmap_id: roadmap_id.to_owned(),
            status,
            phases: trail.phases,
            topics_parsed,
            topics_kept: kept.len(),
            skipped_topics: plan.skipped_topics,
            invalid_resources: parsed.invalid_resources,
            fallback_topics: parsed.fallback_topics,
            persistence,
            raw_document: document.to_owned(),
        };
        if outcome == PersistOutcome::Failed {
            return Err(RegenerationError::PersistenceFailed {
                report: Box::new(report),
            });
        }
        if status == RegenerationStatus::PartiallyFailed {
            tracing::warn!(
                roadmap_id,
                failed_batches = report.persistence.failures.len(),
                "regeneration partially failed"
            );
        }
        Ok(report)
    }

    /// Asks `generator` for a fresh document, then regenerates from it.
    ///
    /// Titles of kept topics are added to the request so the generator can
    /// avoid repeating them.
    pub async fn generate_and_regenerate(
        &self,
        generator: &dyn RoadmapGenerator,
        roadmap_id: &str,
        mut request: GenerationRequest,
        options: &RegenerateOptions,
    ) -> Result<RegenerationReport, RegenerationError> {
        let existing = ExistingState::load(self.store.as_ref(), roadmap_id)
            .await
            .map_err(RegenerationError::Store)?;
        for topic in existing.kept_topics(&options.kept_topic_ids) {
            if !request.kept_topics.contains(&topic.title) {
                request.kept_topics.push(topic.title);
            }
        }
        if request.total_weeks.is_none() {
            request.total_weeks = options.total_weeks_hint;
        }

        let document = generator
            .generate(&request)
            .await
            .map_err(RegenerationError::Generation)?;
        self.regenerate(roadmap_id, &document, options).await
    }
}
