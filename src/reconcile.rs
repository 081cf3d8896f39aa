use std::collections::HashSet;

use anyhow::Context as _;
use serde::Serialize;

use crate::model::{Resource, Topic, title_key};
use crate::store::{Collection, Filter, RoadmapStore};

/// What the store currently holds for one roadmap.
#[derive(Debug, Clone, Default)]
pub struct ExistingState {
    pub topics: Vec<Topic>,
    pub resources: Vec<Resource>,
}

impl ExistingState {
    pub async fn load(store: &dyn RoadmapStore, roadmap_id: &str) -> anyhow::Result<Self> {
        let topics = store
            .select_topics(roadmap_id, &Filter::All)
            .await
            .context("select existing topics")?;
        let resources = store
            .select_resources(roadmap_id, &Filter::All)
            .await
            .context("select existing resources")?;
        Ok(Self { topics, resources })
    }

    /// Topics flagged `keep` or listed in `kept_topic_ids`.
    pub fn kept_topics(&self, kept_topic_ids: &HashSet<String>) -> Vec<Topic> {
        self.topics
            .iter()
            .filter(|topic| is_kept(topic, kept_topic_ids))
            .cloned()
            .collect()
    }
}

fn is_kept(topic: &Topic, kept_topic_ids: &HashSet<String>) -> bool {
    topic.keep || kept_topic_ids.contains(&topic.id)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationPlan {
    pub topics_to_delete: Vec<String>,
    pub topics_to_insert: Vec<Topic>,
    pub resources_to_delete: Vec<String>,
    pub resources_to_insert: Vec<Resource>,
    /// Parsed topics dropped because a kept topic already has their title.
    pub skipped_topics: usize,
}

impl ReconciliationPlan {
    pub fn is_empty(&self) -> bool {
        self.topics_to_delete.is_empty()
            && self.topics_to_insert.is_empty()
            && self.resources_to_delete.is_empty()
            && self.resources_to_insert.is_empty()
    }
}

/// Computes the store mutations that replace every non-kept topic with the
/// freshly parsed set.
///
/// Kept topics survive with their stored resources. Parsed topics whose title
/// matches a kept one (case-insensitively) are left out together with their
/// resources, so a kept topic is never duplicated.
pub fn reconcile(
    existing: &ExistingState,
    kept_topic_ids: &HashSet<String>,
    parsed_topics: Vec<Topic>,
    parsed_resources: Vec<Resource>,
) -> ReconciliationPlan {
    let (kept, replaced): (Vec<&Topic>, Vec<&Topic>) = existing
        .topics
        .iter()
        .partition(|topic| is_kept(topic, kept_topic_ids));

    let replaced_ids = replaced
        .iter()
        .map(|topic| topic.id.as_str())
        .collect::<HashSet<_>>();
    let resources_to_delete = existing
        .resources
        .iter()
        .filter(|resource| replaced_ids.contains(resource.topic_id.as_str()))
        .map(|resource| resource.id.clone())
        .collect();

    let kept_titles = kept
        .iter()
        .map(|topic| topic.title_key())
        .collect::<HashSet<_>>();
    let kept_ids = kept
        .iter()
        .map(|topic| topic.id.as_str())
        .collect::<HashSet<_>>();

    let parsed_count = parsed_topics.len();
    let topics_to_insert = parsed_topics
        .into_iter()
        .filter(|topic| {
            !kept_titles.contains(&title_key(&topic.title)) && !kept_ids.contains(topic.id.as_str())
        })
        .collect::<Vec<_>>();
    let inserted_ids = topics_to_insert
        .iter()
        .map(|topic| topic.id.as_str())
        .collect::<HashSet<_>>();
    let resources_to_insert = parsed_resources
        .into_iter()
        .filter(|resource| inserted_ids.contains(resource.topic_id.as_str()))
        .collect();

    ReconciliationPlan {
        topics_to_delete: replaced.iter().map(|topic| topic.id.clone()).collect(),
        skipped_topics: parsed_count - topics_to_insert.len(),
        topics_to_insert,
        resources_to_delete,
        resources_to_insert,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Insert,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub collection: Collection,
    pub operation: Operation,
    pub records: usize,
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistOutcome {
    Complete,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub batches_attempted: usize,
    pub failures: Vec<BatchFailure>,
    pub topics_inserted: usize,
    pub resources_inserted: usize,
    pub topics_deleted: usize,
    pub resources_deleted: usize,
    /// Resources not attempted because their topic failed to insert.
    pub resources_skipped: usize,
    /// Deletes are held back when no insert batch succeeded.
    pub deletes_skipped: bool,
}

impl ApplyReport {
    pub fn outcome(&self) -> PersistOutcome {
        if self.failures.is_empty() {
            PersistOutcome::Complete
        } else if self.failures.len() == self.batches_attempted {
            PersistOutcome::Failed
        } else {
            PersistOutcome::Partial
        }
    }

    fn record_failure(
        &mut self,
        collection: Collection,
        operation: Operation,
        records: usize,
        err: &anyhow::Error,
    ) {
        tracing::warn!(
            collection = collection.as_str(),
            ?operation,
            records,
            error = %format!("{err:#}"),
            "persistence batch failed"
        );
        self.failures.push(BatchFailure {
            collection,
            operation,
            records,
            error: format!("{err:#}"),
        });
    }
}

/// Applies `plan` in batches of at most `batch_size` records.
///
/// Inserts run first, then deletes (resources before topics). A failed batch
/// is recorded and the remaining batches still run; nothing is rolled back.
pub async fn apply_plan(
    store: &dyn RoadmapStore,
    roadmap_id: &str,
    plan: &ReconciliationPlan,
    batch_size: usize,
) -> ApplyReport {
    let batch_size = batch_size.max(1);
    let mut report = ApplyReport::default();
    let mut failed_topic_ids = HashSet::new();

    for chunk in plan.topics_to_insert.chunks(batch_size) {
        report.batches_attempted += 1;
        match store.insert_topics(roadmap_id, chunk).await {
            Ok(()) => report.topics_inserted += chunk.len(),
            Err(err) => {
                failed_topic_ids.extend(chunk.iter().map(|topic| topic.id.as_str()));
                report.record_failure(Collection::Topics, Operation::Insert, chunk.len(), &err);
            }
        }
    }

    let (resources, orphaned): (Vec<&Resource>, Vec<&Resource>) = plan
        .resources_to_insert
        .iter()
        .partition(|resource| !failed_topic_ids.contains(resource.topic_id.as_str()));
    report.resources_skipped = orphaned.len();
    for chunk in resources.chunks(batch_size) {
        report.batches_attempted += 1;
        let records = chunk.iter().map(|r| (*r).clone()).collect::<Vec<_>>();
        match store.insert_resources(roadmap_id, &records).await {
            Ok(()) => report.resources_inserted += records.len(),
            Err(err) => {
                report.record_failure(Collection::Resources, Operation::Insert, records.len(), &err)
            }
        }
    }

    let inserts_attempted = report.batches_attempted;
    if inserts_attempted > 0 && report.failures.len() == inserts_attempted {
        tracing::warn!(roadmap_id, "every insert batch failed; keeping existing records");
        report.deletes_skipped = true;
        return report;
    }

    for (collection, ids) in [
        (Collection::Resources, &plan.resources_to_delete),
        (Collection::Topics, &plan.topics_to_delete),
    ] {
        for chunk in ids.chunks(batch_size) {
            report.batches_attempted += 1;
            let filter = Filter::Ids(chunk.to_vec());
            match store.delete_where(roadmap_id, collection, &filter).await {
                Ok(deleted) => match collection {
                    Collection::Resources => report.resources_deleted += deleted,
                    Collection::Topics => report.topics_deleted += deleted,
                },
                Err(err) => report.record_failure(collection, Operation::Delete, chunk.len(), &err),
            }
        }
    }

    tracing::info!(
        roadmap_id,
        batches = report.batches_attempted,
        failed = report.failures.len(),
        topics_inserted = report.topics_inserted,
        resources_inserted = report.resources_inserted,
        topics_deleted = report.topics_deleted,
        resources_deleted = report.resources_deleted,
        "reconciliation applied"
    );
    report
}
