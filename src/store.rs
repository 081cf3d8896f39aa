use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::sync::Mutex;

use crate::model::{Resource, Topic};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Topics,
    Resources,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Topics => "topics",
            Self::Resources => "resources",
        }
    }
}

/// Record predicate understood by every store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    All,
    /// Records whose own id is listed.
    Ids(Vec<String>),
}

impl Filter {
    pub fn matches_topic(&self, topic: &Topic) -> bool {
        match self {
            Self::All => true,
            Self::Ids(ids) => ids.iter().any(|id| *id == topic.id),
        }
    }

    pub fn matches_resource(&self, resource: &Resource) -> bool {
        match self {
            Self::All => true,
            Self::Ids(ids) => ids.iter().any(|id| *id == resource.id),
        }
    }
}

/// Keyed record store holding the topics and resources of each roadmap.
#[async_trait]
pub trait RoadmapStore: Send + Sync {
    async fn insert_topics(&self, roadmap_id: &str, topics: &[Topic]) -> anyhow::Result<()>;
    async fn insert_resources(&self, roadmap_id: &str, resources: &[Resource])
    -> anyhow::Result<()>;
    /// Returns the number of deleted records.
    async fn delete_where(
        &self,
        roadmap_id: &str,
        collection: Collection,
        filter: &Filter,
    ) -> anyhow::Result<usize>;
    async fn select_topics(&self, roadmap_id: &str, filter: &Filter) -> anyhow::Result<Vec<Topic>>;
    async fn select_resources(
        &self,
        roadmap_id: &str,
        filter: &Filter,
    ) -> anyhow::Result<Vec<Resource>>;
}

#[derive(Debug, Clone, Default)]
struct RoadmapRecords {
    topics: Vec<Topic>,
    resources: Vec<Resource>,
}

impl RoadmapRecords {
    fn insert_topics(&mut self, topics: &[Topic]) -> anyhow::Result<()> {
        let existing = self.topics.iter().map(|t| t.id.as_str()).collect::<HashSet<_>>();
        let mut incoming = HashSet::new();
        for topic in topics {
            if existing.contains(topic.id.as_str()) || !incoming.insert(topic.id.as_str()) {
                anyhow::bail!("duplicate topic id: {}", topic.id);
            }
        }
        self.topics.extend_from_slice(topics);
        Ok(())
    }

    fn insert_resources(&mut self, resources: &[Resource]) -> anyhow::Result<()> {
        let topic_ids = self.topics.iter().map(|t| t.id.as_str()).collect::<HashSet<_>>();
        let existing = self
            .resources
            .iter()
            .map(|r| r.id.as_str())
            .collect::<HashSet<_>>();
        let mut incoming = HashSet::new();
        for resource in resources {
            if !topic_ids.contains(resource.topic_id.as_str()) {
                anyhow::bail!(
                    "resource {} references unknown topic {}",
                    resource.id,
                    resource.topic_id
                );
            }
            if existing.contains(resource.id.as_str()) || !incoming.insert(resource.id.as_str()) {
                anyhow::bail!("duplicate resource id: {}", resource.id);
            }
        }
        self.resources.extend_from_slice(resources);
        Ok(())
    }

    fn delete_where(&mut self, collection: Collection, filter: &Filter) -> usize {
        match collection {
            Collection::Topics => {
                let before = self.topics.len();
                let removed = self
                    .topics
                    .iter()
                    .filter(|t| filter.matches_topic(t))
                    .map(|t| t.id.clone())
                    .collect::<HashSet<_>>();
                self.topics.retain(|t| !removed.contains(&t.id));
                // Cascade to owned resources.
                self.resources.retain(|r| !removed.contains(&r.topic_id));
                before - self.topics.len()
            }
            Collection::Resources => {
                let before = self.resources.len();
                self.resources.retain(|r| !filter.matches_resource(r));
                before - self.resources.len()
            }
        }
    }
}

/// Store kept entirely in memory; handy for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    roadmaps: Mutex<HashMap<String, RoadmapRecords>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoadmapStore for InMemoryStore {
    async fn insert_topics(&self, roadmap_id: &str, topics: &[Topic]) -> anyhow::Result<()> {
        let mut roadmaps = self.roadmaps.lock().await;
        roadmaps
            .entry(roadmap_id.to_owned())
            .or_default()
            .insert_topics(topics)
    }

    async fn insert_resources(
        &self,
        roadmap_id: &str,
        resources: &[Resource],
    ) -> anyhow::Result<()> {
        let mut roadmaps = self.roadmaps.lock().await;
        roadmaps
            .entry(roadmap_id.to_owned())
            .or_default()
            .insert_resources(resources)
    }

    async fn delete_where(
        &self,
        roadmap_id: &str,
        collection: Collection,
        filter: &Filter,
    ) -> anyhow::Result<usize> {
        let mut roadmaps = self.roadmaps.lock().await;
        Ok(roadmaps
            .get_mut(roadmap_id)
            .map_or(0, |records| records.delete_where(collection, filter)))
    }

    async fn select_topics(&self, roadmap_id: &str, filter: &Filter) -> anyhow::Result<Vec<Topic>> {
        let roadmaps = self.roadmaps.lock().await;
        Ok(roadmaps.get(roadmap_id).map_or_else(Vec::new, |records| {
            records
                .topics
                .iter()
                .filter(|t| filter.matches_topic(t))
                .cloned()
                .collect()
        }))
    }

    async fn select_resources(
        &self,
        roadmap_id: &str,
        filter: &Filter,
    ) -> anyhow::Result<Vec<Resource>> {
        let roadmaps = self.roadmaps.lock().await;
        Ok(roadmaps.get(roadmap_id).map_or_else(Vec::new, |records| {
            records
                .resources
                .iter()
                .filter(|r| filter.matches_resource(r))
                .cloned()
                .collect()
        }))
    }
}

/// JSON files under `<base>/roadmaps/<roadmap_id>/{topics,resources}.json`.
#[derive(Debug)]
pub struct LocalFsStore {
    base_dir: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl LocalFsStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn roadmap_dir(&self, roadmap_id: &str) -> anyhow::Result<PathBuf> {
        let valid = !roadmap_id.is_empty()
            && roadmap_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && roadmap_id != "."
            && roadmap_id != "..";
        if !valid {
            anyhow::bail!("invalid roadmap id: {roadmap_id:?}");
        }
        Ok(self.base_dir.join("roadmaps").join(roadmap_id))
    }

    fn collection_path(&self, roadmap_id: &str, collection: Collection) -> anyhow::Result<PathBuf> {
        Ok(self
            .roadmap_dir(roadmap_id)?
            .join(format!("{}.json", collection.as_str())))
    }

    async fn load(&self, roadmap_id: &str) -> anyhow::Result<RoadmapRecords> {
        let topics_path = self.collection_path(roadmap_id, Collection::Topics)?;
        let resources_path = self.collection_path(roadmap_id, Collection::Resources)?;
        Ok(RoadmapRecords {
            topics: read_json(&topics_path)
                .await
                .with_context(|| format!("read: {}", topics_path.display()))?
                .unwrap_or_default(),
            resources: read_json(&resources_path)
                .await
                .with_context(|| format!("read: {}", resources_path.display()))?
                .unwrap_or_default(),
        })
    }

    async fn save(&self, roadmap_id: &str, records: &RoadmapRecords) -> anyhow::Result<()> {
        let topics_path = self.collection_path(roadmap_id, Collection::Topics)?;
        let resources_path = self.collection_path(roadmap_id, Collection::Resources)?;
        write_json_atomic(&topics_path, &records.topics)
            .await
            .context("write topics.json")?;
        write_json_atomic(&resources_path, &records.resources)
            .await
            .context("write resources.json")?;
        Ok(())
    }

    async fn modify<T>(
        &self,
        roadmap_id: &str,
        f: impl FnOnce(&mut RoadmapRecords) -> anyhow::Result<T> + Send,
    ) -> anyhow::Result<T> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load(roadmap_id).await?;
        let out = f(&mut records)?;
        self.save(roadmap_id, &records).await?;
        Ok(out)
    }
}

#[async_trait]
impl RoadmapStore for LocalFsStore {
    async fn insert_topics(&self, roadmap_id: &str, topics: &[Topic]) -> anyhow::Result<()> {
        self.modify(roadmap_id, |records| records.insert_topics(topics))
            .await
            .context("insert topics")
    }

    async fn insert_resources(
        &self,
        roadmap_id: &str,
        resources: &[Resource],
    ) -> anyhow::Result<()> {
        self.modify(roadmap_id, |records| records.insert_resources(resources))
            .await
            .context("insert resources")
    }

    async fn delete_where(
        &self,
        roadmap_id: &str,
        collection: Collection,
        filter: &Filter,
    ) -> anyhow::Result<usize> {
        self.modify(roadmap_id, |records| {
            Ok(records.delete_where(collection, filter))
        })
        .await
        .with_context(|| format!("delete from {}", collection.as_str()))
    }

    async fn select_topics(&self, roadmap_id: &str, filter: &Filter) -> anyhow::Result<Vec<Topic>> {
        let records = self.load(roadmap_id).await?;
        Ok(records
            .topics
            .into_iter()
            .filter(|t| filter.matches_topic(t))
            .collect())
    }

    async fn select_resources(
        &self,
        roadmap_id: &str,
        filter: &Filter,
    ) -> anyhow::Result<Vec<Resource>> {
        let records = self.load(roadmap_id).await?;
        Ok(records
            .resources
            .into_iter()
            .filter(|r| filter.matches_resource(r))
            .collect())
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let value = serde_json::from_slice(&bytes).context("parse json")?;
    Ok(Some(value))
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    fs::write(&tmp_path, &data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResourceFormat, ResourceType, Section};

    fn topic(id: &str) -> Topic {
        Topic {
            id: id.to_owned(),
            title: format!("Topic {id}"),
            description: String::new(),
            objectives: Vec::new(),
            exercises: Vec::new(),
            week_number: 1,
            section: Section::for_week(1, 1),
            keep: false,
            completed: false,
        }
    }

    fn resource(id: &str, topic_id: &str) -> Resource {
        Resource {
            id: id.to_owned(),
            topic_id: topic_id.to_owned(),
            title: "r".to_owned(),
            description: String::new(),
            url: "https://docs.rs/".to_owned(),
            format: ResourceFormat::Article,
            kind: ResourceType::Reference,
            is_free: true,
            price: None,
            url_validated: true,
            url_validated_at: None,
            url_status_code: Some(200),
            url_error: None,
        }
    }

    async fn exercise_store(store: &dyn RoadmapStore) -> anyhow::Result<()> {
        store.insert_topics("rm", &[topic("t1"), topic("t2")]).await?;
        store
            .insert_resources("rm", &[resource("r1", "t1"), resource("r2", "t2")])
            .await?;

        assert!(store.insert_topics("rm", &[topic("t1")]).await.is_err());
        assert!(
            store
                .insert_resources("rm", &[resource("r3", "missing")])
                .await
                .is_err()
        );

        let deleted = store
            .delete_where("rm", Collection::Topics, &Filter::Ids(vec!["t1".to_owned()]))
            .await?;
        assert_eq!(deleted, 1);

        let topics = store.select_topics("rm", &Filter::All).await?;
        assert_eq!(topics.len(), 1);
        let resources = store.select_resources("rm", &Filter::All).await?;
        assert_eq!(
            resources.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            vec!["r2"]
        );

        assert!(store.select_topics("other", &Filter::All).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn in_memory_store_cascades_and_rejects_duplicates() -> anyhow::Result<()> {
        exercise_store(&InMemoryStore::new()).await
    }

    #[tokio::test]
    async fn local_fs_store_persists_across_instances() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        exercise_store(&LocalFsStore::new(temp.path())).await?;

        let reopened = LocalFsStore::new(temp.path());
        let topics = reopened.select_topics("rm", &Filter::All).await?;
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].id, "t2");
        Ok(())
    }

    #[tokio::test]
    async fn local_fs_store_rejects_path_like_ids() {
        let store = LocalFsStore::new("/tmp/unused");
        assert!(store.select_topics("../escape", &Filter::All).await.is_err());
    }

    #[test]
    fn id_filters_match_the_record_itself() {
        let filter = Filter::Ids(vec!["t1".to_owned()]);
        assert!(filter.matches_topic(&topic("t1")));
        assert!(filter.matches_resource(&resource("t1", "t2")));
        assert!(!filter.matches_resource(&resource("r9", "t1")));
    }
}
