use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub description: String,
}

/// Fixed progression a roadmap moves through, earliest weeks first.
pub const SECTION_PROGRESSION: [(&str, &str); 4] = [
    ("Getting Started", "Foundations and first steps."),
    ("Core Concepts", "The essential ideas everything else builds on."),
    ("Practical Applications", "Applying the concepts to real problems."),
    ("Advanced Topics", "Deeper material for confident learners."),
];

impl Section {
    /// Section for `week_number` when the roadmap spans `total_weeks`.
    ///
    /// The weeks are split evenly across [`SECTION_PROGRESSION`]; weeks past
    /// the declared total land in the last section.
    pub fn for_week(week_number: u32, total_weeks: u32) -> Self {
        let total = u64::from(total_weeks.max(1));
        let week = u64::from(week_number.max(1));
        let steps = SECTION_PROGRESSION.len() as u64;
        let idx = ((week - 1) * steps / total).min(steps - 1) as usize;
        let (name, description) = SECTION_PROGRESSION[idx];
        Self {
            name: name.to_owned(),
            description: description.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub title: String,
    pub description: String,
    pub objectives: Vec<String>,
    pub exercises: Vec<String>,
    pub week_number: u32,
    pub section: Section,
    #[serde(default)]
    pub keep: bool,
    #[serde(default)]
    pub completed: bool,
}

impl Topic {
    pub fn title_key(&self) -> String {
        title_key(&self.title)
    }
}

/// Case-insensitive identity of a topic title.
pub fn title_key(title: &str) -> String {
    title.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceFormat {
    Video,
    Article,
    Book,
    Interactive,
    Course,
    Other,
}

impl ResourceFormat {
    pub fn from_tag(tag: &str) -> Self {
        let tag = tag.trim().to_ascii_lowercase();
        if tag.contains("video") {
            Self::Video
        } else if tag.contains("article") || tag.contains("blog") || tag.contains("doc") {
            Self::Article
        } else if tag.contains("book") {
            Self::Book
        } else if tag.contains("interactive") || tag.contains("playground") {
            Self::Interactive
        } else if tag.contains("course") {
            Self::Course
        } else {
            Self::Other
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Tutorial,
    Project,
    Reference,
    Course,
    Other,
}

impl ResourceType {
    pub fn from_tag(tag: &str) -> Self {
        let tag = tag.trim().to_ascii_lowercase();
        if tag.contains("tutorial") || tag.contains("guide") {
            Self::Tutorial
        } else if tag.contains("project") {
            Self::Project
        } else if tag.contains("reference") || tag.contains("doc") {
            Self::Reference
        } else if tag.contains("course") {
            Self::Course
        } else {
            Self::Other
        }
    }
}

/// A resource before it is bound to a topic and given an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDraft {
    pub title: String,
    pub description: String,
    pub url: String,
    pub format: ResourceFormat,
    #[serde(rename = "type")]
    pub kind: ResourceType,
    pub is_free: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub topic_id: String,
    pub title: String,
    pub description: String,
    pub url: String,
    pub format: ResourceFormat,
    #[serde(rename = "type")]
    pub kind: ResourceType,
    pub is_free: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    pub url_validated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_validated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_error: Option<String>,
}

impl Resource {
    /// Binds a draft whose URL passed validation.
    pub fn validated(
        id: String,
        topic_id: String,
        draft: ResourceDraft,
        verdict: &ValidationResult,
    ) -> Self {
        Self {
            url_validated: verdict.is_valid,
            url_validated_at: Some(verdict.checked_at),
            url_status_code: verdict.status_code,
            url_error: verdict.error.clone(),
            ..Self::unvalidated(id, topic_id, draft)
        }
    }

    /// Binds a draft that is trusted by construction (no probe was issued).
    pub fn trusted(id: String, topic_id: String, draft: ResourceDraft, at: DateTime<Utc>) -> Self {
        Self {
            url_validated: true,
            url_validated_at: Some(at),
            ..Self::unvalidated(id, topic_id, draft)
        }
    }

    fn unvalidated(id: String, topic_id: String, draft: ResourceDraft) -> Self {
        Self {
            id,
            topic_id,
            title: draft.title,
            description: draft.description,
            url: draft.url,
            format: draft.format,
            kind: draft.kind,
            price: if draft.is_free { None } else { draft.price },
            is_free: draft.is_free,
            url_validated: false,
            url_validated_at: None,
            url_status_code: None,
            url_error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl ValidationResult {
    pub fn valid(status_code: Option<u16>, checked_at: DateTime<Utc>) -> Self {
        Self {
            is_valid: true,
            status_code,
            error: None,
            checked_at,
        }
    }

    pub fn invalid(error: impl Into<String>, checked_at: DateTime<Utc>) -> Self {
        Self {
            is_valid: false,
            status_code: None,
            error: Some(error.into()),
            checked_at,
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }
}
