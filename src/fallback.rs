use url::form_urlencoded;

use crate::model::{ResourceDraft, ResourceFormat, ResourceType};

/// Builds search links that always resolve, for topics left without resources.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackResourceGenerator;

impl FallbackResourceGenerator {
    /// Number of resources [`generate`](Self::generate) always returns.
    pub const COUNT: usize = 4;

    pub fn generate(&self, topic_title: &str, topic_description: &str) -> Vec<ResourceDraft> {
        let title = topic_title.trim();
        let query = |suffix: &str| {
            let text = if suffix.is_empty() {
                title.to_owned()
            } else {
                format!("{title} {suffix}")
            };
            form_urlencoded::byte_serialize(text.as_bytes()).collect::<String>()
        };
        let summary = first_sentence(topic_description);
        let context = if summary.is_empty() {
            String::new()
        } else {
            format!(" {summary}")
        };

        vec![
            ResourceDraft {
                title: format!("{title} video tutorials"),
                description: format!("Video walkthroughs about {title}.{context}"),
                url: format!(
                    "https://www.youtube.com/results?search_query={}",
                    query("tutorial")
                ),
                format: ResourceFormat::Video,
                kind: ResourceType::Tutorial,
                is_free: true,
                price: None,
            },
            ResourceDraft {
                title: format!("{title} documentation"),
                description: format!("Official documentation and reference material for {title}."),
                url: format!(
                    "https://www.google.com/search?q={}",
                    query("official documentation")
                ),
                format: ResourceFormat::Article,
                kind: ResourceType::Reference,
                is_free: true,
                price: None,
            },
            ResourceDraft {
                title: format!("{title} example projects"),
                description: format!("Open-source repositories that put {title} into practice."),
                url: format!(
                    "https://github.com/search?q={}&type=repositories",
                    query("")
                ),
                format: ResourceFormat::Interactive,
                kind: ResourceType::Project,
                is_free: true,
                price: None,
            },
            ResourceDraft {
                title: format!("{title} courses"),
                description: format!("Structured courses covering {title}."),
                url: format!("https://www.coursera.org/search?query={}", query("")),
                format: ResourceFormat::Course,
                kind: ResourceType::Course,
                is_free: true,
                price: None,
            },
        ]
    }
}

fn first_sentence(text: &str) -> &str {
    let text = text.trim();
    match text.find(". ") {
        Some(end) => &text[..=end],
        None => text,
    }
}
