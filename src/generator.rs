use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::GeneratorConfig;

/// Inputs for one generated roadmap document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub goal: String,
    #[serde(default)]
    pub preferences: Option<String>,
    #[serde(default)]
    pub feedback: Option<String>,
    /// Titles the user keeps; the model must not repeat them.
    #[serde(default)]
    pub kept_topics: Vec<String>,
    #[serde(default)]
    pub previous_document: Option<String>,
    #[serde(default)]
    pub total_weeks: Option<u32>,
}

/// Produces a markdown roadmap document. The output is opaque text.
#[async_trait]
pub trait RoadmapGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<String>;
}

pub const INSTRUCTIONS: &str = "You are a curriculum designer who writes weekly learning roadmaps.\n\
\n\
Output format (Markdown, follow it exactly):\n\
# Week N: Topic Title\n\
A short description paragraph.\n\
### Objectives:\n\
- one objective per bullet\n\
### Resources:\n\
- [Format] [Type] [Free] \"Resource Title\" - one line description - https://full.url/path\n\
### Exercise:\n\
A single practical exercise.\n\
\n\
Rules:\n\
- Format is one of Video, Article, Book, Interactive, Course.\n\
- Type is one of Tutorial, Project, Reference, Course.\n\
- Use [Free] or [Paid: price].\n\
- Only link to real, currently available pages. Never invent URLs or use placeholder domains.\n\
- Number weeks from 1 without gaps and give every week a distinct title.\n\
- Output ONLY the roadmap Markdown, no preamble or closing remarks.\n";

/// User input for the model, assembled from the request.
pub fn build_input(request: &GenerationRequest) -> String {
    let mut input = format!("Learning goal: {}\n", request.goal.trim());
    if let Some(weeks) = request.total_weeks {
        input.push_str(&format!("Length: {weeks} weeks\n"));
    }
    if let Some(preferences) = request.preferences.as_deref().filter(|p| !p.trim().is_empty()) {
        input.push_str(&format!("Preferences: {}\n", preferences.trim()));
    }
    if !request.kept_topics.is_empty() {
        input.push_str(
            "\nThe learner keeps these topics. Do not include weeks with the same titles:\n",
        );
        for title in &request.kept_topics {
            input.push_str(&format!("- {title}\n"));
        }
    }
    if let Some(feedback) = request.feedback.as_deref().filter(|f| !f.trim().is_empty()) {
        input.push_str(&format!(
            "\nRevise the roadmap using this feedback:\n{}\n",
            feedback.trim()
        ));
    }
    if let Some(previous) = request
        .previous_document
        .as_deref()
        .filter(|d| !d.trim().is_empty())
    {
        input.push_str("\nPrevious roadmap:\n");
        input.push_str(previous.trim());
        input.push('\n');
    }
    input
}

/// Calls the OpenAI Responses API.
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiGenerator {
    pub fn from_config(config: &GeneratorConfig) -> anyhow::Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY is not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            endpoint: responses_endpoint(&config.base_url),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl RoadmapGenerator for OpenAiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<String> {
        if request.goal.trim().is_empty() {
            anyhow::bail!("learning goal is empty");
        }
        tracing::info!(model = %self.model, goal = %request.goal, "generate roadmap");

        let body = ResponsesRequest {
            model: &self.model,
            instructions: INSTRUCTIONS,
            input: build_input(request),
            text: TextOptions {
                format: TextFormat { kind: "text" },
            },
            store: false,
            // GPT-5 models reject sampling params.
            temperature: (!self.model.starts_with("gpt-5")).then_some(self.temperature),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?;

        let status = response.status();
        let raw = response.text().await.context("read OpenAI response body")?;
        if !status.is_success() {
            let message = parse_error_message(&raw).unwrap_or_else(|| raw.clone());
            anyhow::bail!("OpenAI API error ({status}): {message}");
        }
        extract_output_text(&raw).context("extract output text")
    }
}

pub fn responses_endpoint(base_url: &str) -> String {
    format!("{}/responses", base_url.trim_end_matches('/'))
}

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    instructions: &'a str,
    input: String,
    text: TextOptions,
    store: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct TextOptions {
    format: TextFormat,
}

#[derive(Debug, Serialize)]
struct TextFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ResponsesBody {
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

fn parse_error_message(raw: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(raw)
        .ok()
        .map(|body| body.error.message)
}

fn extract_output_text(raw: &str) -> anyhow::Result<String> {
    let body: ResponsesBody = serde_json::from_str(raw).context("parse OpenAI response")?;
    let text = body
        .output
        .iter()
        .filter(|item| item.kind == "message")
        .flat_map(|item| &item.content)
        .filter(|part| part.kind == "output_text")
        .filter_map(|part| part.text.as_deref())
        .collect::<String>();
    if text.trim().is_empty() {
        anyhow::bail!("OpenAI output text is empty");
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_lists_kept_topics_and_feedback() {
        let input = build_input(&GenerationRequest {
            goal: "Learn Rust".to_owned(),
            preferences: Some("videos".to_owned()),
            feedback: Some("more projects".to_owned()),
            kept_topics: vec!["Ownership".to_owned()],
            previous_document: None,
            total_weeks: Some(6),
        });
        assert!(input.starts_with("Learning goal: Learn Rust\n"));
        assert!(input.contains("Length: 6 weeks"));
        assert!(input.contains("Preferences: videos"));
        assert!(input.contains("- Ownership\n"));
        assert!(input.contains("more projects"));
        assert!(!input.contains("Previous roadmap"));
    }

    #[test]
    fn input_carries_the_previous_document_last() {
        let input = build_input(&GenerationRequest {
            goal: "Learn Rust".to_owned(),
            feedback: Some("fewer videos".to_owned()),
            previous_document: Some("\n# Week 1: Ownership\nMoves.\n\n".to_owned()),
            ..GenerationRequest::default()
        });
        assert!(input.ends_with("\nPrevious roadmap:\n# Week 1: Ownership\nMoves.\n"));
        let feedback_at = input.find("fewer videos").expect("feedback in input");
        let previous_at = input.find("Previous roadmap:").expect("previous roadmap in input");
        assert!(feedback_at < previous_at);

        let blank = build_input(&GenerationRequest {
            goal: "Learn Rust".to_owned(),
            previous_document: Some("  \n".to_owned()),
            ..GenerationRequest::default()
        });
        assert!(!blank.contains("Previous roadmap"));
    }

    #[test]
    fn output_text_joins_message_parts() -> anyhow::Result<()> {
        let raw = serde_json::json!({
            "output": [
                { "type": "reasoning", "content": [] },
                { "type": "message", "content": [
                    { "type": "output_text", "text": "# Week 1: A\n" },
                    { "type": "refusal" },
                    { "type": "output_text", "text": "Intro" }
                ]}
            ]
        })
        .to_string();
        assert_eq!(extract_output_text(&raw)?, "# Week 1: A\nIntro");
        Ok(())
    }

    #[test]
    fn empty_output_is_an_error() {
        let raw = r#"{"output":[{"type":"message","content":[]}]}"#;
        assert!(extract_output_text(raw).is_err());
    }

    #[test]
    fn error_message_is_extracted() {
        let raw = r#"{"error":{"message":"bad key","type":"invalid_request_error"}}"#;
        assert_eq!(parse_error_message(raw).as_deref(), Some("bad key"));
        assert_eq!(parse_error_message("not json"), None);
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        assert_eq!(
            responses_endpoint("http://127.0.0.1:9/v1/"),
            "http://127.0.0.1:9/v1/responses"
        );
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let config = GeneratorConfig::default();
        assert!(OpenAiGenerator::from_config(&config).is_err());
    }
}
