use clap::{Args, Parser, Subcommand};

use crate::validate::ValidationMode;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse a roadmap document and print topics and resources as JSON.
    Parse(ParseArgs),
    /// Validate URLs and print one JSON verdict per line.
    Validate(ValidateArgs),
    /// Regenerate a stored roadmap from a document or a generated one.
    Regenerate(RegenerateArgs),
}

#[derive(Debug, Args)]
pub struct CommonArgs {
    /// Settings YAML (see config/roadmapify.example.yaml).
    #[arg(long)]
    pub config: Option<String>,

    /// `noop` applies the static rules only and never touches the network.
    #[arg(long, value_enum, default_value_t = ValidationMode::Http)]
    pub validation: ValidationMode,
}

#[derive(Debug, Args)]
pub struct ParseArgs {
    /// Markdown roadmap document.
    #[arg(long)]
    pub input: String,

    /// Total number of weeks the roadmap spans.
    #[arg(long)]
    pub total_weeks: Option<u32>,

    /// JSON array of previously kept topics.
    #[arg(long)]
    pub kept: Option<String>,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    #[arg(required = true)]
    pub urls: Vec<String>,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Args)]
pub struct RegenerateArgs {
    /// Base directory of the local roadmap store.
    #[arg(long)]
    pub store: String,

    /// Roadmap to regenerate.
    #[arg(long)]
    pub roadmap: String,

    /// Use this document instead of calling the generator.
    #[arg(long, conflicts_with = "goal", required_unless_present = "goal")]
    pub input: Option<String>,

    /// Learning goal sent to the generator.
    #[arg(long)]
    pub goal: Option<String>,

    #[arg(long, requires = "goal")]
    pub preferences: Option<String>,

    /// Feedback on the previous roadmap.
    #[arg(long, requires = "goal")]
    pub feedback: Option<String>,

    /// Markdown file with the roadmap being revised.
    #[arg(long, requires = "goal")]
    pub previous: Option<String>,

    /// Topic id to keep (repeatable).
    #[arg(long = "keep")]
    pub keep: Vec<String>,

    #[arg(long)]
    pub total_weeks: Option<u32>,

    #[command(flatten)]
    pub common: CommonArgs,
}
