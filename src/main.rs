use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    roadmapify::logging::init().context("init logging")?;

    let cli = roadmapify::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        roadmapify::cli::Command::Parse(args) => {
            roadmapify::commands::parse(args).await.context("parse")?;
        }
        roadmapify::cli::Command::Validate(args) => {
            roadmapify::commands::validate(args).await.context("validate")?;
        }
        roadmapify::cli::Command::Regenerate(args) => {
            roadmapify::commands::regenerate(args)
                .await
                .context("regenerate")?;
        }
    }

    Ok(())
}
