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
    novelgrab::logging::init().context("init logging")?;

    let cli = novelgrab::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        novelgrab::cli::Command::Links(args) => {
            novelgrab::collect::run(args).await.context("links")?;
        }
        novelgrab::cli::Command::Chapters(args) => {
            novelgrab::fetch::run(args).await.context("chapters")?;
        }
        novelgrab::cli::Command::Run(args) => {
            novelgrab::run::run(args).await.context("run")?;
        }
    }

    Ok(())
}
