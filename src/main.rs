use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

use bookpages::cli::{CacheCommand, Cli, Command};
use bookpages::commands;
use bookpages::config::{ReaderConfig, parse_api_url};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    bookpages::logging::init(cli.verbose).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    let Cli {
        api_url,
        cache_dir,
        command,
        ..
    } = cli;
    let config = || load_config(api_url.as_deref(), cache_dir.clone());

    match command {
        Command::Flatten(args) => commands::flatten(args).context("flatten")?,
        Command::Outline(args) => commands::outline(args).context("outline")?,
        Command::FetchToc(args) => commands::fetch_toc(&config()?, args)
            .await
            .context("fetch-toc")?,
        Command::Read(args) => commands::read(&config()?, args).await.context("read")?,
        Command::Cache {
            command: CacheCommand::Sweep(args),
        } => commands::cache_sweep(&config()?, args)
            .await
            .context("cache sweep")?,
        Command::Cache {
            command: CacheCommand::Clear(args),
        } => commands::cache_clear(&config()?, args)
            .await
            .context("cache clear")?,
        Command::Cache {
            command: CacheCommand::Stats(args),
        } => commands::cache_stats(&config()?, args)
            .await
            .context("cache stats")?,
    }

    Ok(())
}

/// Environment plus global flag overrides. Offline commands never call this.
fn load_config(api_url: Option<&str>, cache_dir: Option<PathBuf>) -> anyhow::Result<ReaderConfig> {
    let mut config = ReaderConfig::from_env().context("load config")?;
    if let Some(raw) = api_url {
        config.api_url = Some(parse_api_url(raw).with_context(|| format!("--api-url {raw}"))?);
    }
    if let Some(dir) = cache_dir {
        config.cache_dir = dir;
    }
    Ok(config)
}
