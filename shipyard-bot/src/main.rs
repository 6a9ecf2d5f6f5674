//! shipyard-bot: turn chat requests into mobile app builds.
//!
//! Reads one message per line from stdin and replies on stdout. Examples:
//!
//!   build shop and wallet for android from dark mode with the latest version
//!   which ios versions are live for shop?
//!   /status
//!
//! Requires ANTHROPIC_API_KEY environment variable.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use shipyard_bot::bot::Bot;
use shipyard_bot::config::{self, Config};
use shipyard_bot::llm::{DEFAULT_MODEL, LlmClient};
use shipyard_bot::output::ConsoleSink;
use shipyard_engine::Orchestrator;
use shipyard_engine::git::GitRepo;
use shipyard_engine::identity::RemoteConfigResolver;
use shipyard_engine::process::ShellRunner;
use shipyard_engine::store::{AndroidStoreClient, IosStoreClient};
use shipyard_engine::versions::VersionResolver;

#[derive(Parser)]
#[command(name = "shipyard-bot", about = "Chat-driven mobile app builds")]
struct Args {
    /// Config file (default: ~/.config/shipyard/shipyard.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Project directory (overrides the config file)
    #[arg(long)]
    project_dir: Option<PathBuf>,

    /// Anthropic API key (or set ANTHROPIC_API_KEY env var)
    #[arg(long, env = "ANTHROPIC_API_KEY")]
    api_key: String,

    /// Claude model to use (overrides the config file)
    #[arg(long)]
    model: Option<String>,

    /// Command prefix
    #[arg(long, default_value = "/")]
    prefix: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shipyard_bot=info,shipyard_engine=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let mut config = Config::load(&config_path)?;
    if let Some(dir) = args.project_dir {
        config.project_dir = dir;
    }
    if let Some(model) = args.model {
        config.model = Some(model);
    }
    if config.identity_config_url.is_empty() {
        tracing::warn!("identity_config_url is not set; version lookups will find no apps");
    }

    let model = config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let llm = LlmClient::new(args.api_key).with_model(&model);

    let identities = RemoteConfigResolver::new(config.identity_config_url.clone())
        .with_rewrite(config.package_rewrite.clone());
    let android =
        AndroidStoreClient::new(config.service_account_path(), config.android_track.clone());
    let ios = IosStoreClient::new(config.api_key_path());
    let versions = VersionResolver::new(Arc::new(identities), Arc::new(android), Arc::new(ios));

    let git = Arc::new(GitRepo::new(config.project_dir.clone()));
    let orchestrator = Arc::new(Orchestrator::new(
        config.orchestrator_config(),
        versions,
        git.clone(),
        Arc::new(ShellRunner),
    ));

    let bot = Bot::new(
        Arc::new(llm),
        orchestrator,
        git,
        Arc::new(ConsoleSink),
        config.known_apps.clone(),
    )
    .with_prefix(args.prefix);

    tracing::info!(
        config = %config_path.display(),
        project_dir = %config.project_dir.display(),
        model = %model,
        "Starting shipyard-bot"
    );

    let mut builds = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match bot.handle_message(&line).await {
            Ok(Some(build)) => builds.push(build),
            Ok(None) => {}
            Err(e) => tracing::error!(error = %e, "Message handler error"),
        }
        builds.retain(|b| !b.is_finished());
    }

    tracing::info!(pending = builds.len(), "Input closed, waiting for running builds");
    for build in builds {
        if let Err(e) = build.await {
            tracing::error!(error = %e, "Build task failed");
        }
    }
    Ok(())
}
