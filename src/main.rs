use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use askbot::bot::{Bot, BotOptions};
use askbot::channels::TelegramChannel;
use askbot::config::Config;
use askbot::remote::HttpAgentClient;
use askbot::secrets::{CredentialVault, generate_key_base64};

#[derive(Parser)]
#[command(name = "askbot", version)]
#[command(about = "Chat bot that relays commands to private agent endpoints")]
struct Cli {
    /// TOML settings file (defaults to ~/.askbot/config.toml when present).
    #[arg(long, env = "ASKBOT_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot (default).
    Run,
    /// Print a fresh base64 ENCRYPTION_KEY.
    GenerateKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("askbot=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::GenerateKey => {
            println!("{}", generate_key_base64());
            Ok(())
        }
        Commands::Run => {
            init_tracing(cli.log_format);
            run(cli.config).await
        }
    }
}

async fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config =
        Config::from_env_with_toml(config_path.as_deref()).context("Failed to load configuration")?;

    let vault = Arc::new(
        CredentialVault::from_base64_key(&config.secrets.encryption_key)
            .context("Invalid ENCRYPTION_KEY")?,
    );
    let store = askbot::db::connect_from_config(&config.database)
        .await
        .context("Failed to open database")?;
    let agent = Arc::new(HttpAgentClient::new(&config.agent).context("Failed to build agent client")?);

    let Some(telegram_config) = &config.channels.telegram else {
        anyhow::bail!("No chat channel enabled; set TELEGRAM_BOT_TOKEN or TELEGRAM_ENABLED=true");
    };
    let telegram = Arc::new(TelegramChannel::new(telegram_config)?);

    let shutdown = CancellationToken::new();
    let bot = Arc::new(Bot::new(
        store,
        telegram.clone(),
        vault,
        agent,
        BotOptions::from_config(&config),
        shutdown.child_token(),
    ));

    let health = if config.health.enabled {
        let (_, handle) = askbot::health::start_server(&config.health, shutdown.clone()).await?;
        Some(handle)
    } else {
        None
    };

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        tracing::info!("Shutdown requested");
        signal.cancel();
    });

    tracing::info!("askbot started");
    telegram.run(bot, shutdown.clone()).await;

    if let Some(handle) = health
        && let Err(e) = handle.await
    {
        tracing::warn!("Health task ended abnormally: {}", e);
    }
    tracing::info!("askbot stopped");
    Ok(())
}
