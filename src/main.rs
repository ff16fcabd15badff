// ABOUTME: CLI entry point for whitelist-sync
// ABOUTME: Parses commands, resolves configuration, and routes to handlers

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use whitelist_sync::commands;
use whitelist_sync::config::{ConfigOverrides, SyncConfig};
use whitelist_sync::message::Channel;

#[derive(Parser)]
#[command(name = "whitelist-sync")]
#[command(about = "Differential pool whitelist publisher for NATS subscribers", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true, env = "WHITELIST_CONFIG")]
    config: Option<PathBuf>,
    /// PostgreSQL URL of the snapshot store
    #[arg(long = "database-url", global = true, env = "WHITELIST_DATABASE_URL")]
    database_url: Option<String>,
    /// NATS server URL
    #[arg(long = "nats-url", global = true, env = "WHITELIST_NATS_URL")]
    nats_url: Option<String>,
    /// Topic namespace; subjects are <namespace>.<chain>.<channel>
    #[arg(long, global = true, env = "WHITELIST_NAMESPACE")]
    namespace: Option<String>,
    /// Timeout in seconds for each channel emission
    #[arg(long = "publish-timeout", global = true, env = "WHITELIST_PUBLISH_TIMEOUT")]
    publish_timeout: Option<u64>,
    /// Timeout in seconds for each snapshot store operation
    #[arg(long = "store-timeout", global = true, env = "WHITELIST_STORE_TIMEOUT")]
    store_timeout: Option<u64>,
    /// Allow self-signed TLS certificates (insecure - use only for testing)
    #[arg(
        long = "allow-self-signed-certs",
        global = true,
        default_value_t = false
    )]
    allow_self_signed_certs: bool,
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ChannelArg {
    Minimal,
    Full,
    All,
}

impl ChannelArg {
    fn channel(self) -> Option<Channel> {
        match self {
            ChannelArg::Minimal => Some(Channel::Minimal),
            ChannelArg::Full => Some(Channel::Full),
            ChannelArg::All => None,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Publish a whitelist for one chain and store it as the new snapshot
    Publish {
        /// Chain the whitelist belongs to (e.g. ethereum, base)
        #[arg(long)]
        chain: String,
        /// JSON array of pool objects, each with an "address" field
        #[arg(long)]
        file: PathBuf,
        /// Send the whole whitelist instead of only the changes
        #[arg(long)]
        force_full: bool,
    },
    /// Show the latest stored snapshot for a chain
    Latest {
        #[arg(long)]
        chain: String,
    },
    /// Create the snapshot tables and indexes if missing
    InitSchema,
    /// Follow whitelist updates for a chain
    Watch {
        #[arg(long)]
        chain: String,
        /// Channel to follow
        #[arg(long, value_enum, default_value_t = ChannelArg::All)]
        channel: ChannelArg,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    whitelist_sync::postgres::connection::init_tls_policy(cli.allow_self_signed_certs);

    let config = SyncConfig::resolve(
        cli.config.as_deref(),
        ConfigOverrides {
            database_url: cli.database_url,
            nats_url: cli.nats_url,
            namespace: cli.namespace,
            publish_timeout_secs: cli.publish_timeout,
            store_timeout_secs: cli.store_timeout,
        },
    )?;
    tracing::debug!("Configuration: {}", config.describe());

    match cli.command {
        Commands::Publish {
            chain,
            file,
            force_full,
        } => commands::publish(&config, &chain, &file, force_full)
            .await
            .map(|_| ()),
        Commands::Latest { chain } => commands::latest(&config, &chain).await.map(|_| ()),
        Commands::InitSchema => commands::init_schema(&config).await,
        Commands::Watch { chain, channel } => {
            commands::watch(&config, &chain, channel.channel()).await
        }
    }
}
