use anyhow::Context;
use clap::{Parser, Subcommand};
use metafs_config::{AppConfig, Profile};
use metafs_core::node::IndexerNode;
use metafs_core::rescan::RescanState;
use metafs_types::ChainKind;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "metafs-indexer", version, about = "Multi-chain MetaID file-system indexer")]
struct Cli {
    /// Directory holding the config.<profile>.yaml files.
    #[arg(long, default_value = "./config", env = "METAFS_CONFIG_DIR")]
    config_dir: PathBuf,

    /// Deployment profile to load.
    #[arg(long, value_enum, default_value_t = Profile::Loc, env = "METAFS_PROFILE")]
    profile: Profile,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Run the indexer until interrupted (default).
    Run,
    /// Rescan a height range on one chain, then exit.
    Rescan {
        #[arg(value_enum)]
        chain: ChainKind,
        start_height: u64,
        end_height: u64,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,metafs_core=info,metafs_store=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(mut node: IndexerNode) -> anyhow::Result<()> {
    node.start();
    tokio::signal::ctrl_c()
        .await
        .context("listening for shutdown signal")?;
    tracing::info!("shutdown signal received");
    node.stop().await;
    Ok(())
}

async fn rescan(
    mut node: IndexerNode,
    chain: ChainKind,
    start_height: u64,
    end_height: u64,
) -> anyhow::Result<()> {
    node.start_rescan(chain, start_height, end_height)?;
    loop {
        let status = node.rescan_status();
        if status.state != RescanState::Running {
            println!("{}", serde_json::to_string_pretty(&status)?);
            node.stop().await;
            return match status.state {
                RescanState::Completed => Ok(()),
                other => anyhow::bail!("rescan finished with state {other:?}"),
            };
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config_dir, cli.profile)
        .with_context(|| format!("loading profile {} from {:?}", cli.profile, cli.config_dir))?;
    tracing::info!(
        profile = %cli.profile,
        chains = config.chains.len(),
        data_dir = ?config.database.data_dir,
        "configuration loaded"
    );

    let node = IndexerNode::build(&config, HashMap::new())?;
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(node).await,
        Command::Rescan {
            chain,
            start_height,
            end_height,
        } => rescan(node, chain, start_height, end_height).await,
    }
}
