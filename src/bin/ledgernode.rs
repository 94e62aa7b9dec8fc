#![forbid(unsafe_code)]
//! Ledger node: opens the stores and serves the HTTP facade.

use clap::{Parser, Subcommand};
use ledgernode::api::run_api_server;
use ledgernode::config::{load_config, Config, DEFAULT_CONFIG_FILE};
use ledgernode::crypto::{address_from_hex, address_to_hex, hash_to_hex};
use ledgernode::keystore::KeyStore;
use ledgernode::node::{LedgerNode, LedgerService};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Overrides ledger.chain_dir
    #[arg(long)]
    chain_dir: Option<PathBuf>,
    /// Overrides ledger.key_file
    #[arg(long)]
    key_file: Option<PathBuf>,
    /// Overrides ledger.entry_file
    #[arg(long)]
    entry_file: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serves the HTTP API (default)
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Generates the node key file
    Keygen,
    /// Prints the node address
    Address,
    /// Prints confirmed and pending balance of an address
    Balance { address: String },
    /// Lists confirmed transactions of an address, oldest first
    History { address: String },
}

fn apply_overrides(cli: &Cli, config: &mut Config) {
    if let Some(dir) = &cli.chain_dir {
        config.ledger.chain_dir = dir.clone();
    }
    if let Some(key) = &cli.key_file {
        config.ledger.key_file = key.clone();
    }
    if let Some(entry) = &cli.entry_file {
        config.ledger.entry_file = entry.clone();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;
    apply_overrides(&cli, &mut config);
    config.validate()?;

    match cli.command {
        Some(Commands::Keygen) => {
            let keys = KeyStore::create(&config.ledger.key_file)?;
            println!("{}", address_to_hex(&keys.address()));
        }
        Some(Commands::Address) => {
            let keys = KeyStore::load(&config.ledger.key_file)?;
            println!("{}", address_to_hex(&keys.address()));
        }
        Some(Commands::Balance { address }) => {
            let node = LedgerNode::open(&config)?;
            let address = address_from_hex(&address)?;
            println!("confirmed: {}", node.get_balance(&address));
            println!("pending:   {}", node.get_pending_balance(&address));
        }
        Some(Commands::History { address }) => {
            let node = LedgerNode::open(&config)?;
            let address = address_from_hex(&address)?;
            for hash in node.get_transactions(&address) {
                println!("{}", hash_to_hex(&hash));
            }
        }
        Some(Commands::Serve { host, port }) => {
            if let Some(host) = host {
                config.api.host = host;
            }
            if let Some(port) = port {
                config.api.port = port;
            }
            serve(config).await?;
        }
        None => serve(config).await?,
    }

    Ok(())
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("{}:{}", config.api.host, config.api.port).parse()?;
    let node = Arc::new(LedgerNode::open(&config)?);

    if let Some(ttl) = config.mempool.expiry_secs {
        let pruner = node.clone();
        let period = Duration::from_secs(ttl.clamp(1, 60));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                pruner.prune_expired();
            }
        });
    }

    info!(
        address = %address_to_hex(&node.node_address()),
        confirmed = node.confirmed_count(),
        "ledger node ready"
    );
    run_api_server(node, addr).await
}
