mod error;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tkey_core::chain::Blockchain;
use tkey_core::config::Config;
use tkey_network::addrman::AddressManager;
use tracing_subscriber::EnvFilter;

use crate::error::{CliError, Result};

#[derive(Parser)]
#[command(name = "tkeyd")]
#[command(about = "TKEY full node", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Fail get configuration ← {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.logs) {
        eprintln!("Fail logging initialize ← {e}");
        return ExitCode::FAILURE;
    }

    tracing::info!("Preparing to start");

    let worker_count = config.core.workers.resolve();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_count)
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "fail to build the worker runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => {
            tracing::info!("Stop daemon");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "fail init node");
            eprintln!("Fail init node ← {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)?;
            Ok(Config::from_toml_str(&contents)?)
        }
        None => Ok(Config::default()),
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| CliError::Logging(e.to_string()))
}

async fn run(config: Config) -> Result<()> {
    let genesis = tkey_core::codec::Hash256::zero();
    let blockchain = Blockchain::with_genesis(genesis);

    let addresses = AddressManager::load(
        &config.addresses.path,
        config.addresses.storage_time,
        config.addresses.address_capacity,
        config.addresses.banned_capacity,
    )?;

    let node = Arc::new(tkey_network::Node::new(blockchain, addresses, tkey_network::wire::MAGIC_MAIN));

    let rpc_state = Arc::new(tkey_rpc::RpcState { blockchain: node.blockchain.clone() });
    let rpc_addr: SocketAddr = "0.0.0.0:8332".parse()?;
    let rpc_handle = tkey_rpc::serve(rpc_addr, rpc_state).await?;

    let p2p_addr: SocketAddr = config
        .transports
        .get("main")
        .map(|t| format!("{}:{}", t.host, t.port))
        .unwrap_or_else(|| "0.0.0.0:8333".to_string())
        .parse()?;
    let listen_node = node.clone();
    tokio::spawn(async move {
        if let Err(e) = tkey_network::dispatch::listen(listen_node, p2p_addr).await {
            tracing::error!(error = %e, "p2p listener stopped");
        }
    });

    tracing::info!(pid = std::process::id(), %p2p_addr, %rpc_addr, "start daemon");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    rpc_handle.stop().ok();

    let addresses = node.addresses.lock().await;
    if let Err(e) = addresses.save() {
        tracing::warn!(error = %e, "failed to persist address book on shutdown");
    }

    Ok(())
}
