//! Solana L2 Client
//!
//! Command-line front end for the L2 client connection.
//! Runs one-shot queries or watches subscriptions until Ctrl+C.

use anyhow::Result;
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use rpc_client::{rpc_types::CommitmentLevel, Connection};
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

/// Solana L2 Client
#[derive(Parser, Debug)]
#[command(name = "solana-l2-client")]
#[command(about = "Query and watch an L2 node over JSON-RPC and WebSocket", long_about = None)]
struct Args {
    /// HTTP RPC endpoint
    #[arg(long, default_value = "http://127.0.0.1:8899")]
    url: String,

    /// WebSocket endpoint (derived from --url when unset)
    #[arg(long)]
    ws_url: Option<String>,

    /// JSON connection config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Commitment level (max, recent, root, single, singleGossip)
    #[arg(long)]
    commitment: Option<CommitmentLevel>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Account balance in lamports
    Balance { pubkey: Pubkey },
    /// Account details
    Account { pubkey: Pubkey },
    /// Current slot
    Slot,
    /// Current epoch
    EpochInfo,
    /// Node version
    Version,
    /// Request an airdrop
    Airdrop { pubkey: Pubkey, lamports: u64 },
    /// Print account updates until Ctrl+C
    WatchAccount { pubkey: Pubkey },
    /// Print slot updates until Ctrl+C
    WatchSlots,
    /// Wait for a transaction to be processed
    WatchSignature { signature: Signature },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::load_config(args.config.as_deref(), args.commitment, args.ws_url.as_deref())?;
    let connection = Connection::with_config(&args.url, config)?;
    tracing::debug!("Connected to {}", connection.url());

    match args.command {
        Command::Balance { pubkey } => {
            let lamports = connection.get_balance(&pubkey, None).await?;
            println!("{lamports} lamports");
        }
        Command::Account { pubkey } => {
            let account = connection.get_account_info(&pubkey, None).await?;
            println!("Owner:      {}", account.owner);
            println!("Lamports:   {}", account.lamports);
            println!("Executable: {}", account.executable);
            println!("Data:       {} bytes", account.data.len());
        }
        Command::Slot => {
            println!("{}", connection.get_slot(None).await?);
        }
        Command::EpochInfo => {
            let info = connection.get_epoch_info(None).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::Version => {
            let version = connection.get_version().await?;
            println!("{}", version.solana_core);
        }
        Command::Airdrop { pubkey, lamports } => {
            let signature = connection.request_airdrop(&pubkey, lamports, None).await?;
            println!("{signature}");
        }
        Command::WatchAccount { pubkey } => watch_account(&connection, pubkey).await?,
        Command::WatchSlots => watch_slots(&connection).await?,
        Command::WatchSignature { signature } => watch_signature(&connection, signature).await?,
    }

    Ok(())
}

fn timestamp() -> String {
    chrono::Utc::now().format("%H:%M:%S%.3f").to_string()
}

async fn watch_account(connection: &Connection, pubkey: Pubkey) -> Result<()> {
    let id = connection.on_account_change(&pubkey, None, move |update| {
        println!(
            "[{}] slot {}: {} lamports, {} bytes, owner {}",
            timestamp(),
            update.context.slot,
            update.value.lamports,
            update.value.data.len(),
            update.value.owner
        );
    });
    tracing::info!("Watching account {}. Press Ctrl+C to stop.", pubkey);

    tokio::signal::ctrl_c().await?;
    connection.remove_account_change_listener(id).await?;
    Ok(())
}

async fn watch_slots(connection: &Connection) -> Result<()> {
    let id = connection.on_slot_change(|info| {
        println!("[{}] slot {} (parent {}, root {})", timestamp(), info.slot, info.parent, info.root);
    });
    tracing::info!("Watching slots. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    connection.remove_slot_change_listener(id).await?;
    Ok(())
}

async fn watch_signature(connection: &Connection, signature: Signature) -> Result<()> {
    let (done_tx, done_rx) = oneshot::channel();
    let done_tx = Arc::new(Mutex::new(Some(done_tx)));

    let id = connection.on_signature(&signature, None, move |result| {
        if let Some(done) = done_tx.lock().take() {
            let _ = done.send(result);
        }
    });
    tracing::info!("Waiting for {}. Press Ctrl+C to stop.", signature);

    tokio::select! {
        result = done_rx => {
            let result = result?;
            match result.value.err {
                None => println!("[{}] {} succeeded at slot {}", timestamp(), signature, result.context.slot),
                Some(err) => println!("[{}] {} failed at slot {}: {}", timestamp(), signature, result.context.slot, err),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Stopped waiting");
            connection.remove_signature_listener(id).await?;
        }
    }

    Ok(())
}
