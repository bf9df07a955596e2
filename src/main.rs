//! ledger-core CLI application.
//!
//! A command-line front end over the account and settlement core: signup,
//! login, manual deposit ingestion, a one-shot settlement tick, and a
//! long-running settlement daemon.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::Parser;
use ledger_core::cli::{Cli, Commands};
use ledger_core::credential::{SignupRequest, signup, verify_login_credentials};
use ledger_core::ingestor::{BlockchainTransaction, ingest};
use ledger_core::settlement::{SettlementWorker, run_tick};
use ledger_core::store::sqlite;
use ledger_core::wallet::MockWalletGenerator;
use ledger_core::{Amount, config, log as ledger_log};
use log::info;
use tokio::sync::broadcast;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ledger_log::init_logging();
    let cli = Cli::parse();
    let cfg = config::load_configuration(&cli.config).context("could not load configuration")?;

    let store = Arc::new(sqlite::open(std::path::Path::new(&cfg.database_path)).context("could not open store")?);
    let wallet_generator = MockWalletGenerator::new();

    match cli.command {
        Commands::Signup { username, password } => {
            let account = signup(
                store.as_ref(),
                &wallet_generator,
                cfg.min_username_length,
                cfg.max_username_length,
                cfg.min_password_length,
                cfg.max_password_length,
                cfg.salt_size,
                cfg.max_wallet_create_attempts,
                SignupRequest {
                    username: Some(username),
                    password: Some(password),
                },
            )?;
            println!("account created: {} (deposit address {})", account.id, account.deposit_wallet_address);
        },
        Commands::Login { username, password } => {
            let account = verify_login_credentials(store.as_ref(), &username, &password)?;
            println!("login ok: {}", account.id);
        },
        Commands::Ingest {
            id,
            sender_id,
            height,
            amount,
        } => {
            let outcome = ingest(
                store.as_ref(),
                &BlockchainTransaction {
                    id,
                    sender_id,
                    height,
                    amount: Amount::from_str(&amount).map_err(|e| anyhow!(e))?,
                },
            )?;
            match outcome.transaction {
                Some(t) => println!("ingested transaction {} for account {}", t.id, t.account_id),
                None => println!("sender is not a known deposit wallet, ignored"),
            }
        },
        Commands::Settle => {
            let shard_index = cfg.shard_index.context("settle requires shard_index to be configured")?;
            run_tick(store.as_ref(), shard_index, cfg.shard_count)?;
            println!("settlement tick complete");
        },
        Commands::Daemon => {
            let shard_index = cfg.shard_index.context("daemon requires shard_index to be configured")?;
            let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

            let worker = SettlementWorker::new(
                Arc::clone(&store),
                shard_index,
                cfg.shard_count,
                Duration::from_secs(cfg.settlement_interval_secs),
            );
            let handle = worker.run(shutdown_rx);

            tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
            info!("received ctrl-c, shutting down");
            let _ = shutdown_tx.send(());
            let _ = handle.await;
        },
    }

    Ok(())
}
