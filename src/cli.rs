use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Command-line interface definition for the ledger core.
///
/// This struct is the root of the CLI argument parser. It uses the `clap`
/// crate for argument parsing.
#[derive(Parser)]
#[command(name = "ledger-core", about = "Custodial account and settlement core", version, long_about = None)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "config/config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new account: validates credentials, allocates a deposit
    /// wallet, and persists the account.
    Signup {
        #[arg(short, long, help = "Desired username")]
        username: String,
        #[arg(short, long, help = "Desired password")]
        password: String,
    },

    /// Verify login credentials against a stored account.
    Login {
        #[arg(short, long, help = "Username")]
        username: String,
        #[arg(short, long, help = "Password")]
        password: String,
    },

    /// Ingest a single observed blockchain transaction.
    ///
    /// Intended for manual replay/testing; in production this is driven by
    /// the blockchain observer, which is out of scope for this core.
    Ingest {
        /// Blockchain transaction id. Doubles as the idempotency key.
        #[arg(long)]
        id: String,
        /// Sender address; matched against a deposit wallet address.
        #[arg(long)]
        sender_id: String,
        /// Block height the transaction was observed at.
        #[arg(long)]
        height: i64,
        /// Transferred amount, as a decimal string.
        #[arg(long)]
        amount: String,
    },

    /// Run one settlement tick for this process's configured shard and
    /// exit. Useful for cron-driven settlement instead of the daemon.
    Settle,

    /// Run the settlement worker continuously until Ctrl+C.
    ///
    /// Ticks on `settlement_interval_secs` and shuts down gracefully on
    /// Ctrl+C, draining the current tick before exiting.
    Daemon,
}
