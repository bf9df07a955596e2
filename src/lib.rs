//! ledger-core: a custodial account and settlement service for deposits
//! observed on a blockchain.
//!
//! This library provides the core of a custodial account service: it turns
//! observed blockchain deposit transactions into ledger entries, folds
//! unsettled ledger entries into running account balances on a sharded
//! timer, and owns the signup/login credential lifecycle that issues each
//! account its own deposit wallet.
//!
//! # Architecture
//!
//! - [`amount`]: arbitrary-precision decimal amounts, stored and transmitted
//!   as strings, never as floating point.
//! - [`sharding`]: deterministic account-id to shard-key assignment and
//!   shard-range partitioning of the key space.
//! - [`error`]: the store and core error taxonomies.
//! - [`store`]: the [`store::AccountStore`] persistence contract, with a
//!   SQLite-backed implementation and an in-memory one for tests.
//! - [`wallet`]: the boundary to the external blockchain wallet generator.
//! - [`credential`]: signup validation/persistence and login verification.
//! - [`ingestor`]: idempotent deposit ingestion from blockchain transactions.
//! - [`settlement`]: the sharded gather/fold/prune settlement tick and its
//!   timer-driven worker.
//! - [`config`]: configuration loading.
//! - [`log`]: log handling.
//! - [`cli`]: command-line interface definition.

pub mod amount;
pub mod cli;
pub mod config;
pub mod credential;
pub mod error;
pub mod ingestor;
pub mod log;
pub mod settlement;
pub mod sharding;
pub mod store;
pub mod wallet;

pub use crate::amount::Amount;
pub use crate::error::{CoreError, CoreResult, StoreError, StoreResult};
pub use crate::store::AccountStore;
