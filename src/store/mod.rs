//! Account Store Adapter.
//!
//! A thin contract over the persistence layer: create/read/update by type and
//! id, a field-scoped delete (used by settlement pruning), and the handful
//! of indexed queries the core actually issues. Two implementations are
//! provided: [`sqlite::SqliteStore`] for real runs, and
//! [`memory::InMemoryStore`] for tests.

pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::error::StoreResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub password: String,
    pub password_salt: String,
    pub active: bool,
    pub created_date: DateTime<Utc>,
    pub deposit_wallet_address: String,
    pub deposit_wallet_passphrase: String,
    pub deposit_wallet_private_key: String,
    pub deposit_wallet_public_key: String,
}

/// Fields required to create a new account row. `id` is minted by the
/// caller (UUID v4); the store only enforces uniqueness of `username` and
/// `deposit_wallet_address`.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub id: String,
    pub username: String,
    pub password: String,
    pub password_salt: String,
    pub deposit_wallet_address: String,
    pub deposit_wallet_passphrase: String,
    pub deposit_wallet_private_key: String,
    pub deposit_wallet_public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deposit {
    pub id: String,
    pub account_id: String,
    pub transaction_id: String,
    pub height: i64,
    pub created_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDeposit {
    pub id: String,
    pub account_id: String,
    pub transaction_id: String,
    pub height: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Deposit,
    Credit,
    Debit,
    Withdrawal,
}

impl TransactionType {
    pub fn is_credit(self) -> bool {
        matches!(self, TransactionType::Deposit | TransactionType::Credit)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Credit => "credit",
            TransactionType::Debit => "debit",
            TransactionType::Withdrawal => "withdrawal",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(TransactionType::Deposit),
            "credit" => Some(TransactionType::Credit),
            "debit" => Some(TransactionType::Debit),
            "withdrawal" => Some(TransactionType::Withdrawal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: String,
    pub account_id: String,
    pub kind: TransactionType,
    pub amount: Amount,
    pub created_date: DateTime<Utc>,
    pub settled: bool,
    pub settled_date: Option<DateTime<Utc>>,
    pub balance: Option<Amount>,
    pub canceled: bool,
    pub settlement_shard_key: Option<String>,
}

/// Fields required to create a new, unsettled transaction. The store stamps
/// `settlement_shard_key = shard_key(account_id)` itself (never trusting a
/// caller-supplied shard key), so that no insertion path can leak a row out
/// of settlement by omitting it.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub id: String,
    pub account_id: String,
    pub kind: TransactionType,
    pub amount: Amount,
}

/// The explicit field set a settlement fold writes back onto a transaction.
/// Never a generic patch blob — see DESIGN.md's note on the source's
/// `txnData` bug.
#[derive(Debug, Clone)]
pub struct TransactionSettlement {
    pub settled: bool,
    pub settled_date: Option<DateTime<Utc>>,
    pub balance: Option<Amount>,
    pub canceled: bool,
}

pub trait AccountStore: Send + Sync {
    /// The store's own clock. The core never reads the wall clock directly.
    fn now(&self) -> DateTime<Utc>;

    fn create_account(&self, account: NewAccount) -> StoreResult<Account>;
    fn read_account(&self, id: &str) -> StoreResult<Account>;
    fn account_by_username(&self, username: &str) -> StoreResult<Option<Account>>;
    fn account_by_deposit_wallet_address(&self, address: &str) -> StoreResult<Option<Account>>;

    fn create_deposit(&self, deposit: NewDeposit) -> StoreResult<Deposit>;
    fn read_deposit(&self, id: &str) -> StoreResult<Deposit>;

    fn create_transaction(&self, transaction: NewTransaction) -> StoreResult<Transaction>;
    fn read_transaction(&self, id: &str) -> StoreResult<Transaction>;

    /// Applies a settlement mutation to `id`. Fails with [`crate::error::StoreError::NotFound`]
    /// if no row matched.
    fn update_transaction_settlement(&self, id: &str, update: TransactionSettlement) -> StoreResult<()>;

    /// Field-scoped delete: unsets `settlement_shard_key` on a row, distinct
    /// from deleting the row itself. Errors here are non-fatal to callers.
    fn clear_settlement_shard_key(&self, id: &str) -> StoreResult<()>;

    /// Range scan by `settlement_shard_key` over the inclusive interval
    /// `[start, end]`, ordered by `created_date` ascending with transaction
    /// id as a lexicographic tiebreak.
    fn transactions_in_shard_range(&self, start: &str, end: &str) -> StoreResult<Vec<Transaction>>;
}
