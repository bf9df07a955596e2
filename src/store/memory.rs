//! In-process test double for [`super::AccountStore`].
//!
//! Backed by `Mutex`-guarded `HashMap`s. Enforces the same uniqueness and
//! not-found semantics as the SQLite adapter so that tests exercising the
//! ingestor/settlement/credential logic against this double are faithful to
//! the real backend.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use crate::error::{StoreError, StoreResult};
use crate::sharding::shard_key;
use crate::store::{
    Account, AccountStore, Deposit, NewAccount, NewDeposit, NewTransaction, Transaction, TransactionSettlement,
};

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, Account>,
    username_index: HashMap<String, String>,
    deposit_wallet_index: HashMap<String, String>,
    deposits: HashMap<String, Deposit>,
    transactions: HashMap<String, Transaction>,
}

pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Test/admin helper: flips `active` on an account. Not part of
    /// [`AccountStore`] because spec.md treats deactivation as an external
    /// precondition, not an operation this core performs.
    pub fn set_active(&self, account_id: &str, active: bool) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(account) = inner.accounts.get_mut(account_id) {
            account.active = active;
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountStore for InMemoryStore {
    fn now(&self) -> chrono::DateTime<Utc> {
        Utc::now()
    }

    fn create_account(&self, account: NewAccount) -> StoreResult<Account> {
        let mut inner = self.inner.lock().unwrap();

        if inner.username_index.contains_key(&account.username) {
            return Err(StoreError::UniqueViolation("username".to_string()));
        }
        if inner.deposit_wallet_index.contains_key(&account.deposit_wallet_address) {
            return Err(StoreError::UniqueViolation("deposit_wallet_address".to_string()));
        }

        let row = Account {
            id: account.id.clone(),
            username: account.username.clone(),
            password: account.password,
            password_salt: account.password_salt,
            active: true,
            created_date: Utc::now(),
            deposit_wallet_address: account.deposit_wallet_address.clone(),
            deposit_wallet_passphrase: account.deposit_wallet_passphrase,
            deposit_wallet_private_key: account.deposit_wallet_private_key,
            deposit_wallet_public_key: account.deposit_wallet_public_key,
        };

        inner.username_index.insert(account.username, account.id.clone());
        inner
            .deposit_wallet_index
            .insert(account.deposit_wallet_address, account.id.clone());
        inner.accounts.insert(account.id, row.clone());

        Ok(row)
    }

    fn read_account(&self, id: &str) -> StoreResult<Account> {
        self.inner
            .lock()
            .unwrap()
            .accounts
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn account_by_username(&self, username: &str) -> StoreResult<Option<Account>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .username_index
            .get(username)
            .and_then(|id| inner.accounts.get(id))
            .cloned())
    }

    fn account_by_deposit_wallet_address(&self, address: &str) -> StoreResult<Option<Account>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .deposit_wallet_index
            .get(address)
            .and_then(|id| inner.accounts.get(id))
            .cloned())
    }

    fn create_deposit(&self, deposit: NewDeposit) -> StoreResult<Deposit> {
        let mut inner = self.inner.lock().unwrap();

        if inner.deposits.contains_key(&deposit.id) {
            return Err(StoreError::UniqueViolation("deposit.id".to_string()));
        }

        let row = Deposit {
            id: deposit.id.clone(),
            account_id: deposit.account_id,
            transaction_id: deposit.transaction_id,
            height: deposit.height,
            created_date: Utc::now(),
        };

        inner.deposits.insert(deposit.id, row.clone());
        Ok(row)
    }

    fn read_deposit(&self, id: &str) -> StoreResult<Deposit> {
        self.inner
            .lock()
            .unwrap()
            .deposits
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn create_transaction(&self, transaction: NewTransaction) -> StoreResult<Transaction> {
        let mut inner = self.inner.lock().unwrap();

        let row = Transaction {
            id: transaction.id.clone(),
            account_id: transaction.account_id.clone(),
            kind: transaction.kind,
            amount: transaction.amount,
            created_date: Utc::now(),
            settled: false,
            settled_date: None,
            balance: None,
            canceled: false,
            settlement_shard_key: Some(shard_key(&transaction.account_id)),
        };

        inner.transactions.insert(transaction.id, row.clone());
        Ok(row)
    }

    fn read_transaction(&self, id: &str) -> StoreResult<Transaction> {
        self.inner
            .lock()
            .unwrap()
            .transactions
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn update_transaction_settlement(&self, id: &str, update: TransactionSettlement) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let row = inner.transactions.get_mut(id).ok_or(StoreError::NotFound)?;

        row.settled = update.settled;
        row.settled_date = update.settled_date;
        row.balance = update.balance;
        row.canceled = update.canceled;

        Ok(())
    }

    fn clear_settlement_shard_key(&self, id: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let row = inner.transactions.get_mut(id).ok_or(StoreError::NotFound)?;
        row.settlement_shard_key = None;
        Ok(())
    }

    fn transactions_in_shard_range(&self, start: &str, end: &str) -> StoreResult<Vec<Transaction>> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<Transaction> = inner
            .transactions
            .values()
            .filter(|t| {
                t.settlement_shard_key
                    .as_deref()
                    .is_some_and(|key| crate::sharding::in_range(key, start, end))
            })
            .cloned()
            .collect();

        rows.sort_by(|a, b| a.created_date.cmp(&b.created_date).then_with(|| a.id.cmp(&b.id)));
        Ok(rows)
    }
}
