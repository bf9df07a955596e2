//! Settlement Engine: per-shard gather/fold/prune tick, the single-row admin
//! bypass, and the timer-driven worker loop.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::amount::Amount;
use crate::error::{CoreError, CoreResult};
use crate::log::mask_amount;
use crate::sharding::shard_range;
use crate::store::{AccountStore, Transaction, TransactionSettlement};

struct AccountLedger {
    balance: Amount,
    last_settled_transaction: Option<Transaction>,
    unsettled_transactions: Vec<Transaction>,
}

/// Runs one settlement tick for the shard `(shard_index, shard_count)`.
///
/// Phase 1 (gather) and any other store error abort the whole tick — the
/// next tick retries cleanly. Phase 2 (fold) failures on an individual row
/// are logged and leave that row unsettled; it re-enters the next tick.
/// Phase 3 (prune) failures are non-fatal.
pub fn run_tick(store: &dyn AccountStore, shard_index: u32, shard_count: u32) -> CoreResult<()> {
    let (start, end) = shard_range(shard_index, shard_count);

    // Phase 1 — gather.
    let rows = store.transactions_in_shard_range(&start, &end)?;
    let gathered = rows.len();

    let mut ledgers: HashMap<String, AccountLedger> = HashMap::new();
    for row in rows {
        let ledger = ledgers.entry(row.account_id.clone()).or_insert_with(|| AccountLedger {
            balance: Amount::zero(),
            last_settled_transaction: None,
            unsettled_transactions: Vec::new(),
        });

        if row.settled {
            // Rows arrive in createdDate order, so the last settled row
            // seen for an account is the newest one.
            if let Some(balance) = &row.balance {
                ledger.balance = balance.clone();
            }
            ledger.last_settled_transaction = Some(row);
        } else {
            ledger.unsettled_transactions.push(row);
        }
    }

    let accounts_touched = ledgers.len();

    for (account_id, ledger) in ledgers {
        let mut balance = ledger.balance;
        let mut newly_settled: Vec<Transaction> = Vec::new();

        // Phase 2 — fold, strictly sequential per account in createdDate
        // ascending order (already guaranteed by the gather's ordering).
        for mut transaction in ledger.unsettled_transactions {
            let now = store.now();
            let (next_balance, canceled) = if transaction.kind.is_credit() {
                (balance.checked_add(&transaction.amount), false)
            } else {
                let candidate = balance.checked_sub(&transaction.amount);
                if candidate.is_negative() {
                    (balance.clone(), true)
                } else {
                    (candidate, false)
                }
            };

            let update = TransactionSettlement {
                settled: true,
                settled_date: Some(now),
                balance: Some(next_balance.clone()),
                canceled,
            };

            match store.update_transaction_settlement(&transaction.id, update.clone()) {
                Ok(()) => {
                    balance = next_balance;
                    transaction.settled = true;
                    transaction.settled_date = update.settled_date;
                    transaction.balance = update.balance;
                    transaction.canceled = canceled;
                    newly_settled.push(transaction);
                },
                Err(e) => {
                    let masked_amount = mask_amount(&transaction.amount);
                    warn!(
                        account_id = &*account_id, transaction_id = &*transaction.id,
                        amount = masked_amount.as_str(), error:% = e;
                        "settlement: failed to write fold result, row stays unsettled"
                    );
                },
            }
        }

        // Phase 3 — prune.
        prune_shard_keys(store, &account_id, ledger.last_settled_transaction, newly_settled);
    }

    info!(
        target: "audit",
        shard_index = shard_index, shard_count = shard_count, rows_gathered = gathered, accounts_touched = accounts_touched;
        "settlement: tick complete"
    );

    Ok(())
}

fn prune_shard_keys(
    store: &dyn AccountStore,
    account_id: &str,
    last_settled_transaction: Option<Transaction>,
    newly_settled: Vec<Transaction>,
) {
    let mut candidates: Vec<(DateTime<Utc>, String)> = Vec::new();

    if let Some(t) = &last_settled_transaction {
        candidates.push((t.created_date, t.id.clone()));
    }
    for t in &newly_settled {
        if t.settled {
            candidates.push((t.created_date, t.id.clone()));
        }
    }

    if candidates.is_empty() {
        return;
    }

    candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    // Drop the last element: the new latest-settled row retains its key.
    candidates.pop();

    for (_, id) in candidates {
        if let Err(e) = store.clear_settlement_shard_key(&id) {
            info!(account_id = account_id, transaction_id = &*id, error:% = e; "settlement: stale shard key will be re-read next tick");
        }
    }
}

/// Administrative single-row settle. Does not compute balance and does not
/// participate in the fold; calling it on a row still in the unsettled
/// stream corrupts the running-balance invariant (spec.md §9).
pub fn settle_transaction(store: &dyn AccountStore, transaction_id: &str) -> CoreResult<()> {
    let now = store.now();
    store
        .update_transaction_settlement(
            transaction_id,
            TransactionSettlement {
                settled: true,
                settled_date: Some(now),
                balance: None,
                canceled: false,
            },
        )
        .map_err(|_| CoreError::SettleFailed)
}

/// Runs the settlement tick on a timer until a shutdown signal arrives.
/// Grounded on the teacher's `TransactionUnlocker` background task: a
/// `tokio::select!` race between `interval.tick()` and a
/// `broadcast::Receiver<()>`.
pub struct SettlementWorker<S: AccountStore + 'static> {
    store: std::sync::Arc<S>,
    shard_index: u32,
    shard_count: u32,
    tick_interval: Duration,
}

impl<S: AccountStore + 'static> SettlementWorker<S> {
    pub fn new(store: std::sync::Arc<S>, shard_index: u32, shard_count: u32, tick_interval: Duration) -> Self {
        SettlementWorker {
            store,
            shard_index,
            shard_count,
            tick_interval,
        }
    }

    pub fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                shard_index = self.shard_index, shard_count = self.shard_count;
                "settlement worker started"
            );
            let mut ticker = interval(self.tick_interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = run_tick(self.store.as_ref(), self.shard_index, self.shard_count) {
                            error!(shard_index = self.shard_index, error:% = e; "settlement tick aborted");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!(shard_index = self.shard_index; "settlement worker received shutdown signal");
                        break;
                    }
                }
            }
            info!(shard_index = self.shard_index; "settlement worker stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{SignupRequest, signup};
    use crate::ingestor::{BlockchainTransaction, ingest};
    use crate::store::memory::InMemoryStore;
    use crate::store::{NewTransaction, TransactionType};
    use crate::wallet::MockWalletGenerator;

    fn seeded_account(store: &InMemoryStore, username: &str) -> crate::store::Account {
        signup(
            store,
            &MockWalletGenerator::new(),
            3,
            30,
            7,
            50,
            32,
            10,
            SignupRequest {
                username: Some(username.to_string()),
                password: Some("hunter222".to_string()),
            },
        )
        .unwrap()
    }

    #[test]
    fn happy_path_deposit_and_settle() {
        let store = InMemoryStore::new();
        let account = seeded_account(&store, "alice");

        ingest(
            &store,
            &BlockchainTransaction {
                id: "tx1".to_string(),
                sender_id: account.deposit_wallet_address.clone(),
                height: 100,
                amount: Amount::from(500u64),
            },
        )
        .unwrap();

        run_tick(&store, 0, 1).unwrap();

        let deposit = store.read_deposit("tx1").unwrap();
        let transaction = store.read_transaction(&deposit.transaction_id).unwrap();

        assert_eq!(transaction.kind, TransactionType::Deposit);
        assert_eq!(transaction.amount.to_string(), "500");
        assert!(transaction.settled);
        assert!(!transaction.canceled);
        assert_eq!(transaction.balance.unwrap().to_string(), "500");
        assert!(transaction.settlement_shard_key.is_some());
    }

    #[test]
    fn overdraft_is_canceled_without_moving_balance() {
        let store = InMemoryStore::new();
        let account = seeded_account(&store, "alice");

        ingest(
            &store,
            &BlockchainTransaction {
                id: "tx1".to_string(),
                sender_id: account.deposit_wallet_address.clone(),
                height: 100,
                amount: Amount::from(500u64),
            },
        )
        .unwrap();
        run_tick(&store, 0, 1).unwrap();

        let withdrawal = store
            .create_transaction(NewTransaction {
                id: "w1".to_string(),
                account_id: account.id.clone(),
                kind: TransactionType::Withdrawal,
                amount: Amount::from(700u64),
            })
            .unwrap();
        let credit = store
            .create_transaction(NewTransaction {
                id: "c1".to_string(),
                account_id: account.id.clone(),
                kind: TransactionType::Credit,
                amount: Amount::from(200u64),
            })
            .unwrap();

        run_tick(&store, 0, 1).unwrap();

        let withdrawal = store.read_transaction(&withdrawal.id).unwrap();
        let credit = store.read_transaction(&credit.id).unwrap();

        assert!(withdrawal.canceled);
        assert_eq!(withdrawal.balance.unwrap().to_string(), "500");
        assert!(!credit.canceled);
        assert_eq!(credit.balance.unwrap().to_string(), "700");

        assert!(withdrawal.settlement_shard_key.is_none());
        assert!(credit.settlement_shard_key.is_some());
    }

    #[test]
    fn sharded_isolation_leaves_other_shard_untouched() {
        let store = InMemoryStore::new();
        let a = seeded_account(&store, "alice");
        let b = seeded_account(&store, "bob");

        // Find indices that separate the two accounts, regardless of hash.
        let a_key = crate::sharding::shard_key(&a.id);
        let b_key = crate::sharding::shard_key(&b.id);
        let (lo, hi) = if a_key < b_key { (&a, &b) } else { (&b, &a) };

        store
            .create_transaction(NewTransaction {
                id: "ca".to_string(),
                account_id: lo.id.clone(),
                kind: TransactionType::Credit,
                amount: Amount::from(10u64),
            })
            .unwrap();
        store
            .create_transaction(NewTransaction {
                id: "cb".to_string(),
                account_id: hi.id.clone(),
                kind: TransactionType::Credit,
                amount: Amount::from(10u64),
            })
            .unwrap();

        // Shard 0 of 2 covers the lower half of the key space.
        run_tick(&store, 0, 2).unwrap();

        let lo_tx = store.read_transaction("ca").unwrap();
        let hi_tx = store.read_transaction("cb").unwrap();

        assert!(lo_tx.settled);
        assert!(!hi_tx.settled);
        assert!(hi_tx.settlement_shard_key.is_some());
    }

    #[test]
    fn single_transaction_settle_does_not_compute_balance() {
        let store = InMemoryStore::new();
        let account = seeded_account(&store, "alice");
        let transaction = store
            .create_transaction(NewTransaction {
                id: "t1".to_string(),
                account_id: account.id,
                kind: TransactionType::Credit,
                amount: Amount::from(10u64),
            })
            .unwrap();

        settle_transaction(&store, &transaction.id).unwrap();

        let row = store.read_transaction(&transaction.id).unwrap();
        assert!(row.settled);
        assert!(row.balance.is_none());
    }

    #[test]
    fn single_transaction_settle_fails_on_missing_row() {
        let store = InMemoryStore::new();
        let err = settle_transaction(&store, "does-not-exist").unwrap_err();
        assert!(matches!(err, CoreError::SettleFailed));
    }
}
