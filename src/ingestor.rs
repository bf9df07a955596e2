//! Deposit Ingestor: idempotent materialization of a [`BlockchainTransaction`]
//! into a `(Deposit, Transaction)` pair.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::error::{CoreError, CoreResult};
use crate::log::mask_string;
use crate::store::{AccountStore, Deposit, NewDeposit, NewTransaction, Transaction, TransactionType};

/// Input event from the blockchain observer. Out of scope: the observer
/// itself (spec.md §1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockchainTransaction {
    pub id: String,
    pub sender_id: String,
    pub height: i64,
    pub amount: Amount,
}

#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    pub deposit: Option<Deposit>,
    pub transaction: Option<Transaction>,
}

/// Ingests one [`BlockchainTransaction`], per spec.md §4.3.
///
/// Idempotency key: `Deposit.id = BlockchainTransaction.id`. Replaying the
/// same input any number of times returns the same `(Deposit.id,
/// Transaction.id)` pair without altering stored state.
pub fn ingest(store: &dyn AccountStore, b: &BlockchainTransaction) -> CoreResult<IngestOutcome> {
    let account = match store.account_by_deposit_wallet_address(&b.sender_id)? {
        Some(account) => account,
        // Not ours — benign.
        None => return Ok(IngestOutcome::default()),
    };

    let transaction_id = uuid::Uuid::new_v4().to_string();

    match store.create_deposit(NewDeposit {
        id: b.id.clone(),
        account_id: account.id.clone(),
        transaction_id: transaction_id.clone(),
        height: b.height,
    }) {
        Ok(deposit) => {
            let transaction = create_deposit_transaction(store, &deposit.account_id, &deposit.transaction_id, b)?;
            info!(
                target: "audit",
                account_id = &*account.id, deposit_id = &*deposit.id, transaction_id = &*transaction.id;
                "ingest: deposit materialized"
            );
            Ok(IngestOutcome {
                deposit: Some(deposit),
                transaction: Some(transaction),
            })
        },
        Err(insert_err) => {
            // Presumed uniqueness violation on Deposit.id: this transaction
            // has been seen before (or crashed mid-way through ingestion).
            let existing_deposit = store.read_deposit(&b.id).map_err(|read_err| {
                CoreError::DepositIngestFatal(format!(
                    "deposit insert failed ({insert_err}) and the existing deposit could not be read ({read_err})"
                ))
            })?;

            match store.read_transaction(&existing_deposit.transaction_id) {
                Ok(transaction) => {
                    let masked_sender = mask_string(&b.sender_id);
                    debug!(
                        deposit_id = &*existing_deposit.id, sender_id = masked_sender.as_str();
                        "ingest: replay of already-materialized deposit, no-op"
                    );
                    Ok(IngestOutcome {
                        deposit: Some(existing_deposit),
                        transaction: Some(transaction),
                    })
                },
                Err(_) => {
                    // Dangling-deposit crash recovery: a past crash happened
                    // between the Deposit insert and the Transaction insert.
                    // Adopt the deposit's own transactionId rather than
                    // minting a fresh one.
                    let transaction = create_deposit_transaction(
                        store,
                        &existing_deposit.account_id,
                        &existing_deposit.transaction_id,
                        b,
                    )?;
                    info!(
                        target: "audit",
                        deposit_id = &*existing_deposit.id, transaction_id = &*transaction.id;
                        "ingest: recovered dangling deposit from a prior crash"
                    );
                    Ok(IngestOutcome {
                        deposit: Some(existing_deposit),
                        transaction: Some(transaction),
                    })
                },
            }
        },
    }
}

fn create_deposit_transaction(
    store: &dyn AccountStore,
    account_id: &str,
    transaction_id: &str,
    b: &BlockchainTransaction,
) -> CoreResult<Transaction> {
    let transaction = store.create_transaction(NewTransaction {
        id: transaction_id.to_string(),
        account_id: account_id.to_string(),
        kind: TransactionType::Deposit,
        amount: b.amount.clone(),
    })?;
    Ok(transaction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{SignupRequest, signup};
    use crate::store::memory::InMemoryStore;
    use crate::wallet::MockWalletGenerator;

    fn seeded_account(store: &InMemoryStore) -> crate::store::Account {
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
                username: Some("alice".to_string()),
                password: Some("hunter222".to_string()),
            },
        )
        .unwrap()
    }

    #[test]
    fn ingesting_unknown_sender_is_benign() {
        let store = InMemoryStore::new();
        let outcome = ingest(
            &store,
            &BlockchainTransaction {
                id: "tx1".to_string(),
                sender_id: "not-a-wallet".to_string(),
                height: 100,
                amount: Amount::from(500u64),
            },
        )
        .unwrap();

        assert!(outcome.deposit.is_none());
        assert!(outcome.transaction.is_none());
    }

    #[test]
    fn happy_path_creates_deposit_and_transaction() {
        let store = InMemoryStore::new();
        let account = seeded_account(&store);

        let outcome = ingest(
            &store,
            &BlockchainTransaction {
                id: "tx1".to_string(),
                sender_id: account.deposit_wallet_address.clone(),
                height: 100,
                amount: Amount::from(500u64),
            },
        )
        .unwrap();

        let deposit = outcome.deposit.unwrap();
        let transaction = outcome.transaction.unwrap();
        assert_eq!(deposit.id, "tx1");
        assert_eq!(transaction.kind, TransactionType::Deposit);
        assert_eq!(transaction.amount.to_string(), "500");
        assert!(!transaction.settled);
    }

    #[test]
    fn replaying_the_same_input_is_idempotent() {
        let store = InMemoryStore::new();
        let account = seeded_account(&store);
        let b = BlockchainTransaction {
            id: "tx1".to_string(),
            sender_id: account.deposit_wallet_address.clone(),
            height: 100,
            amount: Amount::from(500u64),
        };

        let first = ingest(&store, &b).unwrap();
        let second = ingest(&store, &b).unwrap();
        let third = ingest(&store, &b).unwrap();

        assert_eq!(first.deposit.unwrap().id, second.deposit.clone().unwrap().id);
        assert_eq!(second.deposit.unwrap().id, third.deposit.clone().unwrap().id);
        assert_eq!(
            first.transaction.as_ref().map(|t| &t.id),
            second.transaction.as_ref().map(|t| &t.id)
        );
        assert_eq!(
            second.transaction.as_ref().map(|t| &t.id),
            third.transaction.as_ref().map(|t| &t.id)
        );
    }

    #[test]
    fn recovers_from_dangling_deposit_without_transaction() {
        let store = InMemoryStore::new();
        let account = seeded_account(&store);

        // Simulate a crash between Deposit insert and Transaction insert:
        // pre-seed a Deposit whose transactionId has no matching row.
        store
            .create_deposit(NewDeposit {
                id: "tx2".to_string(),
                account_id: account.id.clone(),
                transaction_id: "T2".to_string(),
                height: 50,
            })
            .unwrap();

        let outcome = ingest(
            &store,
            &BlockchainTransaction {
                id: "tx2".to_string(),
                sender_id: account.deposit_wallet_address.clone(),
                height: 50,
                amount: Amount::from(50u64),
            },
        )
        .unwrap();

        let transaction = outcome.transaction.unwrap();
        assert_eq!(transaction.id, "T2");
        assert_eq!(transaction.kind, TransactionType::Deposit);
        assert_eq!(transaction.amount.to_string(), "50");
    }
}
