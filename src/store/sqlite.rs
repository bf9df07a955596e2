//! SQLite-backed [`super::AccountStore`] implementation.
//!
//! Follows the teacher's `db/accounts.rs` idiom: a pooled `r2d2` connection,
//! prepared/cached statements, `named_params!`, and uniqueness enforced by
//! SQL `UNIQUE` constraints rather than hand-rolled pre-checks.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use log::{debug, info};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, named_params};
use rusqlite_migration::{M, Migrations};

use crate::amount::Amount;
use crate::error::{StoreError, StoreResult};
use crate::sharding::{in_range, shard_key};
use crate::store::{
    Account, AccountStore, Deposit, NewAccount, NewDeposit, NewTransaction, Transaction, TransactionSettlement,
    TransactionType,
};

pub type Pool = r2d2::Pool<SqliteConnectionManager>;

fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        r#"
        CREATE TABLE accounts (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            password TEXT NOT NULL,
            password_salt TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            created_date TEXT NOT NULL,
            deposit_wallet_address TEXT NOT NULL UNIQUE,
            deposit_wallet_passphrase TEXT NOT NULL,
            deposit_wallet_private_key TEXT NOT NULL,
            deposit_wallet_public_key TEXT NOT NULL
        );

        CREATE TABLE deposits (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL REFERENCES accounts(id),
            transaction_id TEXT NOT NULL,
            height INTEGER NOT NULL,
            created_date TEXT NOT NULL
        );

        CREATE TABLE transactions (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL REFERENCES accounts(id),
            kind TEXT NOT NULL,
            amount TEXT NOT NULL,
            created_date TEXT NOT NULL,
            settled INTEGER NOT NULL DEFAULT 0,
            settled_date TEXT,
            balance TEXT,
            canceled INTEGER NOT NULL DEFAULT 0,
            settlement_shard_key TEXT
        );

        CREATE INDEX idx_transactions_account_id ON transactions(account_id);
        CREATE INDEX idx_transactions_shard_key ON transactions(settlement_shard_key);
        "#,
    )])
}

/// Opens (creating if necessary) a SQLite database at `path` and runs
/// migrations, returning a pooled store.
pub fn open(path: &Path) -> StoreResult<SqliteStore> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let manager = SqliteConnectionManager::file(path);
    let pool = r2d2::Pool::new(manager)?;

    {
        let mut conn = pool.get()?;
        migrations().to_latest(&mut conn)?;
    }

    info!(path:% = path.display(); "Opened ledger store");
    Ok(SqliteStore { pool })
}

pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    fn conn(&self) -> StoreResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }
}

/// Maps a SQLite `UNIQUE` constraint failure to `StoreError::UniqueViolation`,
/// naming the actual column that was violated (SQLite's own message is
/// `UNIQUE constraint failed: table.column`) so callers can distinguish which
/// uniqueness rule was broken rather than a generic label for the whole
/// statement.
fn map_unique_violation(err: rusqlite::Error, fallback_field: &str) -> StoreError {
    if let rusqlite::Error::SqliteFailure(ref e, ref message) = err {
        if e.code == rusqlite::ErrorCode::ConstraintViolation {
            let field = message
                .as_deref()
                .and_then(|m| m.rsplit_once('.'))
                .map(|(_, column)| column.to_string())
                .unwrap_or_else(|| fallback_field.to_string());
            return StoreError::UniqueViolation(field);
        }
    }
    StoreError::Rusqlite(err)
}

fn read_account_row(conn: &Connection, id: &str) -> StoreResult<Option<Account>> {
    let mut stmt = conn.prepare_cached(
        r#"
        SELECT id, username, password, password_salt, active, created_date,
               deposit_wallet_address, deposit_wallet_passphrase,
               deposit_wallet_private_key, deposit_wallet_public_key
        FROM accounts WHERE id = :id
        "#,
    )?;

    stmt.query_row(named_params! { ":id": id }, account_from_row)
        .optional()
        .map_err(StoreError::from)
}

fn account_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get("id")?,
        username: row.get("username")?,
        password: row.get("password")?,
        password_salt: row.get("password_salt")?,
        active: row.get("active")?,
        created_date: row.get("created_date")?,
        deposit_wallet_address: row.get("deposit_wallet_address")?,
        deposit_wallet_passphrase: row.get("deposit_wallet_passphrase")?,
        deposit_wallet_private_key: row.get("deposit_wallet_private_key")?,
        deposit_wallet_public_key: row.get("deposit_wallet_public_key")?,
    })
}

fn deposit_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Deposit> {
    Ok(Deposit {
        id: row.get("id")?,
        account_id: row.get("account_id")?,
        transaction_id: row.get("transaction_id")?,
        height: row.get("height")?,
        created_date: row.get("created_date")?,
    })
}

fn transaction_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Transaction> {
    let kind_str: String = row.get("kind")?;
    let kind = TransactionType::from_str(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, format!("unknown transaction kind: {kind_str}").into())
    })?;

    Ok(Transaction {
        id: row.get("id")?,
        account_id: row.get("account_id")?,
        kind,
        amount: row.get("amount")?,
        created_date: row.get("created_date")?,
        settled: row.get("settled")?,
        settled_date: row.get("settled_date")?,
        balance: row.get("balance")?,
        canceled: row.get("canceled")?,
        settlement_shard_key: row.get("settlement_shard_key")?,
    })
}

impl AccountStore for SqliteStore {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn create_account(&self, account: NewAccount) -> StoreResult<Account> {
        let conn = self.conn()?;
        let now = Utc::now();

        debug!(account_id = &*account.id; "store: creating account");

        conn.execute(
            r#"
            INSERT INTO accounts (
                id, username, password, password_salt, active, created_date,
                deposit_wallet_address, deposit_wallet_passphrase,
                deposit_wallet_private_key, deposit_wallet_public_key
            ) VALUES (
                :id, :username, :password, :password_salt, 1, :created_date,
                :deposit_wallet_address, :deposit_wallet_passphrase,
                :deposit_wallet_private_key, :deposit_wallet_public_key
            )
            "#,
            named_params! {
                ":id": account.id,
                ":username": account.username,
                ":password": account.password,
                ":password_salt": account.password_salt,
                ":created_date": now,
                ":deposit_wallet_address": account.deposit_wallet_address,
                ":deposit_wallet_passphrase": account.deposit_wallet_passphrase,
                ":deposit_wallet_private_key": account.deposit_wallet_private_key,
                ":deposit_wallet_public_key": account.deposit_wallet_public_key,
            },
        )
        .map_err(|e| map_unique_violation(e, "username_or_deposit_wallet_address"))?;

        read_account_row(&conn, &account.id)?.ok_or(StoreError::NotFound)
    }

    fn read_account(&self, id: &str) -> StoreResult<Account> {
        let conn = self.conn()?;
        read_account_row(&conn, id)?.ok_or(StoreError::NotFound)
    }

    fn account_by_username(&self, username: &str) -> StoreResult<Option<Account>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            r#"
            SELECT id, username, password, password_salt, active, created_date,
                   deposit_wallet_address, deposit_wallet_passphrase,
                   deposit_wallet_private_key, deposit_wallet_public_key
            FROM accounts WHERE username = :username
            "#,
        )?;
        stmt.query_row(named_params! { ":username": username }, account_from_row)
            .optional()
            .map_err(StoreError::from)
    }

    fn account_by_deposit_wallet_address(&self, address: &str) -> StoreResult<Option<Account>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            r#"
            SELECT id, username, password, password_salt, active, created_date,
                   deposit_wallet_address, deposit_wallet_passphrase,
                   deposit_wallet_private_key, deposit_wallet_public_key
            FROM accounts WHERE deposit_wallet_address = :address
            "#,
        )?;
        stmt.query_row(named_params! { ":address": address }, account_from_row)
            .optional()
            .map_err(StoreError::from)
    }

    fn create_deposit(&self, deposit: NewDeposit) -> StoreResult<Deposit> {
        let conn = self.conn()?;
        let now = Utc::now();

        conn.execute(
            r#"
            INSERT INTO deposits (id, account_id, transaction_id, height, created_date)
            VALUES (:id, :account_id, :transaction_id, :height, :created_date)
            "#,
            named_params! {
                ":id": deposit.id,
                ":account_id": deposit.account_id,
                ":transaction_id": deposit.transaction_id,
                ":height": deposit.height,
                ":created_date": now,
            },
        )
        .map_err(|e| map_unique_violation(e, "deposit.id"))?;

        let mut stmt = conn.prepare_cached(
            "SELECT id, account_id, transaction_id, height, created_date FROM deposits WHERE id = :id",
        )?;
        stmt.query_row(named_params! { ":id": deposit.id }, deposit_from_row)
            .map_err(StoreError::from)
    }

    fn read_deposit(&self, id: &str) -> StoreResult<Deposit> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, account_id, transaction_id, height, created_date FROM deposits WHERE id = :id",
        )?;
        stmt.query_row(named_params! { ":id": id }, deposit_from_row)
            .optional()?
            .ok_or(StoreError::NotFound)
    }

    fn create_transaction(&self, transaction: NewTransaction) -> StoreResult<Transaction> {
        let conn = self.conn()?;
        let now = Utc::now();
        let shard_key = shard_key(&transaction.account_id);

        conn.execute(
            r#"
            INSERT INTO transactions (
                id, account_id, kind, amount, created_date, settled,
                settled_date, balance, canceled, settlement_shard_key
            ) VALUES (
                :id, :account_id, :kind, :amount, :created_date, 0,
                NULL, NULL, 0, :shard_key
            )
            "#,
            named_params! {
                ":id": transaction.id,
                ":account_id": transaction.account_id,
                ":kind": transaction.kind.as_str(),
                ":amount": transaction.amount,
                ":created_date": now,
                ":shard_key": shard_key,
            },
        )?;

        let mut stmt = conn.prepare_cached(
            r#"
            SELECT id, account_id, kind, amount, created_date, settled,
                   settled_date, balance, canceled, settlement_shard_key
            FROM transactions WHERE id = :id
            "#,
        )?;
        stmt.query_row(named_params! { ":id": transaction.id }, transaction_from_row)
            .map_err(StoreError::from)
    }

    fn read_transaction(&self, id: &str) -> StoreResult<Transaction> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            r#"
            SELECT id, account_id, kind, amount, created_date, settled,
                   settled_date, balance, canceled, settlement_shard_key
            FROM transactions WHERE id = :id
            "#,
        )?;
        stmt.query_row(named_params! { ":id": id }, transaction_from_row)
            .optional()?
            .ok_or(StoreError::NotFound)
    }

    fn update_transaction_settlement(&self, id: &str, update: TransactionSettlement) -> StoreResult<()> {
        let conn = self.conn()?;
        let rows = conn.execute(
            r#"
            UPDATE transactions
            SET settled = :settled, settled_date = :settled_date, balance = :balance, canceled = :canceled
            WHERE id = :id
            "#,
            named_params! {
                ":id": id,
                ":settled": update.settled,
                ":settled_date": update.settled_date,
                ":balance": update.balance,
                ":canceled": update.canceled,
            },
        )?;

        if rows == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    fn clear_settlement_shard_key(&self, id: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE transactions SET settlement_shard_key = NULL WHERE id = :id",
            named_params! { ":id": id },
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    fn transactions_in_shard_range(&self, start: &str, end: &str) -> StoreResult<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            r#"
            SELECT id, account_id, kind, amount, created_date, settled,
                   settled_date, balance, canceled, settlement_shard_key
            FROM transactions
            WHERE settlement_shard_key IS NOT NULL
              AND settlement_shard_key >= :start
              AND settlement_shard_key <= :end
            ORDER BY created_date ASC, id ASC
            "#,
        )?;

        let rows = stmt.query_map(named_params! { ":start": start, ":end": end }, transaction_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            let row = row?;
            if row
                .settlement_shard_key
                .as_deref()
                .is_some_and(|key| in_range(key, start, end))
            {
                out.push(row);
            }
        }
        Ok(out)
    }
}
