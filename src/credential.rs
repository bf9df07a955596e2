//! Credential Service: signup sanitization + persistence, and login
//! verification.

use log::{info, warn};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::{CoreError, CoreResult, StoreError};
use crate::log::mask_string;
use crate::store::{Account, AccountStore, NewAccount};
use crate::wallet::WalletGenerator;

pub struct SignupRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

fn hash_password(password: &str, salt_hex: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt_hex.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_salt(salt_size: usize) -> String {
    let mut bytes = vec![0u8; salt_size];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Validates and hashes signup credentials, allocates a deposit wallet, and
/// persists the new account. Combines spec.md §4.2 steps 1-9 with the insert
/// itself (Open Question 1: the insert lives inside this core so that a
/// concurrent-signup race is resolved by the store's `UNIQUE` constraints
/// rather than left to the caller).
pub fn signup(
    store: &dyn AccountStore,
    wallet_generator: &dyn WalletGenerator,
    min_username_length: usize,
    max_username_length: usize,
    min_password_length: usize,
    max_password_length: usize,
    salt_size: usize,
    max_wallet_create_attempts: u32,
    request: SignupRequest,
) -> CoreResult<Account> {
    let (username, password) = match (request.username, request.password) {
        (Some(u), Some(p)) => (u, p),
        _ => return Err(CoreError::NoCredentialsProvided),
    };

    let username = username.trim().to_string();
    let username_len = username.chars().count();
    if username_len < min_username_length || username_len > max_username_length {
        return Err(CoreError::InvalidUsername);
    }

    let password_len = password.chars().count();
    if password_len < min_password_length || password_len > max_password_length {
        return Err(CoreError::InvalidPassword);
    }

    let password_salt = generate_salt(salt_size);
    let password_hash = hash_password(&password, &password_salt);

    let existing = store
        .account_by_username(&username)
        .map_err(CoreError::BadAccountLookup)?;
    if existing.is_some() {
        return Err(CoreError::SignUpUsernameTaken);
    }

    let wallet = allocate_deposit_wallet(store, wallet_generator, max_wallet_create_attempts)?;

    let account = store
        .create_account(NewAccount {
            id: uuid::Uuid::new_v4().to_string(),
            username,
            password: password_hash,
            password_salt,
            deposit_wallet_address: wallet.address,
            deposit_wallet_passphrase: wallet.passphrase,
            deposit_wallet_private_key: wallet.private_key,
            deposit_wallet_public_key: wallet.public_key,
        })
        .map_err(map_create_account_error)?;

    let masked_address = mask_string(&account.deposit_wallet_address);
    info!(
        target: "audit",
        account_id = &*account.id, deposit_wallet_address = masked_address.as_str();
        "signup: account created"
    );

    Ok(account)
}

/// Maps a `create_account` failure to the spec.md §7 business error it
/// represents: a losing concurrent signup surfaces `SignUpUsernameTaken`
/// (or `AccountCreate` if the collision is on the wallet address) from the
/// store's `UNIQUE` constraint itself, rather than an untyped
/// `CoreError::Store` passthrough (spec.md §9 Open Question 1).
fn map_create_account_error(err: StoreError) -> CoreError {
    match err {
        StoreError::UniqueViolation(ref field) if field.contains("deposit_wallet_address") => CoreError::AccountCreate,
        StoreError::UniqueViolation(_) => CoreError::SignUpUsernameTaken,
        other => CoreError::Store(other),
    }
}

fn allocate_deposit_wallet(
    store: &dyn AccountStore,
    wallet_generator: &dyn WalletGenerator,
    max_attempts: u32,
) -> CoreResult<crate::wallet::GeneratedWallet> {
    for _ in 0..max_attempts {
        let candidate = wallet_generator.generate();
        let collision = store
            .account_by_deposit_wallet_address(&candidate.address)
            .map_err(CoreError::BadAccountLookup)?;
        if collision.is_none() {
            return Ok(candidate);
        }
    }
    Err(CoreError::AccountCreate)
}

/// Verifies login credentials. Unknown username and wrong password collapse
/// into the same [`CoreError::InvalidCredentials`] kind to avoid an
/// enumeration oracle (spec.md §4.2 step 2, §7).
pub fn verify_login_credentials(store: &dyn AccountStore, username: &str, password: &str) -> CoreResult<Account> {
    let username = username.trim();

    let account = match store.account_by_username(username).map_err(CoreError::BadAccountLookup)? {
        Some(account) => account,
        None => {
            warn!(target: "audit", username = username; "login: unknown username");
            return Err(CoreError::InvalidCredentials);
        },
    };

    if !account.active {
        warn!(target: "audit", account_id = &*account.id; "login: account inactive");
        return Err(CoreError::AccountInactive);
    }

    let expected = hash_password(password, &account.password_salt);
    if expected != account.password {
        warn!(target: "audit", account_id = &*account.id; "login: password mismatch");
        return Err(CoreError::InvalidCredentials);
    }

    info!(target: "audit", account_id = &*account.id; "login: success");
    Ok(account)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use crate::wallet::MockWalletGenerator;

    const MIN_U: usize = 3;
    const MAX_U: usize = 30;
    const MIN_P: usize = 7;
    const MAX_P: usize = 50;
    const SALT: usize = 32;
    const MAX_ATTEMPTS: u32 = 10;

    fn do_signup(store: &InMemoryStore, gen: &MockWalletGenerator, username: &str, password: &str) -> CoreResult<Account> {
        signup(
            store,
            gen,
            MIN_U,
            MAX_U,
            MIN_P,
            MAX_P,
            SALT,
            MAX_ATTEMPTS,
            SignupRequest {
                username: Some(username.to_string()),
                password: Some(password.to_string()),
            },
        )
    }

    #[test]
    fn signup_hashes_password_with_salt() {
        let store = InMemoryStore::new();
        let gen = MockWalletGenerator::new();

        let account = do_signup(&store, &gen, "alice", "hunter222").unwrap();
        assert_eq!(account.password_salt.len(), 64);
        assert_eq!(hash_password("hunter222", &account.password_salt), account.password);
    }

    #[test]
    fn signup_rejects_missing_credentials() {
        let store = InMemoryStore::new();
        let gen = MockWalletGenerator::new();

        let err = signup(
            &store,
            &gen,
            MIN_U,
            MAX_U,
            MIN_P,
            MAX_P,
            SALT,
            MAX_ATTEMPTS,
            SignupRequest {
                username: None,
                password: Some("hunter222".to_string()),
            },
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::NoCredentialsProvided));
    }

    #[test]
    fn signup_rejects_short_username_and_password() {
        let store = InMemoryStore::new();
        let gen = MockWalletGenerator::new();

        let err = do_signup(&store, &gen, "ab", "hunter222").unwrap_err();
        assert!(matches!(err, CoreError::InvalidUsername));

        let err = do_signup(&store, &gen, "alice", "short").unwrap_err();
        assert!(matches!(err, CoreError::InvalidPassword));
    }

    #[test]
    fn username_and_password_bounds_are_counted_in_chars_not_bytes() {
        let store = InMemoryStore::new();
        let gen = MockWalletGenerator::new();

        // 28 multi-byte chars: under the 30-char limit, but its UTF-8
        // encoding is well over 30 bytes.
        let wide_username = "é".repeat(28);
        assert_eq!(wide_username.chars().count(), 28);
        assert!(wide_username.len() > MAX_U);
        let account = do_signup(&store, &gen, &wide_username, "hunter222").unwrap();
        assert_eq!(account.username, wide_username);

        // 31 multi-byte chars: over the 30-char limit regardless of bytes.
        let too_wide_username = "é".repeat(31);
        let err = do_signup(&store, &gen, &too_wide_username, "hunter222b").unwrap_err();
        assert!(matches!(err, CoreError::InvalidUsername));

        // 8 multi-byte chars: under the 7-char minimum password bound from
        // the top, well within the 50-char max despite being 16 bytes.
        let wide_password = "é".repeat(8);
        do_signup(&store, &gen, "bob", &wide_password).unwrap();
    }

    #[test]
    fn map_create_account_error_distinguishes_username_and_wallet_collisions() {
        assert!(matches!(
            map_create_account_error(StoreError::UniqueViolation("username".to_string())),
            CoreError::SignUpUsernameTaken
        ));
        assert!(matches!(
            map_create_account_error(StoreError::UniqueViolation("deposit_wallet_address".to_string())),
            CoreError::AccountCreate
        ));
        assert!(matches!(
            map_create_account_error(StoreError::UniqueViolation("username_or_deposit_wallet_address".to_string())),
            CoreError::SignUpUsernameTaken
        ));
    }

    #[test]
    fn signup_surfaces_username_taken_when_the_insert_itself_collides() {
        // Simulates the race from spec.md §9 Open Question 1: two signups
        // both pass the pre-check, but the second collides at the store's
        // UNIQUE constraint rather than the earlier probe.
        let store = InMemoryStore::new();

        store
            .create_account(crate::store::NewAccount {
                id: "already-there".to_string(),
                username: "alice".to_string(),
                password: "irrelevant".to_string(),
                password_salt: "irrelevant".to_string(),
                deposit_wallet_address: "irrelevant-wallet".to_string(),
                deposit_wallet_passphrase: "irrelevant".to_string(),
                deposit_wallet_private_key: "irrelevant".to_string(),
                deposit_wallet_public_key: "irrelevant".to_string(),
            })
            .unwrap();

        let err = map_create_account_error(
            store
                .create_account(crate::store::NewAccount {
                    id: "racer".to_string(),
                    username: "alice".to_string(),
                    password: "irrelevant".to_string(),
                    password_salt: "irrelevant".to_string(),
                    deposit_wallet_address: "a-different-wallet".to_string(),
                    deposit_wallet_passphrase: "irrelevant".to_string(),
                    deposit_wallet_private_key: "irrelevant".to_string(),
                    deposit_wallet_public_key: "irrelevant".to_string(),
                })
                .unwrap_err(),
        );
        assert!(matches!(err, CoreError::SignUpUsernameTaken));
    }

    #[test]
    fn signup_rejects_duplicate_username() {
        let store = InMemoryStore::new();
        let gen = MockWalletGenerator::new();

        do_signup(&store, &gen, "alice", "hunter222").unwrap();
        let err = do_signup(&store, &gen, "alice", "different").unwrap_err();
        assert!(matches!(err, CoreError::SignUpUsernameTaken));
    }

    #[test]
    fn login_collapses_unknown_user_and_wrong_password() {
        let store = InMemoryStore::new();
        let gen = MockWalletGenerator::new();
        do_signup(&store, &gen, "alice", "hunter222").unwrap();

        let unknown = verify_login_credentials(&store, "bob", "whatever").unwrap_err();
        let wrong_password = verify_login_credentials(&store, "alice", "wrong_pass").unwrap_err();

        assert!(matches!(unknown, CoreError::InvalidCredentials));
        assert!(matches!(wrong_password, CoreError::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong_password.to_string());
    }

    #[test]
    fn login_succeeds_with_correct_password() {
        let store = InMemoryStore::new();
        let gen = MockWalletGenerator::new();
        do_signup(&store, &gen, "alice", "hunter222").unwrap();

        let account = verify_login_credentials(&store, "alice", "hunter222").unwrap();
        assert_eq!(account.username, "alice");
    }

    #[test]
    fn login_rejects_inactive_account() {
        let store = InMemoryStore::new();
        let gen = MockWalletGenerator::new();
        let account = do_signup(&store, &gen, "alice", "hunter222").unwrap();
        store.set_active(&account.id, false);

        let err = verify_login_credentials(&store, "alice", "hunter222").unwrap_err();
        assert!(matches!(err, CoreError::AccountInactive));
    }
}
