//! Wallet Allocator: wraps the external blockchain wallet generator.
//!
//! The generator's cryptographic internals are explicitly out of scope
//! (spec.md §1) — only its `{address, passphrase, privateKey, publicKey}`
//! output shape is consumed here, via the [`WalletGenerator`] trait.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedWallet {
    pub address: String,
    pub passphrase: String,
    pub private_key: String,
    pub public_key: String,
}

pub trait WalletGenerator: Send + Sync {
    fn generate(&self) -> GeneratedWallet;
}

/// A UUID-based stand-in for the real blockchain wallet generator, used in
/// tests and for manual CLI operation. Never used to derive real on-chain
/// addresses — the real generator is an external collaborator this core
/// does not own.
pub struct MockWalletGenerator;

impl MockWalletGenerator {
    pub fn new() -> Self {
        MockWalletGenerator
    }
}

impl Default for MockWalletGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl WalletGenerator for MockWalletGenerator {
    fn generate(&self) -> GeneratedWallet {
        GeneratedWallet {
            address: uuid::Uuid::new_v4().to_string(),
            passphrase: uuid::Uuid::new_v4().to_string(),
            private_key: uuid::Uuid::new_v4().to_string(),
            public_key: uuid::Uuid::new_v4().to_string(),
        }
    }
}
