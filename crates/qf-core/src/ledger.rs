//! The transport seam: everything the client needs from the network.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// Raw account as returned by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub lamports: u64,
    /// Program that owns the account.
    pub owner: [u8; 32],
    pub data: Vec<u8>,
}

/// Ledger transport used by the reader and the workflows.
///
/// Implementations must not retry `send_transaction` on their own.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// `Ok(None)` when no account lives at `address`.
    async fn get_account(&self, address: &[u8; 32]) -> Result<Option<AccountSnapshot>>;

    async fn get_latest_blockhash(&self) -> Result<[u8; 32]>;

    async fn get_minimum_balance_for_rent_exemption(&self, space: usize) -> Result<u64>;

    /// Submit signed wire bytes and return the transaction signature (base58).
    async fn send_transaction(&self, wire: &[u8]) -> Result<String>;

    /// Wait until `signature` reaches the configured commitment.
    async fn confirm_transaction(&self, signature: &str) -> Result<()>;
}

#[async_trait]
impl<T: Ledger + ?Sized> Ledger for Arc<T> {
    async fn get_account(&self, address: &[u8; 32]) -> Result<Option<AccountSnapshot>> {
        (**self).get_account(address).await
    }

    async fn get_latest_blockhash(&self) -> Result<[u8; 32]> {
        (**self).get_latest_blockhash().await
    }

    async fn get_minimum_balance_for_rent_exemption(&self, space: usize) -> Result<u64> {
        (**self).get_minimum_balance_for_rent_exemption(space).await
    }

    async fn send_transaction(&self, wire: &[u8]) -> Result<String> {
        (**self).send_transaction(wire).await
    }

    async fn confirm_transaction(&self, signature: &str) -> Result<()> {
        (**self).confirm_transaction(signature).await
    }
}
