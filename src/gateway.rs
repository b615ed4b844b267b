use crate::error::PurchaseError;
use alloy::{
    primitives::Address,
    providers::{
        DynProvider,
        Provider,
    },
};
use async_trait::async_trait;
use tracing::debug;

/// Source of the accounts a purchase may act for.
#[async_trait]
pub trait WalletGateway: Send + Sync {
    async fn request_accounts(&self) -> Result<Vec<Address>, String>;
}

/// A single account whose key is held by this process.
#[derive(Clone, Debug)]
pub struct LocalAccount {
    address: Address,
}

impl LocalAccount {
    pub fn new(address: Address) -> Self {
        Self { address }
    }
}

#[async_trait]
impl WalletGateway for LocalAccount {
    async fn request_accounts(&self) -> Result<Vec<Address>, String> {
        Ok(vec![self.address])
    }
}

/// Accounts unlocked on the node itself, queried with `eth_accounts`.
#[derive(Clone)]
pub struct NodeAccounts {
    provider: DynProvider,
}

impl NodeAccounts {
    pub fn new(provider: DynProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl WalletGateway for NodeAccounts {
    async fn request_accounts(&self) -> Result<Vec<Address>, String> {
        self.provider
            .get_accounts()
            .await
            .map_err(|e| e.to_string())
    }
}

/// Per-caller context carrying the wallet a request acts through.
pub struct Session<W> {
    wallet: Option<W>,
}

impl<W: WalletGateway> Session<W> {
    pub fn new(wallet: W) -> Self {
        Self {
            wallet: Some(wallet),
        }
    }

    pub fn without_wallet() -> Self {
        Self { wallet: None }
    }

    /// Asks the wallet for its accounts and returns the first one.
    pub async fn connected_account(&self) -> Result<Address, PurchaseError> {
        let wallet = self
            .wallet
            .as_ref()
            .ok_or(PurchaseError::WalletUnavailable)?;
        let accounts = wallet
            .request_accounts()
            .await
            .map_err(PurchaseError::WalletRequestFailed)?;
        if accounts.len() > 1 {
            debug!(count = accounts.len(), "wallet exposes several accounts, using the first");
        }
        accounts
            .into_iter()
            .next()
            .ok_or(PurchaseError::WalletNotConnected)
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[tokio::test]
    async fn connected_account__fails_without_wallet() {
        // given
        let session = Session::<LocalAccount>::without_wallet();

        // when
        let result = session.connected_account().await;

        // then
        assert!(matches!(result, Err(PurchaseError::WalletUnavailable)));
    }

    #[tokio::test]
    async fn connected_account__returns_local_address() {
        // given
        let address = Address::repeat_byte(0x11);
        let session = Session::new(LocalAccount::new(address));

        // when
        let result = session.connected_account().await.unwrap();

        // then
        assert_eq!(result, address);
    }
}
