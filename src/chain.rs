use crate::{
    BoosterType,
    contracts::{
        IBoosterSale::{
            self,
            IBoosterSaleInstance,
        },
        IBoosterToken::{
            self,
            IBoosterTokenInstance,
        },
        ICardNft::{
            self,
            ICardNftInstance,
        },
    },
    error::ChainError,
};
use alloy::{
    network::{
        Ethereum,
        ReceiptResponse,
    },
    primitives::{
        Address,
        TxHash,
        U256,
    },
    providers::{
        DynProvider,
        PendingTransactionBuilder,
    },
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{
    debug,
    info,
};

pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_REQUIRED_CONFIRMATIONS: u64 = 1;

#[async_trait]
pub trait TokenContract: Send + Sync {
    async fn allowance(&self, owner: Address, spender: Address) -> Result<U256, ChainError>;

    /// Submits an approval and waits for it to be confirmed.
    async fn approve(
        &self,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError>;

    async fn balance_of(&self, account: Address) -> Result<U256, ChainError>;
}

#[async_trait]
pub trait BoosterContract: Send + Sync {
    fn address(&self) -> Address;

    async fn booster_price(&self, booster_type: &BoosterType) -> Result<U256, ChainError>;

    /// Submits the purchase and waits for it to be confirmed.
    async fn purchase_booster(
        &self,
        buyer: Address,
        booster_type: &BoosterType,
    ) -> Result<TxHash, ChainError>;

    /// Cards produced by the buyer's most recent purchase.
    async fn last_purchased_cards(&self, buyer: Address) -> Result<Vec<U256>, ChainError>;
}

#[async_trait]
pub trait NftContract: Send + Sync {
    /// Submits a batch mint and waits for it to be confirmed.
    async fn mint_batch(
        &self,
        to: Address,
        ids: &[U256],
        uris: &[String],
    ) -> Result<TxHash, ChainError>;
}

#[derive(Clone, Copy, Debug)]
pub struct ConfirmationPolicy {
    pub timeout: Duration,
    pub confirmations: u64,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            confirmations: DEFAULT_REQUIRED_CONFIRMATIONS,
        }
    }
}

impl ConfirmationPolicy {
    async fn confirm(
        &self,
        method: &'static str,
        pending: PendingTransactionBuilder<Ethereum>,
    ) -> Result<TxHash, ChainError> {
        let tx_hash = *pending.tx_hash();
        debug!(%method, %tx_hash, timeout = ?self.timeout, "waiting for confirmation");
        let receipt = tokio::time::timeout(
            self.timeout,
            pending
                .with_required_confirmations(self.confirmations)
                .get_receipt(),
        )
        .await
        .map_err(|_| ChainError::Timeout {
            method,
            tx_hash,
            waited: self.timeout,
        })?
        .map_err(|e| ChainError::call_failed(method, e))?;
        if !receipt.status() {
            return Err(ChainError::Reverted { method, tx_hash });
        }
        info!(%method, %tx_hash, "transaction confirmed");
        Ok(receipt.transaction_hash())
    }
}

/// Contract addresses of one deployment.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ContractAddresses {
    pub token: Address,
    pub booster: Address,
    pub nft: Address,
}

pub struct TokenHandle {
    instance: IBoosterTokenInstance<DynProvider>,
    policy: ConfirmationPolicy,
}

pub struct BoosterHandle {
    instance: IBoosterSaleInstance<DynProvider>,
    policy: ConfirmationPolicy,
}

pub struct NftHandle {
    instance: ICardNftInstance<DynProvider>,
    policy: ConfirmationPolicy,
}

/// Binds the three game contracts to a single provider.
pub fn bind_contracts(
    provider: DynProvider,
    addresses: ContractAddresses,
    policy: ConfirmationPolicy,
) -> (TokenHandle, BoosterHandle, NftHandle) {
    let token = TokenHandle {
        instance: IBoosterToken::new(addresses.token, provider.clone()),
        policy,
    };
    let booster = BoosterHandle {
        instance: IBoosterSale::new(addresses.booster, provider.clone()),
        policy,
    };
    let nft = NftHandle {
        instance: ICardNft::new(addresses.nft, provider),
        policy,
    };
    (token, booster, nft)
}

#[async_trait]
impl TokenContract for TokenHandle {
    async fn allowance(&self, owner: Address, spender: Address) -> Result<U256, ChainError> {
        self.instance
            .allowance(owner, spender)
            .call()
            .await
            .map_err(|e| ChainError::call_failed("allowance", e))
    }

    async fn approve(
        &self,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError> {
        let pending = self
            .instance
            .approve(spender, amount)
            .from(owner)
            .send()
            .await
            .map_err(|e| ChainError::call_failed("approve", e))?;
        self.policy.confirm("approve", pending).await
    }

    async fn balance_of(&self, account: Address) -> Result<U256, ChainError> {
        self.instance
            .balanceOf(account)
            .call()
            .await
            .map_err(|e| ChainError::call_failed("balanceOf", e))
    }
}

#[async_trait]
impl BoosterContract for BoosterHandle {
    fn address(&self) -> Address {
        *self.instance.address()
    }

    async fn booster_price(&self, booster_type: &BoosterType) -> Result<U256, ChainError> {
        self.instance
            .getBoosterPrice(booster_type.to_string())
            .call()
            .await
            .map_err(|e| ChainError::call_failed("getBoosterPrice", e))
    }

    async fn purchase_booster(
        &self,
        buyer: Address,
        booster_type: &BoosterType,
    ) -> Result<TxHash, ChainError> {
        let pending = self
            .instance
            .purchaseBooster(booster_type.to_string())
            .from(buyer)
            .send()
            .await
            .map_err(|e| ChainError::call_failed("purchaseBooster", e))?;
        self.policy.confirm("purchaseBooster", pending).await
    }

    async fn last_purchased_cards(&self, buyer: Address) -> Result<Vec<U256>, ChainError> {
        self.instance
            .getLastPurchasedCards()
            .from(buyer)
            .call()
            .await
            .map_err(|e| ChainError::call_failed("getLastPurchasedCards", e))
    }
}

#[async_trait]
impl NftContract for NftHandle {
    async fn mint_batch(
        &self,
        to: Address,
        ids: &[U256],
        uris: &[String],
    ) -> Result<TxHash, ChainError> {
        let pending = self
            .instance
            .mintBatch(to, ids.to_vec(), uris.to_vec())
            .from(to)
            .send()
            .await
            .map_err(|e| ChainError::call_failed("mintBatch", e))?;
        self.policy.confirm("mintBatch", pending).await
    }
}
