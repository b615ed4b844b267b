//! Booster purchase flow: buy a booster on chain, mint the resulting cards,
//! then tell the backend about them.

use crate::{
    BoosterType,
    backend_client::{
        DEFAULT_SYNC_TIMEOUT,
        MintSync,
        ReconciliationBackend,
    },
    chain::{
        BoosterContract,
        NftContract,
        TokenContract,
    },
    error::{
        PurchaseError,
        PurchaseStep,
        SyncError,
    },
    gateway::{
        Session,
        WalletGateway,
    },
};
use alloy::primitives::{
    Address,
    TxHash,
    U256,
};
use futures::TryFutureExt;
use serde::{
    Serialize,
    Serializer,
};
use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        Mutex,
        PoisonError,
    },
    time::Duration,
};
use tokio::sync::{
    Mutex as AsyncMutex,
    OwnedMutexGuard,
};
use tracing::{
    debug,
    info,
    warn,
};

pub const DEFAULT_METADATA_URI: &str = "http://localhost:3000/api/metadata/{id}";
const ID_PLACEHOLDER: &str = "{id}";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PurchaseStage {
    Idle,
    ResolvingWallet,
    CheckingAllowance,
    Approving,
    Purchasing,
    ReadingCards,
    Minting,
    Syncing,
    Done,
    Failed,
}

impl fmt::Display for PurchaseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Outcome of reporting minted cards to the backend.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum BackendSync {
    Synced,
    Failed { reason: String },
    Skipped,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResult {
    pub success: bool,
    pub booster_type: BoosterType,
    pub card_ids: Vec<String>,
    /// Hash of the confirmed mint transaction.
    pub transaction_hash: TxHash,
    pub backend_sync: BackendSync,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceCheck {
    pub has_enough: bool,
    #[serde(serialize_with = "decimal")]
    pub balance: U256,
    #[serde(serialize_with = "decimal")]
    pub price: U256,
}

fn decimal<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// URL template turning a card id into its metadata URI.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MetadataTemplate(String);

impl MetadataTemplate {
    /// A template without an `{id}` placeholder is treated as a base URL.
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        if template.contains(ID_PLACEHOLDER) {
            Self(template)
        } else {
            Self(format!(
                "{}/{ID_PLACEHOLDER}",
                template.trim_end_matches('/')
            ))
        }
    }

    pub fn uri_for(&self, card_id: &U256) -> String {
        self.0.replace(ID_PLACEHOLDER, &card_id.to_string())
    }
}

impl Default for MetadataTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_METADATA_URI)
    }
}

/// One async lock per account, dropped from the map once nobody holds or awaits it.
#[derive(Default)]
struct AccountLocks {
    inner: Mutex<HashMap<Address, Arc<AsyncMutex<()>>>>,
}

impl AccountLocks {
    async fn acquire(&self, account: Address) -> AccountGuard<'_> {
        let lock = {
            let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(account).or_default().clone()
        };
        AccountGuard {
            locks: self,
            account,
            guard: Some(lock.lock_owned().await),
        }
    }

    fn release(&self, account: Address) {
        let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // The map's own handle is the only one left when count is 1.
        if locks
            .get(&account)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&account);
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

struct AccountGuard<'a> {
    locks: &'a AccountLocks,
    account: Address,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for AccountGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(self.account);
    }
}

pub struct PurchaseService<T, B, N, R> {
    token: T,
    booster: B,
    nft: N,
    backend: Option<R>,
    metadata: MetadataTemplate,
    sync_timeout: Duration,
    locks: AccountLocks,
}

impl<T, B, N, R> PurchaseService<T, B, N, R>
where
    T: TokenContract,
    B: BoosterContract,
    N: NftContract,
    R: ReconciliationBackend,
{
    pub fn new(token: T, booster: B, nft: N, metadata: MetadataTemplate) -> Self {
        Self {
            token,
            booster,
            nft,
            backend: None,
            metadata,
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
            locks: AccountLocks::default(),
        }
    }

    pub fn with_backend(mut self, backend: R) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Upper bound on the backend report; past it the sync counts as failed.
    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    /// Buys a booster and mints its cards to the connected account.
    ///
    /// Every chain call is attempted once and awaited before the next one is
    /// made. Purchases from the same account are serialized so the "last
    /// purchased" read always belongs to this call's purchase. Reporting to
    /// the backend happens after the mint is confirmed and its failure only
    /// shows up in [`PurchaseResult::backend_sync`].
    pub async fn purchase_booster_and_mint<W: WalletGateway>(
        &self,
        session: &Session<W>,
        booster_type: &BoosterType,
    ) -> Result<PurchaseResult, PurchaseError> {
        let mut stage = PurchaseStage::Idle;
        let outcome = self
            .run_purchase(session, booster_type, &mut stage)
            .await;
        if let Err(e) = &outcome {
            warn!(%booster_type, failed_at = %stage, error = %e, "booster purchase failed");
            transition(&mut stage, PurchaseStage::Failed);
        }
        outcome
    }

    async fn run_purchase<W: WalletGateway>(
        &self,
        session: &Session<W>,
        booster_type: &BoosterType,
        stage: &mut PurchaseStage,
    ) -> Result<PurchaseResult, PurchaseError> {
        transition(stage, PurchaseStage::ResolvingWallet);
        let owner = session.connected_account().await?;
        info!(%owner, %booster_type, "starting booster purchase");

        let (card_ids, mint_tx) = {
            let _guard = self.locks.acquire(owner).await;
            self.purchase_and_mint_locked(owner, booster_type, stage)
                .await?
        };

        transition(stage, PurchaseStage::Syncing);
        let backend_sync = self.sync_backend(owner, &card_ids, mint_tx).await;

        transition(stage, PurchaseStage::Done);
        Ok(PurchaseResult {
            success: true,
            booster_type: booster_type.clone(),
            card_ids,
            transaction_hash: mint_tx,
            backend_sync,
        })
    }

    async fn purchase_and_mint_locked(
        &self,
        owner: Address,
        booster_type: &BoosterType,
        stage: &mut PurchaseStage,
    ) -> Result<(Vec<String>, TxHash), PurchaseError> {
        transition(stage, PurchaseStage::CheckingAllowance);
        let spender = self.booster.address();
        let price = self
            .booster
            .booster_price(booster_type)
            .await
            .map_err(PurchaseError::at(PurchaseStep::ReadPrice))?;
        let allowance = self
            .token
            .allowance(owner, spender)
            .await
            .map_err(PurchaseError::at(PurchaseStep::ReadAllowance))?;
        debug!(%price, %allowance, "checked allowance");

        if allowance < price {
            transition(stage, PurchaseStage::Approving);
            let approve_tx = self
                .token
                .approve(owner, spender, U256::MAX)
                .await
                .map_err(PurchaseError::at(PurchaseStep::Approve))?;
            info!(%approve_tx, "token spending approved");
        }

        transition(stage, PurchaseStage::Purchasing);
        let purchase_tx = self
            .booster
            .purchase_booster(owner, booster_type)
            .await
            .map_err(PurchaseError::at(PurchaseStep::Purchase))?;
        info!(%purchase_tx, %booster_type, "booster purchased");

        transition(stage, PurchaseStage::ReadingCards);
        let ids = self
            .booster
            .last_purchased_cards(owner)
            .await
            .map_err(PurchaseError::at(PurchaseStep::ReadCards))?;
        let uris: Vec<String> = ids.iter().map(|id| self.metadata.uri_for(id)).collect();

        transition(stage, PurchaseStage::Minting);
        let mint_tx = self
            .nft
            .mint_batch(owner, &ids, &uris)
            .await
            .map_err(PurchaseError::at(PurchaseStep::Mint))?;
        info!(%mint_tx, cards = ids.len(), "cards minted");

        Ok((ids.iter().map(U256::to_string).collect(), mint_tx))
    }

    async fn sync_backend(
        &self,
        owner: Address,
        card_ids: &[String],
        mint_tx: TxHash,
    ) -> BackendSync {
        let Some(backend) = &self.backend else {
            debug!("no backend configured, skipping sync");
            return BackendSync::Skipped;
        };
        let payload = MintSync {
            wallet_address: owner,
            card_ids: card_ids.to_vec(),
            tx_hash: mint_tx,
        };
        let outcome = tokio::time::timeout(self.sync_timeout, backend.sync_minted(&payload))
            .await
            .unwrap_or(Err(SyncError::Timeout(self.sync_timeout)));
        match outcome {
            Ok(ack) => {
                debug!(message = ?ack.message, "backend sync acknowledged");
                BackendSync::Synced
            }
            Err(e) => {
                warn!(%owner, %mint_tx, error = %e, "backend sync failed; on-chain mint stands");
                BackendSync::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Compares the connected account's token balance against a booster's price.
    pub async fn has_enough_tokens<W: WalletGateway>(
        &self,
        session: &Session<W>,
        booster_type: &BoosterType,
    ) -> Result<BalanceCheck, PurchaseError> {
        let owner = session.connected_account().await?;
        let (balance, price) = futures::try_join!(
            self.token
                .balance_of(owner)
                .map_err(PurchaseError::at(PurchaseStep::ReadBalance)),
            self.booster
                .booster_price(booster_type)
                .map_err(PurchaseError::at(PurchaseStep::ReadPrice)),
        )?;
        Ok(BalanceCheck {
            has_enough: balance >= price,
            balance,
            price,
        })
    }
}

fn transition(stage: &mut PurchaseStage, next: PurchaseStage) {
    debug!(from = %stage, to = %next, "purchase stage");
    *stage = next;
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn uri_for__substitutes_card_id() {
        // given
        let template = MetadataTemplate::new("https://cards.example/meta/{id}.json");

        // when
        let uri = template.uri_for(&U256::from(42u64));

        // then
        assert_eq!(uri, "https://cards.example/meta/42.json");
    }

    #[test]
    fn new__treats_plain_url_as_base() {
        // given
        let template = MetadataTemplate::new("https://cards.example/meta/");

        // when
        let uri = template.uri_for(&U256::from(7u64));

        // then
        assert_eq!(uri, "https://cards.example/meta/7");
    }

    #[test]
    fn balance_check__serializes_amounts_as_decimal_strings() {
        // given
        let check = BalanceCheck {
            has_enough: false,
            balance: U256::from(50u64),
            price: U256::from(200u64),
        };

        // when
        let json = serde_json::to_value(&check).unwrap();

        // then
        assert_eq!(
            json,
            serde_json::json!({ "hasEnough": false, "balance": "50", "price": "200" })
        );
    }

    #[test]
    fn backend_sync__serializes_with_status_tag() {
        // given
        let failed = BackendSync::Failed {
            reason: "offline".to_string(),
        };

        // when
        let json = serde_json::to_value(&failed).unwrap();

        // then
        assert_eq!(
            json,
            serde_json::json!({ "status": "failed", "reason": "offline" })
        );
    }

    #[tokio::test]
    async fn acquire__serializes_same_account() {
        // given
        let locks = AccountLocks::default();
        let account = Address::repeat_byte(1);

        // when
        let first = locks.acquire(account).await;
        let second = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            locks.acquire(account),
        )
        .await;
        let other = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            locks.acquire(Address::repeat_byte(2)),
        )
        .await;

        // then
        assert!(second.is_err());
        assert!(other.is_ok());
        drop(first);
    }

    #[tokio::test]
    async fn acquire__forgets_account_once_released() {
        // given
        let locks = AccountLocks::default();
        let account = Address::repeat_byte(1);

        // when
        let guard = locks.acquire(account).await;
        let held = locks.tracked();
        drop(guard);

        // then
        assert_eq!(held, 1);
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn acquire__keeps_lock_while_another_caller_waits() {
        // given
        let locks = Arc::new(AccountLocks::default());
        let account = Address::repeat_byte(1);
        let first = locks.acquire(account).await;
        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(account).await;
            })
        };
        while locks
            .inner
            .lock()
            .unwrap()
            .get(&account)
            .is_none_or(|lock| Arc::strong_count(lock) < 3)
        {
            tokio::task::yield_now().await;
        }

        // when
        drop(first);
        let still_tracked = locks.tracked();
        waiter.await.unwrap();

        // then
        assert_eq!(still_tracked, 1);
        assert_eq!(locks.tracked(), 0);
    }
}
