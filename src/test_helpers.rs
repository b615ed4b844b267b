use crate::{
    BoosterType,
    backend_client::{
        MintSync,
        ReconciliationBackend,
        SyncAck,
    },
    chain::{
        BoosterContract,
        NftContract,
        TokenContract,
    },
    error::{
        ChainError,
        SyncError,
    },
    gateway::{
        LocalAccount,
        Session,
        WalletGateway,
    },
    purchase::{
        MetadataTemplate,
        PurchaseService,
    },
};
use alloy::primitives::{
    Address,
    TxHash,
    U256,
};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        PoisonError,
        atomic::{
            AtomicU64,
            AtomicUsize,
            Ordering,
        },
    },
    time::Duration,
};

pub const CARDS_PER_BOOSTER: u64 = 3;
pub const TEST_METADATA_URI: &str = "https://cards.test/meta/{id}.json";

pub type MockService = PurchaseService<MockToken, MockBooster, MockNft, MockBackend>;

#[derive(Clone, Debug, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

fn locked<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn fake_tx(seed: u64) -> TxHash {
    TxHash::left_padding_from(&seed.to_be_bytes())
}

/// How a mocked write transaction ends.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TxOutcome {
    #[default]
    Confirmed,
    Reverted,
    TimedOut,
}

impl TxOutcome {
    fn settle(self, method: &'static str, tx_hash: TxHash) -> Result<TxHash, ChainError> {
        match self {
            TxOutcome::Confirmed => Ok(tx_hash),
            TxOutcome::Reverted => Err(ChainError::Reverted { method, tx_hash }),
            TxOutcome::TimedOut => Err(ChainError::Timeout {
                method,
                tx_hash,
                waited: Duration::from_secs(1),
            }),
        }
    }
}

#[derive(Clone, Default)]
pub struct MockToken {
    pub balance: Arc<Mutex<U256>>,
    pub allowance: Arc<Mutex<U256>>,
    pub approve_outcome: TxOutcome,
    pub fail_reads: bool,
    pub allowance_calls: CallCounter,
    pub approve_calls: CallCounter,
    pub balance_calls: CallCounter,
}

impl MockToken {
    pub fn new(balance: u64, allowance: u64) -> Self {
        Self {
            balance: Arc::new(Mutex::new(U256::from(balance))),
            allowance: Arc::new(Mutex::new(U256::from(allowance))),
            ..Self::default()
        }
    }
}

#[async_trait]
impl TokenContract for MockToken {
    async fn allowance(&self, _owner: Address, _spender: Address) -> Result<U256, ChainError> {
        self.allowance_calls.hit();
        tokio::task::yield_now().await;
        if self.fail_reads {
            return Err(ChainError::call_failed("allowance", "rpc unavailable"));
        }
        Ok(*locked(&self.allowance))
    }

    async fn approve(
        &self,
        _owner: Address,
        _spender: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError> {
        self.approve_calls.hit();
        tokio::task::yield_now().await;
        let tx_hash = self.approve_outcome.settle("approve", fake_tx(0xa0))?;
        *locked(&self.allowance) = amount;
        Ok(tx_hash)
    }

    async fn balance_of(&self, _account: Address) -> Result<U256, ChainError> {
        self.balance_calls.hit();
        tokio::task::yield_now().await;
        if self.fail_reads {
            return Err(ChainError::call_failed("balanceOf", "rpc unavailable"));
        }
        Ok(*locked(&self.balance))
    }
}

/// Booster sale whose "last purchased" slot is overwritten by every purchase,
/// like the deployed contract's.
#[derive(Clone)]
pub struct MockBooster {
    pub address: Address,
    pub prices: Arc<HashMap<String, U256>>,
    pub purchase_outcome: TxOutcome,
    pub last_purchased: Arc<Mutex<HashMap<Address, Vec<U256>>>>,
    pub next_card_id: Arc<AtomicU64>,
    pub fail_card_reads: bool,
    pub price_calls: CallCounter,
    pub purchase_calls: CallCounter,
    pub read_cards_calls: CallCounter,
}

impl MockBooster {
    pub fn with_prices(prices: &[(&str, u64)]) -> Self {
        Self {
            address: Address::repeat_byte(0xb0),
            prices: Arc::new(
                prices
                    .iter()
                    .map(|(name, price)| (name.to_string(), U256::from(*price)))
                    .collect(),
            ),
            purchase_outcome: TxOutcome::Confirmed,
            last_purchased: Arc::default(),
            next_card_id: Arc::new(AtomicU64::new(1)),
            fail_card_reads: false,
            price_calls: CallCounter::default(),
            purchase_calls: CallCounter::default(),
            read_cards_calls: CallCounter::default(),
        }
    }
}

#[async_trait]
impl BoosterContract for MockBooster {
    fn address(&self) -> Address {
        self.address
    }

    async fn booster_price(&self, booster_type: &BoosterType) -> Result<U256, ChainError> {
        self.price_calls.hit();
        tokio::task::yield_now().await;
        self.prices
            .get(booster_type.as_str())
            .copied()
            .ok_or_else(|| ChainError::call_failed("getBoosterPrice", "unknown booster type"))
    }

    async fn purchase_booster(
        &self,
        buyer: Address,
        _booster_type: &BoosterType,
    ) -> Result<TxHash, ChainError> {
        self.purchase_calls.hit();
        tokio::task::yield_now().await;
        let first = self
            .next_card_id
            .fetch_add(CARDS_PER_BOOSTER, Ordering::SeqCst);
        let tx_hash = self
            .purchase_outcome
            .settle("purchaseBooster", fake_tx(0xb000 + first))?;
        let cards = (first..first + CARDS_PER_BOOSTER).map(U256::from).collect();
        locked(&self.last_purchased).insert(buyer, cards);
        tokio::task::yield_now().await;
        Ok(tx_hash)
    }

    async fn last_purchased_cards(&self, buyer: Address) -> Result<Vec<U256>, ChainError> {
        self.read_cards_calls.hit();
        tokio::task::yield_now().await;
        if self.fail_card_reads {
            return Err(ChainError::call_failed(
                "getLastPurchasedCards",
                "connection reset by peer",
            ));
        }
        Ok(locked(&self.last_purchased)
            .get(&buyer)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MintCall {
    pub to: Address,
    pub ids: Vec<U256>,
    pub uris: Vec<String>,
}

#[derive(Clone, Default)]
pub struct MockNft {
    pub mint_outcome: TxOutcome,
    pub mints: Arc<Mutex<Vec<MintCall>>>,
    pub mint_calls: CallCounter,
}

impl MockNft {
    pub fn recorded_mints(&self) -> Vec<MintCall> {
        locked(&self.mints).clone()
    }
}

#[async_trait]
impl NftContract for MockNft {
    async fn mint_batch(
        &self,
        to: Address,
        ids: &[U256],
        uris: &[String],
    ) -> Result<TxHash, ChainError> {
        self.mint_calls.hit();
        tokio::task::yield_now().await;
        let seq = self.mint_calls.count() as u64;
        let tx_hash = self.mint_outcome.settle("mintBatch", fake_tx(0xc000 + seq))?;
        locked(&self.mints).push(MintCall {
            to,
            ids: ids.to_vec(),
            uris: uris.to_vec(),
        });
        Ok(tx_hash)
    }
}

#[derive(Clone, Default)]
pub struct MockBackend {
    pub reject: bool,
    /// Never answers, like a backend that accepted the request and hung.
    pub hang: bool,
    pub received: Arc<Mutex<Vec<MintSync>>>,
    pub sync_calls: CallCounter,
}

#[async_trait]
impl ReconciliationBackend for MockBackend {
    async fn sync_minted(&self, payload: &MintSync) -> Result<SyncAck, SyncError> {
        self.sync_calls.hit();
        locked(&self.received).push(payload.clone());
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.reject {
            return Err(SyncError::Status {
                status: 503,
                body: "maintenance".to_string(),
            });
        }
        Ok(SyncAck {
            success: true,
            message: None,
        })
    }
}

/// Wallet reporting a fixed list of accounts.
#[derive(Clone, Debug, Default)]
pub struct MockWallet {
    pub accounts: Vec<Address>,
    pub request_calls: CallCounter,
}

#[async_trait]
impl WalletGateway for MockWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, String> {
        self.request_calls.hit();
        Ok(self.accounts.clone())
    }
}

/// Mocked contracts and backend wired into a purchase service.
pub struct TestContext {
    pub token: MockToken,
    pub booster: MockBooster,
    pub nft: MockNft,
    pub backend: MockBackend,
}

impl TestContext {
    pub fn new(balance: u64, allowance: u64, prices: &[(&str, u64)]) -> Self {
        Self {
            token: MockToken::new(balance, allowance),
            booster: MockBooster::with_prices(prices),
            nft: MockNft::default(),
            backend: MockBackend::default(),
        }
    }

    pub fn alice() -> Address {
        Address::repeat_byte(0xa1)
    }

    pub fn alice_session() -> Session<LocalAccount> {
        Session::new(LocalAccount::new(Self::alice()))
    }

    pub fn service(&self) -> MockService {
        PurchaseService::new(
            self.token.clone(),
            self.booster.clone(),
            self.nft.clone(),
            MetadataTemplate::new(TEST_METADATA_URI),
        )
        .with_backend(self.backend.clone())
    }

    pub fn service_without_backend(&self) -> MockService {
        PurchaseService::new(
            self.token.clone(),
            self.booster.clone(),
            self.nft.clone(),
            MetadataTemplate::new(TEST_METADATA_URI),
        )
    }

    pub fn chain_calls(&self) -> usize {
        self.token.allowance_calls.count()
            + self.token.approve_calls.count()
            + self.token.balance_calls.count()
            + self.booster.price_calls.count()
            + self.booster.purchase_calls.count()
            + self.booster.read_cards_calls.count()
            + self.nft.mint_calls.count()
    }
}
