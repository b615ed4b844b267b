use crate::{
    BoosterType,
    backend_client::BackendClient,
    chain::{
        BoosterHandle,
        ContractAddresses,
        NftHandle,
        TokenHandle,
        bind_contracts,
    },
    config::{
        AppConfig,
        WalletConfig,
    },
    deployment::{
        DeploymentRecord,
        DeploymentStore,
    },
    error::PurchaseError,
    gateway::{
        LocalAccount,
        NodeAccounts,
        Session,
        WalletGateway,
    },
    purchase::{
        BalanceCheck,
        PurchaseResult,
        PurchaseService,
    },
    wallets,
};
use alloy::{
    network::EthereumWallet,
    primitives::Address,
    providers::{
        DynProvider,
        Provider,
        ProviderBuilder,
    },
    signers::local::PrivateKeySigner,
};
use async_trait::async_trait;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use tracing::{
    info,
    warn,
};
use url::Url;

pub type ChainPurchaseService =
    PurchaseService<TokenHandle, BoosterHandle, NftHandle, BackendClient>;

/// Wallet selected on the command line.
pub enum AppWallet {
    Local(LocalAccount),
    Node(NodeAccounts),
}

#[async_trait]
impl WalletGateway for AppWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, String> {
        match self {
            AppWallet::Local(local) => local.request_accounts().await,
            AppWallet::Node(node) => node.request_accounts().await,
        }
    }
}

pub struct BoosterApp {
    pub service: ChainPurchaseService,
    pub session: Session<AppWallet>,
}

impl BoosterApp {
    pub async fn new(
        config: &AppConfig,
        explicit: Option<ContractAddresses>,
    ) -> Result<Self> {
        let url: Url = config
            .network
            .url
            .parse()
            .wrap_err_with(|| format!("Invalid RPC URL {}", config.network.url))?;
        info!(network = %config.network.network, url = %url, "connecting to RPC");

        let (provider, wallet) = match &config.wallet {
            WalletConfig::Keystore { name, dir } => {
                let keystore = wallets::find_keystore(dir, name)?;
                let signer = wallets::unlock_keystore(&keystore)?;
                signing_provider(signer, url)
            }
            WalletConfig::PrivateKey(raw) => {
                signing_provider(wallets::signer_from_hex(raw)?, url)
            }
            WalletConfig::NodeAccounts => {
                let provider = ProviderBuilder::new().connect_http(url).erased();
                let wallet = AppWallet::Node(NodeAccounts::new(provider.clone()));
                (provider, wallet)
            }
        };

        let chain_id = provider
            .get_chain_id()
            .await
            .wrap_err("failed to query chain id")?;
        let addresses = resolve_addresses(config, explicit, chain_id)?;
        info!(
            chain_id,
            token = %addresses.token,
            booster = %addresses.booster,
            nft = %addresses.nft,
            "bound game contracts"
        );

        let (token, booster, nft) =
            bind_contracts(provider, addresses, config.confirmation);
        let mut service =
            PurchaseService::new(token, booster, nft, config.metadata.clone());
        if let Some(backend_url) = &config.backend_url {
            service = service.with_backend(BackendClient::new(backend_url.clone())?);
        } else {
            warn!("no backend URL configured, minted cards will not be reconciled");
        }

        Ok(Self {
            service,
            session: Session::new(wallet),
        })
    }

    pub async fn purchase(
        &self,
        booster_type: &BoosterType,
    ) -> Result<PurchaseResult, PurchaseError> {
        self.service
            .purchase_booster_and_mint(&self.session, booster_type)
            .await
    }

    pub async fn balance(
        &self,
        booster_type: &BoosterType,
    ) -> Result<BalanceCheck, PurchaseError> {
        self.service
            .has_enough_tokens(&self.session, booster_type)
            .await
    }
}

fn signing_provider(signer: PrivateKeySigner, url: Url) -> (DynProvider, AppWallet) {
    let address = signer.address();
    let provider = ProviderBuilder::new()
        .wallet(EthereumWallet::from(signer))
        .connect_http(url)
        .erased();
    (provider, AppWallet::Local(LocalAccount::new(address)))
}

fn resolve_addresses(
    config: &AppConfig,
    explicit: Option<ContractAddresses>,
    chain_id: u64,
) -> Result<ContractAddresses> {
    if let Some(addresses) = explicit {
        return Ok(addresses);
    }
    let network = config.network.network;
    let store = DeploymentStore::new(network)?;
    let record = store.latest()?.ok_or_else(|| {
        eyre!(
            "No deployment recorded for {network}.\n\
             Deployment records file: {}\n\n\
             Pass --token/--booster/--nft or run `deployments record` first.",
            store.path().display()
        )
    })?;
    check_record_chain(&record, chain_id)
}

/// Refuses a deployment record made on another chain than the one connected.
fn check_record_chain(record: &DeploymentRecord, chain_id: u64) -> Result<ContractAddresses> {
    match record.chain_id {
        Some(recorded) if recorded != chain_id => Err(eyre!(
            "Deployment record for {} was made on chain {recorded}, but the RPC reports chain {chain_id}.\n\
             Check --network/--rpc-url or pass --token/--booster/--nft explicitly.",
            record.network_url
        )),
        _ => Ok(record.addresses()),
    }
}
