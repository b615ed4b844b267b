use alloy::primitives::Address;
use booster_client::{
    BoosterType,
    chain::{
        ConfirmationPolicy,
        ContractAddresses,
    },
    client::BoosterApp,
    config::{
        AppConfig,
        Network,
        NetworkTarget,
        WalletConfig,
    },
    deployment::{
        DeploymentRecord,
        DeploymentStore,
    },
    purchase::{
        DEFAULT_METADATA_URI,
        MetadataTemplate,
    },
    wallets,
};
use clap::{
    Parser,
    Subcommand,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use serde::Serialize;
use std::{
    path::{
        Path,
        PathBuf,
    },
    sync::OnceLock,
    time::Duration,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(
    name = "booster-client",
    about = "Buy card boosters, mint the cards, and reconcile them with the game backend",
    version
)]
struct Cli {
    /// Network the game contracts live on
    #[arg(long, value_enum, default_value = "base-sepolia", env = "BOOSTER_NETWORK")]
    network: Network,

    /// Override the RPC URL for the selected network
    #[arg(long, env = "BOOSTER_RPC_URL")]
    rpc_url: Option<String>,

    /// Encrypted keystore to sign with
    #[arg(long, conflicts_with_all = ["private_key", "node_accounts"])]
    wallet: Option<String>,

    /// Override keystore directory (defaults to ~/.foundry/keystores)
    #[arg(long)]
    wallet_dir: Option<String>,

    /// Hex private key to sign with
    #[arg(long, env = "BOOSTER_PRIVATE_KEY", hide_env_values = true, conflicts_with = "node_accounts")]
    private_key: Option<String>,

    /// Use accounts unlocked on the RPC node
    #[arg(long)]
    node_accounts: bool,

    /// Token contract address (overrides the deployment record)
    #[arg(long, requires_all = ["booster", "nft"])]
    token: Option<Address>,

    /// Booster sale contract address
    #[arg(long, requires_all = ["token", "nft"])]
    booster: Option<Address>,

    /// Card NFT contract address
    #[arg(long, requires_all = ["token", "booster"])]
    nft: Option<Address>,

    /// Base URL of the game backend used to reconcile minted cards
    #[arg(long, env = "BOOSTER_BACKEND_URL")]
    backend_url: Option<String>,

    /// Metadata URI template; `{id}` is replaced by the card id
    #[arg(long, default_value = DEFAULT_METADATA_URI, env = "BOOSTER_METADATA_URI")]
    metadata_uri: String,

    /// Seconds to wait for each transaction to confirm
    #[arg(long, default_value_t = 120)]
    confirm_timeout_secs: u64,

    /// Confirmations required before a transaction counts as final
    #[arg(long, default_value_t = 1)]
    confirmations: u64,

    /// Directory for the rolling log file
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Buy a booster and mint its cards
    Purchase { booster_type: BoosterType },
    /// Check whether the wallet can afford a booster
    Balance { booster_type: BoosterType },
    /// Inspect or record contract deployments
    Deployments {
        #[command(subcommand)]
        action: DeploymentsCommand,
    },
    /// List keystores in the wallet directory
    Wallets,
}

#[derive(Subcommand, Debug)]
enum DeploymentsCommand {
    /// Print recorded deployments for the selected network
    Show,
    /// Record contract addresses deployed to the selected network
    Record {
        #[arg(long)]
        token: Address,
        #[arg(long)]
        booster: Address,
        #[arg(long)]
        nft: Address,
        #[arg(long)]
        chain_id: Option<u64>,
        #[arg(long)]
        block: Option<u64>,
    },
}

impl Cli {
    fn explicit_addresses(&self) -> Option<ContractAddresses> {
        Some(ContractAddresses {
            token: self.token?,
            booster: self.booster?,
            nft: self.nft?,
        })
    }

    fn network_target(&self) -> NetworkTarget {
        NetworkTarget::new(self.network, self.rpc_url.clone())
    }

    fn app_config(&self) -> Result<AppConfig> {
        let wallet = if let Some(name) = &self.wallet {
            WalletConfig::Keystore {
                name: name.clone(),
                dir: wallets::keystore_dir(self.wallet_dir.as_deref())?,
            }
        } else if let Some(key) = &self.private_key {
            WalletConfig::PrivateKey(key.clone())
        } else if self.node_accounts {
            WalletConfig::NodeAccounts
        } else {
            return Err(eyre!(
                "Select a wallet with --wallet <name>, --private-key <hex>, or --node-accounts"
            ));
        };

        Ok(AppConfig {
            network: self.network_target(),
            wallet,
            backend_url: self.backend_url.clone(),
            metadata: MetadataTemplate::new(self.metadata_uri.clone()),
            confirmation: ConfirmationPolicy {
                timeout: Duration::from_secs(self.confirm_timeout_secs),
                confirmations: self.confirmations,
            },
        })
    }
}

fn init_tracing(log_dir: &Path) -> Result<()> {
    let appender = rolling::daily(log_dir, "booster-client.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| eyre!("failed to initialise logging: {e}"))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value).wrap_err("failed to render output")?;
    println!("{json}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(&cli.log_dir)?;
    tracing::info!("starting booster-client");

    match &cli.command {
        Command::Purchase { booster_type } => {
            let app = BoosterApp::new(&cli.app_config()?, cli.explicit_addresses()).await?;
            let result = app.purchase(booster_type).await?;
            print_json(&result)?;
        }
        Command::Balance { booster_type } => {
            let app = BoosterApp::new(&cli.app_config()?, cli.explicit_addresses()).await?;
            let check = app.balance(booster_type).await?;
            print_json(&check)?;
        }
        Command::Deployments { action } => {
            let store = DeploymentStore::new(cli.network)?;
            match action {
                DeploymentsCommand::Show => {
                    println!("Deployment records file: {}", store.path().display());
                    print_json(&store.load()?)?;
                }
                DeploymentsCommand::Record {
                    token,
                    booster,
                    nft,
                    chain_id,
                    block,
                } => {
                    let addresses = ContractAddresses {
                        token: *token,
                        booster: *booster,
                        nft: *nft,
                    };
                    let mut record =
                        DeploymentRecord::new(addresses, cli.network_target().url);
                    record.chain_id = *chain_id;
                    record.deployment_block = *block;
                    store.append(record)?;
                    println!("Recorded deployment for {}", cli.network);
                }
            }
        }
        Command::Wallets => {
            let dir = wallets::keystore_dir(cli.wallet_dir.as_deref())?;
            let found = wallets::list_keystores(&dir)?;
            if found.is_empty() {
                println!("No keystores found in {}", dir.display());
            }
            for keystore in found {
                let address = keystore
                    .address
                    .map_or_else(|| "unknown address".to_string(), |a| a.to_string());
                println!("{}\t{}\t{}", keystore.name, address, keystore.path.display());
            }
        }
    }
    Ok(())
}
