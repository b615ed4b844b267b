use crate::{
    chain::ConfirmationPolicy,
    purchase::MetadataTemplate,
};
use clap::ValueEnum;
use std::{
    fmt,
    path::PathBuf,
};

pub const DEFAULT_BASE_RPC_URL: &str = "https://mainnet.base.org";
pub const DEFAULT_BASE_SEPOLIA_RPC_URL: &str = "https://sepolia.base.org";
pub const DEFAULT_ARBITRUM_RPC_URL: &str = "https://arb1.arbitrum.io/rpc";
pub const DEFAULT_ARBITRUM_SEPOLIA_RPC_URL: &str = "https://sepolia-rollup.arbitrum.io/rpc";
pub const DEFAULT_LOCAL_RPC_URL: &str = "http://localhost:8545";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, ValueEnum)]
pub enum Network {
    Base,
    BaseSepolia,
    Arbitrum,
    ArbitrumSepolia,
    Local,
}

impl Network {
    pub fn dir_name(self) -> &'static str {
        match self {
            Network::Base => "base",
            Network::BaseSepolia => "base-sepolia",
            Network::Arbitrum => "arbitrum",
            Network::ArbitrumSepolia => "arbitrum-sepolia",
            Network::Local => "local",
        }
    }

    pub fn default_rpc_url(self) -> &'static str {
        match self {
            Network::Base => DEFAULT_BASE_RPC_URL,
            Network::BaseSepolia => DEFAULT_BASE_SEPOLIA_RPC_URL,
            Network::Arbitrum => DEFAULT_ARBITRUM_RPC_URL,
            Network::ArbitrumSepolia => DEFAULT_ARBITRUM_SEPOLIA_RPC_URL,
            Network::Local => DEFAULT_LOCAL_RPC_URL,
        }
    }

    pub fn all() -> [Network; 5] {
        [
            Network::Base,
            Network::BaseSepolia,
            Network::Arbitrum,
            Network::ArbitrumSepolia,
            Network::Local,
        ]
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Base => "Base",
            Network::BaseSepolia => "Base Sepolia",
            Network::Arbitrum => "Arbitrum One",
            Network::ArbitrumSepolia => "Arbitrum Sepolia",
            Network::Local => "Local",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NetworkTarget {
    pub network: Network,
    pub url: String,
}

impl NetworkTarget {
    pub fn new(network: Network, rpc_url: Option<String>) -> Self {
        let url = rpc_url.unwrap_or_else(|| network.default_rpc_url().to_string());
        Self { network, url }
    }
}

/// Where signing keys come from.
#[derive(Clone, Debug)]
pub enum WalletConfig {
    Keystore { name: String, dir: PathBuf },
    PrivateKey(String),
    NodeAccounts,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub network: NetworkTarget,
    pub wallet: WalletConfig,
    pub backend_url: Option<String>,
    pub metadata: MetadataTemplate,
    pub confirmation: ConfirmationPolicy,
}
