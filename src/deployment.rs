use crate::{
    chain::ContractAddresses,
    config::Network,
};
use alloy::primitives::Address;
use chrono::Utc;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fs,
    io::ErrorKind,
    path::{
        Path,
        PathBuf,
    },
};

pub const DEPLOYMENTS_ROOT: &str = ".deployments";
const DEPLOYMENTS_FILE: &str = "deployments.json";

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub deployed_at: String,
    pub token_address: Address,
    pub booster_address: Address,
    pub nft_address: Address,
    pub network_url: String,
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub deployment_block: Option<u64>,
}

impl DeploymentRecord {
    pub fn new(addresses: ContractAddresses, network_url: impl Into<String>) -> Self {
        Self {
            deployed_at: Utc::now().to_rfc3339(),
            token_address: addresses.token,
            booster_address: addresses.booster,
            nft_address: addresses.nft,
            network_url: network_url.into(),
            chain_id: None,
            deployment_block: None,
        }
    }

    pub fn addresses(&self) -> ContractAddresses {
        ContractAddresses {
            token: self.token_address,
            booster: self.booster_address,
            nft: self.nft_address,
        }
    }
}

/// Append-only log of deployments for one network, kept as a JSON array.
///
/// The file is created on the first append; until then the log is empty.
#[derive(Debug)]
pub struct DeploymentStore {
    network: Network,
    path: PathBuf,
}

impl DeploymentStore {
    pub fn new(network: Network) -> Result<Self> {
        Self::under(DEPLOYMENTS_ROOT, network)
    }

    pub fn under(root: impl AsRef<Path>, network: Network) -> Result<Self> {
        let path = root
            .as_ref()
            .join(network.dir_name())
            .join(DEPLOYMENTS_FILE);
        Ok(Self { network, path })
    }

    pub fn load(&self) -> Result<Vec<DeploymentRecord>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).wrap_err_with(|| {
                    format!("Cannot read {} deployments at {}", self.network, self.path.display())
                });
            }
        };
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&data).wrap_err_with(|| {
            format!(
                "{} is not a list of {} deployment records",
                self.path.display(),
                self.network
            )
        })
    }

    pub fn latest(&self) -> Result<Option<DeploymentRecord>> {
        Ok(self.load()?.pop())
    }

    /// Adds `record` after the existing ones. The new log replaces the old
    /// file in one rename, so a failed write leaves the previous log intact.
    pub fn append(&self, record: DeploymentRecord) -> Result<()> {
        let mut records = self.load()?;
        records.push(record);

        let dir = self
            .path
            .parent()
            .ok_or_else(|| eyre!("Deployment log {} has no parent", self.path.display()))?;
        fs::create_dir_all(dir)
            .wrap_err_with(|| format!("Cannot create {}", dir.display()))?;

        let json = serde_json::to_vec_pretty(&records)
            .wrap_err("Cannot encode deployment records")?;
        let staged = self.path.with_extension("json.tmp");
        fs::write(&staged, json)
            .wrap_err_with(|| format!("Cannot write {}", staged.display()))?;
        fs::rename(&staged, &self.path).wrap_err_with(|| {
            format!("Cannot replace deployment log {}", self.path.display())
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use tempdir::TempDir;

    fn addresses(seed: u8) -> ContractAddresses {
        ContractAddresses {
            token: Address::repeat_byte(seed),
            booster: Address::repeat_byte(seed + 1),
            nft: Address::repeat_byte(seed + 2),
        }
    }

    #[test]
    fn load__is_empty_before_first_append() {
        // given
        let dir = TempDir::new("deployments").unwrap();

        // when
        let store = DeploymentStore::under(dir.path(), Network::Local).unwrap();

        // then
        assert!(store.path().ends_with("local/deployments.json"));
        assert!(!store.path().exists());
        assert!(store.load().unwrap().is_empty());
        assert!(store.latest().unwrap().is_none());
    }

    #[test]
    fn append__creates_network_directory_and_leaves_no_staging_file() {
        // given
        let dir = TempDir::new("deployments").unwrap();
        let store = DeploymentStore::under(dir.path(), Network::ArbitrumSepolia).unwrap();

        // when
        store
            .append(DeploymentRecord::new(addresses(4), "https://sepolia-rollup.arbitrum.io/rpc"))
            .unwrap();

        // then
        assert!(store.path().exists());
        assert!(!store.path().with_extension("json.tmp").exists());
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn load__names_file_when_log_is_corrupt() {
        // given
        let dir = TempDir::new("deployments").unwrap();
        let store = DeploymentStore::under(dir.path(), Network::Base).unwrap();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{ not json").unwrap();

        // when
        let err = store.load().unwrap_err();

        // then
        assert!(err.to_string().contains("deployments.json"));
    }

    #[test]
    fn latest__returns_most_recently_appended_record() {
        // given
        let dir = TempDir::new("deployments").unwrap();
        let store = DeploymentStore::under(dir.path(), Network::BaseSepolia).unwrap();
        store
            .append(DeploymentRecord::new(addresses(1), "https://sepolia.base.org"))
            .unwrap();

        // when
        let mut newer = DeploymentRecord::new(addresses(10), "https://sepolia.base.org");
        newer.chain_id = Some(84532);
        store.append(newer.clone()).unwrap();

        // then
        assert_eq!(store.load().unwrap().len(), 2);
        let latest = store.latest().unwrap().unwrap();
        assert_eq!(latest, newer);
        assert_eq!(latest.addresses(), addresses(10));
    }

    #[test]
    fn load__accepts_records_without_optional_fields() {
        // given
        let dir = TempDir::new("deployments").unwrap();
        let store = DeploymentStore::under(dir.path(), Network::Base).unwrap();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        let json = format!(
            r#"[{{"deployedAt":"2025-01-01T00:00:00Z","tokenAddress":"{}","boosterAddress":"{}","nftAddress":"{}","networkUrl":"https://mainnet.base.org"}}]"#,
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            Address::repeat_byte(3),
        );
        fs::write(store.path(), json).unwrap();

        // when
        let records = store.load().unwrap();

        // then
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].chain_id, None);
        assert_eq!(records[0].booster_address, Address::repeat_byte(2));
    }
}
