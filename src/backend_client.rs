use crate::error::SyncError;
use alloy::primitives::{
    Address,
    TxHash,
};
use async_trait::async_trait;
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::time::Duration;

const SYNC_PATH: &str = "/api/nft/sync";
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(10);

/// Payload telling the backend which cards a wallet just minted.
#[derive(Clone, Debug, Serialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MintSync {
    pub wallet_address: Address,
    pub card_ids: Vec<String>,
    pub tx_hash: TxHash,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SyncAck {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[async_trait]
pub trait ReconciliationBackend: Send + Sync {
    async fn sync_minted(&self, payload: &MintSync) -> Result<SyncAck, SyncError>;
}

#[derive(Clone)]
pub struct BackendClient {
    base_url: String,
    http: reqwest::Client,
    timeout: Duration,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_SYNC_TIMEOUT)
    }

    /// `timeout` bounds the whole request, connect through body.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .wrap_err("failed to build HTTP client for backend")?;
        Ok(Self {
            base_url,
            http,
            timeout,
        })
    }

    pub fn sync_url(&self) -> String {
        format!("{}{}", self.base_url, SYNC_PATH)
    }
}

#[async_trait]
impl ReconciliationBackend for BackendClient {
    async fn sync_minted(&self, payload: &MintSync) -> Result<SyncAck, SyncError> {
        let res = self
            .http
            .post(self.sync_url())
            .json(payload)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        let status = res.status();
        let bytes = res.bytes().await.map_err(|e| self.request_error(e))?;
        if !status.is_success() {
            return Err(SyncError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        let ack: SyncAck = serde_json::from_slice(&bytes)
            .map_err(|e| SyncError::Decode(e.to_string()))?;
        if !ack.success {
            return Err(SyncError::Rejected(
                ack.message
                    .unwrap_or_else(|| "no reason given".to_string()),
            ));
        }
        Ok(ack)
    }
}

impl BackendClient {
    fn request_error(&self, e: reqwest::Error) -> SyncError {
        if e.is_timeout() {
            SyncError::Timeout(self.timeout)
        } else {
            SyncError::Request(e.to_string())
        }
    }
}
