use alloy::primitives::TxHash;
use std::{
    fmt,
    time::Duration,
};

/// Steps of a booster purchase that talk to the chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PurchaseStep {
    ReadPrice,
    ReadBalance,
    ReadAllowance,
    Approve,
    Purchase,
    ReadCards,
    Mint,
}

impl fmt::Display for PurchaseStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PurchaseStep::ReadPrice => "read booster price",
            PurchaseStep::ReadBalance => "read token balance",
            PurchaseStep::ReadAllowance => "read token allowance",
            PurchaseStep::Approve => "approve token spending",
            PurchaseStep::Purchase => "purchase booster",
            PurchaseStep::ReadCards => "read purchased cards",
            PurchaseStep::Mint => "mint card batch",
        };
        write!(f, "{name}")
    }
}

/// Failure of a single contract interaction.
#[derive(thiserror::Error, Debug)]
pub enum ChainError {
    #[error("{method} failed: {reason}")]
    CallFailed {
        method: &'static str,
        reason: String,
    },
    #[error("{method} transaction {tx_hash} reverted")]
    Reverted {
        method: &'static str,
        tx_hash: TxHash,
    },
    #[error("{method} transaction {tx_hash} not confirmed after {waited:?}")]
    Timeout {
        method: &'static str,
        tx_hash: TxHash,
        waited: Duration,
    },
}

impl ChainError {
    pub fn call_failed(method: &'static str, reason: impl fmt::Display) -> Self {
        ChainError::CallFailed {
            method,
            reason: reason.to_string(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PurchaseError {
    #[error("booster type must be a non-empty string")]
    InvalidBoosterType,
    #[error("no wallet provider available")]
    WalletUnavailable,
    #[error("wallet returned no connected account")]
    WalletNotConnected,
    #[error("wallet account request failed: {0}")]
    WalletRequestFailed(String),
    #[error("failed to {step}: {source}")]
    ContractCallFailed {
        step: PurchaseStep,
        #[source]
        source: ChainError,
    },
    #[error("timed out waiting to {step} (tx {tx_hash}) after {waited:?}")]
    Timeout {
        step: PurchaseStep,
        tx_hash: TxHash,
        waited: Duration,
    },
}

impl PurchaseError {
    pub(crate) fn at(step: PurchaseStep) -> impl FnOnce(ChainError) -> Self {
        move |source| match source {
            ChainError::Timeout {
                tx_hash, waited, ..
            } => PurchaseError::Timeout {
                step,
                tx_hash,
                waited,
            },
            source => PurchaseError::ContractCallFailed { step, source },
        }
    }
}

/// Failure to reconcile minted cards with the backend. Never fatal to a purchase.
#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("backend request failed: {0}")]
    Request(String),
    #[error("backend responded with {status}: {body}")]
    Status { status: u16, body: String },
    #[error("backend rejected sync: {0}")]
    Rejected(String),
    #[error("invalid backend response: {0}")]
    Decode(String),
    #[error("backend did not answer within {0:?}")]
    Timeout(Duration),
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn at__maps_chain_timeout_to_purchase_timeout() {
        // given
        let err = ChainError::Timeout {
            method: "mintBatch",
            tx_hash: TxHash::repeat_byte(7),
            waited: Duration::from_secs(3),
        };

        // when
        let mapped = PurchaseError::at(PurchaseStep::Mint)(err);

        // then
        match mapped {
            PurchaseError::Timeout { step, waited, .. } => {
                assert_eq!(step, PurchaseStep::Mint);
                assert_eq!(waited, Duration::from_secs(3));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn at__keeps_underlying_error_for_failed_calls() {
        // given
        let err = ChainError::call_failed("purchaseBooster", "execution reverted");

        // when
        let mapped = PurchaseError::at(PurchaseStep::Purchase)(err);

        // then
        assert_eq!(
            mapped.to_string(),
            "failed to purchase booster: purchaseBooster failed: execution reverted"
        );
    }
}
