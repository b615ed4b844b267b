use crate::error::PurchaseError;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    str::FromStr,
};

pub mod backend_client;
pub mod chain;
pub mod client;
pub mod config;
pub mod deployment;
pub mod error;
pub mod gateway;
pub mod purchase;
pub mod wallets;

pub mod test_helpers;

pub mod contracts {
    use alloy::sol;

    sol! {
        #[sol(rpc)]
        interface IBoosterToken {
            function allowance(address owner, address spender) external view returns (uint256);
            function approve(address spender, uint256 amount) external returns (bool);
            function balanceOf(address account) external view returns (uint256);
        }
    }

    sol! {
        #[sol(rpc)]
        interface IBoosterSale {
            function getBoosterPrice(string boosterType) external view returns (uint256);
            function purchaseBooster(string boosterType) external;
            function getLastPurchasedCards() external view returns (uint256[]);
        }
    }

    sol! {
        #[sol(rpc)]
        interface ICardNft {
            function mintBatch(address to, uint256[] ids, string[] uris) external;
        }
    }
}

/// Key of a purchasable booster bundle, as named by the booster contract.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BoosterType(String);

impl BoosterType {
    pub fn new(raw: impl Into<String>) -> Result<Self, PurchaseError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(PurchaseError::InvalidBoosterType);
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BoosterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BoosterType {
    type Err = PurchaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for BoosterType {
    type Error = PurchaseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BoosterType> for String {
    fn from(value: BoosterType) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn booster_type__rejects_blank_names() {
        // given
        let names = ["", "   "];

        // when
        let results = names.map(BoosterType::new);

        // then
        for result in results {
            assert!(matches!(result, Err(PurchaseError::InvalidBoosterType)));
        }
    }

    #[test]
    fn booster_type__keeps_name_verbatim() {
        // given
        let raw = "Legendary";

        // when
        let booster: BoosterType = raw.parse().unwrap();

        // then
        assert_eq!(booster.as_str(), "Legendary");
        assert_eq!(serde_json::to_string(&booster).unwrap(), "\"Legendary\"");
    }

    #[test]
    fn booster_type__deserialization_validates() {
        // given
        let raw = "\"\"";

        // when
        let result = serde_json::from_str::<BoosterType>(raw);

        // then
        assert!(result.is_err());
    }
}
