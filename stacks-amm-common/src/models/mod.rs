pub mod pool;
pub mod quote;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

pub use pool::Pool;
pub use quote::SwapQuote;

/// Currently supported Stacks networks
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Network {
    Mainnet,
    #[default]
    Testnet,
    Devnet,
}

impl Network {
    /// Default node API endpoint for this network.
    pub fn default_api_url(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://api.mainnet.hiro.so",
            Network::Testnet => "https://api.testnet.hiro.so",
            Network::Devnet => "http://localhost:3999",
        }
    }

    /// Address version of single-signature accounts (`SP` / `ST`).
    pub fn single_sig_version(&self) -> u8 {
        match self {
            Network::Mainnet => 22,
            Network::Testnet | Network::Devnet => 26,
        }
    }

    /// Address version of multi-signature accounts (`SM` / `SN`).
    pub fn multi_sig_version(&self) -> u8 {
        match self {
            Network::Mainnet => 20,
            Network::Testnet | Network::Devnet => 21,
        }
    }

    /// Whether an address version belongs to this network.
    pub fn accepts_version(&self, version: u8) -> bool {
        version == self.single_sig_version() || version == self.multi_sig_version()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("mainnet", Network::Mainnet)]
    #[case("Testnet", Network::Testnet)]
    #[case("DEVNET", Network::Devnet)]
    fn test_parse_network(#[case] input: &str, #[case] expected: Network) {
        assert_eq!(Network::from_str(input).unwrap(), expected);
    }

    #[test]
    fn test_network_display_round_trips() {
        assert_eq!(Network::Mainnet.to_string(), "mainnet");
        assert!(Network::from_str("stacks").is_err());
    }

    #[test]
    fn test_versions() {
        assert!(Network::Mainnet.accepts_version(22));
        assert!(!Network::Mainnet.accepts_version(26));
        assert!(Network::Devnet.accepts_version(21));
    }
}
