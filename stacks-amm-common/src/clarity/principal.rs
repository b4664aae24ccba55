use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::c32::{c32_address, c32_address_decode, AddressError, HASH160_LENGTH};

/// Maximum length of a contract name.
pub const CONTRACT_NAME_MAX_LENGTH: usize = 40;

/// An account principal: an address version and the hash160 of its public key(s).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StandardPrincipal {
    version: u8,
    hash160: [u8; HASH160_LENGTH],
}

impl StandardPrincipal {
    pub fn new(version: u8, hash160: [u8; HASH160_LENGTH]) -> Result<Self, AddressError> {
        if version >= 32 {
            return Err(AddressError::InvalidVersion(version));
        }
        Ok(Self { version, hash160 })
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn hash160(&self) -> &[u8; HASH160_LENGTH] {
        &self.hash160
    }
}

impl FromStr for StandardPrincipal {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (version, hash160) = c32_address_decode(s)?;
        Ok(Self { version, hash160 })
    }
}

impl fmt::Display for StandardPrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // version is checked on construction
        let address = c32_address(self.version, &self.hash160).map_err(|_| fmt::Error)?;
        f.write_str(&address)
    }
}

impl TryFrom<String> for StandardPrincipal {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StandardPrincipal> for String {
    fn from(value: StandardPrincipal) -> Self {
        value.to_string()
    }
}

/// A deployed contract, identified by its issuer and name: `ST....amm-pool`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContractPrincipal {
    issuer: StandardPrincipal,
    name: String,
}

impl ContractPrincipal {
    pub fn new(issuer: StandardPrincipal, name: &str) -> Result<Self, AddressError> {
        validate_contract_name(name)?;
        Ok(Self { issuer, name: name.to_string() })
    }

    pub fn issuer(&self) -> &StandardPrincipal {
        &self.issuer
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ContractPrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.issuer, self.name)
    }
}

/// Validates a contract name: a letter followed by letters, digits, `-` or `_`.
pub fn validate_contract_name(name: &str) -> Result<(), AddressError> {
    let mut chars = name.chars();
    let valid_head = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic());
    let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid_head && valid_tail && name.len() <= CONTRACT_NAME_MAX_LENGTH {
        Ok(())
    } else {
        Err(AddressError::InvalidContractName(name.to_string()))
    }
}

/// Any principal a Clarity value can carry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Principal {
    Standard(StandardPrincipal),
    Contract(ContractPrincipal),
}

impl FromStr for Principal {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((issuer, name)) => {
                Ok(Principal::Contract(ContractPrincipal::new(issuer.parse()?, name)?))
            }
            None => Ok(Principal::Standard(s.parse()?)),
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::Standard(p) => p.fmt(f),
            Principal::Contract(p) => p.fmt(f),
        }
    }
}

impl TryFrom<String> for Principal {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Principal> for String {
    fn from(value: Principal) -> Self {
        value.to_string()
    }
}

impl From<StandardPrincipal> for Principal {
    fn from(value: StandardPrincipal) -> Self {
        Principal::Standard(value)
    }
}

impl From<ContractPrincipal> for Principal {
    fn from(value: ContractPrincipal) -> Self {
        Principal::Contract(value)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    const ADDRESS: &str = "SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7";

    #[test]
    fn test_parse_standard_principal() {
        let principal: Principal = ADDRESS.parse().unwrap();

        assert!(matches!(principal, Principal::Standard(StandardPrincipal { version: 22, .. })));
        assert_eq!(principal.to_string(), ADDRESS);
    }

    #[test]
    fn test_parse_contract_principal() {
        let principal: Principal = format!("{ADDRESS}.token-a").parse().unwrap();

        match &principal {
            Principal::Contract(contract) => {
                assert_eq!(contract.issuer.to_string(), ADDRESS);
                assert_eq!(contract.name, "token-a");
            }
            other => panic!("Expected contract principal, got {other:?}"),
        }
        assert_eq!(principal.to_string(), format!("{ADDRESS}.token-a"));
    }

    #[rstest]
    #[case::empty("")]
    #[case::leading_digit("1token")]
    #[case::dot("token.a")]
    #[case::space("token a")]
    #[case::too_long("a-very-long-contract-name-that-is-not-allowed")]
    fn test_invalid_contract_names(#[case] name: &str) {
        assert!(validate_contract_name(name).is_err());
    }

    #[rstest]
    #[case("amm")]
    #[case("token_b")]
    #[case("Pool-v2")]
    fn test_valid_contract_names(#[case] name: &str) {
        assert!(validate_contract_name(name).is_ok());
    }

    #[test]
    fn test_serde_uses_string_form() {
        let principal: Principal = format!("{ADDRESS}.amm").parse().unwrap();

        let json = serde_json::to_string(&principal).unwrap();
        assert_eq!(json, format!("\"{ADDRESS}.amm\""));

        let back: Principal = serde_json::from_str(&json).unwrap();
        assert_eq!(back, principal);
    }

    #[test]
    fn test_standard_principal_rejects_bad_version() {
        assert_eq!(
            StandardPrincipal::new(40, [0; HASH160_LENGTH]),
            Err(AddressError::InvalidVersion(40))
        );
    }
}
