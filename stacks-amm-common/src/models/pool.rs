use serde::{Deserialize, Serialize};

use crate::clarity::principal::Principal;

/// A liquidity pool as identified by the AMM contract: its token pair and fee tier.
///
/// Pools are loaded and validated elsewhere; this type only carries the fields needed to
/// address the pool in contract calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pool {
    #[serde(rename = "token-0")]
    pub token_0: Principal,
    #[serde(rename = "token-1")]
    pub token_1: Principal,
    pub fee: u128,
}

impl Pool {
    pub fn new(token_0: Principal, token_1: Principal, fee: u128) -> Self {
        Self { token_0, token_1, fee }
    }
}
