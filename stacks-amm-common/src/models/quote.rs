use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::serde_primitives::biguint_string;

/// The expected outcome of a swap: tokens received and the fee charged on the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapQuote {
    #[serde(with = "biguint_string")]
    pub output_amount: BigUint,
    #[serde(with = "biguint_string")]
    pub fee_amount: BigUint,
}

impl SwapQuote {
    pub fn new(output_amount: impl Into<BigUint>, fee_amount: impl Into<BigUint>) -> Self {
        Self { output_amount: output_amount.into(), fee_amount: fee_amount.into() }
    }
}
