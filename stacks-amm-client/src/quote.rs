use num_bigint::BigUint;
use stacks_amm_common::{
    models::{Pool, SwapQuote},
    ClarityValue,
};
use thiserror::Error;
use tracing::debug;

use crate::{config::QuoteConfig, rpc::ReadOnlyCall, RPCError};

const OUTPUT_AMOUNT_KEY: &str = "output-amount";
const FEE_AMOUNT_KEY: &str = "fee-amount";

/// Errors surfaced to quote consumers. The display strings are what UIs show.
#[derive(Error, Debug)]
pub enum QuoteError {
    /// Transport failures, shown as reported by the client.
    #[error(transparent)]
    Rpc(#[from] RPCError),

    /// The call did not return `(ok (tuple ...))`.
    #[error("Could not retrieve swap quote")]
    UnexpectedResult(ClarityValue),

    /// The tuple lacks unsigned `output-amount` / `fee-amount` entries.
    #[error("Unexpected quote return shape")]
    UnexpectedShape(ClarityValue),
}

/// Builds the `get-swap-quote` call for swapping `amount_in` through `pool`.
///
/// Arguments are, in order: token-0, token-1, fee tier, input amount, direction.
pub fn build_quote_call(
    config: &QuoteConfig,
    pool: &Pool,
    amount_in: u128,
    zero_for_one: bool,
) -> ReadOnlyCall {
    ReadOnlyCall {
        contract_address: *config.contract_address(),
        contract_name: config.contract_name().to_string(),
        function_name: config.function_name().to_string(),
        arguments: vec![
            ClarityValue::Principal(pool.token_0.clone()),
            ClarityValue::Principal(pool.token_1.clone()),
            ClarityValue::UInt(pool.fee),
            ClarityValue::UInt(amount_in),
            ClarityValue::Bool(zero_for_one),
        ],
        sender: *config.sender(),
    }
}

/// Unwraps `(ok (tuple (output-amount uint) (fee-amount uint) ...))` into a quote.
///
/// Extra tuple entries are ignored.
pub fn decode_swap_quote(value: ClarityValue) -> Result<SwapQuote, QuoteError> {
    let entries = match value {
        ClarityValue::ResponseOk(inner) => match *inner {
            ClarityValue::Tuple(entries) => entries,
            other => {
                debug!(found = other.type_name(), "Quote response is ok but not a tuple");
                return Err(QuoteError::UnexpectedResult(ClarityValue::ok(other)));
            }
        },
        other => {
            debug!(found = other.type_name(), "Quote response is not (ok ...)");
            return Err(QuoteError::UnexpectedResult(other));
        }
    };

    match (entries.get(OUTPUT_AMOUNT_KEY), entries.get(FEE_AMOUNT_KEY)) {
        (Some(ClarityValue::UInt(output)), Some(ClarityValue::UInt(fee))) => {
            Ok(SwapQuote { output_amount: BigUint::from(*output), fee_amount: BigUint::from(*fee) })
        }
        (output, fee) => {
            debug!(
                output = output.map_or("missing", ClarityValue::type_name),
                fee = fee.map_or("missing", ClarityValue::type_name),
                "Quote tuple lacks uint amounts"
            );
            Err(QuoteError::UnexpectedShape(ClarityValue::Tuple(entries)))
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use stacks_amm_common::StandardPrincipal;

    use super::*;

    const ISSUER: &str = "SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7";

    fn pool() -> Pool {
        Pool::new(
            format!("{ISSUER}.token-a").parse().unwrap(),
            format!("{ISSUER}.token-b").parse().unwrap(),
            3000,
        )
    }

    fn quote_tuple(output: ClarityValue, fee: ClarityValue) -> ClarityValue {
        ClarityValue::tuple([(OUTPUT_AMOUNT_KEY, output), (FEE_AMOUNT_KEY, fee)])
    }

    #[test]
    fn test_build_quote_call_argument_order() {
        let contract: StandardPrincipal = ISSUER.parse().unwrap();
        let config = QuoteConfig::new(contract, "amm").unwrap();

        let call = build_quote_call(&config, &pool(), 1_000, false);

        assert_eq!(call.function_name, "get-swap-quote");
        assert_eq!(call.contract_name, "amm");
        assert_eq!(call.sender, contract);
        assert_eq!(
            call.arguments,
            vec![
                ClarityValue::Principal(pool().token_0),
                ClarityValue::Principal(pool().token_1),
                ClarityValue::UInt(3000),
                ClarityValue::UInt(1_000),
                ClarityValue::Bool(false),
            ]
        );
    }

    #[test]
    fn test_decode_ok_tuple() {
        let value = ClarityValue::ok(quote_tuple(ClarityValue::UInt(995), ClarityValue::UInt(5)));

        let quote = decode_swap_quote(value).unwrap();

        assert_eq!(quote, SwapQuote::new(995u32, 5u32));
    }

    #[test]
    fn test_decode_ignores_extra_entries() {
        let value = ClarityValue::ok(ClarityValue::tuple([
            (OUTPUT_AMOUNT_KEY, ClarityValue::UInt(u128::MAX)),
            (FEE_AMOUNT_KEY, ClarityValue::UInt(0)),
            ("price-impact", ClarityValue::UInt(12)),
        ]));

        let quote = decode_swap_quote(value).unwrap();

        assert_eq!(quote.output_amount, BigUint::from(u128::MAX));
        assert_eq!(quote.fee_amount, BigUint::from(0u32));
    }

    #[rstest]
    #[case::err_response(ClarityValue::err(ClarityValue::UInt(1001)))]
    #[case::err_with_tuple(ClarityValue::err(quote_tuple(ClarityValue::UInt(1), ClarityValue::UInt(1))))]
    #[case::ok_uint(ClarityValue::ok(ClarityValue::UInt(995)))]
    #[case::ok_none(ClarityValue::ok(ClarityValue::OptionalNone))]
    #[case::bare_tuple(quote_tuple(ClarityValue::UInt(995), ClarityValue::UInt(5)))]
    fn test_decode_unexpected_result(#[case] value: ClarityValue) {
        let err = decode_swap_quote(value).unwrap_err();

        assert!(matches!(err, QuoteError::UnexpectedResult(_)));
        assert_eq!(err.to_string(), "Could not retrieve swap quote");
    }

    #[rstest]
    #[case::signed_output(quote_tuple(ClarityValue::Int(995), ClarityValue::UInt(5)))]
    #[case::signed_fee(quote_tuple(ClarityValue::UInt(995), ClarityValue::Int(5)))]
    #[case::missing_output(ClarityValue::tuple([(FEE_AMOUNT_KEY, ClarityValue::UInt(5))]))]
    #[case::missing_fee(ClarityValue::tuple([(OUTPUT_AMOUNT_KEY, ClarityValue::UInt(995))]))]
    #[case::empty(ClarityValue::tuple::<String, _>([]))]
    fn test_decode_unexpected_shape(#[case] tuple: ClarityValue) {
        let err = decode_swap_quote(ClarityValue::ok(tuple)).unwrap_err();

        assert!(matches!(err, QuoteError::UnexpectedShape(_)));
        assert_eq!(err.to_string(), "Unexpected quote return shape");
    }

    #[test]
    fn test_rpc_error_message_is_transparent() {
        let err = QuoteError::from(RPCError::CallFailed("NoSuchContract".to_string()));

        assert_eq!(err.to_string(), "NoSuchContract");
    }
}
