use std::time::Duration;

use stacks_amm_common::{
    c32::AddressError, clarity::principal::validate_contract_name, StandardPrincipal,
};

/// Name of the read-only quote function exposed by the AMM contract.
pub const GET_SWAP_QUOTE: &str = "get-swap-quote";

/// Default name of the AMM contract.
pub const DEFAULT_CONTRACT_NAME: &str = "amm";

/// Identifies the AMM contract and the caller used for quote calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuoteConfig {
    contract_address: StandardPrincipal,
    contract_name: String,
    function_name: String,
    sender: StandardPrincipal,
}

impl QuoteConfig {
    /// Creates a config for `contract_address.contract_name`. The sender defaults to the
    /// contract address.
    pub fn new(
        contract_address: StandardPrincipal,
        contract_name: &str,
    ) -> Result<Self, AddressError> {
        validate_contract_name(contract_name)?;
        Ok(Self {
            contract_address,
            contract_name: contract_name.to_string(),
            function_name: GET_SWAP_QUOTE.to_string(),
            sender: contract_address,
        })
    }

    /// Set the address the read-only call is evaluated as.
    pub fn with_sender(mut self, sender: StandardPrincipal) -> Self {
        self.sender = sender;
        self
    }

    /// Override the quote function name (default: `get-swap-quote`).
    pub fn with_function_name(mut self, function_name: &str) -> Self {
        self.function_name = function_name.to_string();
        self
    }

    pub fn contract_address(&self) -> &StandardPrincipal {
        &self.contract_address
    }

    pub fn contract_name(&self) -> &str {
        &self.contract_name
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn sender(&self) -> &StandardPrincipal {
        &self.sender
    }
}

/// How the HTTP transport deals with transient failures (rate limits, gateway errors).
#[non_exhaustive]
#[derive(Clone, Debug)]
pub enum RetryConfiguration {
    /// Every request is attempted exactly once.
    Disabled,
    Exponential(ExponentialRetryConfiguration),
}

impl Default for RetryConfiguration {
    fn default() -> Self {
        RetryConfiguration::exponential(
            Duration::from_millis(250),
            1.75,
            Duration::from_secs(5),
            Some(Duration::from_secs(30)),
        )
    }
}

impl RetryConfiguration {
    pub fn disabled() -> Self {
        RetryConfiguration::Disabled
    }

    pub fn exponential(
        initial_interval: Duration,
        multiplier: f64,
        max_interval: Duration,
        max_elapsed_time: Option<Duration>,
    ) -> Self {
        RetryConfiguration::Exponential(ExponentialRetryConfiguration::new(
            initial_interval,
            multiplier,
            max_interval,
            max_elapsed_time,
        ))
    }
}

#[derive(Clone, Debug)]
pub struct ExponentialRetryConfiguration {
    initial_interval: Duration,
    multiplier: f64,
    max_interval: Duration,
    max_elapsed_time: Option<Duration>,
}

impl ExponentialRetryConfiguration {
    pub fn new(
        initial_interval: Duration,
        multiplier: f64,
        max_interval: Duration,
        max_elapsed_time: Option<Duration>,
    ) -> Self {
        Self { initial_interval, multiplier, max_interval, max_elapsed_time }
    }

    pub fn initial_interval(&self) -> Duration {
        self.initial_interval
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    pub fn max_elapsed_time(&self) -> Option<Duration> {
        self.max_elapsed_time
    }
}
