//! Swap quotes for a Stacks AMM contract.
//!
//! [`QuoteFetcher`] keeps a quote in sync with changing inputs, calling the contract's
//! read-only `get-swap-quote` function through a [`ReadOnlyClient`].
pub mod cli;
pub mod config;
pub mod fetcher;
pub mod quote;
pub mod rpc;

pub use config::{QuoteConfig, RetryConfiguration};
pub use fetcher::{QuoteFetcher, QuoteInputs, QuoteState};
pub use quote::QuoteError;
pub use rpc::{HttpReadOnlyClient, HttpReadOnlyClientOptions, RPCError, ReadOnlyClient};
