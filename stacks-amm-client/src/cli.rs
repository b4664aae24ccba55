use std::{sync::Arc, time::Duration};

use clap::{Args, Parser, Subcommand};
use stacks_amm_common::{
    models::{Network, Pool},
    Principal, StandardPrincipal,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_appender::rolling;

use crate::{
    config::{QuoteConfig, RetryConfiguration, DEFAULT_CONTRACT_NAME},
    fetcher::{QuoteFetcher, QuoteInputs, QuoteState},
    rpc::{HttpReadOnlyClientOptions, ReadOnlyClient},
    HttpReadOnlyClient,
};

/// Stacks AMM Client CLI - Fetch swap quotes from an AMM contract
///
/// Quotes are computed by the contract's read-only `get-swap-quote` function, evaluated by a
/// Stacks node.
#[derive(Parser, Debug, Clone, PartialEq)]
#[clap(version = env!("CARGO_PKG_VERSION"))]
struct CliArgs {
    /// The Stacks network to query
    #[clap(long, default_value = "testnet", env = "STACKS_NETWORK")]
    network: Network,

    /// Node API URL. Defaults to the public Hiro API of the selected network.
    #[clap(long, env = "STACKS_NODE_URL")]
    node_url: Option<String>,

    /// Address that deployed the AMM contract
    #[clap(long, env = "AMM_CONTRACT_ADDRESS")]
    contract_address: StandardPrincipal,

    /// Name of the AMM contract
    #[clap(long, default_value = DEFAULT_CONTRACT_NAME, env = "AMM_CONTRACT_NAME")]
    contract_name: String,

    /// Address the read-only call is evaluated as. Defaults to the contract address.
    #[clap(long, env = "STACKS_SENDER")]
    sender: Option<StandardPrincipal>,

    /// Node API key, sent as `x-api-key`. Can be set with STACKS_API_KEY env variable.
    #[clap(short = 'k', long, env = "STACKS_API_KEY")]
    api_key: Option<String>,

    /// HTTP request timeout in seconds
    #[clap(long, default_value = "10")]
    timeout: u64,

    /// If set, rate limited or failed requests are not retried.
    #[clap(long)]
    no_retry: bool,

    /// Logging folder path.
    #[clap(long, default_value = "logs")]
    log_folder: String,

    /// Enable verbose logging.
    #[clap(long)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum Command {
    /// Fetch a single quote and print it as JSON
    Quote {
        #[clap(flatten)]
        pool: PoolArgs,

        /// Amount of the input token, in its smallest unit
        #[clap(long, allow_negative_numbers = true)]
        amount: i128,

        /// Swap token-1 for token-0 instead of token-0 for token-1
        #[clap(long)]
        one_for_zero: bool,
    },
    /// Read `<amount> [zero-for-one|one-for-zero]` lines from stdin and print the latest quote
    /// state as a JSON line whenever it changes. States published in quick succession may be
    /// coalesced into the last one.
    Watch {
        #[clap(flatten)]
        pool: PoolArgs,
    },
}

#[derive(Args, Debug, Clone, PartialEq)]
struct PoolArgs {
    /// First token of the pool, e.g. SP...token-a
    #[clap(long = "token-0")]
    token_0: Principal,

    /// Second token of the pool
    #[clap(long = "token-1")]
    token_1: Principal,

    /// Fee tier of the pool
    #[clap(long)]
    fee: u128,
}

impl From<PoolArgs> for Pool {
    fn from(value: PoolArgs) -> Self {
        Pool::new(value.token_0, value.token_1, value.fee)
    }
}

impl CliArgs {
    fn validate(&self) -> Result<(), String> {
        let addresses =
            [("Contract address", Some(self.contract_address)), ("Sender", self.sender)];
        for (role, address) in addresses {
            let Some(address) = address else { continue };
            if !self
                .network
                .accepts_version(address.version())
            {
                return Err(format!(
                    "{role} {address} does not belong to {network}",
                    network = self.network
                ));
            }
        }
        Ok(())
    }

    fn quote_config(&self) -> Result<QuoteConfig, String> {
        let config = QuoteConfig::new(self.contract_address, &self.contract_name)
            .map_err(|e| format!("Invalid contract name {}: {e}", self.contract_name))?;
        Ok(match self.sender {
            Some(sender) => config.with_sender(sender),
            None => config,
        })
    }

    fn client_options(&self) -> HttpReadOnlyClientOptions {
        let retry = if self.no_retry {
            RetryConfiguration::disabled()
        } else {
            RetryConfiguration::default()
        };
        HttpReadOnlyClientOptions::new()
            .with_api_key(self.api_key.clone())
            .with_timeout(Some(Duration::from_secs(self.timeout)))
            .with_retry(retry)
    }
}

pub async fn run_cli() -> Result<(), String> {
    // Parse CLI Args
    let args: CliArgs = CliArgs::parse();
    args.validate()?;

    // Setup Logging
    let log_level = if args.verbose { "debug" } else { "info" };
    let (non_blocking, _guard) =
        tracing_appender::non_blocking(rolling::never(&args.log_folder, "dev_logs.log"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(non_blocking)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to set up logging subscriber: {e}"))?;

    run(args).await
}

async fn run(args: CliArgs) -> Result<(), String> {
    info!("Running with version: {}", option_env!("CARGO_PKG_VERSION").unwrap_or("unknown"));
    let config = args.quote_config()?;
    let options = args.client_options();
    let client = match &args.node_url {
        Some(url) => HttpReadOnlyClient::new(url, options),
        None => HttpReadOnlyClient::for_network(args.network, options),
    }
    .map_err(|e| format!("Failed to create node client: {e}"))?;
    info!(
        network = %args.network,
        contract = %format!("{}.{}", config.contract_address(), config.contract_name()),
        "Quoting against AMM contract"
    );

    match args.command {
        Command::Quote { pool, amount, one_for_zero } => {
            let inputs = QuoteInputs::new(Some(pool.into()), amount, !one_for_zero);
            let state = fetch_once(Arc::new(client), config, inputs).await?;
            print_state(&state)?;
            match state.error {
                Some(error) => Err(format!("Quote failed: {error}")),
                None => Ok(()),
            }
        }
        Command::Watch { pool } => watch(Arc::new(client), config, pool.into()).await,
    }
}

/// Evaluates `inputs` once and waits for the outcome.
async fn fetch_once<C>(
    client: Arc<C>,
    config: QuoteConfig,
    inputs: QuoteInputs,
) -> Result<QuoteState, String>
where
    C: ReadOnlyClient + 'static,
{
    let mut fetcher = QuoteFetcher::new(client, config);
    if let Some(handle) = fetcher.update(inputs) {
        handle
            .await
            .map_err(|e| format!("Quote task failed: {e}"))?;
    }
    Ok(fetcher.state())
}

async fn watch<C>(client: Arc<C>, config: QuoteConfig, pool: Pool) -> Result<(), String>
where
    C: ReadOnlyClient + 'static,
{
    let mut fetcher = QuoteFetcher::new(client, config);
    let mut rx = fetcher.subscribe();

    let state_printer = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            print_state(&state)?;
        }
        Ok::<(), String>(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending = None;
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| format!("Failed to read stdin: {e}"))?
    {
        match parse_watch_line(&line) {
            Ok(Some((amount_in, zero_for_one))) => {
                let inputs = QuoteInputs::new(Some(pool.clone()), amount_in, zero_for_one);
                if let Some(handle) = fetcher.update(inputs) {
                    pending = Some(handle);
                }
            }
            Ok(None) => continue,
            Err(e) => warn!("Ignoring input line: {e}"),
        }
    }

    debug!("stdin closed");
    if let Some(handle) = pending {
        handle
            .await
            .map_err(|e| format!("Quote task failed: {e}"))?;
    }
    // Closes the state channel once superseded requests finish.
    drop(fetcher);
    state_printer
        .await
        .map_err(|e| format!("State printer failed: {e}"))?
}

/// Parses `<amount> [zero-for-one|one-for-zero]`. Blank lines yield `None`.
fn parse_watch_line(line: &str) -> Result<Option<(i128, bool)>, String> {
    let mut parts = line.split_whitespace();
    let Some(amount) = parts.next() else {
        return Ok(None);
    };
    let amount = amount
        .parse::<i128>()
        .map_err(|e| format!("invalid amount {amount}: {e}"))?;
    let zero_for_one = match parts.next() {
        None | Some("zero-for-one") => true,
        Some("one-for-zero") => false,
        Some(other) => return Err(format!("unknown direction {other}")),
    };
    if let Some(extra) = parts.next() {
        return Err(format!("unexpected token {extra}"));
    }
    Ok(Some((amount, zero_for_one)))
}

fn print_state(state: &QuoteState) -> Result<(), String> {
    let json =
        serde_json::to_string(state).map_err(|e| format!("Failed to serialize quote state: {e}"))?;
    println!("{json}");
    Ok(())
}
