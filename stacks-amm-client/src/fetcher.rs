//! # Quote fetcher
//!
//! Keeps a `{quote, isLoading, error}` state in sync with the latest quote inputs. Every
//! trigger starts a new request generation; responses belonging to an older generation are
//! dropped, whatever order they arrive in. In-flight HTTP requests are never aborted, only
//! their results are ignored.
//!
//! State is published through a [`tokio::sync::watch`] channel. The generation counter only
//! advances while the channel's write lock is held, and responses check it under that same
//! lock, so a superseded response can never write after a newer trigger ran.
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use serde::Serialize;
use stacks_amm_common::models::{Pool, SwapQuote};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, instrument, trace, warn};

use crate::{
    config::QuoteConfig,
    quote::{build_quote_call, decode_swap_quote, QuoteError},
    rpc::{ReadOnlyCall, ReadOnlyClient},
};

/// Everything a quote depends on. Any change triggers a new fetch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuoteInputs {
    /// `None` while the pool is still loading.
    pub pool: Option<Pool>,
    pub amount_in: i128,
    pub zero_for_one: bool,
}

impl QuoteInputs {
    pub fn new(pool: Option<Pool>, amount_in: i128, zero_for_one: bool) -> Self {
        Self { pool, amount_in, zero_for_one }
    }

    /// The pool and unsigned amount to quote, or `None` if no request should be made.
    fn fetchable(&self) -> Option<(&Pool, u128)> {
        let pool = self.pool.as_ref()?;
        if self.amount_in <= 0 {
            return None;
        }
        let amount_in = u128::try_from(self.amount_in).ok()?;
        Some((pool, amount_in))
    }
}

/// Observable quote state. `quote` and `error` are never set at the same time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteState {
    pub quote: Option<SwapQuote>,
    pub is_loading: bool,
    pub error: Option<String>,
}

struct Shared {
    generation: AtomicU64,
    state: watch::Sender<QuoteState>,
}

impl Shared {
    /// Starts a new generation, applying `f` to the state within the same critical section.
    fn advance<F>(&self, f: F) -> u64
    where
        F: FnOnce(&mut QuoteState) -> bool,
    {
        let mut generation = 0;
        self.state.send_if_modified(|state| {
            generation = self
                .generation
                .fetch_add(1, Ordering::SeqCst)
                .wrapping_add(1);
            f(state)
        });
        generation
    }

    /// Writes a response into the state if `generation` is still the current one.
    ///
    /// Returns whether the state was updated.
    fn publish(&self, generation: u64, result: Result<SwapQuote, QuoteError>) -> bool {
        self.state.send_if_modified(|state| {
            let current = self
                .generation
                .load(Ordering::SeqCst);
            if current != generation {
                debug!(generation, current, "Discarding superseded quote response");
                return false;
            }
            match result {
                Ok(quote) => {
                    trace!(?quote, "Publishing swap quote");
                    state.quote = Some(quote);
                    state.error = None;
                }
                Err(err) => {
                    warn!(error = %err, "Swap quote request failed");
                    state.quote = None;
                    state.error = Some(err.to_string());
                }
            }
            state.is_loading = false;
            true
        })
    }
}

/// Fetches swap quotes for changing inputs and publishes the outcome.
///
/// Dropping the fetcher cancels the request in flight.
pub struct QuoteFetcher<C: ReadOnlyClient> {
    client: Arc<C>,
    config: Arc<QuoteConfig>,
    shared: Arc<Shared>,
    inputs: Option<QuoteInputs>,
}

impl<C> QuoteFetcher<C>
where
    C: ReadOnlyClient + 'static,
{
    pub fn new(client: Arc<C>, config: QuoteConfig) -> Self {
        let (state, _) = watch::channel(QuoteState::default());
        Self {
            client,
            config: Arc::new(config),
            shared: Arc::new(Shared { generation: AtomicU64::new(0), state }),
            inputs: None,
        }
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<QuoteState> {
        self.shared.state.subscribe()
    }

    /// A snapshot of the current state.
    pub fn state(&self) -> QuoteState {
        self.shared.state.borrow().clone()
    }

    /// The inputs of the last evaluation, if any.
    pub fn inputs(&self) -> Option<&QuoteInputs> {
        self.inputs.as_ref()
    }

    /// The current request generation.
    pub fn generation(&self) -> u64 {
        self.shared
            .generation
            .load(Ordering::SeqCst)
    }

    /// Re-evaluates the quote if `inputs` differ from the last evaluated ones.
    ///
    /// Returns the handle of the spawned request, if one was started. Must be called from
    /// within a tokio runtime.
    pub fn update(&mut self, inputs: QuoteInputs) -> Option<JoinHandle<()>> {
        if self.inputs.as_ref() == Some(&inputs) {
            trace!("Quote inputs unchanged, skipping evaluation");
            return None;
        }
        self.evaluate(inputs)
    }

    /// Re-evaluates the quote for the last inputs, even if they did not change.
    pub fn refresh(&mut self) -> Option<JoinHandle<()>> {
        let inputs = self.inputs.clone()?;
        self.evaluate(inputs)
    }

    /// Cancels the request in flight. Its response will not touch the state.
    pub fn cancel(&mut self) {
        let generation = self.shared.advance(|state| {
            let was_loading = state.is_loading;
            state.is_loading = false;
            was_loading
        });
        debug!(generation, "Cancelled quote request");
    }

    fn evaluate(&mut self, inputs: QuoteInputs) -> Option<JoinHandle<()>> {
        let mut call = None;
        let generation = self.shared.advance(|state| {
            match inputs.fetchable() {
                Some((pool, amount_in)) => {
                    state.is_loading = true;
                    state.error = None;
                    call = Some(build_quote_call(
                        &self.config,
                        pool,
                        amount_in,
                        inputs.zero_for_one,
                    ));
                }
                None => {
                    // Nothing to quote. The superseded request will never clear the loading
                    // flag, so it is cleared here.
                    state.quote = None;
                    state.error = None;
                    state.is_loading = false;
                }
            }
            true
        });
        self.inputs = Some(inputs);

        let Some(call) = call else {
            debug!(generation, "Skipping quote request: pool missing or amount not positive");
            return None;
        };
        debug!(generation, "Starting quote request");
        Some(tokio::spawn(fetch_quote(
            Arc::clone(&self.client),
            Arc::clone(&self.shared),
            generation,
            call,
        )))
    }
}

impl<C: ReadOnlyClient> Drop for QuoteFetcher<C> {
    fn drop(&mut self) {
        // supersede any request in flight; subscribers keep the last state
        self.shared.advance(|_| false);
    }
}

#[instrument(skip(client, shared, call), fields(function = %call.function_name))]
async fn fetch_quote<C>(client: Arc<C>, shared: Arc<Shared>, generation: u64, call: ReadOnlyCall)
where
    C: ReadOnlyClient + ?Sized,
{
    let result = match client.call_read_only(&call).await {
        Ok(value) => decode_swap_quote(value),
        Err(err) => Err(QuoteError::from(err)),
    };
    if !shared.publish(generation, result) {
        trace!("Quote response superseded");
    }
}
