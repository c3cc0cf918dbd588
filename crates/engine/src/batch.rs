//! Fan one call out across many symbols.

use futures_util::future::join_all;
use perpdata_core::MarketDataError;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use tracing::{debug, warn};

/// Uppercase every symbol, dropping repeats but keeping first-seen order.
/// A blank entry rejects the whole list.
pub fn normalize_symbols(symbols: &[String]) -> Result<Vec<String>, MarketDataError> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(symbols.len());
    for raw in symbols {
        let symbol = raw.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(MarketDataError::Validation(
                "symbol must not be empty".to_string(),
            ));
        }
        if seen.insert(symbol.clone()) {
            out.push(symbol);
        }
    }
    Ok(out)
}

/// Run `call` once per symbol concurrently and key the results by symbol.
///
/// All calls are awaited before anything is assembled. If any call fails the
/// whole batch fails with the first error in input order. An empty list
/// returns an empty map without calling anything, and a blank symbol fails
/// before any call is made. Concurrency is unbounded; the exchange rate
/// limiter is the only throttle.
pub async fn fanout<T, F, Fut>(
    symbols: &[String],
    call: F,
) -> Result<BTreeMap<String, T>, MarketDataError>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T, MarketDataError>>,
{
    let symbols = normalize_symbols(symbols)?;
    if symbols.is_empty() {
        return Ok(BTreeMap::new());
    }
    debug!(symbols = symbols.len(), "Fanning out batch");

    let results = join_all(symbols.iter().cloned().map(&call)).await;

    let mut out = BTreeMap::new();
    for (symbol, result) in symbols.into_iter().zip(results) {
        match result {
            Ok(value) => {
                out.insert(symbol, value);
            }
            Err(err) => {
                warn!(%symbol, error = %err, "Batch aborted on symbol failure");
                return Err(err);
            }
        }
    }
    Ok(out)
}

/// Outcome for one symbol of a partial batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolOutcome<T> {
    Ok(T),
    Error(String),
}

impl<T> From<Result<T, MarketDataError>> for SymbolOutcome<T> {
    fn from(result: Result<T, MarketDataError>) -> Self {
        match result {
            Ok(value) => SymbolOutcome::Ok(value),
            Err(err) => SymbolOutcome::Error(err.to_string()),
        }
    }
}

/// Like [`fanout`], but a failing symbol is recorded next to the others
/// instead of failing the batch.
/// A blank symbol still rejects the whole list.
pub async fn fanout_partial<T, F, Fut>(
    symbols: &[String],
    call: F,
) -> Result<BTreeMap<String, SymbolOutcome<T>>, MarketDataError>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T, MarketDataError>>,
{
    let symbols = normalize_symbols(symbols)?;
    if symbols.is_empty() {
        return Ok(BTreeMap::new());
    }

    let results = join_all(symbols.iter().cloned().map(&call)).await;
    Ok(symbols
        .into_iter()
        .zip(results)
        .map(|(symbol, result)| (symbol, SymbolOutcome::from(result)))
        .collect())
}

/// Result of a batch tool: a plain symbol map, or per-symbol outcomes when
/// partial results were asked for.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BatchOutput<T> {
    Complete(BTreeMap<String, T>),
    Partial(BTreeMap<String, SymbolOutcome<T>>),
}

/// Run a batch in the mode the caller asked for.
pub async fn run<T, F, Fut>(
    symbols: &[String],
    allow_partial: bool,
    call: F,
) -> Result<BatchOutput<T>, MarketDataError>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T, MarketDataError>>,
{
    if allow_partial {
        Ok(BatchOutput::Partial(fanout_partial(symbols, call).await?))
    } else {
        Ok(BatchOutput::Complete(fanout(symbols, call).await?))
    }
}
