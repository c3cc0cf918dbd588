use crate::models::*;
use async_trait::async_trait;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Which kind of failure an exchange reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeErrorKind {
    /// Any other API or transport failure.
    Api,
    /// The exchange throttled the request. Retried by the executor.
    RateLimit,
    /// The trading pair does not exist on the exchange.
    SymbolNotFound,
}

/// An error reported by (or while talking to) an exchange.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("[{exchange}] {message}{}", code_suffix(.code))]
pub struct ExchangeError {
    pub exchange: Exchange,
    pub kind: ExchangeErrorKind,
    /// The exchange's own error code, or the HTTP status for non-JSON failures.
    pub code: Option<i64>,
    pub message: String,
}

fn code_suffix(code: &Option<i64>) -> String {
    match code {
        Some(code) => format!(" (code: {})", code),
        None => String::new(),
    }
}

impl ExchangeError {
    pub fn api(exchange: Exchange, message: impl Into<String>, code: Option<i64>) -> Self {
        Self {
            exchange,
            kind: ExchangeErrorKind::Api,
            code,
            message: message.into(),
        }
    }

    pub fn rate_limit(exchange: Exchange, message: impl Into<String>, code: i64) -> Self {
        Self {
            exchange,
            kind: ExchangeErrorKind::RateLimit,
            code: Some(code),
            message: message.into(),
        }
    }

    pub fn symbol_not_found(exchange: Exchange, message: impl Into<String>, code: i64) -> Self {
        Self {
            exchange,
            kind: ExchangeErrorKind::SymbolNotFound,
            code: Some(code),
            message: message.into(),
        }
    }
}

/// Errors surfaced by every market data operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketDataError {
    /// Bad input, caught before any network call.
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

impl MarketDataError {
    pub fn is_validation(&self) -> bool {
        matches!(self, MarketDataError::Validation(_))
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(
            self,
            MarketDataError::Exchange(ExchangeError {
                kind: ExchangeErrorKind::RateLimit,
                ..
            })
        )
    }

    pub fn exchange_error(&self) -> Option<&ExchangeError> {
        match self {
            MarketDataError::Exchange(err) => Some(err),
            MarketDataError::Validation(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Exchange Client Trait
// ---------------------------------------------------------------------------

/// Exchange-agnostic access to futures market data.
///
/// Symbols are expected to be uppercased by the caller. Every method returns
/// normalized models regardless of the exchange's wire format.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Which exchange this client talks to.
    fn exchange(&self) -> Exchange;

    /// Current open interest for a symbol.
    async fn open_interest(&self, symbol: &str) -> Result<OpenInterest, MarketDataError>;

    /// Historical open interest at a fixed period.
    async fn open_interest_history(
        &self,
        query: &HistoryQuery,
    ) -> Result<Vec<OpenInterest>, MarketDataError>;

    /// Funding rate history.
    async fn funding_rate(
        &self,
        query: &FundingRateQuery,
    ) -> Result<Vec<FundingRate>, MarketDataError>;

    /// 24h ticker statistics for one symbol, or every symbol when `None`.
    async fn ticker_24h(&self, symbol: Option<&str>) -> Result<Vec<Ticker24h>, MarketDataError>;

    /// OHLCV candles in chronological order.
    async fn klines(&self, query: &KlinesQuery) -> Result<Klines, MarketDataError>;

    /// Mark price and funding info for one symbol, or every symbol when `None`.
    async fn mark_price(&self, symbol: Option<&str>) -> Result<Vec<MarkPrice>, MarketDataError>;

    /// Top trader long/short ratio history.
    async fn long_short_ratio(
        &self,
        query: &HistoryQuery,
    ) -> Result<Vec<LongShortRatio>, MarketDataError>;
}
