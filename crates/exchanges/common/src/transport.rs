use perpdata_core::{Exchange, ExchangeError, MarketDataError};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// A raw HTTP response, before any exchange-specific error handling.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON, mapping failures to an exchange error.
    pub fn json<T: DeserializeOwned>(&self, exchange: Exchange) -> Result<T, MarketDataError> {
        serde_json::from_str(&self.body).map_err(|e| {
            ExchangeError::api(exchange, format!("unexpected response: {}", e), None).into()
        })
    }

    /// The generic error for a failed response whose body carries no usable error.
    pub fn status_error(&self, exchange: Exchange) -> MarketDataError {
        ExchangeError::api(
            exchange,
            format!("HTTP {}: {}", self.status, self.body),
            Some(i64::from(self.status)),
        )
        .into()
    }
}

/// Unauthenticated GET requests against one exchange's REST base URL.
#[derive(Debug, Clone)]
pub struct JsonTransport {
    exchange: Exchange,
    base_url: String,
    client: reqwest::Client,
}

impl JsonTransport {
    pub fn new(
        exchange: Exchange,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, MarketDataError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ExchangeError::api(exchange, format!("HTTP client setup failed: {}", e), None)
            })?;
        Ok(Self::with_client(exchange, base_url, client))
    }

    /// Share an existing connection pool.
    pub fn with_client(
        exchange: Exchange,
        base_url: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            exchange,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `base_url + path` with the given query parameters.
    ///
    /// Only transport failures are errors here; status handling is left to
    /// the exchange client, which knows how its error bodies look.
    pub async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<RawResponse, MarketDataError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(exchange = %self.exchange, endpoint = path, ?query, "GET");

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                ExchangeError::api(self.exchange, format!("request failed: {}", e), None)
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| {
                ExchangeError::api(
                    self.exchange,
                    format!("reading response failed: {}", e),
                    Some(i64::from(status)),
                )
            })?;

        Ok(RawResponse { status, body })
    }
}
