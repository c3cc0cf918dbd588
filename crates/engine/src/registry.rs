use perpdata_core::{Exchange, ExchangeClient, MarketDataError};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Exchange clients looked up by name.
#[derive(Default, Clone)]
pub struct ExchangeRegistry {
    clients: BTreeMap<Exchange, Arc<dyn ExchangeClient>>,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client under the exchange it reports. Replaces any
    /// previous client for that exchange.
    pub fn register(&mut self, client: Arc<dyn ExchangeClient>) -> &mut Self {
        self.clients.insert(client.exchange(), client);
        self
    }

    pub fn get(&self, exchange: Exchange) -> Result<Arc<dyn ExchangeClient>, MarketDataError> {
        self.clients.get(&exchange).cloned().ok_or_else(|| {
            MarketDataError::Validation(format!("Exchange {} is not configured", exchange))
        })
    }

    /// Resolve a user-supplied exchange name, defaulting to Binance.
    pub fn resolve(
        &self,
        name: Option<&str>,
    ) -> Result<(Exchange, Arc<dyn ExchangeClient>), MarketDataError> {
        let exchange = match name {
            Some(name) => name.parse::<Exchange>()?,
            None => Exchange::Binance,
        };
        Ok((exchange, self.get(exchange)?))
    }

    pub fn exchanges(&self) -> Vec<Exchange> {
        self.clients.keys().copied().collect()
    }
}

impl std::fmt::Debug for ExchangeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeRegistry")
            .field("exchanges", &self.exchanges())
            .finish()
    }
}
