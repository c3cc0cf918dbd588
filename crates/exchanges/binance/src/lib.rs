//! Binance USDT-M futures adapter.
//!
//! Public REST market data only; no authenticated endpoints.

pub mod client;
pub mod protocol;

pub use client::BinanceClient;
