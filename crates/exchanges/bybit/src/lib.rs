//! Bybit V5 linear futures adapter.

pub mod client;
pub mod protocol;

pub use client::BybitClient;
