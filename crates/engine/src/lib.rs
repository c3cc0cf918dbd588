pub mod args;
pub mod batch;
pub mod cache;
pub mod catalogue;
pub mod config;
pub mod registry;
pub mod service;

#[cfg(test)]
mod testing;

pub use batch::{BatchOutput, SymbolOutcome};
pub use cache::{CacheStats, CacheStatsSnapshot, TtlCache};
pub use catalogue::ToolSpec;
pub use config::{ConfigError, EngineConfig, ExchangeOverrides};
pub use registry::ExchangeRegistry;
pub use service::{CacheSettings, DerivedMetrics, OneOrList, ToolError, ToolService};
