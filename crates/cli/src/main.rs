use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use perpdata_core::Exchange;
use perpdata_engine::{catalogue, EngineConfig, ExchangeOverrides};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "perpdata")]
#[command(about = "Perpetual futures market data from Binance and Bybit, served as callable tools")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", env = "PERPDATA_LOG_LEVEL")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", env = "PERPDATA_LOG_FORMAT")]
    log_format: LogFormat,

    /// TOML config file. Flags and environment variables override it.
    #[arg(short, long, env = "PERPDATA_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: ConfigOverrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Args, Debug, Default)]
struct ConfigOverrides {
    /// HTTP request timeout in seconds
    #[arg(long, env = "PERPDATA_HTTP_TIMEOUT")]
    http_timeout: Option<u64>,

    /// Throttle requests to each exchange's rate limit
    #[arg(long, env = "PERPDATA_RATE_LIMIT_ENABLED")]
    rate_limit_enabled: Option<bool>,

    /// Retry requests the exchange rejected for rate limiting
    #[arg(long, env = "PERPDATA_RATE_LIMIT_RETRY_ENABLED")]
    rate_limit_retry_enabled: Option<bool>,

    /// Attempts per request, first one included
    #[arg(long, env = "PERPDATA_MAX_RETRIES")]
    max_retries: Option<u32>,

    /// Cache open interest, ticker and mark price snapshots
    #[arg(long, env = "PERPDATA_CACHE_ENABLED")]
    cache_enabled: Option<bool>,

    /// Snapshot cache TTL in seconds
    #[arg(long, env = "PERPDATA_CACHE_TTL")]
    cache_ttl: Option<f64>,

    #[arg(long, env = "PERPDATA_BINANCE_BASE_URL")]
    binance_base_url: Option<String>,

    /// Binance requests per window
    #[arg(long, env = "PERPDATA_BINANCE_RATE_LIMIT")]
    binance_rate_limit: Option<usize>,

    #[arg(long, env = "PERPDATA_BINANCE_WINDOW_SECS")]
    binance_window_secs: Option<u64>,

    #[arg(long, env = "PERPDATA_BYBIT_BASE_URL")]
    bybit_base_url: Option<String>,

    /// Bybit requests per window
    #[arg(long, env = "PERPDATA_BYBIT_RATE_LIMIT")]
    bybit_rate_limit: Option<usize>,

    #[arg(long, env = "PERPDATA_BYBIT_WINDOW_SECS")]
    bybit_window_secs: Option<u64>,
}

impl ConfigOverrides {
    fn apply(&self, config: &mut EngineConfig) {
        if let Some(v) = self.http_timeout {
            config.http_timeout_secs = v;
        }
        if let Some(v) = self.rate_limit_enabled {
            config.rate_limit_enabled = v;
        }
        if let Some(v) = self.rate_limit_retry_enabled {
            config.rate_limit_retry_enabled = v;
        }
        if let Some(v) = self.max_retries {
            config.max_retries = v;
        }
        if let Some(v) = self.cache_enabled {
            config.cache_enabled = v;
        }
        if let Some(v) = self.cache_ttl {
            config.cache_ttl_secs = v;
        }
        ExchangeOverrides {
            base_url: self.binance_base_url.clone(),
            rate_limit: self.binance_rate_limit,
            window_secs: self.binance_window_secs,
        }
        .apply(config.settings_mut(Exchange::Binance));
        ExchangeOverrides {
            base_url: self.bybit_base_url.clone(),
            rate_limit: self.bybit_rate_limit,
            window_secs: self.bybit_window_secs,
        }
        .apply(config.settings_mut(Exchange::Bybit));
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP tool server
    Serve {
        /// Bind address
        #[arg(short, long, default_value = "0.0.0.0:3000", env = "PERPDATA_BIND")]
        bind: String,
    },

    /// Call one tool and print its JSON result
    Call {
        /// Tool name (see `perpdata tools`)
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,
    },

    /// List available tools
    Tools,

    /// Print the effective configuration as TOML
    Config,
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    cli.overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing. Logs go to stderr so `call` output stays parseable.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    match cli.log_format {
        LogFormat::Text => fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init(),
    }

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Serve { bind } => {
            let service = config.build_service()?;
            perpdata_api::start_server(service, &bind).await?;
        }
        Commands::Call { tool, args } => {
            let args: serde_json::Value =
                serde_json::from_str(&args).context("--args is not valid JSON")?;
            let service = config.build_service()?;
            let result = service
                .call(&tool, args)
                .await
                .with_context(|| format!("{} failed", tool))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Tools => {
            println!("Available tools:");
            for tool in catalogue::tools() {
                println!("  {:<32} {}", tool.name, tool.description);
            }
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
