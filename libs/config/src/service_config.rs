//! Service Configuration Module
//!
//! Loads the Meridian runtime configuration from a TOML file, layered with an
//! optional environment-specific file and `MERIDIAN_`-prefixed environment
//! variables. Every field has a default, so an empty (or missing) base file
//! yields a runnable single-instance configuration.

use crate::defaults;
use anyhow::{ensure, Context, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use types::{Timeframe, VenueId};

/// Default location of the base configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/meridian.toml";

/// Prefix for environment variable overrides, e.g. `MERIDIAN_OWNERSHIP__ENABLED`
pub const ENV_PREFIX: &str = "MERIDIAN";

/// Top-level runtime configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct MeridianConfig {
    pub logging: LoggingConfig,
    pub market_data: MarketDataConfig,
    pub subscriptions: SubscriptionsConfig,
    pub ownership: OwnershipConfig,
    pub strategies: StrategiesConfig,
}

/// Log output settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence when set
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Market data engine settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct MarketDataConfig {
    pub venue: VenueId,
    /// Logical symbols, e.g. `BTC/USDT`
    pub symbols: Vec<String>,
    pub timeframes: Vec<Timeframe>,
    pub series_capacity: usize,
    pub bootstrap_cap: usize,
    pub page_size: usize,
    pub bootstrap_permits: usize,
    pub bootstrap_delay_ms: u64,
    pub reconnect_delay_ms: u64,
    pub connect_timeout_ms: u64,
    pub ws_url: String,
    pub rest_url: String,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        use defaults::market_data::*;
        Self {
            venue: VenueId::Binance,
            symbols: vec!["BTC/USDT".to_string()],
            timeframes: Timeframe::ALL.to_vec(),
            series_capacity: SERIES_CAPACITY,
            bootstrap_cap: BOOTSTRAP_CAP,
            page_size: PAGE_SIZE,
            bootstrap_permits: BOOTSTRAP_PERMITS,
            bootstrap_delay_ms: BOOTSTRAP_DELAY_MS,
            reconnect_delay_ms: RECONNECT_DELAY_MS,
            connect_timeout_ms: CONNECT_TIMEOUT_MS,
            ws_url: BINANCE_WS_URL.to_string(),
            rest_url: BINANCE_REST_URL.to_string(),
        }
    }
}

impl MarketDataConfig {
    pub fn bootstrap_delay(&self) -> Duration {
        Duration::from_millis(self.bootstrap_delay_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Defaults applied to task subscriptions
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SubscriptionsConfig {
    /// `None` means unbounded queues
    pub default_capacity: Option<usize>,
    /// One of `wait`, `drop_oldest`, `drop_newest`, `reject`
    pub overflow_policy: String,
    pub warn_threshold_percent: u8,
    pub warn_interval_ms: u64,
}

impl Default for SubscriptionsConfig {
    fn default() -> Self {
        use defaults::subscriptions::*;
        Self {
            default_capacity: Some(DEFAULT_CAPACITY),
            overflow_policy: OVERFLOW_POLICY.to_string(),
            warn_threshold_percent: WARN_THRESHOLD_PERCENT,
            warn_interval_ms: WARN_INTERVAL_MS,
        }
    }
}

impl SubscriptionsConfig {
    pub fn warn_interval(&self) -> Duration {
        Duration::from_millis(self.warn_interval_ms)
    }
}

/// Distributed strategy ownership settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct OwnershipConfig {
    /// When false every lease operation is a local no-op
    pub enabled: bool,
    /// Falls back to `hostname-uuid` when unset
    pub instance_id: Option<String>,
    pub redis_url: String,
    pub key_prefix: String,
    pub lease_ttl_secs: u64,
    pub renew_interval_secs: u64,
    pub reconcile_interval_secs: u64,
}

impl Default for OwnershipConfig {
    fn default() -> Self {
        use defaults::ownership::*;
        Self {
            enabled: false,
            instance_id: None,
            redis_url: REDIS_URL.to_string(),
            key_prefix: KEY_PREFIX.to_string(),
            lease_ttl_secs: LEASE_TTL_SECS,
            renew_interval_secs: RENEW_INTERVAL_SECS,
            reconcile_interval_secs: RECONCILE_INTERVAL_SECS,
        }
    }
}

impl OwnershipConfig {
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    pub fn renew_interval(&self) -> Duration {
        Duration::from_secs(self.renew_interval_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}

/// Strategy definition source
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct StrategiesConfig {
    /// Directory holding one `<id>.json` document per strategy
    pub definitions_dir: PathBuf,
}

impl Default for StrategiesConfig {
    fn default() -> Self {
        Self {
            definitions_dir: PathBuf::from("./strategies"),
        }
    }
}

impl MeridianConfig {
    /// Load configuration from files with environment overrides
    ///
    /// An explicitly given `base_path` must exist. Without one the default
    /// path is tried and silently skipped when absent. Environment files are
    /// looked up in `environments/{env}.toml` next to the base file.
    pub fn load(base_path: Option<&Path>, environment: Option<&str>) -> Result<Self> {
        let (base, required) = match base_path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        let mut builder = Config::builder().add_source(File::from(base.as_path()).required(required));

        if let Some(env) = environment {
            let env_file = base
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("environments")
                .join(format!("{}.toml", env));

            if env_file.exists() {
                info!("Loading environment config: {:?}", env_file);
                builder = builder.add_source(File::from(env_file));
            } else {
                warn!("Environment config not found: {:?}", env_file);
            }
        }

        // MERIDIAN_MARKET_DATA__SYMBOLS="BTC/USDT,ETH/USDT"
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("market_data.symbols")
                .with_list_parse_key("market_data.timeframes")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let loaded: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        debug!(?loaded, "Configuration loaded");
        Ok(loaded)
    }

    /// Reject values that can never produce a working runtime
    pub fn validate(&self) -> Result<()> {
        let md = &self.market_data;
        ensure!(md.series_capacity > 0, "market_data.series_capacity must be > 0");
        ensure!(md.bootstrap_permits > 0, "market_data.bootstrap_permits must be > 0");
        ensure!(md.page_size > 0, "market_data.page_size must be > 0");
        ensure!(
            md.timeframes.contains(&Timeframe::FINEST),
            "market_data.timeframes must include {}",
            Timeframe::FINEST
        );
        ensure!(!md.symbols.is_empty(), "market_data.symbols must not be empty");

        let subs = &self.subscriptions;
        ensure!(
            subs.default_capacity != Some(0),
            "subscriptions.default_capacity must be > 0 (omit it for unbounded)"
        );
        ensure!(
            (1..=100).contains(&subs.warn_threshold_percent),
            "subscriptions.warn_threshold_percent must be within 1..=100"
        );

        let own = &self.ownership;
        ensure!(own.lease_ttl_secs > 0, "ownership.lease_ttl_secs must be > 0");
        ensure!(
            own.renew_interval_secs > 0 && own.renew_interval_secs < own.lease_ttl_secs,
            "ownership.renew_interval_secs ({}) must be > 0 and shorter than lease_ttl_secs ({})",
            own.renew_interval_secs,
            own.lease_ttl_secs
        );
        ensure!(
            own.reconcile_interval_secs > 0,
            "ownership.reconcile_interval_secs must be > 0"
        );
        ensure!(!own.key_prefix.is_empty(), "ownership.key_prefix must not be empty");
        Ok(())
    }

    /// Expand environment variables in paths and URLs
    pub fn expand_env_vars(&mut self) -> Result<()> {
        let md = &mut self.market_data;
        md.ws_url = shellexpand::env(&md.ws_url)
            .context("Failed to expand websocket URL")?
            .to_string();
        md.rest_url = shellexpand::env(&md.rest_url)
            .context("Failed to expand REST URL")?
            .to_string();

        self.ownership.redis_url = shellexpand::env(&self.ownership.redis_url)
            .context("Failed to expand redis URL")?
            .to_string();

        if let Some(dir) = self.strategies.definitions_dir.to_str() {
            let expanded = shellexpand::full(dir).context("Failed to expand definitions path")?;
            self.strategies.definitions_dir = PathBuf::from(expanded.as_ref());
        }

        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

/// Convenience function: load, expand and validate
pub fn load_config(base_path: Option<&Path>, environment: Option<&str>) -> Result<MeridianConfig> {
    let mut config = MeridianConfig::load(base_path, environment)?;
    config.expand_env_vars()?;
    config.validate()?;
    Ok(config)
}
