//! # Meridian Runtime Configuration
//!
//! Layered configuration for the Meridian runtime and its services.
//!
//! ## Features
//!
//! - **Layered sources**: base TOML file, optional `environments/{env}.toml`
//!   override, then `MERIDIAN_`-prefixed environment variables
//! - **Defaults everywhere**: an empty file is a valid single-instance setup
//! - **Validation**: impossible values are rejected before any service starts
//!
//! ## Usage
//!
//! ```rust,no_run
//! use runtime_config::load_config;
//!
//! let config = load_config(None, Some("staging")).unwrap();
//! println!("tracking {:?}", config.market_data.symbols);
//! ```

pub mod defaults;
pub mod service_config;

pub use service_config::{
    load_config, LoggingConfig, MarketDataConfig, MeridianConfig, OwnershipConfig,
    StrategiesConfig, SubscriptionsConfig, DEFAULT_CONFIG_PATH, ENV_PREFIX,
};
