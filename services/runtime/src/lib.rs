//! # Meridian Runtime
//!
//! Wires the market data engine, task subscriptions and strategy ownership
//! into one service. The `meridian` binary is a thin CLI over [`app::run`].

pub mod active;
pub mod app;
pub mod logging;
pub mod repository;

pub use active::{run_evaluation_consumer, ActiveStrategies};
pub use app::{build_registry, run, EVALUATION_SUBSCRIPTION};
pub use logging::init_logging;
pub use repository::FileStrategyRepository;
