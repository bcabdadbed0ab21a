//! # Task Subscriptions
//!
//! Backpressure-aware distribution of [`types::MarketDataTask`] events to
//! independent consumers. Each subscription owns its own queue, so a slow
//! consumer only ever loses its own tasks.
//!
//! ```rust
//! use task_subscription::{ChannelOptions, OverflowPolicy, PressureConfig, SubscriptionRegistry};
//!
//! let registry = SubscriptionRegistry::new(
//!     ChannelOptions::bounded(256, OverflowPolicy::DropOldest),
//!     PressureConfig::default(),
//! );
//! let signals = registry.register("signals", true, None, None).unwrap();
//! assert!(signals.only_bar_close());
//! ```

pub mod channel;
pub mod error;
pub mod pressure;
pub mod registry;
pub mod subscription;

pub use channel::{ChannelFactory, ChannelOptions, OverflowPolicy, TaskQueue, WriteOutcome};
pub use error::{Result, SubscriptionError};
pub use pressure::{PressureConfig, PressureSnapshot, QueuePressureMonitor};
pub use registry::{PublishReport, SubscriptionRegistry};
pub use subscription::TaskSubscription;
