//! One consumer-facing task queue plus its pressure monitor

use crate::channel::{ChannelOptions, TaskQueue, WriteOutcome};
use crate::error::{Result, SubscriptionError};
use crate::pressure::{PressureConfig, PressureSnapshot, QueuePressureMonitor};
use futures::stream::{self, Stream};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use types::MarketDataTask;

#[derive(Debug)]
pub struct TaskSubscription {
    name: String,
    only_bar_close: bool,
    queue: TaskQueue<MarketDataTask>,
    monitor: QueuePressureMonitor,
}

impl TaskSubscription {
    pub fn new(
        name: impl Into<String>,
        only_bar_close: bool,
        options: ChannelOptions,
        pressure: PressureConfig,
    ) -> Result<Self> {
        let name = name.into();
        let queue = TaskQueue::new(options)?;
        let monitor = QueuePressureMonitor::new(name.clone(), options.capacity, pressure);
        Ok(Self {
            name,
            only_bar_close,
            queue,
            monitor,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn only_bar_close(&self) -> bool {
        self.only_bar_close
    }

    pub fn options(&self) -> ChannelOptions {
        self.queue.options()
    }

    /// Delivery-time filter: bar-close-only subscriptions skip updates
    pub fn accepts(&self, task: &MarketDataTask) -> bool {
        !self.only_bar_close || task.is_bar_close
    }

    /// Non-blocking enqueue; overflow is reported through the monitor
    pub fn try_write(&self, task: MarketDataTask) -> WriteOutcome {
        let outcome = self.queue.try_write(task);
        self.observe(outcome);
        outcome
    }

    /// Enqueue, waiting for space only under the `Wait` policy
    pub async fn write(&self, task: MarketDataTask) -> WriteOutcome {
        let outcome = self.queue.write(task).await;
        self.observe(outcome);
        outcome
    }

    fn observe(&self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Enqueued => self.monitor.record_write(),
            // an eviction keeps depth constant: one in, one out
            WriteOutcome::EvictedOldest
            | WriteOutcome::DroppedNewest
            | WriteOutcome::Full
            | WriteOutcome::Rejected => {
                self.monitor.record_drop();
                self.monitor.record_full();
            }
            WriteOutcome::Closed => {}
        }
    }

    pub fn try_read(&self) -> Option<MarketDataTask> {
        let task = self.queue.try_read()?;
        self.monitor.record_read();
        Some(task)
    }

    /// Wait for the next task; fails with `Closed` or `Cancelled`
    pub async fn read(&self, cancel: &CancellationToken) -> Result<MarketDataTask> {
        let task = self.queue.read(cancel).await?;
        self.monitor.record_read();
        Ok(task)
    }

    /// Pull stream that ends when the subscription closes or `cancel` fires
    pub fn into_stream(
        self: Arc<Self>,
        cancel: CancellationToken,
    ) -> impl Stream<Item = MarketDataTask> + Send + 'static {
        stream::unfold((self, cancel), |(sub, cancel)| async move {
            match sub.read(&cancel).await {
                Ok(task) => Some((task, (sub, cancel))),
                Err(SubscriptionError::Closed) | Err(SubscriptionError::Cancelled) => None,
                Err(e) => {
                    tracing::warn!("Subscription '{}' stream ended: {}", sub.name, e);
                    None
                }
            }
        })
    }

    pub fn close(&self) {
        self.queue.close();
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn stats(&self) -> PressureSnapshot {
        self.monitor.snapshot()
    }
}
