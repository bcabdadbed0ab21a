//! Bounded and unbounded task queues
//!
//! A `TaskQueue` is a FIFO guarded by a `parking_lot::Mutex` with two
//! `Notify` handles: one wakes readers when an item arrives, the other wakes
//! writers blocked under the `Wait` overflow policy when space frees up.
//! Waiters always register interest (`Notified::enable`) before checking the
//! queue, so a notification between the check and the await is never lost.

use crate::error::{Result, SubscriptionError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// What a bounded queue does with an item that arrives while it is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Async writers wait for space; `try_write` reports `Full`
    Wait,
    /// Evict the oldest queued item to make room
    #[default]
    DropOldest,
    /// Silently discard the incoming item
    DropNewest,
    /// Refuse the incoming item with an error outcome
    Reject,
}

impl OverflowPolicy {
    pub const fn label(self) -> &'static str {
        match self {
            OverflowPolicy::Wait => "wait",
            OverflowPolicy::DropOldest => "drop_oldest",
            OverflowPolicy::DropNewest => "drop_newest",
            OverflowPolicy::Reject => "reject",
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for OverflowPolicy {
    type Err = SubscriptionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "wait" => Ok(OverflowPolicy::Wait),
            "drop_oldest" => Ok(OverflowPolicy::DropOldest),
            "drop_newest" => Ok(OverflowPolicy::DropNewest),
            "reject" => Ok(OverflowPolicy::Reject),
            _ => Err(SubscriptionError::UnknownPolicy(s.to_string())),
        }
    }
}

/// Queue shape: `capacity == None` means unbounded, and the policy is ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOptions {
    pub capacity: Option<usize>,
    pub overflow: OverflowPolicy,
}

impl ChannelOptions {
    pub fn bounded(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            capacity: Some(capacity),
            overflow,
        }
    }

    pub fn unbounded() -> Self {
        Self {
            capacity: None,
            overflow: OverflowPolicy::default(),
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.capacity.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity == Some(0) {
            return Err(SubscriptionError::invalid_config(
                "bounded queue capacity must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self::bounded(1024, OverflowPolicy::DropOldest)
    }
}

/// Result of a single enqueue attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Enqueued,
    /// Enqueued after evicting the oldest item
    EvictedOldest,
    /// Incoming item discarded under `DropNewest`
    DroppedNewest,
    /// Queue full under `Wait`; the item was not enqueued
    Full,
    /// Incoming item refused under `Reject`
    Rejected,
    Closed,
}

impl WriteOutcome {
    /// True when the written item is now in the queue
    pub fn is_accepted(self) -> bool {
        matches!(self, WriteOutcome::Enqueued | WriteOutcome::EvictedOldest)
    }

    /// True when the queue was at capacity
    pub fn hit_capacity(self) -> bool {
        matches!(
            self,
            WriteOutcome::EvictedOldest
                | WriteOutcome::DroppedNewest
                | WriteOutcome::Full
                | WriteOutcome::Rejected
        )
    }

    /// Convert into a `Result`, surfacing `Rejected` and `Closed` as errors
    pub fn into_result(self, capacity: Option<usize>) -> Result<WriteOutcome> {
        match self {
            WriteOutcome::Rejected => Err(SubscriptionError::Rejected {
                capacity: capacity.unwrap_or_default(),
            }),
            WriteOutcome::Closed => Err(SubscriptionError::Closed),
            other => Ok(other),
        }
    }
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Multi-producer multi-consumer FIFO with a configurable overflow policy
#[derive(Debug)]
pub struct TaskQueue<T> {
    state: Mutex<QueueState<T>>,
    readable: Notify,
    writable: Notify,
    options: ChannelOptions,
}

impl<T> TaskQueue<T> {
    pub fn new(options: ChannelOptions) -> Result<Self> {
        options.validate()?;
        let initial = options.capacity.unwrap_or(64).min(4096);
        Ok(Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(initial),
                closed: false,
            }),
            readable: Notify::new(),
            writable: Notify::new(),
            options,
        })
    }

    pub fn options(&self) -> ChannelOptions {
        self.options
    }

    pub fn capacity(&self) -> Option<usize> {
        self.options.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Non-blocking enqueue applying the overflow policy when full
    pub fn try_write(&self, item: T) -> WriteOutcome {
        let outcome = {
            let mut state = self.state.lock();
            if state.closed {
                return WriteOutcome::Closed;
            }
            match self.options.capacity {
                Some(cap) if state.items.len() >= cap => match self.options.overflow {
                    OverflowPolicy::Wait => WriteOutcome::Full,
                    OverflowPolicy::DropNewest => WriteOutcome::DroppedNewest,
                    OverflowPolicy::Reject => WriteOutcome::Rejected,
                    OverflowPolicy::DropOldest => {
                        state.items.pop_front();
                        state.items.push_back(item);
                        WriteOutcome::EvictedOldest
                    }
                },
                _ => {
                    state.items.push_back(item);
                    WriteOutcome::Enqueued
                }
            }
        };

        if outcome.is_accepted() {
            self.readable.notify_one();
        }
        outcome
    }

    /// Enqueue, waiting for space when the policy is `Wait`
    ///
    /// Every other policy resolves immediately exactly like `try_write`.
    pub async fn write(&self, item: T) -> WriteOutcome {
        let cap = match (self.options.capacity, self.options.overflow) {
            (Some(cap), OverflowPolicy::Wait) => cap,
            _ => return self.try_write(item),
        };

        let mut pending = Some(item);
        loop {
            let notified = self.writable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.closed {
                    return WriteOutcome::Closed;
                }
                if state.items.len() < cap {
                    if let Some(item) = pending.take() {
                        state.items.push_back(item);
                    }
                    drop(state);
                    self.readable.notify_one();
                    return WriteOutcome::Enqueued;
                }
            }

            notified.await;
        }
    }

    /// Non-blocking dequeue
    pub fn try_read(&self) -> Option<T> {
        let item = self.state.lock().items.pop_front();
        if item.is_some() && self.options.capacity.is_some() {
            self.writable.notify_one();
        }
        item
    }

    /// Dequeue, waiting until an item arrives, the queue closes, or `cancel` fires
    ///
    /// Items still queued when the queue closes are drained before `Closed`
    /// is reported.
    pub async fn read(&self, cancel: &CancellationToken) -> Result<T> {
        loop {
            let notified = self.readable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_read() {
                return Ok(item);
            }
            if self.is_closed() {
                return Err(SubscriptionError::Closed);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = cancel.cancelled() => return Err(SubscriptionError::Cancelled),
            }
        }
    }

    /// Close the queue and wake every waiter; later writes return `Closed`
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.readable.notify_waiters();
        self.writable.notify_waiters();
    }
}

/// Builds task queues from registry defaults and per-subscription overrides
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelFactory {
    defaults: ChannelOptions,
}

impl ChannelFactory {
    pub fn new(defaults: ChannelOptions) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> ChannelOptions {
        self.defaults
    }

    /// Resolve overrides against the defaults
    pub fn options(
        &self,
        capacity: Option<usize>,
        overflow: Option<OverflowPolicy>,
    ) -> ChannelOptions {
        ChannelOptions {
            capacity: capacity.or(self.defaults.capacity),
            overflow: overflow.unwrap_or(self.defaults.overflow),
        }
    }

    pub fn create<T>(&self, options: ChannelOptions) -> Result<TaskQueue<T>> {
        TaskQueue::new(options)
    }
}
