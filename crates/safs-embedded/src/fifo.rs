//! Bounded blocking FIFO queue
//!
//! A single monitor (mutex + condvar) guards the queue contents. Producers
//! never block: `put` fails when the queue is full. Consumers pick one of
//! three wait policies when the queue is empty.

use crate::defaults::DEFAULT_QUEUE_CAPACITY;
use crate::result::ResultCode;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// How long `take` may block when the queue is empty.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Fail immediately with `FifoError::Empty`
    NoWait,
    /// Block up to the given duration, then fail with `FifoError::Timeout`
    Timeout(Duration),
    /// Block until an item arrives or the queue is interrupted
    Forever,
}

impl WaitPolicy {
    /// Bounded wait of `ms` milliseconds.
    pub fn millis(ms: u64) -> Self {
        WaitPolicy::Timeout(Duration::from_millis(ms))
    }
}

/// Errors that can occur when using a Fifo
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FifoError {
    /// Queue is at capacity
    #[error("Queue is full ({max_size} items)")]
    Full {
        /// Capacity at the time of the failed insert
        max_size: usize,
    },

    /// Queue is empty and the caller asked not to wait
    #[error("Queue is empty")]
    Empty,

    /// Bounded wait elapsed with the queue still empty
    #[error("Timed out after {0:?} waiting for a queue element")]
    Timeout(Duration),

    /// Waiting consumer was released by `interrupt`
    #[error("Wait for a queue element was interrupted")]
    Interrupted,
}

impl FifoError {
    /// Result code reported to service callers.
    pub fn result_code(&self) -> ResultCode {
        match self {
            FifoError::Full { .. } => ResultCode::QueueFull,
            FifoError::Empty => ResultCode::NoQueueElement,
            FifoError::Timeout(_) => ResultCode::Timeout,
            FifoError::Interrupted => ResultCode::UnknownError,
        }
    }
}

struct FifoState<T> {
    items: VecDeque<T>,
    max_size: usize,
    /// Bumped by `interrupt`; waiters compare against the value they saw on entry.
    interrupts: u64,
}

/// Bounded, thread-safe first-in-first-out queue.
///
/// Any number of producers and consumers may share one queue. Items come out
/// in insertion order; which of several blocked consumers gets the next item
/// is unspecified.
pub struct Fifo<T> {
    state: Mutex<FifoState<T>>,
    available: Condvar,
}

impl<T> Fifo<T> {
    /// Create a queue with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a queue holding at most `max_size` items.
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            state: Mutex::new(FifoState {
                items: VecDeque::new(),
                max_size,
                interrupts: 0,
            }),
            available: Condvar::new(),
        }
    }

    /// Append an item at the tail and wake blocked consumers.
    pub fn put(&self, item: T) -> Result<(), FifoError> {
        let mut state = self.state.lock();
        if state.items.len() >= state.max_size {
            return Err(FifoError::Full {
                max_size: state.max_size,
            });
        }
        state.items.push_back(item);
        drop(state);
        self.available.notify_all();
        Ok(())
    }

    /// Remove and return the head item, waiting according to `policy`.
    pub fn take(&self, policy: WaitPolicy) -> Result<T, FifoError> {
        let mut state = self.state.lock();
        let epoch = state.interrupts;

        match policy {
            WaitPolicy::NoWait => state.items.pop_front().ok_or(FifoError::Empty),
            WaitPolicy::Forever => loop {
                if let Some(item) = state.items.pop_front() {
                    return Ok(item);
                }
                self.available.wait(&mut state);
                if state.interrupts != epoch {
                    return Err(FifoError::Interrupted);
                }
            },
            WaitPolicy::Timeout(timeout) => {
                // A duration too large to represent as a deadline waits forever.
                let Some(deadline) = Instant::now().checked_add(timeout) else {
                    drop(state);
                    return self.take(WaitPolicy::Forever);
                };
                loop {
                    if let Some(item) = state.items.pop_front() {
                        return Ok(item);
                    }
                    let timed_out = self.available.wait_until(&mut state, deadline).timed_out();
                    if state.interrupts != epoch {
                        return Err(FifoError::Interrupted);
                    }
                    if timed_out {
                        return state.items.pop_front().ok_or(FifoError::Timeout(timeout));
                    }
                }
            }
        }
    }

    /// Change the capacity. Items already queued beyond the new limit stay.
    pub fn set_max_size(&self, max_size: usize) {
        self.state.lock().max_size = max_size;
    }

    /// Current capacity
    pub fn max_size(&self) -> usize {
        self.state.lock().max_size
    }

    /// Remove every queued item.
    pub fn clear(&self) {
        self.state.lock().items.clear();
    }

    /// Release every consumer currently blocked in `take` with
    /// `FifoError::Interrupted`. Queued items are left in place.
    pub fn interrupt(&self) {
        let mut state = self.state.lock();
        state.interrupts = state.interrupts.wrapping_add(1);
        drop(state);
        self.available.notify_all();
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }
}

impl<T> Default for Fifo<T> {
    fn default() -> Self {
        Self::new()
    }
}
