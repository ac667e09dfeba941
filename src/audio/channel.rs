//! Fixed-capacity byte queue connecting a producer task to a consumer task.
//!
//! The queue is slot-based: every push stores one block, every pop hands
//! back exactly that block. Capacity is accounted in bytes, and a popped
//! block keeps its bytes reserved until the consumer releases it, the same
//! "receive then return" discipline as a DMA ring buffer.

use std::collections::VecDeque;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

/// What `push` does when the incoming block does not fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait up to the push timeout, then reject the incoming block.
    #[default]
    DropIncoming,
    /// Evict queued blocks from the head until the incoming block fits.
    /// Popped blocks that are not yet released are never evicted.
    EvictOldest,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drop_incoming" => Ok(OverflowPolicy::DropIncoming),
            "evict_oldest" => Ok(OverflowPolicy::EvictOldest),
            other => Err(format!("unknown overflow policy: {}", other)),
        }
    }
}

struct State {
    blocks: VecDeque<Bytes>,
    /// Bytes queued plus bytes popped but not yet released.
    occupied: usize,
}

struct Shared {
    capacity: usize,
    policy: OverflowPolicy,
    state: Mutex<State>,
    readable: Condvar,
    writable: Condvar,
}

/// Bounded, ordered, blocking byte queue.
///
/// Cloning yields another handle to the same queue. The pipeline uses it
/// with one producer and one consumer at a time.
#[derive(Clone)]
pub struct BoundedByteChannel {
    shared: Arc<Shared>,
}

impl BoundedByteChannel {
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, OverflowPolicy::default())
    }

    pub fn with_policy(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            shared: Arc::new(Shared {
                capacity,
                policy,
                state: Mutex::new(State {
                    blocks: VecDeque::new(),
                    occupied: 0,
                }),
                readable: Condvar::new(),
                writable: Condvar::new(),
            }),
        }
    }

    /// Copy `data` into the queue as one block.
    ///
    /// Returns `false` if the block could not be accepted before `timeout`
    /// elapsed. A rejected push leaves the queue untouched.
    pub fn push(&self, data: &[u8], timeout: Duration) -> bool {
        if data.is_empty() {
            return true;
        }
        if data.len() > self.shared.capacity {
            return false;
        }
        self.push_bytes(Bytes::copy_from_slice(data), timeout)
    }

    /// Same as [`push`](Self::push) for a block the caller already owns.
    pub fn push_bytes(&self, block: Bytes, timeout: Duration) -> bool {
        let len = block.len();
        if len == 0 {
            return true;
        }
        let capacity = self.shared.capacity;
        if len > capacity {
            return false;
        }

        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();

        if self.shared.policy == OverflowPolicy::EvictOldest {
            let mut evicted = 0usize;
            while state.occupied + len > capacity {
                let Some(oldest) = state.blocks.pop_front() else {
                    break;
                };
                state.occupied -= oldest.len();
                evicted += oldest.len();
            }
            if evicted > 0 {
                log::debug!("Evicted {} queued bytes to make room for {}", evicted, len);
            }
        }

        while state.occupied + len > capacity {
            if self
                .shared
                .writable
                .wait_until(&mut state, deadline)
                .timed_out()
                && state.occupied + len > capacity
            {
                return false;
            }
        }

        state.occupied += len;
        state.blocks.push_back(block);
        drop(state);
        self.shared.readable.notify_one();
        true
    }

    /// Take the oldest block, waiting up to `timeout` for one to arrive.
    ///
    /// A zero timeout polls without blocking.
    pub fn pop(&self, timeout: Duration) -> Option<ChannelItem> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            if let Some(block) = state.blocks.pop_front() {
                return Some(ChannelItem {
                    data: block,
                    shared: Arc::clone(&self.shared),
                });
            }
            if self
                .shared
                .readable
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.blocks.pop_front().map(|block| ChannelItem {
                    data: block,
                    shared: Arc::clone(&self.shared),
                });
            }
        }
    }

    /// Pop and release every queued block. Returns the number of bytes discarded.
    pub fn drain(&self) -> usize {
        let mut discarded = 0;
        while let Some(item) = self.pop(Duration::ZERO) {
            discarded += item.len();
            item.release();
        }
        discarded
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Bytes currently reserved, including popped blocks not yet released.
    pub fn occupied(&self) -> usize {
        self.shared.state.lock().occupied
    }

    /// Number of blocks waiting to be popped.
    pub fn queued(&self) -> usize {
        self.shared.state.lock().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.state.lock().blocks.is_empty()
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.shared.policy
    }
}

/// A block taken from a [`BoundedByteChannel`].
///
/// Its bytes stay reserved in the channel until the item is released,
/// either explicitly or by dropping it.
pub struct ChannelItem {
    data: Bytes,
    shared: Arc<Shared>,
}

impl ChannelItem {
    /// Return the block's storage to the channel.
    pub fn release(self) {
        drop(self);
    }
}

impl Deref for ChannelItem {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for ChannelItem {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.occupied -= self.data.len();
        drop(state);
        self.shared.writable.notify_one();
    }
}
