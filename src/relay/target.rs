//! The Telegram chat currently bridged to the other networks.
//!
//! Read by every router loop, rebound by the admin `/start` command. A
//! single atomic keeps reads and writes linearizable without a lock.

use std::sync::atomic::{AtomicI64, Ordering};

/// Chat id meaning "no relay group bound".
pub const UNBOUND: i64 = 0;

/// The one mutable piece of relay state shared across tasks.
#[derive(Debug, Default)]
pub struct ActiveGroupTarget {
    chat_id: AtomicI64,
}

impl ActiveGroupTarget {
    /// Start with `initial`; [`UNBOUND`] leaves Telegram out of the relay.
    pub fn new(initial: i64) -> Self {
        Self {
            chat_id: AtomicI64::new(initial),
        }
    }

    /// The bound chat, if any.
    pub fn get(&self) -> Option<i64> {
        match self.chat_id.load(Ordering::SeqCst) {
            UNBOUND => None,
            id => Some(id),
        }
    }

    /// Raw value as reported by `/status`; [`UNBOUND`] when unset.
    pub fn raw(&self) -> i64 {
        self.chat_id.load(Ordering::SeqCst)
    }

    /// Bind the relay to `chat_id`, returning the previous binding.
    pub fn bind(&self, chat_id: i64) -> Option<i64> {
        match self.chat_id.swap(chat_id, Ordering::SeqCst) {
            UNBOUND => None,
            id => Some(id),
        }
    }

    /// Whether a relay group is bound.
    pub fn is_bound(&self) -> bool {
        self.get().is_some()
    }
}
