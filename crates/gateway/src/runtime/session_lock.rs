//! Per-chat run lock.
//!
//! Only one orchestrator run executes per chat at a time. Acquisition never
//! waits: a trigger that loses the race is skipped, not queued.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A `Semaphore(1)` guarding one chat.
#[derive(Debug)]
pub struct ChatLock {
    sem: Arc<Semaphore>,
}

impl Default for ChatLock {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatLock {
    pub fn new() -> Self {
        Self {
            sem: Arc::new(Semaphore::new(1)),
        }
    }

    /// Take the lock if it is free. The permit releases on drop.
    pub fn try_acquire(&self) -> Result<ChatPermit, ChatBusy> {
        self.sem
            .clone()
            .try_acquire_owned()
            .map(|permit| ChatPermit { _permit: permit })
            .map_err(|_| ChatBusy)
    }

    /// Whether a run currently holds the lock.
    pub fn is_held(&self) -> bool {
        self.sem.available_permits() == 0
    }
}

/// Held for the duration of one run.
#[derive(Debug)]
pub struct ChatPermit {
    _permit: OwnedSemaphorePermit,
}

/// Returned when a run is already in progress for the chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatBusy;

impl std::fmt::Display for ChatBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "chat is busy: a run is already in progress")
    }
}

impl std::error::Error for ChatBusy {}
