//! Passive batching: one decision per burst of unaddressed messages.
//!
//! The first passive message opens a window with a fixed deadline. Messages
//! arriving before it only bump the count and replace the remembered event.
//! When the deadline passes the batch is handed to the [`TriggerSink`] as a
//! single [`Trigger::BatchFlush`]. An active trigger cancels the batch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{Trigger, TriggerSink};
use crate::platform::InboundEvent;

struct PendingBatch {
    id: u64,
    count: u32,
    deadline: Instant,
    last_event: InboundEvent,
    handle: JoinHandle<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    /// This message opened a new window.
    Started { deadline: Instant },
    /// Joined the open window; `count` includes this message.
    Joined { count: u32 },
}

/// At most one pending batch for one chat.
#[derive(Default)]
pub struct PassiveBatch {
    slot: Arc<Mutex<Option<PendingBatch>>>,
    next_id: AtomicU64,
}

impl PassiveBatch {
    pub fn push(&self, event: InboundEvent, window: Duration, sink: Arc<dyn TriggerSink>) -> BatchStatus {
        let mut slot = self.slot.lock();
        if let Some(pending) = slot.as_mut() {
            pending.count += 1;
            pending.last_event = event;
            return BatchStatus::Joined { count: pending.count };
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + window;
        let chat_id = event.chat_id;
        let shared = Arc::clone(&self.slot);

        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let fired = {
                let mut slot = shared.lock();
                match slot.as_ref() {
                    Some(p) if p.id == id => slot.take(),
                    _ => None,
                }
            };
            if let Some(batch) = fired {
                tracing::debug!(chat_id, count = batch.count, "passive batch flushed");
                sink.fire(Trigger::BatchFlush {
                    chat_id,
                    count: batch.count,
                    last_event: batch.last_event,
                })
                .await;
            }
        });

        *slot = Some(PendingBatch {
            id,
            count: 1,
            deadline,
            last_event: event,
            handle,
        });
        BatchStatus::Started { deadline }
    }

    /// Discard the pending batch, if any. Returns how many messages it held.
    pub fn cancel(&self) -> Option<u32> {
        let pending = self.slot.lock().take()?;
        pending.handle.abort();
        Some(pending.count)
    }

    pub fn pending_count(&self) -> Option<u32> {
        self.slot.lock().as_ref().map(|p| p.count)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.slot.lock().as_ref().map(|p| p.deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        fired: Mutex<Vec<(Instant, Trigger)>>,
    }

    #[async_trait::async_trait]
    impl TriggerSink for Recorder {
        async fn fire(&self, trigger: Trigger) {
            self.fired.lock().push((Instant::now(), trigger));
        }
    }

    fn event(text: &str) -> InboundEvent {
        InboundEvent {
            chat_id: 3,
            user_id: 1,
            user_name: "ann".into(),
            text: text.into(),
            is_private: false,
            mentions_bot: false,
            reply_to_bot: false,
        }
    }

    const W: Duration = Duration::from_secs(30);

    #[tokio::test(start_paused = true)]
    async fn burst_flushes_once_after_window() {
        let sink = Arc::new(Recorder::default());
        let batch = PassiveBatch::default();
        let start = Instant::now();

        assert!(matches!(batch.push(event("a"), W, sink.clone()), BatchStatus::Started { .. }));
        tokio::time::sleep(W.mul_f64(0.3)).await;
        assert_eq!(batch.push(event("b"), W, sink.clone()), BatchStatus::Joined { count: 2 });
        tokio::time::sleep(W.mul_f64(0.3)).await;
        assert_eq!(batch.push(event("c"), W, sink.clone()), BatchStatus::Joined { count: 3 });

        tokio::time::sleep(W.mul_f64(0.3)).await;
        assert!(sink.fired.lock().is_empty(), "deadline is fixed at the first message");

        tokio::time::sleep(W.mul_f64(0.2)).await;
        {
            let fired = sink.fired.lock();
            assert_eq!(fired.len(), 1);
            let (at, trigger) = &fired[0];
            assert!(*at >= start + W);
            match trigger {
                Trigger::BatchFlush { chat_id, count, last_event } => {
                    assert_eq!(*chat_id, 3);
                    assert_eq!(*count, 3);
                    assert_eq!(last_event.text, "c");
                }
                other => panic!("unexpected trigger {other:?}"),
            }
        }
        assert_eq!(batch.pending_count(), None);

        tokio::time::sleep(W * 2).await;
        assert_eq!(sink.fired.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_the_batch() {
        let sink = Arc::new(Recorder::default());
        let batch = PassiveBatch::default();

        batch.push(event("a"), W, sink.clone());
        batch.push(event("b"), W, sink.clone());
        assert_eq!(batch.cancel(), Some(2));
        assert_eq!(batch.cancel(), None);

        tokio::time::sleep(W * 2).await;
        assert!(sink.fired.lock().is_empty());

        // A new message after cancellation opens a fresh window.
        batch.push(event("c"), W, sink.clone());
        tokio::time::sleep(W + Duration::from_secs(1)).await;
        assert_eq!(sink.fired.lock().len(), 1);
    }
}
