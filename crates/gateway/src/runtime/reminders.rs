//! Reminder poller: delivers due reminders on a fixed interval.
//!
//! A reminder is marked sent only after the platform accepted it, so a
//! failed send is retried on the next sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::Instrument;

use mm_store::{ChatStore, ReminderRecord};

use crate::platform::{ChatPlatform, TextFormat};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub delivered: usize,
    pub failed: usize,
}

pub fn format_reminder(reminder: &ReminderRecord) -> String {
    format!("⏰ Reminder: {}", reminder.text)
}

pub struct ReminderPoller {
    store: Arc<dyn ChatStore>,
    platform: Arc<dyn ChatPlatform>,
}

impl ReminderPoller {
    pub fn new(store: Arc<dyn ChatStore>, platform: Arc<dyn ChatPlatform>) -> Self {
        Self { store, platform }
    }

    /// Deliver every reminder due at `now`.
    pub async fn tick(&self, now: DateTime<Utc>) -> SweepReport {
        let span = tracing::info_span!(
            "reminder.sweep",
            delivered = tracing::field::Empty,
            failed = tracing::field::Empty,
        );
        let report = self.sweep(now).instrument(span.clone()).await;
        span.record("delivered", report.delivered);
        span.record("failed", report.failed);
        report
    }

    async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        let due = match self.store.due_reminders(now).await {
            Ok(due) => due,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load due reminders");
                return report;
            }
        };

        for reminder in due {
            let text = format_reminder(&reminder);
            if let Err(e) = self
                .platform
                .send_text(reminder.chat_id, &text, TextFormat::Plain)
                .await
            {
                tracing::warn!(
                    reminder_id = %reminder.id,
                    chat_id = reminder.chat_id,
                    error = %e,
                    "reminder delivery failed, will retry"
                );
                report.failed += 1;
                continue;
            }
            match self.store.mark_reminder_sent(reminder.id).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::error!(reminder_id = %reminder.id, error = %e, "failed to mark reminder sent");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Sweep forever, one tick per `interval`.
    pub async fn run(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = self.tick(Utc::now()).await;
            if report.delivered > 0 || report.failed > 0 {
                tracing::info!(delivered = report.delivered, failed = report.failed, "reminder sweep");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm_domain::error::Result;
    use mm_domain::{ChatId, Error};
    use mm_store::{MemoryStore, NewReminder};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct Outbox {
        down: AtomicBool,
        sent: Mutex<Vec<(ChatId, String)>>,
    }

    #[async_trait::async_trait]
    impl ChatPlatform for Outbox {
        async fn send_text(&self, chat_id: ChatId, text: &str, _format: TextFormat) -> Result<()> {
            if self.down.load(Ordering::SeqCst) {
                return Err(Error::Platform("offline".into()));
            }
            self.sent.lock().push((chat_id, text.to_string()));
            Ok(())
        }
        async fn send_photo(&self, _chat_id: ChatId, _url: &str, _caption: &str) -> Result<()> {
            Ok(())
        }
        async fn send_typing(&self, _chat_id: ChatId) -> Result<()> {
            Ok(())
        }
    }

    async fn seeded(due_in: chrono::Duration) -> (Arc<MemoryStore>, DateTime<Utc>) {
        let store = Arc::new(MemoryStore::in_memory());
        let now = Utc::now();
        store
            .create_reminder(NewReminder {
                chat_id: 4,
                user_id: Some(9),
                text: "stretch".into(),
                due_at: now + due_in,
            })
            .await
            .unwrap();
        (store, now)
    }

    #[tokio::test]
    async fn due_reminder_is_delivered_once() {
        let (store, now) = seeded(chrono::Duration::minutes(1)).await;
        let outbox = Arc::new(Outbox::default());
        let poller = ReminderPoller::new(store.clone(), outbox.clone());

        assert_eq!(poller.tick(now).await, SweepReport::default());

        let later = now + chrono::Duration::minutes(1) + chrono::Duration::seconds(30);
        assert_eq!(poller.tick(later).await, SweepReport { delivered: 1, failed: 0 });
        assert_eq!(*outbox.sent.lock(), vec![(4, "⏰ Reminder: stretch".to_string())]);

        assert_eq!(poller.tick(later).await, SweepReport::default());
        assert!(store.due_reminders(later).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_delivery_stays_due() {
        let (store, now) = seeded(chrono::Duration::zero()).await;
        let outbox = Arc::new(Outbox::default());
        outbox.down.store(true, Ordering::SeqCst);
        let poller = ReminderPoller::new(store.clone(), outbox.clone());

        assert_eq!(poller.tick(now).await, SweepReport { delivered: 0, failed: 1 });
        assert_eq!(store.due_reminders(now).await.unwrap().len(), 1);

        outbox.down.store(false, Ordering::SeqCst);
        assert_eq!(poller.tick(now).await.delivered, 1);
        assert_eq!(outbox.sent.lock().len(), 1);
    }
}
