//! Idle wake: a randomized per-chat timer that lets the agent speak up in a
//! chat that has gone quiet.
//!
//! Every reset aborts the previous timer and bumps a generation counter; a
//! timer only fires if its generation is still current, so a superseded
//! timer can never fire late.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use mm_domain::config::SchedulingConfig;
use mm_domain::ChatId;

use super::{Trigger, TriggerSink};

struct ArmedTimer {
    generation: u64,
    deadline: Instant,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct IdleTimer {
    slot: Arc<Mutex<Option<ArmedTimer>>>,
    generation: AtomicU64,
}

impl IdleTimer {
    /// Cancel any live timer and arm a new one firing after `delay`.
    /// Returns the new generation.
    pub fn reset(&self, chat_id: ChatId, delay: Duration, sink: Arc<dyn TriggerSink>) -> u64 {
        let mut slot = self.slot.lock();
        if let Some(old) = slot.take() {
            old.handle.abort();
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let deadline = Instant::now() + delay;
        let shared = Arc::clone(&self.slot);

        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let current = {
                let mut slot = shared.lock();
                match slot.as_ref() {
                    Some(t) if t.generation == generation => slot.take().is_some(),
                    _ => false,
                }
            };
            if current {
                tracing::debug!(chat_id, generation, "idle wake");
                sink.fire(Trigger::IdleWake { chat_id }).await;
            }
        });

        *slot = Some(ArmedTimer {
            generation,
            deadline,
            handle,
        });
        generation
    }

    /// Disarm the timer. Returns whether one was live.
    pub fn cancel(&self) -> bool {
        match self.slot.lock().take() {
            Some(t) => {
                t.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.slot.lock().is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.slot.lock().as_ref().map(|t| t.deadline)
    }
}

/// Uniform random delay between the configured idle bounds.
pub fn random_delay(cfg: &SchedulingConfig) -> Duration {
    let min = cfg.idle_min_minutes.saturating_mul(60);
    let max = cfg.idle_max_minutes.saturating_mul(60);
    let secs = if max <= min {
        min
    } else {
        rand::thread_rng().gen_range(min..=max)
    };
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        fired: Mutex<Vec<Trigger>>,
    }

    #[async_trait::async_trait]
    impl TriggerSink for Counter {
        async fn fire(&self, trigger: Trigger) {
            self.fired.lock().push(trigger);
        }
    }

    const MIN: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn reset_supersedes_previous_timer() {
        let sink = Arc::new(Counter::default());
        let timer = IdleTimer::default();

        let g1 = timer.reset(8, MIN * 10, sink.clone());
        tokio::time::sleep(MIN * 5).await;
        let g2 = timer.reset(8, MIN * 10, sink.clone());
        assert!(g2 > g1);

        // The first deadline passes without a fire.
        tokio::time::sleep(MIN * 6).await;
        assert!(sink.fired.lock().is_empty());
        assert!(timer.is_armed());

        tokio::time::sleep(MIN * 5).await;
        assert_eq!(*sink.fired.lock(), vec![Trigger::IdleWake { chat_id: 8 }]);
        assert!(!timer.is_armed());

        tokio::time::sleep(MIN * 60).await;
        assert_eq!(sink.fired.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_disarms() {
        let sink = Arc::new(Counter::default());
        let timer = IdleTimer::default();
        timer.reset(1, MIN, sink.clone());
        assert!(timer.cancel());
        assert!(!timer.cancel());
        tokio::time::sleep(MIN * 2).await;
        assert!(sink.fired.lock().is_empty());
    }

    #[test]
    fn delay_stays_within_bounds() {
        let cfg = SchedulingConfig {
            idle_min_minutes: 2,
            idle_max_minutes: 5,
            ..SchedulingConfig::default()
        };
        for _ in 0..50 {
            let d = random_delay(&cfg);
            assert!(d >= Duration::from_secs(120) && d <= Duration::from_secs(300));
        }
        let fixed = SchedulingConfig {
            idle_min_minutes: 7,
            idle_max_minutes: 7,
            ..SchedulingConfig::default()
        };
        assert_eq!(random_delay(&fixed), Duration::from_secs(420));
    }
}
