//! Deterministic reply chance for passive batches.
//!
//! Each flushed batch adds its message count to an accumulator. Once the
//! accumulator reaches `1 / probability` messages the agent replies and the
//! overflow carries over, so on average one reply goes out per
//! `1 / probability` unaddressed messages.

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReplyChance {
    counter: f64,
}

impl ReplyChance {
    /// Account for `count` messages; returns whether to reply now.
    pub fn register(&mut self, count: u32, probability: f64) -> bool {
        if probability.is_nan() || probability <= 0.0 {
            return false;
        }
        if probability >= 1.0 {
            self.counter = 0.0;
            return true;
        }
        let threshold = 1.0 / probability;
        self.counter += f64::from(count);
        if self.counter >= threshold {
            self.counter -= threshold;
            true
        } else {
            false
        }
    }

    pub fn counter(&self) -> f64 {
        self.counter
    }
}

/// Parse a per-chat probability override; out-of-range values are clamped.
pub fn parse_probability(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let value = match raw.strip_suffix('%') {
        Some(pct) => pct.trim().parse::<f64>().ok()? / 100.0,
        None => raw.parse::<f64>().ok()?,
    };
    value.is_finite().then(|| value.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_every_threshold_messages_keeping_overflow() {
        let mut rc = ReplyChance::default();
        // p = 0.2 → one reply per 5 messages.
        assert!(!rc.register(3, 0.2));
        assert!(rc.register(3, 0.2));
        assert!((rc.counter() - 1.0).abs() < 1e-9);
        assert!(rc.register(4, 0.2));
        assert!(rc.counter().abs() < 1e-9);
        assert!(!rc.register(1, 0.2));
    }

    #[test]
    fn edge_probabilities() {
        let mut rc = ReplyChance::default();
        for _ in 0..100 {
            assert!(!rc.register(10, 0.0));
            assert!(!rc.register(10, f64::NAN));
        }
        for _ in 0..10 {
            assert!(rc.register(1, 1.0));
        }
    }

    #[test]
    fn overrides_parse() {
        assert_eq!(parse_probability("0.5"), Some(0.5));
        assert_eq!(parse_probability(" 25% "), Some(0.25));
        assert_eq!(parse_probability("3"), Some(1.0));
        assert_eq!(parse_probability("-1"), Some(0.0));
        assert_eq!(parse_probability("often"), None);
        assert_eq!(parse_probability("inf"), None);
    }
}
