//! Counter-based sampling for diagnostic work.
//!
//! Under load, logging every request is too expensive. The gate samples every request
//! until a cumulative threshold is reached, then one in every `interval` requests.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::SamplingConfig;

const DEFAULT_INTERVAL: u64 = 8;

#[derive(Debug)]
pub struct SamplingGate {
    counter: AtomicU64,
    interval: u64,
    min_threshold: i64,
}

impl SamplingGate {
    /// Creates a gate; an `interval` that is not a power of two falls back to 8.
    pub fn new(interval: u64, min_threshold: i64) -> Self {
        let interval = if interval.is_power_of_two() { interval } else { DEFAULT_INTERVAL };
        Self { counter: AtomicU64::new(0), interval, min_threshold }
    }

    pub fn from_config(config: &SamplingConfig) -> Self {
        Self::new(config.interval, config.min_threshold)
    }

    /// Counts one call and decides whether it is sampled.
    pub fn next(&self) -> bool {
        let count = self.counter.fetch_add(1, Ordering::Relaxed);
        match u64::try_from(self.min_threshold) {
            Err(_) => true,
            Ok(min) if count < min => true,
            Ok(_) => count & (self.interval - 1) == 0,
        }
    }

    pub fn count(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }
}

impl Default for SamplingGate {
    fn default() -> Self {
        Self::from_config(&SamplingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn samples_below_threshold_then_every_interval() {
        let gate = SamplingGate::new(8, 10);
        let decisions = (0..40).map(|_| gate.next()).collect::<Vec<_>>();

        for (count, sampled) in decisions.iter().enumerate() {
            let expected = count < 10 || count % 8 == 0;
            assert_eq!(*sampled, expected, "call {count}");
        }
        assert_eq!(gate.count(), 40);
    }

    #[test]
    fn invalid_interval_resets() {
        assert_eq!(SamplingGate::new(6, 0).interval(), 8);
        assert_eq!(SamplingGate::new(0, 0).interval(), 8);
        assert_eq!(SamplingGate::new(1, 0).interval(), 1);
        assert_eq!(SamplingGate::new(32, 0).interval(), 32);
    }

    #[test]
    fn negative_threshold_always_samples() {
        let gate = SamplingGate::new(8, -1);
        assert!((0..100).all(|_| gate.next()));
    }

    #[test]
    fn zero_threshold_starts_gating_immediately() {
        let gate = SamplingGate::new(4, 0);
        let sampled = (0..8).filter(|_| gate.next()).count();
        assert_eq!(sampled, 2);
    }

    #[test]
    fn concurrent_counting() {
        let gate = Arc::new(SamplingGate::new(16, 0));
        let handles = (0..4)
            .map(|_| {
                let gate = Arc::clone(&gate);
                std::thread::spawn(move || (0..1000).filter(|_| gate.next()).count())
            })
            .collect::<Vec<_>>();

        let sampled: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(gate.count(), 4000);
        assert_eq!(sampled, 4000 / 16);
    }
}
