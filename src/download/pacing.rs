//! Human-cadence pacing between page fetches.
//!
//! Stateless per draw: a uniform base delay plus, with a small probability, an
//! additional long pause. Not adaptive to server behavior; the point is to
//! look like a person flipping through a viewer, not to maximize throughput.

use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

#[derive(Debug, Clone, Copy)]
pub struct PacingConfig {
    pub base_min: Duration,
    pub base_max: Duration,
    pub long_pause_probability: f64,
    pub long_min: Duration,
    pub long_max: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            base_min: Duration::from_secs(2),
            base_max: Duration::from_secs(6),
            long_pause_probability: 0.15,
            long_min: Duration::from_secs(5),
            long_max: Duration::from_secs(12),
        }
    }
}

pub struct Pacer {
    config: PacingConfig,
    rng: StdRng,
}

impl Pacer {
    pub fn new(config: PacingConfig) -> Self {
        Self {
            config,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic variant for tests.
    pub fn seeded(config: PacingConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Two independent draws: base delay always, long pause sometimes.
    pub fn next_delay(&mut self) -> Duration {
        let mut delay = uniform(&mut self.rng, self.config.base_min, self.config.base_max);
        if self.rng.r#gen::<f64>() < self.config.long_pause_probability {
            delay += uniform(&mut self.rng, self.config.long_min, self.config.long_max);
        }
        delay
    }

    pub fn pause(&mut self) {
        let delay = self.next_delay();
        trace!(target: "pacing", delay_ms = delay.as_millis() as u64, "pausing before next fetch");
        thread::sleep(delay);
    }
}

fn uniform(rng: &mut StdRng, min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let millis = rng.gen_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: usize = 20_000;

    fn config(probability: f64) -> PacingConfig {
        PacingConfig {
            base_min: Duration::from_millis(2000),
            base_max: Duration::from_millis(6000),
            long_pause_probability: probability,
            long_min: Duration::from_millis(5000),
            long_max: Duration::from_millis(12000),
        }
    }

    #[test]
    fn base_delay_always_stays_within_the_configured_range() {
        let mut pacer = Pacer::seeded(config(0.0), 7);
        for _ in 0..SAMPLES {
            let delay = pacer.next_delay();
            assert!(delay >= Duration::from_millis(2000), "too short: {delay:?}");
            assert!(delay <= Duration::from_millis(6000), "too long: {delay:?}");
        }
    }

    #[test]
    fn long_pause_frequency_tracks_the_configured_probability() {
        let mut pacer = Pacer::seeded(config(0.15), 42);
        // base max is 6 s and the smallest long pause is 5 s, so any delay
        // above 6 s must have taken the long-pause branch.
        let long = (0..SAMPLES)
            .filter(|_| pacer.next_delay() > Duration::from_millis(6000))
            .count();
        let frequency = long as f64 / SAMPLES as f64;
        assert!(
            (0.10..=0.20).contains(&frequency),
            "long pause frequency {frequency} out of tolerance"
        );
    }

    #[test]
    fn certain_long_pause_adds_at_least_its_minimum() {
        let mut pacer = Pacer::seeded(config(1.0), 3);
        for _ in 0..1000 {
            let delay = pacer.next_delay();
            assert!(delay >= Duration::from_millis(2000 + 5000));
            assert!(delay <= Duration::from_millis(6000 + 12000));
        }
    }

    #[test]
    fn degenerate_range_collapses_to_the_minimum() {
        let cfg = PacingConfig {
            base_min: Duration::ZERO,
            base_max: Duration::ZERO,
            long_pause_probability: 0.0,
            long_min: Duration::ZERO,
            long_max: Duration::ZERO,
        };
        let mut pacer = Pacer::seeded(cfg, 1);
        assert_eq!(pacer.next_delay(), Duration::ZERO);
    }
}
