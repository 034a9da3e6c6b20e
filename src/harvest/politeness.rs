//! Pacing for page sessions
//!
//! Every navigation and every pagination step waits a configured base delay
//! plus random jitter. This is unconditional and independent of blocking
//! detection. Navigation failures get a separate, bounded exponential
//! backoff via [`RetryPolicy`].
//!
//! Randomness and wall-clock time are injectable so tests can be
//! deterministic.

use chrono::{Local, NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::HarvestConfig;
use crate::error::HarvestError;

/// Source of "now" for `scraped_at` stamps and relative dates
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Local wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock stuck at one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Delay configuration
#[derive(Debug, Clone)]
pub struct PolitenessConfig {
    /// Base delay applied before every step
    pub base_delay: Duration,
    /// Smallest random addition
    pub jitter_min: Duration,
    /// Largest random addition
    pub jitter_max: Duration,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::ZERO,
            jitter_min: Duration::from_millis(1000),
            jitter_max: Duration::from_millis(3000),
        }
    }
}

impl PolitenessConfig {
    pub fn from_config(config: &HarvestConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.delay_ms),
            jitter_min: Duration::from_millis(config.jitter_min_ms),
            jitter_max: Duration::from_millis(config.jitter_max_ms.max(config.jitter_min_ms)),
        }
    }
}

/// Jittered delay between navigation and pagination steps
pub struct DelayPolicy {
    config: PolitenessConfig,
    rng: Mutex<StdRng>,
}

impl DelayPolicy {
    /// Create a delay policy seeded from OS entropy
    pub fn new(config: PolitenessConfig) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Create a delay policy with a fixed seed
    pub fn with_seed(config: PolitenessConfig, seed: u64) -> Self {
        Self {
            config,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn config(&self) -> &PolitenessConfig {
        &self.config
    }

    /// Draw the next delay: base plus uniform jitter in `[jitter_min, jitter_max]`
    pub fn next_delay(&self) -> Duration {
        let min = self.config.jitter_min.as_millis() as u64;
        let max = self.config.jitter_max.as_millis() as u64;
        let jitter = if max > min {
            self.rng.lock().gen_range(min..=max)
        } else {
            min
        };
        self.config.base_delay + Duration::from_millis(jitter)
    }

    /// Sleep for the next delay unless the run is cancelled first
    pub async fn pause(&self, cancel: &CancellationToken) -> Result<(), HarvestError> {
        let delay = self.next_delay();
        if delay.is_zero() {
            return if cancel.is_cancelled() {
                Err(HarvestError::Cancelled)
            } else {
                Ok(())
            };
        }

        tracing::trace!("Pausing {:?}", delay);
        tokio::select! {
            _ = cancel.cancelled() => Err(HarvestError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

/// Bounded exponential backoff for a single navigation
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total tries, including the first
    pub attempts: u32,
    /// Backoff after the first failure
    pub base: Duration,
    /// Backoff ceiling
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base: Duration::from_millis(500),
            max: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &HarvestConfig) -> Self {
        Self {
            attempts: config.retry_attempts.max(1),
            base: Duration::from_millis(config.retry_base_ms),
            max: Duration::from_millis(config.retry_max_ms),
        }
    }

    /// Single try, no backoff
    pub fn none() -> Self {
        Self {
            attempts: 1,
            base: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// Backoff to wait after the `failures`-th consecutive failure (1-based)
    pub fn backoff_for(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(16);
        self.base.saturating_mul(2u32.pow(exp)).min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base: u64, min: u64, max: u64) -> PolitenessConfig {
        PolitenessConfig {
            base_delay: Duration::from_millis(base),
            jitter_min: Duration::from_millis(min),
            jitter_max: Duration::from_millis(max),
        }
    }

    #[test]
    fn delay_stays_in_window() {
        let policy = DelayPolicy::with_seed(config(500, 1000, 3000), 7);
        for _ in 0..200 {
            let d = policy.next_delay();
            assert!(d >= Duration::from_millis(1500), "{:?}", d);
            assert!(d <= Duration::from_millis(3500), "{:?}", d);
        }
    }

    #[test]
    fn seeded_policies_agree() {
        let a = DelayPolicy::with_seed(config(0, 1000, 3000), 42);
        let b = DelayPolicy::with_seed(config(0, 1000, 3000), 42);
        let da: Vec<_> = (0..10).map(|_| a.next_delay()).collect();
        let db: Vec<_> = (0..10).map(|_| b.next_delay()).collect();
        assert_eq!(da, db);
    }

    #[test]
    fn degenerate_window_is_fixed() {
        let policy = DelayPolicy::new(config(250, 0, 0));
        assert_eq!(policy.next_delay(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn pause_reports_cancellation() {
        let policy = DelayPolicy::new(config(0, 0, 0));
        let cancel = CancellationToken::new();
        assert!(policy.pause(&cancel).await.is_ok());

        cancel.cancel();
        assert!(matches!(policy.pause(&cancel).await, Err(HarvestError::Cancelled)));

        let slow = DelayPolicy::new(config(60_000, 0, 0));
        assert!(matches!(slow.pause(&cancel).await, Err(HarvestError::Cancelled)));
    }

    #[test]
    fn backoff_doubles_until_cap() {
        let retry = RetryPolicy {
            attempts: 6,
            base: Duration::from_millis(500),
            max: Duration::from_millis(3000),
        };
        assert_eq!(retry.backoff_for(1), Duration::from_millis(500));
        assert_eq!(retry.backoff_for(2), Duration::from_millis(1000));
        assert_eq!(retry.backoff_for(3), Duration::from_millis(2000));
        assert_eq!(retry.backoff_for(4), Duration::from_millis(3000));
        assert_eq!(retry.backoff_for(30), Duration::from_millis(3000));
    }

    #[test]
    fn fixed_clock_reports_its_day() {
        let now = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(FixedClock(now).today(), NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
    }
}
