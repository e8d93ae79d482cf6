use std::time::Duration;

use turnstile_env_utils::{
    DefaultEnvUsizeError, OptionEnvUsizeError, default_env_u64, default_env_usize, option_env_u64,
};

use crate::Error;

pub const DEFAULT_WORKER_COUNT: usize = 10;
pub const DEFAULT_CAPACITY: usize = 3;
pub const DEFAULT_VISITS_PER_WORKER: usize = 3;
pub const DEFAULT_MIN_MS: u64 = 500;
pub const DEFAULT_MAX_MS: u64 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    DefaultEnv(#[from] DefaultEnvUsizeError),
    #[error(transparent)]
    OptionEnv(#[from] OptionEnvUsizeError),
}

/// Inclusive range a simulated duration is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationRange {
    pub min: Duration,
    pub max: Duration,
}

impl DurationRange {
    #[must_use]
    pub const fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub const fn from_millis(min: u64, max: u64) -> Self {
        Self::new(Duration::from_millis(min), Duration::from_millis(max))
    }

    #[must_use]
    pub const fn fixed(duration: Duration) -> Self {
        Self::new(duration, duration)
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.min.as_nanos() <= self.max.as_nanos()
    }

    /// Draws a duration uniformly from the range, with microsecond
    /// granularity.
    #[must_use]
    pub fn sample(&self, rng: &turnstile_random::Rng) -> Duration {
        let min = u64::try_from(self.min.as_micros()).unwrap_or(u64::MAX);
        let max = u64::try_from(self.max.as_micros()).unwrap_or(u64::MAX);

        Duration::from_micros(rng.range_u64(min..=max))
    }
}

impl Default for DurationRange {
    fn default() -> Self {
        Self::from_millis(DEFAULT_MIN_MS, DEFAULT_MAX_MS)
    }
}

/// What a worker does when a bounded acquire gives up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// Keep waiting for the same visit.
    #[default]
    Retry,
    /// Stop visiting and finish.
    Abandon,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioConfig {
    pub worker_count: usize,
    pub capacity: usize,
    pub visits_per_worker: usize,
    pub seed: Option<u64>,
    pub hold: DurationRange,
    pub rest: DurationRange,
    pub acquire_timeout: Option<Duration>,
    pub timeout_policy: TimeoutPolicy,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            capacity: DEFAULT_CAPACITY,
            visits_per_worker: DEFAULT_VISITS_PER_WORKER,
            seed: None,
            hold: DurationRange::default(),
            rest: DurationRange::default(),
            acquire_timeout: None,
            timeout_policy: TimeoutPolicy::default(),
        }
    }
}

impl ScenarioConfig {
    #[must_use]
    pub fn new(worker_count: usize, capacity: usize, visits_per_worker: usize) -> Self {
        Self {
            worker_count,
            capacity,
            visits_per_worker,
            ..Self::default()
        }
    }

    /// Reads `TURNSTILE_*` variables, falling back to the defaults for any
    /// that are unset.
    ///
    /// # Errors
    ///
    /// * If any of the variables is set to something that is not an unsigned integer
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let range = |min_name: &str, max_name: &str, fallback: DurationRange| {
            Ok::<_, ConfigError>(DurationRange::from_millis(
                default_env_u64(min_name, duration_millis(fallback.min))?,
                default_env_u64(max_name, duration_millis(fallback.max))?,
            ))
        };

        Ok(Self {
            worker_count: default_env_usize("TURNSTILE_WORKERS", defaults.worker_count)?,
            capacity: default_env_usize("TURNSTILE_CAPACITY", defaults.capacity)?,
            visits_per_worker: default_env_usize("TURNSTILE_VISITS", defaults.visits_per_worker)?,
            seed: option_env_u64("TURNSTILE_SEED")?,
            hold: range(
                "TURNSTILE_HOLD_MIN_MS",
                "TURNSTILE_HOLD_MAX_MS",
                defaults.hold,
            )?,
            rest: range(
                "TURNSTILE_REST_MIN_MS",
                "TURNSTILE_REST_MAX_MS",
                defaults.rest,
            )?,
            acquire_timeout: option_env_u64("TURNSTILE_ACQUIRE_TIMEOUT_MS")?
                .map(Duration::from_millis),
            timeout_policy: defaults.timeout_policy,
        })
    }

    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    #[must_use]
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    #[must_use]
    pub const fn with_visits_per_worker(mut self, visits_per_worker: usize) -> Self {
        self.visits_per_worker = visits_per_worker;
        self
    }

    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub const fn with_hold(mut self, hold: DurationRange) -> Self {
        self.hold = hold;
        self
    }

    #[must_use]
    pub const fn with_rest(mut self, rest: DurationRange) -> Self {
        self.rest = rest;
        self
    }

    #[must_use]
    pub const fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn with_timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout_policy = policy;
        self
    }

    /// # Errors
    ///
    /// * [`Error::InvalidCapacity`] if the capacity is zero
    /// * [`Error::InvalidConfig`] if there are no workers, no visits, or a
    ///   duration range has `min > max`
    pub fn validate(&self) -> Result<(), Error> {
        if self.capacity == 0 {
            return Err(Error::InvalidCapacity);
        }
        if self.worker_count == 0 {
            return Err(Error::InvalidConfig(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.visits_per_worker == 0 {
            return Err(Error::InvalidConfig(
                "visits per worker must be at least 1".to_string(),
            ));
        }
        if !self.hold.is_valid() {
            return Err(Error::InvalidConfig(format!(
                "hold range {:?}..={:?} is inverted",
                self.hold.min, self.hold.max
            )));
        }
        if !self.rest.is_valid() {
            return Err(Error::InvalidConfig(format!(
                "rest range {:?}..={:?} is inverted",
                self.rest.min, self.rest.max
            )));
        }

        Ok(())
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
