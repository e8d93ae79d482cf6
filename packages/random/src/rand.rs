//! Standard random number generation backend using `rand::rngs::SmallRng`.

use std::{
    ops::RangeInclusive,
    sync::{Arc, Mutex},
};

use rand::{Rng as _, RngCore, SeedableRng, rngs::SmallRng};

/// Re-export of the `rand` crate for access to distribution types and traits.
pub use rand;

use crate::GenericRng;

/// The underlying random number generator implementation using `rand::rngs::SmallRng`.
#[derive(Clone)]
pub struct RandRng(Arc<Mutex<SmallRng>>);

impl RandRng {
    /// Creates a new random number generator from an optional seed.
    ///
    /// If `None` is provided, the RNG is seeded from the operating system.
    #[must_use]
    pub fn new<S: Into<Option<u64>>>(seed: S) -> Self {
        let rng = seed
            .into()
            .map_or_else(SmallRng::from_os_rng, SmallRng::seed_from_u64);

        Self(Arc::new(Mutex::new(rng)))
    }
}

impl GenericRng for RandRng {
    /// # Panics
    ///
    /// * If the internal mutex is poisoned
    fn next_u64(&self) -> u64 {
        self.0.lock().unwrap().next_u64()
    }

    /// # Panics
    ///
    /// * If the internal mutex is poisoned
    fn range_u64(&self, range: RangeInclusive<u64>) -> u64 {
        if range.start() >= range.end() {
            return *range.start();
        }
        self.0.lock().unwrap().random_range(range)
    }
}
