//! Counting slot pool with scoped permits.
//!
//! A [`SlotPool`] admits at most `capacity` holders at once. Every grant hands
//! out a [`SlotPermit`] which gives its slot back when dropped, so a slot can
//! not leak on early return, cancellation or panic.
//!
//! Grants and releases advance a logical clock under the pool lock. The ticks
//! recorded on each permit give a total order over all admissions, which is
//! what the overlap checks in [`crate::ScenarioReport`] rely on.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use turnstile_assert::{assert_invariant, invariant_violated};

use crate::Error;

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum AcquireError {
    #[error("Timed out waiting for a slot")]
    TimedOut,
    #[error("Cancelled while waiting for a slot")]
    Cancelled,
}

/// Position of a grant or release on the pool's logical clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStamp {
    pub tick: u64,
    pub at: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub held: usize,
    pub peak: usize,
    pub granted: u64,
    pub released: u64,
}

#[derive(Debug, Default)]
struct PoolState {
    held: usize,
    peak: usize,
    granted: u64,
    released: u64,
    tick: u64,
}

#[derive(Debug)]
pub struct SlotPool {
    capacity: usize,
    state: Mutex<PoolState>,
    notify: Notify,
}

impl SlotPool {
    /// # Errors
    ///
    /// * [`Error::InvalidCapacity`] if `capacity` is zero
    pub fn new(capacity: usize) -> Result<Self, Error> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity);
        }

        Ok(Self {
            capacity,
            state: Mutex::new(PoolState::default()),
            notify: Notify::new(),
        })
    }

    /// # Errors
    ///
    /// * [`Error::InvalidCapacity`] if `capacity` is zero
    pub fn shared(capacity: usize) -> Result<Arc<Self>, Error> {
        Ok(Arc::new(Self::new(capacity)?))
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn held(&self) -> usize {
        self.state().held
    }

    #[must_use]
    pub fn available(&self) -> usize {
        self.capacity - self.state().held
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.state();

        PoolStats {
            capacity: self.capacity,
            held: state.held,
            peak: state.peak,
            granted: state.granted,
            released: state.released,
        }
    }

    // An invariant failure panics while the guard is held; the state is still
    // consistent at that point so poisoning is ignored.
    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Grants a slot if one is free right now.
    #[must_use]
    pub fn try_acquire(self: &Arc<Self>) -> Option<SlotPermit> {
        let mut state = self.state();

        if state.held >= self.capacity {
            return None;
        }

        state.held += 1;
        assert_invariant!(
            state.held <= self.capacity,
            "held {} exceeds capacity {}",
            state.held,
            self.capacity
        );
        state.peak = state.peak.max(state.held);
        state.granted += 1;
        state.tick += 1;
        let tick = state.tick;
        drop(state);

        log::trace!("try_acquire: granted slot at tick {tick}");

        Some(SlotPermit {
            pool: Arc::clone(self),
            grant: PoolStamp {
                tick,
                at: Instant::now(),
            },
            released: false,
        })
    }

    /// Waits for a free slot.
    ///
    /// Fails with [`AcquireError::Cancelled`] as soon as `token` is cancelled,
    /// including when it already was on entry, and with
    /// [`AcquireError::TimedOut`] once `timeout` elapses. `None` waits for as
    /// long as it takes.
    ///
    /// # Errors
    ///
    /// * [`AcquireError::Cancelled`] if `token` is cancelled before a slot is granted
    /// * [`AcquireError::TimedOut`] if no slot frees up within `timeout`
    pub async fn acquire(
        self: &Arc<Self>,
        timeout: Option<Duration>,
        token: &CancellationToken,
    ) -> Result<SlotPermit, AcquireError> {
        if token.is_cancelled() {
            return Err(AcquireError::Cancelled);
        }

        let deadline = timeout.map(|x| tokio::time::Instant::now() + x);

        loop {
            // Register before checking so a release between the check and the
            // await still wakes us.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(permit) = self.try_acquire() {
                return Ok(permit);
            }

            tokio::select! {
                biased;
                () = token.cancelled() => {
                    log::trace!("acquire: cancelled while waiting");
                    return Err(AcquireError::Cancelled);
                }
                () = sleep_until(deadline) => {
                    log::trace!("acquire: timed out after {timeout:?}");
                    return Err(AcquireError::TimedOut);
                }
                () = &mut notified => {}
            }
        }
    }

    fn release_slot(&self, grant: PoolStamp) -> PoolStamp {
        let mut state = self.state();

        if state.held == 0 {
            invariant_violated!("release of grant at tick {} with no slot held", grant.tick);
        }

        state.held -= 1;
        state.released += 1;
        state.tick += 1;
        assert_invariant!(
            state.released <= state.granted,
            "released {} exceeds granted {}",
            state.released,
            state.granted
        );
        let tick = state.tick;
        drop(state);

        assert_invariant!(
            tick > grant.tick,
            "release tick {tick} is not after grant tick {}",
            grant.tick
        );

        self.notify.notify_one();

        log::trace!("release: slot granted at tick {} released at tick {tick}", grant.tick);

        PoolStamp {
            tick,
            at: Instant::now(),
        }
    }
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// One held slot. The slot goes back to the pool when the permit is dropped
/// or explicitly [released](SlotPermit::release).
#[derive(Debug)]
#[must_use = "dropping the permit releases the slot immediately"]
pub struct SlotPermit {
    pool: Arc<SlotPool>,
    grant: PoolStamp,
    released: bool,
}

impl SlotPermit {
    #[must_use]
    pub const fn grant(&self) -> PoolStamp {
        self.grant
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<SlotPool> {
        &self.pool
    }

    /// Gives the slot back and returns where the release landed on the pool
    /// clock.
    pub fn release(mut self) -> PoolStamp {
        self.released = true;
        self.pool.release_slot(self.grant)
    }
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            self.pool.release_slot(self.grant);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test_log::test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(SlotPool::new(0), Err(Error::InvalidCapacity)));
    }

    #[test_log::test]
    fn try_acquire_stops_at_capacity() {
        let pool = SlotPool::shared(2).unwrap();

        let first = pool.try_acquire().unwrap();
        let second = pool.try_acquire().unwrap();

        assert!(pool.try_acquire().is_none());
        assert_eq!(pool.held(), 2);
        assert_eq!(pool.available(), 0);

        drop(first);
        assert_eq!(pool.available(), 1);

        drop(second);
        assert_eq!(
            pool.stats(),
            PoolStats {
                capacity: 2,
                held: 0,
                peak: 2,
                granted: 2,
                released: 2,
            }
        );
    }

    #[test_log::test]
    fn ticks_are_strictly_increasing() {
        let pool = SlotPool::shared(1).unwrap();

        let permit = pool.try_acquire().unwrap();
        let grant = permit.grant();
        let release = permit.release();

        let next = pool.try_acquire().unwrap();

        assert!(grant.tick < release.tick);
        assert!(release.tick < next.grant().tick);
    }

    #[test_log::test]
    fn explicit_release_does_not_release_twice() {
        let pool = SlotPool::shared(1).unwrap();

        let permit = pool.try_acquire().unwrap();
        let _ = permit.release();

        let stats = pool.stats();
        assert_eq!(stats.granted, 1);
        assert_eq!(stats.released, 1);
        assert_eq!(stats.held, 0);
    }

    #[test_log::test(tokio::test)]
    async fn acquire_with_cancelled_token_fails_fast() {
        let pool = SlotPool::shared(1).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let result = pool.acquire(None, &token).await;

        assert_eq!(result.unwrap_err(), AcquireError::Cancelled);
        assert_eq!(pool.held(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn acquire_times_out_on_full_pool() {
        let pool = SlotPool::shared(1).unwrap();
        let token = CancellationToken::new();
        let _held = pool.try_acquire().unwrap();

        let result = pool.acquire(Some(Duration::from_millis(20)), &token).await;

        assert_eq!(result.unwrap_err(), AcquireError::TimedOut);
        assert_eq!(pool.held(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn acquire_succeeds_immediately_with_zero_timeout_when_free() {
        let pool = SlotPool::shared(1).unwrap();
        let token = CancellationToken::new();

        let permit = pool.acquire(Some(Duration::ZERO), &token).await.unwrap();

        assert_eq!(permit.grant().tick, 1);
        assert!(Arc::ptr_eq(permit.pool(), &pool));
    }

    #[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
    async fn waiter_wakes_when_slot_is_released() {
        let pool = SlotPool::shared(1).unwrap();
        let token = CancellationToken::new();
        let held = pool.try_acquire().unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            let token = token.clone();
            tokio::spawn(async move {
                pool.acquire(None, &token).await.map(|x| x.grant().tick)
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        let released = held.release();
        let granted = waiter.await.unwrap().unwrap();

        assert!(granted > released.tick);
        assert_eq!(pool.held(), 0);
    }

    #[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
    async fn cancelling_a_waiter_leaves_the_slot_for_others() {
        let pool = SlotPool::shared(1).unwrap();
        let held = pool.try_acquire().unwrap();

        let cancelled_token = CancellationToken::new();
        let cancelled = {
            let pool = Arc::clone(&pool);
            let token = cancelled_token.clone();
            tokio::spawn(async move {
                pool.acquire(None, &token).await.map(|_| ())
            })
        };
        let patient = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                pool.acquire(None, &CancellationToken::new())
                    .await
                    .map(|_| ())
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancelled_token.cancel();
        drop(held);

        assert_eq!(cancelled.await.unwrap(), Err(AcquireError::Cancelled));
        assert_eq!(patient.await.unwrap(), Ok(()));
        assert_eq!(pool.held(), 0);
    }
}
