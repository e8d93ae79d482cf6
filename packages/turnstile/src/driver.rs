use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use futures::{StreamExt as _, stream::FuturesUnordered};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use turnstile_random::Rng;

use crate::{
    Error,
    config::ScenarioConfig,
    event::{EventSink, LogSink},
    occupant::{AdmissionRecord, FinishReason, Occupant, OccupantId, OccupantReport, VisitContext},
    pool::{PoolStats, SlotPool},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    /// Sorted by occupant id.
    pub occupants: Vec<OccupantReport>,
    /// Sorted by acquire tick.
    pub admissions: Vec<AdmissionRecord>,
    pub pool: PoolStats,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl ScenarioReport {
    #[must_use]
    pub fn total_admissions(&self) -> usize {
        self.admissions.len()
    }

    #[must_use]
    pub fn completed_visits(&self) -> usize {
        self.occupants.iter().map(|x| x.completed_visits).sum()
    }

    #[must_use]
    pub fn remaining_visits(&self) -> usize {
        self.occupants.iter().map(|x| x.remaining_visits).sum()
    }

    #[must_use]
    pub fn finished_with(&self, reason: FinishReason) -> usize {
        self.occupants.iter().filter(|x| x.reason == reason).count()
    }

    /// Most admissions that were open at the same pool tick.
    #[must_use]
    pub fn peak_overlap(&self) -> usize {
        let mut edges = self
            .admissions
            .iter()
            .flat_map(|x| [(x.acquired_tick, 1_isize), (x.released_tick, -1)])
            .collect::<Vec<_>>();
        edges.sort_unstable_by_key(|(tick, _)| *tick);

        let mut current = 0_isize;
        let mut peak = 0_isize;
        for (_, delta) in edges {
            current += delta;
            peak = peak.max(current);
        }

        peak.unsigned_abs()
    }

    #[must_use]
    pub fn has_overlapping_admissions(&self) -> bool {
        self.peak_overlap() > 1
    }

    /// Planned hold durations of one occupant, in visit order.
    #[must_use]
    pub fn planned_holds(&self, occupant_id: OccupantId) -> Vec<Duration> {
        self.admissions
            .iter()
            .filter(|x| x.occupant_id == occupant_id)
            .map(|x| x.planned_hold)
            .collect()
    }
}

pub struct Driver {
    config: ScenarioConfig,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Driver {
    /// # Errors
    ///
    /// * If the config fails [`ScenarioConfig::validate`]
    pub fn new(config: ScenarioConfig) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            config,
            sink: Arc::new(LogSink),
        })
    }

    #[must_use]
    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    #[must_use]
    pub fn with_shared_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// Runs one scenario on the current Tokio runtime and waits for every
    /// occupant to finish.
    ///
    /// Cancelling `token` makes every occupant release what it holds and
    /// finish; the report then has `cancelled` set. Dropping the returned
    /// future cancels the occupants the same way. If an occupant panics the
    /// others are cancelled too, and the panic is reported once all of them
    /// have finished.
    ///
    /// # Errors
    ///
    /// * [`Error::WorkerPanicked`] if an occupant task panicked
    /// * [`Error::Join`] if an occupant task was aborted by the runtime
    ///
    /// # Panics
    ///
    /// * If called outside of a Tokio runtime
    pub async fn run(&self, token: CancellationToken) -> Result<ScenarioReport, Error> {
        let started = Instant::now();
        let config = &self.config;
        let pool = SlotPool::shared(config.capacity)?;
        // Child token so a panicking occupant can stop its siblings without
        // cancelling the caller's token.
        let workers_token = token.child_token();
        // Occupants must not outlive this future if the caller stops polling.
        let _cancel_on_drop = workers_token.clone().drop_guard();

        let ctx = Arc::new(VisitContext {
            pool: Arc::clone(&pool),
            token: workers_token.clone(),
            sink: Arc::clone(&self.sink),
            hold: config.hold,
            rest: config.rest,
            acquire_timeout: config.acquire_timeout,
            timeout_policy: config.timeout_policy,
        });

        log::debug!(
            "run: starting {} occupants, capacity={} visits={} seed={:?}",
            config.worker_count,
            config.capacity,
            config.visits_per_worker,
            config.seed
        );

        let worker_count = OccupantId::try_from(config.worker_count).unwrap_or(OccupantId::MAX);
        let mut handles = (1..=worker_count)
            .map(|id| {
                let occupant = Occupant::new(
                    id,
                    config.visits_per_worker,
                    Rng::for_stream(config.seed, id),
                );
                let ctx = Arc::clone(&ctx);
                let handle = tokio::spawn(async move { occupant.run(&ctx).await });
                async move { (id, handle.await) }
            })
            .collect::<FuturesUnordered<_>>();

        let mut occupants = Vec::with_capacity(config.worker_count);
        let mut admissions = vec![];
        let mut error = None;

        while let Some((id, result)) = handles.next().await {
            match result {
                Ok(outcome) => {
                    occupants.push(outcome.report);
                    admissions.extend(outcome.admissions);
                }
                Err(e) => {
                    log::error!("run: occupant {id} failed: {e:?}");
                    workers_token.cancel();
                    if error.is_none() {
                        error = Some(if e.is_panic() {
                            Error::WorkerPanicked { id }
                        } else {
                            Error::Join(e)
                        });
                    }
                }
            }
        }

        if let Some(error) = error {
            return Err(error);
        }

        occupants.sort_unstable_by_key(|x| x.id);
        admissions.sort_unstable_by_key(|x| x.acquired_tick);

        let report = ScenarioReport {
            occupants,
            admissions,
            pool: pool.stats(),
            cancelled: token.is_cancelled(),
            elapsed: started.elapsed(),
        };

        log::debug!(
            "run: finished in {:?} with {} admissions (peak {}), cancelled={}",
            report.elapsed,
            report.total_admissions(),
            report.pool.peak,
            report.cancelled
        );

        Ok(report)
    }

    /// Starts the scenario in the background.
    ///
    /// # Panics
    ///
    /// * If called outside of a Tokio runtime
    #[must_use]
    pub fn spawn(self, token: CancellationToken) -> ScenarioHandle {
        let handle = {
            let token = token.clone();
            tokio::spawn(async move { self.run(token).await })
        };

        ScenarioHandle { token, handle }
    }
}

/// A scenario running in the background.
#[derive(Debug)]
pub struct ScenarioHandle {
    token: CancellationToken,
    handle: JoinHandle<Result<ScenarioReport, Error>>,
}

impl ScenarioHandle {
    pub fn cancel(&self) {
        log::debug!("Cancelling scenario");
        self.token.cancel();
    }

    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for every occupant to finish.
    ///
    /// # Errors
    ///
    /// * If the scenario itself failed, see [`Driver::run`]
    /// * [`Error::Join`] if the scenario task panicked or was aborted
    pub async fn join(self) -> Result<ScenarioReport, Error> {
        self.handle.await?
    }
}

/// Runs `worker_count` occupants against `capacity` slots with the default
/// reading-room durations until each has made `visits_per_worker` visits.
///
/// # Errors
///
/// * If any of the counts is zero
/// * If an occupant task panicked
pub async fn run_scenario(
    worker_count: usize,
    capacity: usize,
    visits_per_worker: usize,
) -> Result<ScenarioReport, Error> {
    let config = ScenarioConfig::new(worker_count, capacity, visits_per_worker);

    Driver::new(config)?.run(CancellationToken::new()).await
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::DurationRange;

    fn record(occupant_id: OccupantId, acquired_tick: u64, released_tick: u64) -> AdmissionRecord {
        let now = Instant::now();
        AdmissionRecord {
            occupant_id,
            acquired_tick,
            released_tick,
            acquired_at: now,
            released_at: now,
            planned_hold: Duration::from_millis(acquired_tick),
        }
    }

    fn report(admissions: Vec<AdmissionRecord>) -> ScenarioReport {
        ScenarioReport {
            occupants: vec![],
            admissions,
            pool: PoolStats::default(),
            cancelled: false,
            elapsed: Duration::ZERO,
        }
    }

    #[test_log::test]
    fn peak_overlap_counts_open_admissions() {
        let report = report(vec![record(1, 1, 4), record(2, 2, 6), record(3, 5, 7)]);

        assert_eq!(report.peak_overlap(), 2);
        assert!(report.has_overlapping_admissions());
        assert_eq!(report.planned_holds(2), vec![Duration::from_millis(2)]);
    }

    #[test_log::test]
    fn serialized_admissions_do_not_overlap() {
        let report = report(vec![record(1, 1, 2), record(2, 3, 4), record(1, 5, 6)]);

        assert_eq!(report.peak_overlap(), 1);
        assert!(!report.has_overlapping_admissions());
        assert_eq!(report.total_admissions(), 3);
    }

    #[test_log::test]
    fn new_rejects_invalid_config() {
        assert!(matches!(
            Driver::new(ScenarioConfig::new(0, 1, 1)),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            Driver::new(ScenarioConfig::new(1, 0, 1)),
            Err(Error::InvalidCapacity)
        ));
    }

    #[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
    async fn spawned_scenario_can_be_joined() {
        let driver = Driver::new(
            ScenarioConfig::new(3, 2, 1)
                .with_hold(DurationRange::from_millis(1, 2))
                .with_rest(DurationRange::from_millis(0, 1)),
        )
        .unwrap();

        let handle = driver.spawn(CancellationToken::new());
        assert!(!handle.cancellation_token().is_cancelled());

        tokio::time::timeout(Duration::from_secs(2), async {
            while !handle.is_finished() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let report = handle.join().await.unwrap();

        assert_eq!(report.total_admissions(), 3);
        assert_eq!(report.finished_with(FinishReason::Completed), 3);
        assert!(!report.cancelled);
    }
}
