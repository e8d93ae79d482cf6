use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio_util::sync::CancellationToken;
use turnstile_random::Rng;

use crate::{
    config::{DurationRange, TimeoutPolicy},
    event::{Event, EventKind, EventSink},
    pool::{AcquireError, SlotPool},
};

pub type OccupantId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OccupantState {
    Idle,
    Waiting,
    InCriticalRegion,
    Resting,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FinishReason {
    /// Every visit was made. A cancel that lands during the rest after the
    /// last visit still counts as completed.
    Completed,
    Cancelled,
    TimedOut,
}

/// One completed stay in the critical region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionRecord {
    pub occupant_id: OccupantId,
    pub acquired_tick: u64,
    pub released_tick: u64,
    pub acquired_at: Instant,
    pub released_at: Instant,
    /// Hold time that was drawn for this visit. A cancelled visit holds for
    /// less.
    pub planned_hold: Duration,
}

impl AdmissionRecord {
    /// Whether the two stays were in the region at the same time.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.acquired_tick < other.released_tick && other.acquired_tick < self.released_tick
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccupantReport {
    pub id: OccupantId,
    pub completed_visits: usize,
    pub remaining_visits: usize,
    pub reason: FinishReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupantOutcome {
    pub report: OccupantReport,
    pub admissions: Vec<AdmissionRecord>,
}

/// Everything an occupant shares with the rest of its scenario.
pub struct VisitContext {
    pub pool: Arc<SlotPool>,
    pub token: CancellationToken,
    pub sink: Arc<dyn EventSink>,
    pub hold: DurationRange,
    pub rest: DurationRange,
    pub acquire_timeout: Option<Duration>,
    pub timeout_policy: TimeoutPolicy,
}

pub struct Occupant {
    id: OccupantId,
    state: OccupantState,
    remaining_visits: usize,
    completed_visits: usize,
    rng: Rng,
}

impl std::fmt::Debug for Occupant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Occupant")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("remaining_visits", &self.remaining_visits)
            .field("completed_visits", &self.completed_visits)
            .finish_non_exhaustive()
    }
}

impl Occupant {
    #[must_use]
    pub const fn new(id: OccupantId, visits: usize, rng: Rng) -> Self {
        Self {
            id,
            state: OccupantState::Idle,
            remaining_visits: visits,
            completed_visits: 0,
            rng,
        }
    }

    #[must_use]
    pub const fn id(&self) -> OccupantId {
        self.id
    }

    #[must_use]
    pub const fn state(&self) -> OccupantState {
        self.state
    }

    #[must_use]
    pub const fn remaining_visits(&self) -> usize {
        self.remaining_visits
    }

    fn transition(&mut self, ctx: &VisitContext, to: OccupantState, kind: EventKind) {
        let from = self.state;
        self.state = to;

        ctx.sink.emit(Event {
            occupant_id: self.id,
            from,
            to,
            kind,
            at: Instant::now(),
        });
    }

    fn finish(mut self, ctx: &VisitContext, reason: FinishReason) -> OccupantReport {
        self.transition(ctx, OccupantState::Finished, EventKind::Finished { reason });

        OccupantReport {
            id: self.id,
            completed_visits: self.completed_visits,
            remaining_visits: self.remaining_visits,
            reason,
        }
    }

    /// Runs visits until none remain, the scenario is cancelled, or a timed
    /// out acquire is abandoned. Any slot held when the run ends is released
    /// before this returns.
    pub async fn run(mut self, ctx: &VisitContext) -> OccupantOutcome {
        let mut admissions = Vec::with_capacity(self.remaining_visits);

        let reason = loop {
            if self.remaining_visits == 0 {
                break FinishReason::Completed;
            }

            self.transition(ctx, OccupantState::Waiting, EventKind::Transition);

            let permit = loop {
                match ctx.pool.acquire(ctx.acquire_timeout, &ctx.token).await {
                    Ok(permit) => break Ok(permit),
                    Err(AcquireError::Cancelled) => break Err(FinishReason::Cancelled),
                    Err(AcquireError::TimedOut) => {
                        self.transition(ctx, OccupantState::Waiting, EventKind::AcquireTimedOut);
                        if ctx.timeout_policy == TimeoutPolicy::Abandon {
                            break Err(FinishReason::TimedOut);
                        }
                    }
                }
            };
            let permit = match permit {
                Ok(permit) => permit,
                Err(reason) => break reason,
            };

            let grant = permit.grant();
            let planned_hold = ctx.hold.sample(&self.rng);
            self.transition(
                ctx,
                OccupantState::InCriticalRegion,
                EventKind::Entered { tick: grant.tick },
            );

            let interrupted = sleep_or_cancel(planned_hold, &ctx.token).await;

            let release = permit.release();
            admissions.push(AdmissionRecord {
                occupant_id: self.id,
                acquired_tick: grant.tick,
                released_tick: release.tick,
                acquired_at: grant.at,
                released_at: release.at,
                planned_hold,
            });

            if !interrupted {
                self.remaining_visits -= 1;
                self.completed_visits += 1;
            }

            self.transition(
                ctx,
                OccupantState::Resting,
                EventKind::Left {
                    tick: release.tick,
                    remaining_visits: self.remaining_visits,
                },
            );

            if interrupted {
                break FinishReason::Cancelled;
            }

            // Cancelling the trailing rest does not undo a finished schedule.
            let rest = ctx.rest.sample(&self.rng);
            if sleep_or_cancel(rest, &ctx.token).await && self.remaining_visits > 0 {
                break FinishReason::Cancelled;
            }
        };

        OccupantOutcome {
            report: self.finish(ctx, reason),
            admissions,
        }
    }
}

/// Returns `true` if `token` fired before `duration` elapsed.
async fn sleep_or_cancel(duration: Duration, token: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = token.cancelled() => true,
        () = tokio::time::sleep(duration) => false,
    }
}
