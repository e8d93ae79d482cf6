//! Diagnostic events emitted by occupants as they move through their states.
//!
//! Nothing in the controller reads these back; they exist for rendering and
//! for tests that want to reconstruct what happened.

use std::{
    sync::{Mutex, PoisonError},
    time::Instant,
};

use crate::occupant::{FinishReason, OccupantId, OccupantState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Transition,
    /// Granted a slot at pool tick `tick`.
    Entered { tick: u64 },
    /// Released the slot at pool tick `tick`.
    Left { tick: u64, remaining_visits: usize },
    AcquireTimedOut,
    Finished { reason: FinishReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub occupant_id: OccupantId,
    pub from: OccupantState,
    pub to: OccupantState,
    pub kind: EventKind,
    pub at: Instant,
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Renders events through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: Event) {
        let id = event.occupant_id;

        match event.kind {
            EventKind::Transition => {
                log::trace!("occupant {id}: {:?} -> {:?}", event.from, event.to);
            }
            EventKind::Entered { tick } => {
                turnstile_logging::debug_or_trace!(
                    ("occupant {id} entered"),
                    ("occupant {id} entered at tick {tick}")
                );
            }
            EventKind::Left {
                tick,
                remaining_visits,
            } => {
                turnstile_logging::debug_or_trace!(
                    ("occupant {id} left"),
                    ("occupant {id} left at tick {tick} ({remaining_visits} visits remaining)")
                );
            }
            EventKind::AcquireTimedOut => {
                log::debug!("occupant {id} gave up waiting for a slot");
            }
            EventKind::Finished { reason } => {
                log::debug!("occupant {id} finished: {reason:?}");
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct EventRecorder {
    events: Mutex<Vec<Event>>,
}

impl EventRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn for_occupant(&self, occupant_id: OccupantId) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|x| x.occupant_id == occupant_id)
            .collect()
    }

    /// Replays `Entered`/`Left` in pool-tick order and returns the most
    /// occupants that were ever in the critical region together.
    #[must_use]
    pub fn max_in_region(&self) -> usize {
        let mut edges = self
            .events()
            .into_iter()
            .filter_map(|x| match x.kind {
                EventKind::Entered { tick } => Some((tick, true)),
                EventKind::Left { tick, .. } => Some((tick, false)),
                _ => None,
            })
            .collect::<Vec<_>>();
        edges.sort_unstable_by_key(|(tick, _)| *tick);

        let mut current = 0_usize;
        let mut max = 0;

        for (_, entered) in edges {
            if entered {
                current += 1;
                max = max.max(current);
            } else {
                current = current.saturating_sub(1);
            }
        }

        max
    }
}

impl EventSink for EventRecorder {
    fn emit(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl<T: EventSink + ?Sized> EventSink for std::sync::Arc<T> {
    fn emit(&self, event: Event) {
        (**self).emit(event);
    }
}

#[cfg(feature = "flume")]
impl EventSink for flume::Sender<Event> {
    fn emit(&self, event: Event) {
        if self.send(event).is_err() {
            log::trace!("event receiver dropped, discarding {event:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn event(occupant_id: OccupantId, kind: EventKind) -> Event {
        Event {
            occupant_id,
            from: OccupantState::Waiting,
            to: OccupantState::InCriticalRegion,
            kind,
            at: Instant::now(),
        }
    }

    #[test_log::test]
    fn recorder_replays_region_occupancy_by_tick() {
        let recorder = EventRecorder::new();

        // emitted out of tick order on purpose
        recorder.emit(event(2, EventKind::Entered { tick: 2 }));
        recorder.emit(event(1, EventKind::Entered { tick: 1 }));
        recorder.emit(event(
            1,
            EventKind::Left {
                tick: 3,
                remaining_visits: 0,
            },
        ));
        recorder.emit(event(3, EventKind::Entered { tick: 4 }));
        recorder.emit(event(
            2,
            EventKind::Left {
                tick: 5,
                remaining_visits: 0,
            },
        ));

        assert_eq!(recorder.max_in_region(), 2);
        assert_eq!(recorder.for_occupant(1).len(), 2);
        assert_eq!(recorder.events().len(), 5);
    }

    #[cfg(feature = "flume")]
    #[test_log::test]
    fn flume_sender_forwards_events() {
        let (tx, rx) = flume::unbounded();

        tx.emit(event(7, EventKind::AcquireTimedOut));

        assert_eq!(rx.recv().unwrap().occupant_id, 7);
    }

    #[cfg(feature = "flume")]
    #[test_log::test]
    fn flume_sender_ignores_dropped_receiver() {
        let (tx, rx) = flume::unbounded::<Event>();
        drop(rx);

        tx.emit(event(7, EventKind::AcquireTimedOut));
    }
}
