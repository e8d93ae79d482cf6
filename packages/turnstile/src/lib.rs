#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Bounded access controller.
//!
//! A [`SlotPool`] lets at most `capacity` occupants into a shared critical
//! region at a time. A [`Driver`] starts a number of [`Occupant`]s that each
//! make a fixed number of visits: wait for a slot, hold it for a random
//! while, give it back, rest, and repeat.
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), turnstile::Error> {
//! use turnstile::{CancellationToken, Driver, DurationRange, ScenarioConfig};
//!
//! let config = ScenarioConfig::new(10, 3, 3)
//!     .with_seed(1)
//!     .with_hold(DurationRange::from_millis(5, 10))
//!     .with_rest(DurationRange::from_millis(5, 10));
//!
//! let report = Driver::new(config)?.run(CancellationToken::new()).await?;
//!
//! assert_eq!(report.total_admissions(), 30);
//! assert!(report.pool.peak <= 3);
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

pub mod config;
pub mod driver;
pub mod event;
pub mod occupant;
pub mod pool;

pub use config::{ConfigError, DurationRange, ScenarioConfig, TimeoutPolicy};
pub use driver::{Driver, ScenarioHandle, ScenarioReport, run_scenario};
pub use event::{Event, EventKind, EventRecorder, EventSink, LogSink, NullSink};
pub use occupant::{
    AdmissionRecord, FinishReason, Occupant, OccupantId, OccupantOutcome, OccupantReport,
    OccupantState,
};
pub use pool::{AcquireError, PoolStamp, PoolStats, SlotPermit, SlotPool};
pub use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Capacity must be at least 1")]
    InvalidCapacity,
    #[error("Invalid scenario config: {0}")]
    InvalidConfig(String),
    #[error("Occupant {id} panicked")]
    WorkerPanicked { id: OccupantId },
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
