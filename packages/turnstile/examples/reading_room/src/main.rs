//! Reading room: readers take turns in a library that only seats a few at
//! a time.
//!
//! Every flag falls back to the matching `TURNSTILE_*` environment variable
//! and then to the library defaults (10 readers, 3 seats, 3 visits each,
//! 500-1000 ms reading and resting). Press Ctrl+C to send everybody home
//! early.
//!
//! ```text
//! turnstile_reading_room --workers 5 --capacity 1 --visits 1 --seed 7
//! ```

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use turnstile::{
    CancellationToken, Driver, DurationRange, Event, EventKind, FinishReason, ScenarioConfig,
    ScenarioReport, TimeoutPolicy,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of readers.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Seats in the reading room.
    #[arg(short, long)]
    capacity: Option<usize>,

    /// Visits each reader makes.
    #[arg(short, long)]
    visits: Option<usize>,

    /// Seed for reading and resting times.
    #[arg(short, long)]
    seed: Option<u64>,

    #[arg(long)]
    hold_min_ms: Option<u64>,

    #[arg(long)]
    hold_max_ms: Option<u64>,

    #[arg(long)]
    rest_min_ms: Option<u64>,

    #[arg(long)]
    rest_max_ms: Option<u64>,

    /// Give up waiting for a seat after this long.
    #[arg(long)]
    acquire_timeout_ms: Option<u64>,

    /// Go home instead of waiting again after `--acquire-timeout-ms`.
    #[arg(long, default_value_t = false)]
    abandon_on_timeout: bool,
}

#[derive(Debug, Error)]
enum Error {
    #[error(transparent)]
    Turnstile(#[from] turnstile::Error),
    #[error(transparent)]
    Config(#[from] turnstile::ConfigError),
    #[error(transparent)]
    Logging(#[from] turnstile_logging::InitError),
    #[error(transparent)]
    CtrlC(#[from] ctrlc::Error),
    #[error(transparent)]
    IO(#[from] std::io::Error),
}

impl Args {
    fn into_config(self, env: ScenarioConfig) -> ScenarioConfig {
        let range = |min: Option<u64>, max: Option<u64>, fallback: DurationRange| {
            DurationRange::new(
                min.map_or(fallback.min, Duration::from_millis),
                max.map_or(fallback.max, Duration::from_millis),
            )
        };

        ScenarioConfig {
            worker_count: self.workers.unwrap_or(env.worker_count),
            capacity: self.capacity.unwrap_or(env.capacity),
            visits_per_worker: self.visits.unwrap_or(env.visits_per_worker),
            seed: self.seed.or(env.seed),
            hold: range(self.hold_min_ms, self.hold_max_ms, env.hold),
            rest: range(self.rest_min_ms, self.rest_max_ms, env.rest),
            acquire_timeout: self
                .acquire_timeout_ms
                .map(Duration::from_millis)
                .or(env.acquire_timeout),
            timeout_policy: if self.abandon_on_timeout {
                TimeoutPolicy::Abandon
            } else {
                env.timeout_policy
            },
        }
    }
}

fn render(event: &Event) -> Option<String> {
    let id = event.occupant_id;

    Some(match event.kind {
        EventKind::Transition => return None,
        EventKind::Entered { .. } => format!("Reader {id} enters the library and starts reading"),
        EventKind::Left {
            remaining_visits, ..
        } => format!("Reader {id} leaves the library ({remaining_visits} visits left)"),
        EventKind::AcquireTimedOut => format!("Reader {id} is tired of waiting for a seat"),
        EventKind::Finished {
            reason: FinishReason::Completed,
        } => format!("Reader {id} is done for the day"),
        EventKind::Finished { reason } => format!("Reader {id} went home early: {reason:?}"),
    })
}

fn summarize(report: &ScenarioReport) {
    println!();
    println!(
        "{} admissions in {:.2?}, at most {} of {} seats taken at once{}",
        report.total_admissions(),
        report.elapsed,
        report.pool.peak,
        report.pool.capacity,
        if report.cancelled { " (cancelled)" } else { "" }
    );
    for occupant in &report.occupants {
        println!(
            "  reader {:>3}: {} visits, {} left, {:?}",
            occupant.id, occupant.completed_visits, occupant.remaining_visits, occupant.reason
        );
    }
}

fn main() -> Result<(), Error> {
    let args = Args::parse();

    let _layer = turnstile_logging::init(Some("turnstile_reading_room.log"))?;

    let config = args.into_config(ScenarioConfig::from_env()?);
    log::debug!("Starting reading room with {config:?}");

    let token = CancellationToken::new();
    {
        let token = token.clone();
        ctrlc::set_handler(move || {
            println!("ctrl+c received. sending everybody home...");
            token.cancel();
        })?;
    }

    let (tx, rx) = flume::unbounded::<Event>();
    let printer = std::thread::spawn(move || {
        for event in rx {
            if let Some(line) = render(&event) {
                println!("{line}");
            }
        }
    });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let report = {
        let driver = Driver::new(config)?.with_sink(tx);
        runtime.block_on(driver.run(token))?
    };

    if printer.join().is_err() {
        log::error!("Event printer panicked");
    }

    summarize(&report);

    Ok(())
}
