//! Host binary for the cadence scheduler.
//!
//! A minimal tick-driven host that wires the job queues into a real loop:
//! it loads configuration, builds the two queue urgency classes, enqueues
//! the demo workloads, and then calls each queue's processing entry point
//! exactly once per tick until the workloads finish. An external chunk
//! producer is simulated by completing one chunk operation per tick.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `cadence-config.yaml`
//! 3. Create the shared monotonic clock
//! 4. Create the standard and background queues
//! 5. Generate and enqueue the demo workloads
//! 6. Run the tick loop
//! 7. Log the results

mod error;
mod workload;

use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use cadence_core::config::SchedulerConfig;
use cadence_core::job::Job;
use cadence_core::queue::JobQueue;
use cadence_core::time::{MonotonicClock, SharedTimeSource};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::workload::{ChunkPayload, ChunkStreamJob, GridRouteJob, ObstacleGrid};

/// Suspend threshold for the route search: half the standard pass budget
/// per resumption keeps the queue responsive to later arrivals.
const ROUTE_SUSPEND_THRESHOLD: f64 = 0.5;

/// Application entry point for the scheduler host.
///
/// # Errors
///
/// Returns an error if configuration parsing, queue construction, or
/// workload enqueueing fails.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("cadence-engine starting");

    // 2. Load configuration.
    let config = load_config()?;
    info!(
        tick_interval_ms = config.engine.tick_interval_ms,
        max_ticks = config.engine.max_ticks,
        standard_budget_us = config.queues.standard_budget_us,
        background_budget_us = config.queues.background_budget_us,
        "Configuration loaded"
    );

    // 3. Create the shared clock.
    let clock: SharedTimeSource = Rc::new(MonotonicClock::new());

    // 4. Create the queues.
    let mut standard = JobQueue::new(config.queues.standard_budget(), Rc::clone(&clock))?;
    let mut background = JobQueue::new(config.queues.background_budget(), Rc::clone(&clock))?;
    info!(
        standard_budget = ?standard.pass_budget(),
        background_budget = ?background.pass_budget(),
        "Queues created"
    );

    // 5. Generate and enqueue the demo workloads.
    let grid = ObstacleGrid::generate(&config.workload);
    let goal = (
        grid.width().saturating_sub(1),
        grid.height().saturating_sub(1),
    );
    let route_job = Job::new(
        GridRouteJob::new(grid, (0, 0), goal),
        ROUTE_SUSPEND_THRESHOLD,
    )?;
    let route = standard.enqueue(route_job)?;

    let (ops, mut chunk_producers) = workload::chunk_band(config.workload.chunk_count);
    let chunks = background.enqueue(Job::new(ChunkStreamJob::new(ops), 1.0)?)?;
    info!(
        goal = ?goal,
        chunk_count = config.workload.chunk_count,
        "Workloads enqueued"
    );

    // 6. Run the tick loop.
    let interval = Duration::from_millis(config.engine.tick_interval_ms);
    let mut rng = StdRng::seed_from_u64(config.workload.seed);
    let mut tick: u64 = 0;

    loop {
        tick = tick.saturating_add(1);

        // The simulated external producer finishes one chunk per tick.
        if let Some((origin, completer)) = chunk_producers.pop_front() {
            let payload = ChunkPayload {
                origin,
                tiles: rng.random_range(64..=256),
            };
            completer.complete(payload);
            debug!(tick, origin, tiles = payload.tiles, "chunk generated");
        }

        let standard_pass = standard.process();
        let background_pass = background.process();
        debug!(
            tick,
            standard_resumed = standard_pass.resumed,
            standard_consumed = ?standard_pass.consumed,
            background_resumed = background_pass.resumed,
            background_blocked = background_pass.blocked_on_wait,
            "Tick serviced"
        );

        if route.is_finished() && chunks.is_finished() {
            info!(tick, "All workloads finished");
            break;
        }
        if config.engine.max_ticks > 0 && tick >= config.engine.max_ticks {
            warn!(
                tick,
                route_status = ?route.status(),
                chunks_status = ?chunks.status(),
                "Tick limit reached before workloads finished"
            );
            break;
        }

        if !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
    }

    // 7. Log the results.
    match route.take_result() {
        Some(Some(found)) => info!(
            route_cells = found.len(),
            elapsed = ?route.elapsed(),
            "Route search finished"
        ),
        Some(None) => info!(elapsed = ?route.elapsed(), "Route search finished: goal unreachable"),
        None => warn!(status = ?route.status(), fault = ?route.fault(), "Route search produced no result"),
    }
    match chunks.take_result() {
        Some(report) => info!(
            chunks = report.chunks,
            tiles = report.tiles,
            elapsed = ?chunks.elapsed(),
            "Chunk streaming finished"
        ),
        None => warn!(status = ?chunks.status(), fault = ?chunks.fault(), "Chunk streaming produced no result"),
    }

    Ok(())
}

/// Load configuration from `cadence-config.yaml` in the working directory.
///
/// A missing file is not an error: the host falls back to defaults so the
/// binary runs out of the box. A present but malformed file is propagated.
fn load_config() -> Result<SchedulerConfig, EngineError> {
    let path = Path::new("cadence-config.yaml");
    if path.exists() {
        Ok(SchedulerConfig::from_file(path)?)
    } else {
        info!("no cadence-config.yaml found, using defaults");
        Ok(SchedulerConfig::default())
    }
}
