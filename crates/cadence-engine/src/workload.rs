//! Demo workloads exercising the scheduler's integration contract.
//!
//! Two representative consumers, modelled on the kinds of work a tick-driven
//! host actually defers to a cooperative scheduler:
//!
//! - [`GridRouteJob`] -- an incremental breadth-first route search over a
//!   procedurally generated obstacle grid, checkpointing every few node
//!   expansions so a large search spreads across many ticks.
//! - [`ChunkStreamJob`] -- assembles a band of terrain chunks whose payloads
//!   are produced by an external generator, awaiting each chunk and
//!   checkpointing between them.
//!
//! Both bodies are hand-written state machines: everything that must survive
//! a suspension lives in the struct, and `run` continues from the saved
//! state on each resumption.

use std::collections::{BTreeMap, VecDeque};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use cadence_core::config::WorkloadConfig;
use cadence_core::external::{Completer, ExternalOp};
use cadence_core::job::{JobBody, RunContext, Step};

/// Node expansions between route-search checkpoints.
const EXPANSIONS_PER_CHECKPOINT: u64 = 8;

/// A cell coordinate on the obstacle grid: `(x, y)`.
pub type GridCell = (u32, u32);

/// A rectangular grid of open and blocked cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObstacleGrid {
    /// Grid width in cells.
    width: u32,
    /// Grid height in cells.
    height: u32,
    /// Row-major blocked flags, `width x height` entries.
    blocked: Vec<bool>,
}

impl ObstacleGrid {
    /// Generate a reproducible grid from the workload configuration.
    ///
    /// Obstacles are sampled per cell at the configured density (clamped to
    /// 0.9 so a route can plausibly exist); the top-left and bottom-right
    /// corners are always kept open.
    pub fn generate(config: &WorkloadConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let width = config.grid_width.max(2);
        let height = config.grid_height.max(2);
        let density = config.obstacle_density.clamp(0.0, 0.9);

        let cells = usize::try_from(width)
            .unwrap_or(2)
            .saturating_mul(usize::try_from(height).unwrap_or(2));
        let blocked = (0..cells).map(|_| rng.random_bool(density)).collect();

        let mut grid = Self {
            width,
            height,
            blocked,
        };
        grid.set_open((0, 0));
        grid.set_open((width.saturating_sub(1), height.saturating_sub(1)));
        grid
    }

    /// Create a fully open grid.
    pub fn empty(width: u32, height: u32) -> Self {
        let cells = usize::try_from(width.max(1))
            .unwrap_or(1)
            .saturating_mul(usize::try_from(height.max(1)).unwrap_or(1));
        Self {
            width: width.max(1),
            height: height.max(1),
            blocked: vec![false; cells],
        }
    }

    /// Mark a cell as blocked. Out-of-bounds cells are ignored.
    pub fn block(&mut self, cell: GridCell) {
        if let Some(index) = self.index(cell) {
            if let Some(slot) = self.blocked.get_mut(index) {
                *slot = true;
            }
        }
    }

    /// Mark a cell as open. Out-of-bounds cells are ignored.
    fn set_open(&mut self, cell: GridCell) {
        if let Some(index) = self.index(cell) {
            if let Some(slot) = self.blocked.get_mut(index) {
                *slot = false;
            }
        }
    }

    /// Whether a cell is inside the grid and not blocked.
    pub fn is_open(&self, cell: GridCell) -> bool {
        self.index(cell)
            .and_then(|index| self.blocked.get(index))
            .is_some_and(|b| !*b)
    }

    /// Grid width in cells.
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in cells.
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Row-major index of a cell, `None` when out of bounds.
    fn index(&self, (x, y): GridCell) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let row = usize::try_from(y).ok()?;
        let col = usize::try_from(x).ok()?;
        row.checked_mul(usize::try_from(self.width).ok()?)?
            .checked_add(col)
    }

    /// The four orthogonal neighbors of a cell, unchecked for openness.
    fn neighbors((x, y): GridCell) -> [Option<GridCell>; 4] {
        [
            x.checked_sub(1).map(|nx| (nx, y)),
            y.checked_sub(1).map(|ny| (x, ny)),
            x.checked_add(1).map(|nx| (nx, y)),
            y.checked_add(1).map(|ny| (x, ny)),
        ]
    }
}

/// Incremental breadth-first route search between two grid cells.
///
/// Produces the route from start to goal inclusive, or `None` when the goal
/// is unreachable. The open frontier and the predecessor map persist across
/// suspensions; a checkpoint runs after every [`EXPANSIONS_PER_CHECKPOINT`]
/// fully expanded nodes so each resumption stops at a consistent boundary.
pub struct GridRouteJob {
    /// The searched grid.
    grid: ObstacleGrid,
    /// Search origin.
    start: GridCell,
    /// Search target.
    goal: GridCell,
    /// Discovered but not yet expanded cells, in discovery order.
    frontier: VecDeque<GridCell>,
    /// Predecessor of each discovered cell (the start maps to itself).
    came_from: BTreeMap<GridCell, GridCell>,
    /// Whether the search has been seeded with the start cell.
    seeded: bool,
    /// Fully expanded nodes, for checkpoint cadence.
    expansions: u64,
}

impl GridRouteJob {
    /// Create a search over `grid` from `start` to `goal`.
    pub fn new(grid: ObstacleGrid, start: GridCell, goal: GridCell) -> Self {
        Self {
            grid,
            start,
            goal,
            frontier: VecDeque::new(),
            came_from: BTreeMap::new(),
            seeded: false,
            expansions: 0,
        }
    }

    /// Walk the predecessor map back from the goal.
    fn rebuild_route(&self) -> Vec<GridCell> {
        let mut route = vec![self.goal];
        let mut cursor = self.goal;
        while cursor != self.start {
            match self.came_from.get(&cursor) {
                Some(&previous) => {
                    route.push(previous);
                    cursor = previous;
                }
                None => break,
            }
        }
        route.reverse();
        route
    }
}

impl JobBody for GridRouteJob {
    type Output = Option<Vec<GridCell>>;

    fn run(&mut self, cx: &mut RunContext<'_>) -> Step<Self::Output> {
        if !self.seeded {
            self.seeded = true;
            if !self.grid.is_open(self.start) || !self.grid.is_open(self.goal) {
                return Ok(None);
            }
            self.frontier.push_back(self.start);
            self.came_from.insert(self.start, self.start);
        }

        while let Some(cell) = self.frontier.pop_front() {
            if cell == self.goal {
                return Ok(Some(self.rebuild_route()));
            }

            for neighbor in ObstacleGrid::neighbors(cell).into_iter().flatten() {
                if self.grid.is_open(neighbor) && !self.came_from.contains_key(&neighbor) {
                    self.came_from.insert(neighbor, cell);
                    self.frontier.push_back(neighbor);
                }
            }

            self.expansions = self.expansions.saturating_add(1);
            if self
                .expansions
                .checked_rem(EXPANSIONS_PER_CHECKPOINT)
                .unwrap_or(1)
                == 0
            {
                cx.checkpoint()?;
            }
        }

        Ok(None)
    }
}

/// A generated terrain chunk delivered by an external producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPayload {
    /// Chunk index along the streamed band.
    pub origin: u32,
    /// Number of tiles materialized in the chunk.
    pub tiles: u32,
}

/// Totals reported once every chunk has been streamed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkReport {
    /// Chunks received.
    pub chunks: u32,
    /// Tiles materialized across all chunks.
    pub tiles: u64,
}

/// Assembles a band of terrain chunks produced outside the scheduler.
///
/// Chunks are awaited strictly in band order; the job sits in the waiting
/// state whenever the next chunk is not ready yet and checkpoints between
/// chunks so a burst of ready payloads still respects the pass budget.
pub struct ChunkStreamJob {
    /// Pending chunk operations, in band order.
    ops: VecDeque<ExternalOp<ChunkPayload>>,
    /// Running totals, preserved across suspensions.
    report: ChunkReport,
}

impl ChunkStreamJob {
    /// Create a streaming job over the given chunk operations.
    pub fn new(ops: VecDeque<ExternalOp<ChunkPayload>>) -> Self {
        Self {
            ops,
            report: ChunkReport::default(),
        }
    }
}

impl JobBody for ChunkStreamJob {
    type Output = ChunkReport;

    fn run(&mut self, cx: &mut RunContext<'_>) -> Step<ChunkReport> {
        while let Some(op) = self.ops.front() {
            let payload = cx.wait_for(op)?;
            self.ops.pop_front();
            self.report.chunks = self.report.chunks.saturating_add(1);
            self.report.tiles = self.report.tiles.saturating_add(u64::from(payload.tiles));
            cx.checkpoint()?;
        }
        Ok(self.report)
    }
}

/// Create the operations for a band of `count` chunks.
///
/// Returns the job-side operations (in band order, for [`ChunkStreamJob`])
/// and the producer-side completers tagged with their chunk origin.
pub fn chunk_band(
    count: u32,
) -> (
    VecDeque<ExternalOp<ChunkPayload>>,
    VecDeque<(u32, Completer<ChunkPayload>)>,
) {
    let mut ops = VecDeque::new();
    let mut completers = VecDeque::new();
    for origin in 0..count {
        let (op, completer) = ExternalOp::channel();
        ops.push_back(op);
        completers.push_back((origin, completer));
    }
    (ops, completers)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use cadence_core::job::{Job, JobStatus};
    use cadence_core::time::ManualClock;

    use super::*;

    /// Generous pass budget; the manual clock never advances, so no
    /// checkpoint yields during these tests.
    const BUDGET: Duration = Duration::from_millis(900);

    #[test]
    fn grid_generation_is_reproducible() {
        let config = WorkloadConfig::default();
        let first = ObstacleGrid::generate(&config);
        let second = ObstacleGrid::generate(&config);
        assert_eq!(first, second);
    }

    #[test]
    fn generated_corners_are_always_open() {
        let config = WorkloadConfig {
            obstacle_density: 0.9,
            ..WorkloadConfig::default()
        };
        let grid = ObstacleGrid::generate(&config);
        assert!(grid.is_open((0, 0)));
        assert!(grid.is_open((grid.width() - 1, grid.height() - 1)));
    }

    #[test]
    fn route_search_finds_a_route_on_an_open_grid() {
        let clock = ManualClock::new();
        let grid = ObstacleGrid::empty(8, 8);
        let mut job = Job::new(GridRouteJob::new(grid, (0, 0), (7, 7)), 1.0).unwrap();

        job.resume(BUDGET, &clock);
        assert_eq!(job.status(), JobStatus::Finished);

        let route = job.take_result().unwrap().unwrap();
        assert_eq!(route.first(), Some(&(0, 0)));
        assert_eq!(route.last(), Some(&(7, 7)));
        // A breadth-first route on an open grid is a shortest route:
        // 14 orthogonal steps, 15 cells.
        assert_eq!(route.len(), 15);
        for pair in route.windows(2) {
            if let [(ax, ay), (bx, by)] = pair {
                let dx = ax.abs_diff(*bx);
                let dy = ay.abs_diff(*by);
                assert_eq!(dx.saturating_add(dy), 1, "route must be contiguous");
            }
        }
    }

    #[test]
    fn route_search_reports_unreachable_goals() {
        let clock = ManualClock::new();
        let mut grid = ObstacleGrid::empty(4, 4);
        // Wall off the goal corner completely.
        grid.block((2, 3));
        grid.block((3, 2));
        let mut job = Job::new(GridRouteJob::new(grid, (0, 0), (3, 3)), 1.0).unwrap();

        job.resume(BUDGET, &clock);
        assert_eq!(job.status(), JobStatus::Finished);
        assert_eq!(job.take_result(), Some(None));
    }

    #[test]
    fn route_search_refuses_blocked_endpoints() {
        let clock = ManualClock::new();
        let mut grid = ObstacleGrid::empty(4, 4);
        grid.block((0, 0));
        let mut job = Job::new(GridRouteJob::new(grid, (0, 0), (3, 3)), 1.0).unwrap();

        job.resume(BUDGET, &clock);
        assert_eq!(job.status(), JobStatus::Finished);
        assert_eq!(job.take_result(), Some(None));
    }

    #[test]
    fn chunk_stream_waits_for_each_chunk_in_order() {
        let clock = ManualClock::new();
        let (ops, mut completers) = chunk_band(2);
        let mut job = Job::new(ChunkStreamJob::new(ops), 1.0).unwrap();

        job.resume(BUDGET, &clock);
        assert_eq!(job.status(), JobStatus::Waiting);

        let (origin, completer) = completers.pop_front().unwrap();
        completer.complete(ChunkPayload { origin, tiles: 100 });
        job.resume(BUDGET, &clock);
        assert_eq!(job.status(), JobStatus::Waiting);

        let (origin, completer) = completers.pop_front().unwrap();
        completer.complete(ChunkPayload { origin, tiles: 150 });
        job.resume(BUDGET, &clock);
        assert_eq!(job.status(), JobStatus::Finished);

        let report = job.take_result().unwrap();
        assert_eq!(report.chunks, 2);
        assert_eq!(report.tiles, 250);
    }

    #[test]
    fn chunk_stream_with_all_chunks_ready_finishes_in_one_resumption() {
        let clock = ManualClock::new();
        let (ops, completers) = chunk_band(3);
        for (origin, completer) in completers {
            completer.complete(ChunkPayload { origin, tiles: 10 });
        }
        let mut job = Job::new(ChunkStreamJob::new(ops), 1.0).unwrap();

        job.resume(BUDGET, &clock);
        assert_eq!(job.status(), JobStatus::Finished);
        let report = job.take_result().unwrap();
        assert_eq!(report.chunks, 3);
        assert_eq!(report.tiles, 30);
    }
}
