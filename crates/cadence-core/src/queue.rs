//! FIFO job queue with a per-pass time budget.
//!
//! A [`JobQueue`] is the tick-integration point of the scheduler: the host
//! loop calls [`process`](JobQueue::process) exactly once per tick, and the
//! call returns control unconditionally once the queue drains, the pass
//! budget is consumed, or the head job is blocked on an external operation.
//! Jobs are serviced strictly in enqueue order, within a pass and across
//! passes; there is no priority reordering.
//!
//! # Waiting-head policy
//!
//! When the job at the head is waiting on an operation that has not
//! settled, the pass ends. The queue never skips past a waiting head:
//! strict FIFO ordering is chosen over throughput, and the policy is
//! enforced by tests. Jobs behind a waiting head are serviced again once
//! the head settles (or is cancelled).
//!
//! # Failure isolation
//!
//! A body fault finishes that job with a captured [`JobFault`] and never
//! escapes `process`; sibling jobs in the same pass are unaffected.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use tracing::trace;

use crate::job::{Job, JobFault, JobStatus};
use crate::time::{SharedTimeSource, TimeSource};

/// Pass budget for latency-sensitive work (2 ms).
pub const STANDARD_PASS_BUDGET: Duration = Duration::from_micros(2_000);

/// Pass budget for bulk background work (4 ms).
pub const BACKGROUND_PASS_BUDGET: Duration = Duration::from_micros(4_000);

/// Errors that can occur when using a queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// A job that already left its initial state was enqueued.
    #[error("cannot enqueue a job that already started (status: {status:?})")]
    AlreadyStarted {
        /// The offending job's status at enqueue time.
        status: JobStatus,
    },

    /// The pass budget is zero.
    #[error("pass budget must be above zero")]
    ZeroBudget,
}

/// Object-safe view of a job, as stored by the queue.
trait QueuedJob {
    /// Current lifecycle state.
    fn status(&self) -> JobStatus;

    /// Continue the job from its current suspension point.
    fn resume(&mut self, pass_budget: Duration, fallback_time: &dyn TimeSource);
}

impl<T> QueuedJob for Job<T> {
    fn status(&self) -> JobStatus {
        Job::status(self)
    }

    fn resume(&mut self, pass_budget: Duration, fallback_time: &dyn TimeSource) {
        Job::resume(self, pass_budget, fallback_time);
    }
}

/// Caller-side handle to an enqueued job.
///
/// The queue owns the job's scheduling; the handle is how the enqueuing
/// subsystem polls status, reads back the result or fault, and requests
/// cooperative cancellation. Clones observe the same job.
#[derive(Debug)]
pub struct JobHandle<T> {
    /// The shared job slot.
    job: Rc<RefCell<Job<T>>>,
}

impl<T> Clone for JobHandle<T> {
    fn clone(&self) -> Self {
        Self {
            job: Rc::clone(&self.job),
        }
    }
}

impl<T> JobHandle<T> {
    /// Current lifecycle state.
    pub fn status(&self) -> JobStatus {
        self.job.borrow().status()
    }

    /// Whether the job reached its terminal state.
    pub fn is_finished(&self) -> bool {
        self.status() == JobStatus::Finished
    }

    /// Logical time the job has consumed across all resumptions.
    pub fn elapsed(&self) -> Duration {
        self.job.borrow().elapsed()
    }

    /// Take the output, if the job completed normally.
    pub fn take_result(&self) -> Option<T> {
        self.job.borrow_mut().take_result()
    }

    /// The captured body error, if the job faulted.
    pub fn fault(&self) -> Option<JobFault> {
        self.job.borrow().fault().cloned()
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.job.borrow().cancel();
    }
}

/// What one [`JobQueue::process`] pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Number of resumptions granted during the pass.
    pub resumed: u32,
    /// Jobs that reached their terminal state and were removed.
    pub finished: u32,
    /// Time consumed by the pass, by the queue's own source.
    pub consumed: Duration,
    /// Whether the pass ended because the head job was waiting.
    pub blocked_on_wait: bool,
}

/// An ordered container of pending jobs and a per-pass time budget.
pub struct JobQueue {
    /// Jobs in strict enqueue order. The head is serviced first.
    pending: VecDeque<Rc<RefCell<dyn QueuedJob>>>,
    /// Maximum time one pass may consume.
    pass_budget: Duration,
    /// Source measuring pass consumption (and jobs without their own).
    time: SharedTimeSource,
}

impl JobQueue {
    /// Create a queue with an arbitrary pass budget.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::ZeroBudget`] if `pass_budget` is zero.
    pub fn new(pass_budget: Duration, time: SharedTimeSource) -> Result<Self, QueueError> {
        if pass_budget.is_zero() {
            return Err(QueueError::ZeroBudget);
        }
        Ok(Self {
            pending: VecDeque::new(),
            pass_budget,
            time,
        })
    }

    /// Create a queue with the [`STANDARD_PASS_BUDGET`].
    ///
    /// The budget class for latency-sensitive work serviced every tick.
    pub fn standard(time: SharedTimeSource) -> Self {
        Self {
            pending: VecDeque::new(),
            pass_budget: STANDARD_PASS_BUDGET,
            time,
        }
    }

    /// Create a queue with the [`BACKGROUND_PASS_BUDGET`].
    ///
    /// The budget class for bulk work that tolerates a longer pass.
    pub fn background(time: SharedTimeSource) -> Self {
        Self {
            pending: VecDeque::new(),
            pass_budget: BACKGROUND_PASS_BUDGET,
            time,
        }
    }

    /// The per-pass time budget.
    pub const fn pass_budget(&self) -> Duration {
        self.pass_budget
    }

    /// Number of jobs currently queued (any non-terminal state).
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no jobs are queued.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Append a freshly constructed job and return its polling handle.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::AlreadyStarted`] if the job is not in
    /// [`JobStatus::Pending`]; enqueuing a job that already ran elsewhere
    /// would corrupt its slice accounting.
    pub fn enqueue<T: 'static>(&mut self, job: Job<T>) -> Result<JobHandle<T>, QueueError> {
        let status = job.status();
        if status != JobStatus::Pending {
            return Err(QueueError::AlreadyStarted { status });
        }
        let slot = Rc::new(RefCell::new(job));
        let erased: Rc<RefCell<dyn QueuedJob>> = slot.clone();
        self.pending.push_back(erased);
        Ok(JobHandle { job: slot })
    }

    /// Run one scheduling pass. The sole tick-integration entry point.
    ///
    /// Services jobs from the head of the queue, granting each resumption
    /// the full pass budget as its slice basis, until one of:
    ///
    /// - the queue is empty,
    /// - the time consumed since pass entry reaches the budget,
    /// - the head job is waiting on an unsettled external operation
    ///   (see the module-level waiting-head policy).
    ///
    /// Finished jobs (completed, faulted, or cancelled) are removed as they
    /// are encountered. Never blocks on external operations; safe to call
    /// on an empty queue any number of times.
    pub fn process(&mut self) -> PassSummary {
        let entry = self.time.elapsed();
        let mut summary = PassSummary::default();

        while let Some(slot) = self.pending.front() {
            let consumed = self.time.elapsed().saturating_sub(entry);
            if consumed >= self.pass_budget {
                break;
            }

            let mut job = slot.borrow_mut();
            if job.status() == JobStatus::Finished {
                drop(job);
                self.pending.pop_front();
                continue;
            }

            let was_waiting = job.status() == JobStatus::Waiting;
            job.resume(self.pass_budget, self.time.as_ref());
            let status = job.status();
            drop(job);

            match status {
                JobStatus::Finished => {
                    summary.resumed = summary.resumed.saturating_add(1);
                    summary.finished = summary.finished.saturating_add(1);
                    self.pending.pop_front();
                }
                JobStatus::Waiting => {
                    // Head blocked: the pass ends, order is preserved. A
                    // resume that merely re-observed an unsettled wait is
                    // not counted as a resumption.
                    if !was_waiting {
                        summary.resumed = summary.resumed.saturating_add(1);
                    }
                    summary.blocked_on_wait = true;
                    break;
                }
                _ => {
                    summary.resumed = summary.resumed.saturating_add(1);
                }
            }
        }

        summary.consumed = self.time.elapsed().saturating_sub(entry);
        trace!(
            resumed = summary.resumed,
            finished = summary.finished,
            consumed = ?summary.consumed,
            blocked_on_wait = summary.blocked_on_wait,
            remaining = self.pending.len(),
            "pass complete"
        );
        summary
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("pending", &self.pending.len())
            .field("pass_budget", &self.pass_budget)
            .finish_non_exhaustive()
    }
}
