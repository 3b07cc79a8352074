//! Resumable cooperative jobs.
//!
//! A [`Job`] is a single unit of logically long-running work that executes
//! in bounded slices across many scheduler passes. The job body is a
//! hand-written state machine implementing [`JobBody`]: all locals that must
//! survive a suspension live in the body struct, and the body weaves
//! [`RunContext::checkpoint`] calls between units of its algorithm. A
//! checkpoint observes the cooperative cancel signal and the time consumed
//! in the current resumption; crossing the configured slice allowance
//! suspends the body with no loss of progress.
//!
//! # State machine
//!
//! ```text
//! Pending -> Running -> Paused  -> Running -> ...
//!                    -> Waiting -> Running -> ...
//!                    -> Finished            (terminal)
//! ```
//!
//! `Finished` covers normal completion (with a result), a captured body
//! fault, and cooperative cancellation (neither result nor fault).
//!
//! # Suspension as `Result`
//!
//! Bodies return [`Step`], which is `Result<T, Suspend>`. The suspension
//! primitives return `Err` variants, so a body suspends with `?`:
//!
//! ```text
//! while self.done < self.total {
//!     self.step_once();
//!     self.done = self.done.saturating_add(1);
//!     cx.checkpoint()?;
//! }
//! Ok(output)
//! ```
//!
//! Any error type can also be raised with `?`; it is captured as a
//! [`JobFault`] and terminates the job without touching its siblings.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tracing::{trace, warn};

use crate::external::{ExternalOp, OpOutcome, WaitPoint};
use crate::time::{SharedTimeSource, TimeSource};

/// Errors that can occur when constructing a job.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The suspend threshold is not a finite value above zero.
    #[error("suspend threshold must be finite and above zero, got {value}")]
    InvalidThreshold {
        /// The rejected threshold value.
        value: f64,
    },
}

/// Lifecycle state of a [`Job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Constructed but never resumed.
    Pending,
    /// Currently executing inside a resumption.
    Running,
    /// Suspended at a checkpoint because its slice was exhausted.
    Paused,
    /// Suspended awaiting an external operation.
    Waiting,
    /// Terminal: completed, faulted, or cancelled. Never changes again.
    Finished,
}

/// Cooperative cancellation signal shared between a caller and a job.
///
/// Setting the signal never interrupts a body mid-computation; the job
/// observes it at its next checkpoint (a resume entry counts as one) and
/// finishes without producing a result. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    /// The shared flag. Single-threaded by contract, hence [`Cell`].
    flag: Rc<Cell<bool>>,
}

impl CancelSignal {
    /// Create a signal in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Irrevocable.
    pub fn cancel(&self) {
        self.flag.set(true);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.get()
    }
}

/// An error captured from a job body that terminated abnormally.
///
/// Faults are terminal and strictly per-job: they are surfaced through
/// [`Job::fault`] and never propagate into the scheduler pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("job body failed: {message}")]
pub struct JobFault {
    /// Description of the failure.
    message: String,
}

impl JobFault {
    /// Create a fault from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure description.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Why a body stopped before producing its output.
#[derive(Debug)]
pub enum Suspend {
    /// The current slice is exhausted; resume later from the same point.
    Yield,
    /// Blocked on an external operation that has not settled.
    Wait(WaitPoint),
    /// The cooperative cancel signal was observed; finish with no result.
    Cancelled,
    /// The body failed; finish with the captured fault and no result.
    Fault(JobFault),
}

impl Suspend {
    /// Construct a fault suspension from a message.
    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault(JobFault::new(message))
    }
}

impl<E: std::error::Error> From<E> for Suspend {
    fn from(err: E) -> Self {
        Self::Fault(JobFault::new(err.to_string()))
    }
}

/// Outcome of one resumption of a job body.
pub type Step<T> = Result<T, Suspend>;

/// Execution context handed to a body for the duration of one resumption.
///
/// Exposes the two suspension primitives: [`checkpoint`](Self::checkpoint)
/// and [`wait_for`](Self::wait_for). These are the only places where control
/// can return to the scheduler before the body finishes.
pub struct RunContext<'a> {
    /// Time source measuring this resumption.
    time: &'a dyn TimeSource,
    /// Reading taken when the resumption started.
    resumed_at: Duration,
    /// Slice allowance: `suspend_threshold x pass budget`.
    allowance: Duration,
    /// The job's cooperative cancel signal.
    cancel: &'a CancelSignal,
}

impl RunContext<'_> {
    /// Time consumed so far in the current resumption.
    pub fn slice(&self) -> Duration {
        self.time.elapsed().saturating_sub(self.resumed_at)
    }

    /// Cooperative suspension point.
    ///
    /// Call at safe boundaries of the algorithm (between loop units). If
    /// cancellation was requested, suspends with [`Suspend::Cancelled`]; if
    /// the current slice exceeds the allowance, suspends with
    /// [`Suspend::Yield`]; otherwise returns and the body continues.
    pub fn checkpoint(&self) -> Result<(), Suspend> {
        if self.cancel.is_cancelled() {
            return Err(Suspend::Cancelled);
        }
        if self.slice() > self.allowance {
            return Err(Suspend::Yield);
        }
        Ok(())
    }

    /// Await an external operation.
    ///
    /// If `op` already settled, the claimed value (or cancellation) is
    /// returned synchronously and the job never enters the waiting state.
    /// Otherwise suspends with [`Suspend::Wait`]; on a later resumption the
    /// body re-executes up to this call and claims the value then.
    pub fn wait_for<V: 'static>(&self, op: &ExternalOp<V>) -> Result<V, Suspend> {
        if self.cancel.is_cancelled() {
            return Err(Suspend::Cancelled);
        }
        match op.claim() {
            Some(OpOutcome::Completed(value)) => Ok(value),
            Some(OpOutcome::Cancelled) => Err(Suspend::Cancelled),
            None => Err(Suspend::Wait(op.wait_point())),
        }
    }
}

/// A resumable body: the algorithm a job runs in slices.
///
/// Implementations keep every local that must survive a suspension in
/// `self`; `run` is re-entered from the top on each resumption and uses the
/// saved state to continue where it left off. Closures of the matching
/// signature implement this trait, which covers immediate jobs that finish
/// in a single resumption.
pub trait JobBody {
    /// The value produced when the body completes normally.
    type Output;

    /// Execute until completion or the next suspension point.
    fn run(&mut self, cx: &mut RunContext<'_>) -> Step<Self::Output>;
}

impl<T, F> JobBody for F
where
    F: FnMut(&mut RunContext<'_>) -> Step<T>,
{
    type Output = T;

    fn run(&mut self, cx: &mut RunContext<'_>) -> Step<T> {
        self(cx)
    }
}

/// A single unit of cooperative work with its own state machine.
///
/// Constructed in [`JobStatus::Pending`], driven by [`resume`](Self::resume)
/// (normally via a queue), observed through [`status`](Self::status),
/// [`result`](Self::result), [`fault`](Self::fault) and
/// [`elapsed`](Self::elapsed).
pub struct Job<T> {
    /// Current lifecycle state.
    status: JobStatus,
    /// The output, present only after normal completion.
    result: Option<T>,
    /// The captured body error, present only after a faulted completion.
    fault: Option<JobFault>,
    /// Logical time consumed inside resumptions since the job first ran.
    elapsed: Duration,
    /// Fraction of the pass budget after which a checkpoint must yield.
    suspend_threshold: f64,
    /// Cooperative cancel signal.
    cancel: CancelSignal,
    /// Dedicated time source; falls back to the queue's when absent.
    time: Option<SharedTimeSource>,
    /// Await point recorded while the job is waiting.
    wait: Option<WaitPoint>,
    /// The resumable body.
    body: Box<dyn JobBody<Output = T>>,
}

impl<T> Job<T> {
    /// Create a pending job from a body and a suspend threshold.
    ///
    /// The threshold is the fraction of the queue's pass budget a single
    /// resumption may consume before a checkpoint yields. Values of 1.0 or
    /// above mean the job only ever yields at external waits or completion.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::InvalidThreshold`] if `suspend_threshold` is not
    /// finite or not above zero.
    pub fn new(
        body: impl JobBody<Output = T> + 'static,
        suspend_threshold: f64,
    ) -> Result<Self, JobError> {
        if !suspend_threshold.is_finite() || suspend_threshold <= 0.0 {
            return Err(JobError::InvalidThreshold {
                value: suspend_threshold,
            });
        }
        Ok(Self {
            status: JobStatus::Pending,
            result: None,
            fault: None,
            elapsed: Duration::ZERO,
            suspend_threshold,
            cancel: CancelSignal::new(),
            time: None,
            wait: None,
            body: Box::new(body),
        })
    }

    /// Share an externally owned cancel signal instead of the job's own.
    #[must_use]
    pub fn with_cancel_signal(mut self, signal: CancelSignal) -> Self {
        self.cancel = signal;
        self
    }

    /// Measure this job against a dedicated time source instead of the
    /// queue's.
    #[must_use]
    pub fn with_time_source(mut self, time: SharedTimeSource) -> Self {
        self.time = Some(time);
        self
    }

    /// Current lifecycle state.
    pub const fn status(&self) -> JobStatus {
        self.status
    }

    /// Logical time consumed across all resumptions so far.
    ///
    /// Only increases, and only while the job is executing inside a
    /// resumption; it is stable while paused, waiting, or finished.
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// The configured suspend threshold.
    pub const fn suspend_threshold(&self) -> f64 {
        self.suspend_threshold
    }

    /// The output, if the job completed normally.
    pub const fn result(&self) -> Option<&T> {
        self.result.as_ref()
    }

    /// Take the output, if the job completed normally.
    pub fn take_result(&mut self) -> Option<T> {
        self.result.take()
    }

    /// The captured body error, if the job faulted.
    pub const fn fault(&self) -> Option<&JobFault> {
        self.fault.as_ref()
    }

    /// Request cooperative cancellation.
    ///
    /// Honored at the job's next checkpoint or resume entry, never
    /// preemptively. A body that reaches no further checkpoint may still
    /// finish normally.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Continue the job from its current suspension point.
    ///
    /// `pass_budget` is the budget of the pass granting this resumption;
    /// the slice allowance is `suspend_threshold x pass_budget`.
    /// `fallback_time` measures the resumption unless the job carries a
    /// dedicated source.
    ///
    /// A resume entry is a checkpoint: pending cancellation finishes the
    /// job here without running the body (this also releases a cancelled
    /// waiting job). Resuming a finished job, or a waiting job whose
    /// operation has not settled, is a no-op.
    pub fn resume(&mut self, pass_budget: Duration, fallback_time: &dyn TimeSource) {
        if matches!(self.status, JobStatus::Finished) {
            return;
        }
        if self.cancel.is_cancelled() {
            self.wait = None;
            self.status = JobStatus::Finished;
            trace!("job cancelled at resume entry");
            return;
        }
        if matches!(self.status, JobStatus::Waiting) {
            let settled = self.wait.as_ref().is_some_and(WaitPoint::is_settled);
            if !settled {
                return;
            }
            self.wait = None;
        }

        let time: &dyn TimeSource = match self.time.as_deref() {
            Some(own) => own,
            None => fallback_time,
        };
        let resumed_at = time.elapsed();
        let mut cx = RunContext {
            time,
            resumed_at,
            allowance: slice_allowance(pass_budget, self.suspend_threshold),
            cancel: &self.cancel,
        };

        self.status = JobStatus::Running;
        let step = self.body.run(&mut cx);

        let consumed = time.elapsed().saturating_sub(resumed_at);
        self.elapsed = self.elapsed.saturating_add(consumed);

        match step {
            Ok(value) => {
                self.result = Some(value);
                self.status = JobStatus::Finished;
            }
            Err(Suspend::Yield) => {
                self.status = JobStatus::Paused;
            }
            Err(Suspend::Wait(point)) => {
                self.wait = Some(point);
                self.status = JobStatus::Waiting;
            }
            Err(Suspend::Cancelled) => {
                self.status = JobStatus::Finished;
            }
            Err(Suspend::Fault(fault)) => {
                warn!(%fault, "job body faulted");
                self.fault = Some(fault);
                self.status = JobStatus::Finished;
            }
        }
        trace!(status = ?self.status, consumed = ?consumed, "resumption ended");
    }
}

impl<T> std::fmt::Debug for Job<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("status", &self.status)
            .field("elapsed", &self.elapsed)
            .field("suspend_threshold", &self.suspend_threshold)
            .field("has_result", &self.result.is_some())
            .field("fault", &self.fault)
            .finish_non_exhaustive()
    }
}

/// Compute the slice allowance for one resumption.
///
/// Saturates to [`Duration::MAX`] when the product overflows, which makes
/// oversized thresholds mean "never proactively pause".
fn slice_allowance(pass_budget: Duration, threshold: f64) -> Duration {
    Duration::try_from_secs_f64(pass_budget.as_secs_f64() * threshold)
        .unwrap_or(Duration::MAX)
}
