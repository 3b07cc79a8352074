//! Pending results from outside the scheduler.
//!
//! A job sometimes depends on a value another subsystem produces on its own
//! schedule -- a generated map chunk, a loaded asset, a reply from a
//! different simulation system. [`ExternalOp`] is the minimal abstraction
//! for that dependency: the job side can check whether the operation has
//! settled and claim its value once; the producer side holds a [`Completer`]
//! and either completes the operation with a value or cancels it.
//!
//! Settling an operation only flags readiness. The waiting job's state
//! transition happens on the scheduler's next pass, on the scheduler's own
//! logical thread. All types here are reference-counted with [`Rc`] and are
//! therefore not [`Send`]: a completer cannot leave the scheduler's thread,
//! which makes the funneling rule a compile-time guarantee rather than a
//! convention.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// How a settled operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    /// A value was produced and is (or was) available to claim.
    Completed,
    /// The producer cancelled the operation; no value will ever arrive.
    Cancelled,
}

/// Shared state between an [`ExternalOp`] and its [`Completer`].
#[derive(Debug)]
struct OpShared<V> {
    /// The produced value, present from completion until it is claimed.
    value: RefCell<Option<V>>,
    /// How the operation settled, if it has.
    settled: Cell<Option<Settled>>,
}

/// Outcome of claiming a settled operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpOutcome<V> {
    /// The operation completed; the claimed value.
    Completed(V),
    /// The operation was cancelled, or its value was already claimed.
    Cancelled,
}

/// Job-side handle to a pending external result.
///
/// Created together with its [`Completer`] by [`ExternalOp::channel`], or
/// already settled by [`ExternalOp::completed`] for operations that finish
/// synchronously before any job awaits them.
#[derive(Debug)]
pub struct ExternalOp<V> {
    /// State shared with the completer.
    shared: Rc<OpShared<V>>,
}

impl<V> ExternalOp<V> {
    /// Create a pending operation and the completer that settles it.
    pub fn channel() -> (Self, Completer<V>) {
        let shared = Rc::new(OpShared {
            value: RefCell::new(None),
            settled: Cell::new(None),
        });
        (
            Self {
                shared: Rc::clone(&shared),
            },
            Completer { shared },
        )
    }

    /// Create an operation that already completed with `value`.
    ///
    /// Awaiting it returns the value immediately, without the job ever
    /// entering the waiting state.
    pub fn completed(value: V) -> Self {
        Self {
            shared: Rc::new(OpShared {
                value: RefCell::new(Some(value)),
                settled: Cell::new(Some(Settled::Completed)),
            }),
        }
    }

    /// Whether the operation has settled (completed or cancelled).
    pub fn is_settled(&self) -> bool {
        self.shared.settled.get().is_some()
    }

    /// Claim the settled outcome, taking the value out.
    ///
    /// Returns `None` while the operation is still pending. A completed
    /// value can be claimed exactly once; claiming again yields
    /// [`OpOutcome::Cancelled`] because the value is gone.
    pub fn claim(&self) -> Option<OpOutcome<V>> {
        match self.shared.settled.get()? {
            Settled::Cancelled => Some(OpOutcome::Cancelled),
            Settled::Completed => Some(
                self.shared
                    .value
                    .borrow_mut()
                    .take()
                    .map_or(OpOutcome::Cancelled, OpOutcome::Completed),
            ),
        }
    }

    /// A type-erased readiness probe for this operation.
    ///
    /// The scheduler holds the probe while the job is waiting, so it can
    /// test readiness without knowing the value type.
    pub fn wait_point(&self) -> WaitPoint
    where
        V: 'static,
    {
        WaitPoint {
            probe: Rc::new(ProbeFor {
                shared: Rc::clone(&self.shared),
            }),
        }
    }
}

/// Producer-side handle that settles an [`ExternalOp`].
///
/// Consuming by design: an operation settles exactly once.
#[derive(Debug)]
pub struct Completer<V> {
    /// State shared with the job-side handle.
    shared: Rc<OpShared<V>>,
}

impl<V> Completer<V> {
    /// Complete the operation with `value` and flag readiness.
    pub fn complete(self, value: V) {
        *self.shared.value.borrow_mut() = Some(value);
        self.shared.settled.set(Some(Settled::Completed));
    }

    /// Cancel the operation; any waiting job finishes without a result.
    pub fn cancel(self) {
        self.shared.settled.set(Some(Settled::Cancelled));
    }
}

/// Readiness test the scheduler can hold without the value type.
trait SettleProbe {
    /// Whether the underlying operation has settled.
    fn is_settled(&self) -> bool;
}

/// [`SettleProbe`] for a concrete value type.
struct ProbeFor<V> {
    /// The probed operation's shared state.
    shared: Rc<OpShared<V>>,
}

impl<V> SettleProbe for ProbeFor<V> {
    fn is_settled(&self) -> bool {
        self.shared.settled.get().is_some()
    }
}

/// Type-erased handle to a specific await point.
///
/// Held by a waiting job's scheduler-side state so the queue can decide
/// whether resuming the job can make progress.
#[derive(Clone)]
pub struct WaitPoint {
    /// The type-erased readiness probe.
    probe: Rc<dyn SettleProbe>,
}

impl WaitPoint {
    /// Whether the awaited operation has settled.
    pub fn is_settled(&self) -> bool {
        self.probe.is_settled()
    }
}

impl std::fmt::Debug for WaitPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitPoint")
            .field("settled", &self.is_settled())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn pending_until_completed() {
        let (op, completer) = ExternalOp::channel();
        assert!(!op.is_settled());
        assert!(op.claim().is_none());

        completer.complete(7_u32);
        assert!(op.is_settled());
        assert_eq!(op.claim(), Some(OpOutcome::Completed(7)));
    }

    #[test]
    fn cancelled_operation_settles_without_a_value() {
        let (op, completer) = ExternalOp::<u32>::channel();
        completer.cancel();
        assert!(op.is_settled());
        assert_eq!(op.claim(), Some(OpOutcome::Cancelled));
    }

    #[test]
    fn already_completed_operation_is_immediately_claimable() {
        let op = ExternalOp::completed("ready");
        assert!(op.is_settled());
        assert_eq!(op.claim(), Some(OpOutcome::Completed("ready")));
    }

    #[test]
    fn value_is_claimed_at_most_once() {
        let op = ExternalOp::completed(3_u64);
        assert_eq!(op.claim(), Some(OpOutcome::Completed(3)));
        assert_eq!(op.claim(), Some(OpOutcome::Cancelled));
    }

    #[test]
    fn wait_point_tracks_settlement() {
        let (op, completer) = ExternalOp::<()>::channel();
        let point = op.wait_point();
        assert!(!point.is_settled());
        completer.complete(());
        assert!(point.is_settled());
    }
}
