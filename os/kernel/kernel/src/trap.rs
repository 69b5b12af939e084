use crate::SharedDispatcher;
use core::fmt;
use kernel_trap::{FaultEscalation, TrapFrame};

/// What the vector entry must do after a trap.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TrapOutcome {
    /// Return from the exception with the (possibly edited) frame.
    Resume,
    /// The fault could not be contained; park the CPU.
    Halt(FaultEscalation),
    /// The dispatcher lock was held: a fault inside the dispatcher itself.
    Recursive,
    /// A trap arrived before the dispatcher existed.
    NoDispatcher,
}

/// Hands a saved trap frame to the shared dispatcher.
///
/// Never spins: a lock that is already held means the fault was raised
/// while dispatching, and waiting for it would deadlock.
pub fn route_trap<S: fmt::Write>(
    cell: &SharedDispatcher<S>,
    frame: &mut TrapFrame,
    vector: u64,
) -> TrapOutcome {
    let Some(lock) = cell.get() else {
        return TrapOutcome::NoDispatcher;
    };
    let Some(mut dispatcher) = lock.try_lock() else {
        return TrapOutcome::Recursive;
    };
    match dispatcher.dispatch_trap(frame, vector) {
        Ok(()) => TrapOutcome::Resume,
        Err(escalation) => TrapOutcome::Halt(escalation),
    }
}
