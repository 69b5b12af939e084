//! # Kernel Synchronization Primitives
//!
//! Only two primitives are needed while a single context brings the
//! memory subsystem up:
//!
//! - [`SpinLock`] guards state that is also reachable from the trap
//!   vectors. The vector entry uses [`SpinLock::try_lock`] so that a fault
//!   raised while the lock is held is detected instead of deadlocking.
//! - [`SyncOnceCell`] is the single initialization point for process-wide
//!   state published to the trap vectors.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;
mod sync_once_cell;

pub use spin_lock::{SpinLock, SpinLockGuard};
pub use sync_once_cell::SyncOnceCell;
