//! # Kernel Bring-up
//!
//! Everything the bare-metal entry point does between "the boot loader
//! jumped to us" and "memory services are online", written against the
//! hardware traits so it runs under `cargo test` as well.
//!
//! ```text
//! logger ─▶ install_dispatcher ─▶ MemoryManager::bring_up ─▶ allocation_self_test
//!              (Installed)           (allocator, tables,
//!                                     translation on)
//! ```
//!
//! The dispatcher lives in a [`SharedDispatcher`] so the trap vectors can
//! reach it; [`route_trap`] is what the vector entry calls. The memory
//! manager is returned to the caller and passed around explicitly.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod bring_up;
mod error;
mod self_test;
mod trap;

pub use bring_up::{SharedDispatcher, bring_up, install_dispatcher, log_memory_map};
pub use error::KernelError;
pub use self_test::{SELF_TEST_RUNS, allocation_self_test};
pub use trap::{TrapOutcome, route_trap};
