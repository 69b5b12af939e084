//! # Fault Dispatcher
//!
//! Routes synchronous and asynchronous exceptions to per-cause handlers
//! while preserving the complete machine context.
//!
//! ```text
//! Running ──trap──▶ Trapped ──▶ Dispatching ──Resume──▶ Resuming ──▶ Running
//!                                    │
//!                         Decline / no handler
//!                                    ▼
//!                               Escalating ──dump──▶ Halted
//! ```
//!
//! ## Installation order
//!
//! The dispatcher is installed before any memory service exists.
//! [`FaultDispatcher::install`] is the only way to obtain an [`Installed`]
//! witness, and the frame allocator's constructors require one, so an
//! allocator (or a mapper built on it) cannot fault before faults can be
//! reported.
//!
//! ## Cause classes
//!
//! | Class | aarch64 (`ESR_EL1.EC` / vector) | `x86_64` (vector) |
//! |-------|----------------------------------|-------------------|
//! | [`InstructionAbort`](CauseClass::InstructionAbort) | `0x20`, `0x21` | 14 with I/D bit |
//! | [`DataAbort`](CauseClass::DataAbort) | `0x24`, `0x25` | 14 |
//! | [`Alignment`](CauseClass::Alignment) | `0x22`, `0x26`, DFSC `0x21` | 17 |
//! | [`Undefined`](CauseClass::Undefined) | `0x00`, `0x0E` | 6 |
//! | [`Interrupt`](CauseClass::Interrupt) | IRQ, FIQ | ≥ 32 |
//! | [`Other`](CauseClass::Other) | SError, everything else | everything else |
//!
//! ## Escalation
//!
//! A fault nobody handles is written to the diagnostic sink in a fixed
//! format (see [`dump::write_dump`]) and the dispatcher halts. There is no
//! isolation to contain the fault, so the caller parks the CPU.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod cause;
mod context;
mod dispatcher;
pub mod dump;
mod error;
mod vectors;

pub use cause::{CauseClass, PageFaultErrorCode, VectorKind, x86_vector};
pub use context::{ExceptionContext, TrapFrame};
pub use dispatcher::{DispatchRecord, DispatchState, Disposition, FaultDispatcher, FaultHandler};
pub use error::{EscalationReason, FaultEscalation, TrapError};
pub use vectors::{Installed, VectorInstaller};

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub use vectors::Aarch64Vectors;
