//! # Boot Interface and Memory Layout
//!
//! Shared configuration for everything that runs between the boot
//! loader's hand-off and a fully operational memory subsystem.
//!
//! ## Boot Information ([`boot`])
//!
//! The packed [`BootInfo`](boot::BootInfo) structure passed by the boot
//! loader, its validation, and the safe
//! [`MemoryDescription`](boot::MemoryDescription) view the frame allocator
//! and the translation builder are initialized from.
//!
//! ## Memory Layout ([`memory`])
//!
//! Compile-time constants for frame and block sizes, the region of low
//! memory that is never allocated, the high-region bases per
//! architecture and the QEMU `virt` board addresses.
//!
//! ```text
//! Physical (QEMU virt, aarch64):
//!
//! 0x0000_0000 ┌──────────────────────────────┐
//!             │ flash, GIC, ...              │
//! 0x0900_0000 ├──────────────────────────────┤ QEMU_VIRT_UART0 (device window)
//!             │ ...                          │
//! 0x4000_0000 ├──────────────────────────────┤ QEMU_VIRT_RAM_BASE
//!             │ boot loader data             │
//! 0x4008_0000 ├──────────────────────────────┤ KERNEL_LOAD_ADDRESS
//!             │ kernel image (reserved)      │
//!             ├──────────────────────────────┤
//!             │ frames managed by allocator  │
//!             └──────────────────────────────┘
//!
//! Virtual:
//!
//! 0x0000_0000_0000_0000  low region, identity mapped (TTBR0_EL1)
//! 0xffff_0000_0000_0000  high region, high_base + pa  (TTBR1_EL1)
//! ```
//!
//! All constants are checked for consistency at compile time.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
