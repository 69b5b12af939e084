//! # Translation Builder
//!
//! Builds the kernel's translation tables for aarch64 (`VMSAv8-64`, 4 KiB
//! granule) and `x86_64` (4-level paging) from one code path and turns
//! translation on.
//!
//! ## Layout
//!
//! Both architectures walk a 48-bit virtual address through four tables of
//! 512 eight-byte entries:
//!
//! ```text
//! | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  L0   |  L1   |  L2   |  L3   | offset |
//! ```
//!
//! | Level | aarch64 | `x86_64` | Leaf |
//! |:------|:--------|:---------|:-----|
//! | 0 | L0 | PML4 | never |
//! | 1 | L1 | PDPT | never (1 GiB blocks are not built) |
//! | 2 | L2 | PD   | 2 MiB block |
//! | 3 | L3 | PT   | 4 KiB page |
//!
//! The differences between the two live in [`ArchCapabilities`], the
//! [`AttributeTable`] and the [descriptor codec](descriptor); the walk in
//! [`AddressSpace`] is written once.
//!
//! ## Regions
//!
//! The **low** region identity-maps the kernel image, the allocator region
//! and device windows. The **high** region aliases the same frames at
//! `high_base + pa`. On aarch64 the two have separate roots (`TTBR0_EL1`,
//! `TTBR1_EL1`); on `x86_64` they share one `PML4`.
//!
//! ## Table memory
//!
//! Tables are [`TableNode`]s handed out by a [`TableArena`] backed by one
//! contiguous run of frames. The builder refers to them by [`NodeId`] and
//! only turns an id into a physical address when it writes a descriptor.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod address_space;
mod arch;
mod arena;
mod attributes;
pub mod descriptor;
mod error;
mod hw;
mod ranges;

pub use address_space::{AddressSpace, Translation};
pub use arch::{ArchCapabilities, Region};
pub use arena::{ENTRIES_PER_TABLE, MAX_NODES, NodeId, TableArena, TableNode};
pub use attributes::{
    AccessPermission, AttributeIndex, AttributeTable, MappingAttributes, MemoryKind,
};
pub use error::{ActivationError, ArenaError, FatalReason, MappingError};
pub use hw::{TranslationConfig, TranslationHardware};
pub use ranges::{MAX_MAPPED_RANGES, MAX_PHYSICAL_WINDOWS, MappedRange};

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub use hw::Aarch64Mmu;

use kernel_memory_addresses::PhysicalAddress;

/// Access to physical memory from the current execution context.
///
/// The translation builder never dereferences physical addresses itself;
/// whoever owns the node pool turns its frames into [`TableNode`]s through
/// a mapper. Before translation is enabled, and for the identity-mapped low
/// region afterwards, this is the identity.
pub trait PhysMapper {
    /// Views `count` frames starting at `pa` as table nodes.
    ///
    /// # Safety
    /// The frames must be RAM that nothing else references for `'a`, and
    /// `pa` must be reachable through this mapper.
    unsafe fn table_nodes<'a>(&self, pa: PhysicalAddress, count: usize) -> &'a mut [TableNode];
}
