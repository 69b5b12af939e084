//! # Kernel Memory Allocation
//!
//! Physical frame allocation and the memory façade the rest of the kernel
//! talks to.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  MemoryManager                      │
//! │    • memory_alloc / memory_free (frame granular)    │
//! │    • memory_map / memory_unmap (+ TLB maintenance)  │
//! │    • memory_get_stats                               │
//! └────────────┬───────────────────────────┬────────────┘
//!              │                           │
//! ┌────────────▼────────────┐ ┌────────────▼────────────┐
//! │    BitmapFrameAlloc     │ │  kernel_vmem::          │
//! │    • contiguous runs    │ │  AddressSpace           │
//! │    • exact-run free     │ │  + TranslationHardware  │
//! └─────────────────────────┘ └─────────────────────────┘
//! ```
//!
//! ## Bring-up order
//!
//! Creating a [`BitmapFrameAlloc`] takes an [`Installed`](kernel_trap::Installed)
//! witness, so the fault dispatcher is always installed before the first
//! frame is handed out. [`MemoryManager::bring_up`] then draws the table
//! node pool from the allocator, builds the low and high regions and enables
//! translation.
//!
//! ## Example
//!
//! ```rust,no_run
//! # use kernel_alloc::{IdentityMapper, MemoryManager};
//! # use kernel_info::boot::MemoryDescription;
//! # use kernel_trap::Installed;
//! # use kernel_vmem::TranslationHardware;
//! # fn demo<H: TranslationHardware>(installed: &Installed, description: &MemoryDescription<'_>, hw: H) {
//! let mut memory = MemoryManager::bring_up(installed, description, &IdentityMapper, hw).unwrap();
//! let buffer = memory.memory_alloc(3 * 4096).unwrap();
//! memory.memory_free(buffer, 3 * 4096).unwrap();
//! # }
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod error;
pub mod frame_alloc;
mod memory;
mod phys_mapper;

pub use error::{AllocError, BringUpError, InvalidArgument};
pub use frame_alloc::{BitmapFrameAlloc, FrameRun, MemoryStatistics};
pub use memory::MemoryManager;
pub use phys_mapper::IdentityMapper;
