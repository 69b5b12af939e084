//! # Identity `PhysMapper`
//!
//! Before translation is enabled every physical address is its own
//! virtual address, and the allocator region stays identity mapped in the
//! low region afterwards. The node pool is drawn from that region, so the
//! identity is all the bring-up path needs to reach its table memory.

use kernel_memory_addresses::PhysicalAddress;
use kernel_vmem::{PhysMapper, TableNode};

/// [`PhysMapper`] for identity-mapped physical memory.
#[derive(Debug, Default, Copy, Clone)]
pub struct IdentityMapper;

impl PhysMapper for IdentityMapper {
    #[allow(clippy::cast_possible_truncation)]
    unsafe fn table_nodes<'a>(&self, pa: PhysicalAddress, count: usize) -> &'a mut [TableNode] {
        let first = pa.as_u64() as usize as *mut TableNode;
        // SAFETY: the caller guarantees `count` exclusively owned frames at `pa`.
        unsafe { core::slice::from_raw_parts_mut(first, count) }
    }
}
