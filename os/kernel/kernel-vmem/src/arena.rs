//! Fixed-capacity pool of translation-table nodes.
//!
//! Nodes are referred to by [`NodeId`]. A physical address is produced only
//! by [`TableArena::phys_of`], and an address read back from a descriptor is
//! accepted only after [`TableArena::resolve`] has matched it to a node in
//! use, so a corrupted descriptor can never send the walker outside the pool.

use crate::ArenaError;
use kernel_info::memory::FRAME_SIZE;
use kernel_memory_addresses::{PhysicalAddress, PhysicalRange, Size4K};

/// Entries per node.
pub const ENTRIES_PER_TABLE: usize = 512;

/// Upper bound on the number of nodes one arena manages.
pub const MAX_NODES: usize = 256;

/// One 4 KiB translation table.
#[repr(C, align(4096))]
#[derive(Clone)]
pub struct TableNode {
    entries: [u64; ENTRIES_PER_TABLE],
}

const _: () = assert!(size_of::<TableNode>() as u64 == FRAME_SIZE);

impl TableNode {
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [0; ENTRIES_PER_TABLE],
        }
    }

    fn clear(&mut self) {
        self.entries.fill(0);
    }
}

impl Default for TableNode {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Handle of a node owned by a [`TableArena`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(u16);

impl NodeId {
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

const WORDS: usize = MAX_NODES / 64;

pub struct TableArena<'a> {
    nodes: &'a mut [TableNode],
    base: PhysicalAddress,
    used: [u64; WORDS],
    in_use: usize,
}

impl<'a> TableArena<'a> {
    /// Takes ownership of `nodes`, whose first node lives at physical `base`.
    ///
    /// # Errors
    /// [`ArenaError::Empty`] for an empty pool, [`ArenaError::TooLarge`] for
    /// more than [`MAX_NODES`] nodes or a pool wrapping the address space,
    /// [`ArenaError::Misaligned`] if `base` is not 4 KiB aligned.
    pub fn new(nodes: &'a mut [TableNode], base: PhysicalAddress) -> Result<Self, ArenaError> {
        if nodes.is_empty() {
            return Err(ArenaError::Empty);
        }
        if nodes.len() > MAX_NODES {
            return Err(ArenaError::TooLarge);
        }
        if !base.is_aligned::<Size4K>() {
            return Err(ArenaError::Misaligned);
        }
        if PhysicalRange::new(base, nodes.len() as u64 * FRAME_SIZE).is_none() {
            return Err(ArenaError::TooLarge);
        }
        Ok(Self {
            nodes,
            base,
            used: [0; WORDS],
            in_use: 0,
        })
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub const fn in_use(&self) -> usize {
        self.in_use
    }

    #[must_use]
    pub const fn free_count(&self) -> usize {
        self.nodes.len() - self.in_use
    }

    /// Hands out the lowest free node, zeroed.
    pub fn allocate(&mut self) -> Option<NodeId> {
        let index = (0..self.nodes.len()).find(|&i| !self.is_set(i))?;
        self.used[index / 64] |= 1 << (index % 64);
        self.in_use += 1;
        self.nodes[index].clear();
        #[allow(clippy::cast_possible_truncation)]
        Some(NodeId(index as u16))
    }

    /// Returns `id` to the pool. Releasing a free node is a no-op.
    pub fn release(&mut self, id: NodeId) {
        let i = id.index();
        if i < self.nodes.len() && self.is_set(i) {
            self.used[i / 64] &= !(1 << (i % 64));
            self.in_use -= 1;
        }
    }

    /// The only source of table addresses written into descriptors.
    #[must_use]
    pub const fn phys_of(&self, id: NodeId) -> PhysicalAddress {
        PhysicalAddress::new(self.base.as_u64() + id.0 as u64 * FRAME_SIZE)
    }

    /// Maps a table address read from a descriptor back to its node.
    ///
    /// `None` unless `pa` is the aligned base of a node currently in use.
    #[must_use]
    pub fn resolve(&self, pa: PhysicalAddress) -> Option<NodeId> {
        let offset = pa.checked_offset_from(self.base)?;
        if offset % FRAME_SIZE != 0 {
            return None;
        }
        let index = usize::try_from(offset / FRAME_SIZE).ok()?;
        if index >= self.nodes.len() || !self.is_set(index) {
            return None;
        }
        u16::try_from(index).ok().map(NodeId)
    }

    #[must_use]
    pub fn read(&self, id: NodeId, index: usize) -> u64 {
        self.nodes[id.index()].entries[index]
    }

    pub fn write(&mut self, id: NodeId, index: usize, raw: u64) {
        self.nodes[id.index()].entries[index] = raw;
    }

    /// Whether every slot of `id` is invalid.
    #[must_use]
    pub fn is_vacant(&self, id: NodeId) -> bool {
        self.nodes[id.index()].entries.iter().all(|&e| e == 0)
    }

    fn is_set(&self, index: usize) -> bool {
        self.used[index / 64] & (1 << (index % 64)) != 0
    }
}

impl core::fmt::Debug for TableArena<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TableArena")
            .field("base", &self.base)
            .field("capacity", &self.nodes.len())
            .field("in_use", &self.in_use)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: PhysicalAddress = PhysicalAddress::new(0x4100_0000);

    #[test]
    fn rejects_bad_pools() {
        let mut none: [TableNode; 0] = [];
        assert_eq!(TableArena::new(&mut none, BASE).unwrap_err(), ArenaError::Empty);

        let mut one = vec![TableNode::zeroed()];
        assert_eq!(
            TableArena::new(&mut one, PhysicalAddress::new(0x4100_0800)).unwrap_err(),
            ArenaError::Misaligned
        );

        let mut many = vec![TableNode::zeroed(); MAX_NODES + 1];
        assert_eq!(TableArena::new(&mut many, BASE).unwrap_err(), ArenaError::TooLarge);
    }

    #[test]
    fn allocation_is_lowest_first_and_zeroed() {
        let mut nodes = vec![TableNode::zeroed(); 3];
        nodes[1].entries[7] = 0xdead;
        let mut arena = TableArena::new(&mut nodes, BASE).unwrap();

        let a = arena.allocate().unwrap();
        let b = arena.allocate().unwrap();
        assert_eq!((a.index(), b.index()), (0, 1));
        assert_eq!(arena.read(b, 7), 0);
        assert_eq!(arena.free_count(), 1);

        arena.release(a);
        assert_eq!(arena.allocate(), Some(a));
        assert!(arena.allocate().is_some());
        assert_eq!(arena.allocate(), None);
    }

    #[test]
    fn resolve_validates_addresses() {
        let mut nodes = vec![TableNode::zeroed(); 4];
        let mut arena = TableArena::new(&mut nodes, BASE).unwrap();
        let a = arena.allocate().unwrap();
        let b = arena.allocate().unwrap();

        assert_eq!(arena.phys_of(b), PhysicalAddress::new(0x4100_1000));
        assert_eq!(arena.resolve(arena.phys_of(a)), Some(a));
        assert_eq!(arena.resolve(PhysicalAddress::new(0x4100_1008)), None);
        assert_eq!(arena.resolve(PhysicalAddress::new(0x4100_2000)), None, "free node");
        assert_eq!(arena.resolve(PhysicalAddress::new(0x4100_4000)), None, "past the pool");
        assert_eq!(arena.resolve(PhysicalAddress::new(0x40FF_F000)), None, "below the pool");
    }
}
