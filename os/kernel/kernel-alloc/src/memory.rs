//! # Memory Façade
//!
//! [`MemoryManager`] is the kernel's single entry point to memory: it owns
//! the frame allocator, the address space and the translation hardware.
//! It is an explicit context object created by the bring-up path and passed
//! around by `&mut`; there is no global instance.
//!
//! ## Bring-up
//!
//! [`MemoryManager::build`]:
//!
//! 1. initialises the frame allocator from the memory description,
//! 2. draws the table node pool (`NODE_POOL_FRAMES` frames) from it,
//! 3. registers the allocator region, the kernel image and the device
//!    windows as mapping targets,
//! 4. maps the low (identity) and high (alias) regions.
//!
//! [`MemoryManager::activate`] then turns translation on.
//! [`MemoryManager::bring_up`] does both.

use crate::{AllocError, BitmapFrameAlloc, BringUpError, FrameRun, InvalidArgument, MemoryStatistics};
use kernel_info::boot::MemoryDescription;
use kernel_info::memory::{FRAME_SIZE, NODE_POOL_FRAMES};
use kernel_memory_addresses::{PhysicalAddress, PhysicalRange, Size4K, VirtualAddress};
use kernel_trap::Installed;
use kernel_vmem::{
    ActivationError, AddressSpace, ArchCapabilities, MappingError, MemoryKind, PhysMapper,
    TableArena, Translation, TranslationHardware,
};
use log::{debug, info};

pub struct MemoryManager<'a, H: TranslationHardware> {
    frames: BitmapFrameAlloc,
    space: AddressSpace<'a>,
    node_pool: FrameRun,
    hw: H,
}

impl<'a, H: TranslationHardware> MemoryManager<'a, H> {
    /// Builds the allocator and both translation regions without touching
    /// the hardware.
    ///
    /// # Errors
    /// Any allocator, arena or mapping failure along the way.
    pub fn build<M: PhysMapper>(
        installed: &Installed,
        description: &MemoryDescription<'_>,
        mapper: &M,
        hw: H,
    ) -> Result<Self, BringUpError> {
        let mut frames = BitmapFrameAlloc::from_description(installed, description)?;

        let node_pool = frames.allocate(NODE_POOL_FRAMES)?;
        // SAFETY: the run was just allocated and is never freed, so the
        // manager owns these frames for as long as it lives.
        let nodes = unsafe { mapper.table_nodes(node_pool.base(), node_pool.count()) };
        let arena = TableArena::new(nodes, node_pool.base())?;

        let caps = ArchCapabilities::for_arch(description.arch);
        let mut space = AddressSpace::new(installed, caps, arena)?;

        let region = frames.region();
        let kernel = covering_frames(description.kernel).ok_or(MappingError::InvalidRange)?;
        space.allow_target(region)?;
        space.allow_target(kernel)?;
        for &window in description.device_windows {
            let window = covering_frames(window).ok_or(MappingError::InvalidRange)?;
            space.allow_target(window)?;
        }

        space.map_identity(kernel, MemoryKind::Normal, true)?;
        space.map_high_alias(kernel, MemoryKind::Normal, true)?;
        for piece in without(region, kernel).into_iter().flatten() {
            space.map_identity(piece, MemoryKind::Normal, false)?;
            space.map_high_alias(piece, MemoryKind::Normal, false)?;
        }
        for &window in description.device_windows {
            let window = covering_frames(window).ok_or(MappingError::InvalidRange)?;
            space.map_identity(window, MemoryKind::Device, false)?;
        }

        debug!(
            "memory layout built: {} ranges, {} of {} table nodes",
            space.mapped_ranges().len(),
            space.arena().in_use(),
            space.arena().capacity()
        );
        Ok(Self {
            frames,
            space,
            node_pool,
            hw,
        })
    }

    /// Enables translation on the tables built so far.
    ///
    /// # Errors
    /// See [`AddressSpace::activate`].
    pub fn activate(&mut self) -> Result<(), ActivationError> {
        self.space.activate(&mut self.hw)?;
        info!("memory manager online: {:?}", self.frames.stats());
        Ok(())
    }

    /// [`MemoryManager::build`] followed by [`MemoryManager::activate`].
    ///
    /// # Errors
    /// The first failure of either step.
    pub fn bring_up<M: PhysMapper>(
        installed: &Installed,
        description: &MemoryDescription<'_>,
        mapper: &M,
        hw: H,
    ) -> Result<Self, BringUpError> {
        let mut manager = Self::build(installed, description, mapper, hw)?;
        manager.activate()?;
        Ok(manager)
    }

    /// Allocates `size` bytes rounded up to whole frames and returns their
    /// identity-mapped address.
    ///
    /// # Errors
    /// [`InvalidArgument::ZeroCount`] for `size == 0`, otherwise as
    /// [`BitmapFrameAlloc::allocate`].
    pub fn memory_alloc(&mut self, size: u64) -> Result<PhysicalAddress, AllocError> {
        self.memory_alloc_pages(frames_for(size)?)
    }

    /// Releases an allocation made by [`MemoryManager::memory_alloc`] with
    /// the same `size`.
    ///
    /// # Errors
    /// As [`BitmapFrameAlloc::free`].
    pub fn memory_free(&mut self, address: PhysicalAddress, size: u64) -> Result<(), AllocError> {
        self.memory_free_pages(address, frames_for(size)?)
    }

    /// # Errors
    /// As [`BitmapFrameAlloc::allocate`].
    pub fn memory_alloc_pages(&mut self, count: usize) -> Result<PhysicalAddress, AllocError> {
        Ok(self.frames.allocate(count)?.base())
    }

    /// # Errors
    /// As [`BitmapFrameAlloc::free`].
    pub fn memory_free_pages(&mut self, address: PhysicalAddress, count: usize) -> Result<(), AllocError> {
        let run = self.frames.run_at(address, count)?;
        self.frames.free(run)
    }

    /// Maps `length` bytes at `virt` to `phys`. Mappings made through the
    /// façade are never executable.
    ///
    /// # Errors
    /// See [`AddressSpace::map`].
    pub fn memory_map(
        &mut self,
        virt: VirtualAddress,
        phys: PhysicalAddress,
        length: u64,
        kind: MemoryKind,
    ) -> Result<(), MappingError> {
        self.space.map(virt, length, phys, kind, false)?;
        if self.space.is_active() {
            self.hw.publish_table_writes();
            self.hw.synchronize();
        }
        Ok(())
    }

    /// Unmaps `length` bytes at `virt` and, once translation is on,
    /// invalidates every page of the range.
    ///
    /// # Errors
    /// See [`AddressSpace::unmap`].
    pub fn memory_unmap(&mut self, virt: VirtualAddress, length: u64) -> Result<(), MappingError> {
        self.space.unmap(virt, length)?;
        if self.space.is_active() {
            self.hw.publish_table_writes();
            for page in 0..length / FRAME_SIZE {
                let va = VirtualAddress::new(virt.as_u64() + page * FRAME_SIZE);
                self.hw.invalidate_page(va);
            }
            self.hw.synchronize();
        }
        Ok(())
    }

    /// Current allocator statistics.
    ///
    /// Until wide copies are safe the snapshot is assembled with
    /// [`BitmapFrameAlloc::stats_into`].
    #[must_use]
    pub fn memory_get_stats(&self) -> MemoryStatistics {
        if self.space.capabilities().wide_copies_safe {
            self.frames.stats()
        } else {
            let mut stats = MemoryStatistics::default();
            self.frames.stats_into(&mut stats);
            stats
        }
    }

    /// Writes the statistics into `out` one field at a time.
    pub fn memory_get_stats_into(&self, out: &mut MemoryStatistics) {
        self.frames.stats_into(out);
    }

    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<Translation> {
        self.space.translate(va)
    }

    #[must_use]
    pub const fn capabilities(&self) -> &ArchCapabilities {
        self.space.capabilities()
    }

    #[must_use]
    pub const fn frames(&self) -> &BitmapFrameAlloc {
        &self.frames
    }

    #[must_use]
    pub const fn address_space(&self) -> &AddressSpace<'a> {
        &self.space
    }

    /// Frames holding the translation tables.
    #[must_use]
    pub const fn node_pool(&self) -> FrameRun {
        self.node_pool
    }

    #[must_use]
    pub const fn hardware(&self) -> &H {
        &self.hw
    }
}

/// Number of frames covering `size` bytes.
fn frames_for(size: u64) -> Result<usize, AllocError> {
    if size == 0 {
        return Err(InvalidArgument::ZeroCount.into());
    }
    usize::try_from(size.div_ceil(FRAME_SIZE)).map_err(|_| AllocError::OutOfMemory)
}

/// The smallest run of whole frames containing `range`.
fn covering_frames(range: PhysicalRange) -> Option<PhysicalRange> {
    let start = range.start().align_down::<Size4K>();
    let end = range.end().align_up::<Size4K>()?;
    PhysicalRange::from_bounds(start, end)
}

/// `region` with `hole` cut out: the parts below and above it.
fn without(region: PhysicalRange, hole: PhysicalRange) -> [Option<PhysicalRange>; 2] {
    let Some(overlap) = region.intersection(&hole) else {
        return [Some(region), None];
    };
    let below = PhysicalRange::from_bounds(region.start(), overlap.start());
    let above = PhysicalRange::from_bounds(overlap.end(), region.end());
    [below, above].map(|r| r.filter(|r| !r.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: u64, length: u64) -> PhysicalRange {
        PhysicalRange::new(PhysicalAddress::new(start), length).unwrap()
    }

    #[test]
    fn sizes_round_up_to_frames() {
        assert_eq!(frames_for(1), Ok(1));
        assert_eq!(frames_for(4096), Ok(1));
        assert_eq!(frames_for(4097), Ok(2));
        assert_eq!(frames_for(0), Err(InvalidArgument::ZeroCount.into()));
    }

    #[test]
    fn kernel_hole_splits_the_region() {
        let region = range(0x4000_0000, 0x100_0000);
        let [below, above] = without(region, range(0x4008_0000, 0x2_0000));
        assert_eq!(below, Some(range(0x4000_0000, 0x8_0000)));
        assert_eq!(above, Some(range(0x400A_0000, 0xF6_0000)));

        assert_eq!(without(region, range(0x8000_0000, 0x1000)), [Some(region), None]);
        assert_eq!(without(region, range(0x4000_0000, 0x1000))[0], None);
    }

    #[test]
    fn partial_frames_are_covered() {
        let covered = covering_frames(range(0x4008_0010, 0x1000)).unwrap();
        assert_eq!(covered, range(0x4008_0000, 0x2000));
    }
}
