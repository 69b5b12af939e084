//! # Bitmap Frame Allocator
//!
//! Hands out runs of contiguous 4 KiB frames from one physical region.
//!
//! Three bitmaps of [`MAX_FRAMES`] bits each describe the region:
//!
//! - `allocated`: the single source of truth for frame ownership,
//! - `heads` and `tails`: first and last frame of every allocation.
//!
//! The boundary maps are what lets [`BitmapFrameAlloc::free`] insist on
//! receiving exactly the run that [`BitmapFrameAlloc::allocate`] returned:
//! sub-ranges, super-ranges and two merged neighbours all fail the check.
//! Frames taken by [`BitmapFrameAlloc::reserve`] carry no boundary bits and
//! therefore can never be freed.

use crate::{AllocError, InvalidArgument};
use core::fmt;
use kernel_info::boot::MemoryDescription;
use kernel_info::memory::{FRAME_SIZE, LOW_MEMORY_RESERVED, MAX_FRAMES};
use kernel_memory_addresses::{PhysicalAddress, PhysicalRange, Size4K, align_down, align_up};
use kernel_trap::Installed;
use log::{debug, info, trace};

const WORDS: usize = MAX_FRAMES / 64;

/// Frames transitioned together by one [`BitmapFrameAlloc::allocate`] call.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FrameRun {
    start: usize,
    count: usize,
    base: PhysicalAddress,
}

impl FrameRun {
    /// Index of the first frame within the region.
    #[inline]
    #[must_use]
    pub const fn start(&self) -> usize {
        self.start
    }

    #[inline]
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    #[must_use]
    pub const fn len_bytes(&self) -> u64 {
        self.count as u64 * FRAME_SIZE
    }
}

/// Snapshot of the allocator's counters.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct MemoryStatistics {
    pub total_frames: u64,
    pub free_frames: u64,
    pub allocated_frames: u64,
    pub largest_free_run: u64,
    pub frame_size: u64,
}

pub struct BitmapFrameAlloc {
    region: PhysicalRange,
    frames: usize,
    free: usize,
    allocated: [u64; WORDS],
    heads: [u64; WORDS],
    tails: [u64; WORDS],
}

impl BitmapFrameAlloc {
    /// Manages the whole frames of `region`, clamped to [`MAX_FRAMES`].
    ///
    /// Requires the fault dispatcher to be installed.
    ///
    /// # Errors
    /// [`InvalidArgument::EmptyRegion`] if `region` holds no whole frame.
    pub fn new(_installed: &Installed, region: PhysicalRange) -> Result<Self, AllocError> {
        let region = whole_frames(region).ok_or(InvalidArgument::EmptyRegion)?;
        let frames = usize::try_from(region.len() / FRAME_SIZE).unwrap_or(usize::MAX);
        let frames = frames.min(MAX_FRAMES);
        let region = PhysicalRange::new(region.start(), frames as u64 * FRAME_SIZE)
            .ok_or(InvalidArgument::EmptyRegion)?;

        info!("frame allocator: {region:?}, {frames} frames");
        Ok(Self {
            region,
            frames,
            free: frames,
            allocated: [0; WORDS],
            heads: [0; WORDS],
            tails: [0; WORDS],
        })
    }

    /// Manages the largest `Available` region above the first MiB and
    /// reserves the kernel image inside it.
    ///
    /// # Errors
    /// [`InvalidArgument::NoUsableRegion`] if no region holds a whole frame
    /// above [`LOW_MEMORY_RESERVED`].
    pub fn from_description(
        installed: &Installed,
        description: &MemoryDescription<'_>,
    ) -> Result<Self, AllocError> {
        let region = description
            .largest_available(above_low_memory)
            .ok_or(InvalidArgument::NoUsableRegion)?;

        let mut alloc = Self::new(installed, region)?;
        let reserved = alloc.reserve(description.kernel);
        debug!("reserved {reserved} frames for the kernel image {:?}", description.kernel);
        Ok(alloc)
    }

    /// The managed region, frame aligned and clamped.
    #[must_use]
    pub const fn region(&self) -> PhysicalRange {
        self.region
    }

    #[must_use]
    pub const fn total_frames(&self) -> usize {
        self.frames
    }

    /// Allocates `count` contiguous frames, lowest fitting index first.
    ///
    /// # Errors
    /// [`InvalidArgument::ZeroCount`] for `count == 0`,
    /// [`AllocError::OutOfMemory`] if no free run is long enough.
    pub fn allocate(&mut self, count: usize) -> Result<FrameRun, AllocError> {
        if count == 0 {
            return Err(InvalidArgument::ZeroCount.into());
        }
        if count > self.free {
            return Err(AllocError::OutOfMemory);
        }
        let start = self.find_free_run(count).ok_or(AllocError::OutOfMemory)?;
        self.mark(start, count);

        let Some(base) = self.checked_base(start, count) else {
            self.unmark(start, count);
            return Err(AllocError::OutOfMemory);
        };
        self.free -= count;
        trace!("allocated {count} frames at {base} (index {start})");
        Ok(FrameRun { start, count, base })
    }

    /// Returns `run` to the free pool.
    ///
    /// # Errors
    /// [`AllocError::InvalidArgument`] unless `run` is exactly one live
    /// allocation of this allocator; nothing changes on error.
    pub fn free(&mut self, run: FrameRun) -> Result<(), AllocError> {
        if !run.base.is_aligned::<Size4K>() {
            return Err(InvalidArgument::Misaligned.into());
        }
        self.check_run(run.start, run.count)?;
        if self.checked_base(run.start, run.count) != Some(run.base) {
            return Err(InvalidArgument::RunMismatch.into());
        }

        self.unmark(run.start, run.count);
        self.free += run.count;
        trace!("freed {} frames at {}", run.count, run.base);
        Ok(())
    }

    /// Rebuilds the run of `count` frames that starts at `base`.
    ///
    /// # Errors
    /// As [`BitmapFrameAlloc::free`], for a run that could not be freed.
    pub fn run_at(&self, base: PhysicalAddress, count: usize) -> Result<FrameRun, AllocError> {
        if !base.is_aligned::<Size4K>() {
            return Err(InvalidArgument::Misaligned.into());
        }
        let offset = base
            .checked_offset_from(self.region.start())
            .filter(|&o| o < self.region.len())
            .ok_or(InvalidArgument::OutOfRegion)?;
        let start = usize::try_from(offset / FRAME_SIZE).map_err(|_| InvalidArgument::OutOfRegion)?;
        self.check_run(start, count)?;
        Ok(FrameRun { start, count, base })
    }

    /// Marks every frame overlapping `range` as allocated for good.
    ///
    /// Frames outside the region are ignored. Returns how many frames
    /// changed state.
    pub fn reserve(&mut self, range: PhysicalRange) -> usize {
        let Some(overlap) = self.region.intersection(&range) else {
            return 0;
        };
        let base = self.region.start().as_u64();
        let first = align_down(overlap.start().as_u64() - base, FRAME_SIZE) / FRAME_SIZE;
        let end = align_up(overlap.end().as_u64() - base, FRAME_SIZE).unwrap_or(u64::MAX) / FRAME_SIZE;

        let mut reserved = 0;
        for index in first as usize..(end as usize).min(self.frames) {
            if !test(&self.allocated, index) {
                set(&mut self.allocated, index);
                reserved += 1;
            }
        }
        self.free -= reserved;
        reserved
    }

    #[must_use]
    pub fn is_allocated(&self, index: usize) -> bool {
        index < self.frames && test(&self.allocated, index)
    }

    #[must_use]
    pub fn stats(&self) -> MemoryStatistics {
        MemoryStatistics {
            total_frames: self.frames as u64,
            free_frames: self.free as u64,
            allocated_frames: (self.frames - self.free) as u64,
            largest_free_run: self.largest_free_run() as u64,
            frame_size: FRAME_SIZE,
        }
    }

    /// Writes the statistics into `out` one field at a time.
    ///
    /// Each field is a separate 64-bit volatile store, so no wide or paired
    /// copy is emitted. Before translation is enabled all aarch64 memory is
    /// Device memory, where such copies fault.
    pub fn stats_into(&self, out: &mut MemoryStatistics) {
        let stats = self.stats();
        // SAFETY: every pointer comes from a live `&mut` field.
        unsafe {
            core::ptr::write_volatile(&raw mut out.total_frames, stats.total_frames);
            core::ptr::write_volatile(&raw mut out.free_frames, stats.free_frames);
            core::ptr::write_volatile(&raw mut out.allocated_frames, stats.allocated_frames);
            core::ptr::write_volatile(&raw mut out.largest_free_run, stats.largest_free_run);
            core::ptr::write_volatile(&raw mut out.frame_size, stats.frame_size);
        }
    }

    fn find_free_run(&self, count: usize) -> Option<usize> {
        let mut run = 0;
        for index in 0..self.frames {
            if test(&self.allocated, index) {
                run = 0;
            } else {
                run += 1;
                if run == count {
                    return Some(index + 1 - count);
                }
            }
        }
        None
    }

    fn largest_free_run(&self) -> usize {
        let (mut best, mut run) = (0, 0);
        for index in 0..self.frames {
            if test(&self.allocated, index) {
                run = 0;
            } else {
                run += 1;
                best = best.max(run);
            }
        }
        best
    }

    /// Base address of `[start, start + count)`, if it lies in the region.
    fn checked_base(&self, start: usize, count: usize) -> Option<PhysicalAddress> {
        let base = self.region.start().checked_add(start as u64 * FRAME_SIZE)?;
        let end = base.checked_add(count as u64 * FRAME_SIZE)?;
        (end <= self.region.end()).then_some(base)
    }

    fn check_run(&self, start: usize, count: usize) -> Result<(), InvalidArgument> {
        if count == 0 {
            return Err(InvalidArgument::ZeroCount);
        }
        let end = start
            .checked_add(count)
            .filter(|&end| end <= self.frames)
            .ok_or(InvalidArgument::OutOfRegion)?;
        if (start..end).any(|i| !test(&self.allocated, i)) {
            return Err(InvalidArgument::NotAllocated);
        }
        let last = end - 1;
        let boundaries_match = test(&self.heads, start)
            && test(&self.tails, last)
            && (start + 1..end).all(|i| !test(&self.heads, i))
            && (start..last).all(|i| !test(&self.tails, i));
        if boundaries_match {
            Ok(())
        } else {
            Err(InvalidArgument::RunMismatch)
        }
    }

    fn mark(&mut self, start: usize, count: usize) {
        for index in start..start + count {
            set(&mut self.allocated, index);
        }
        set(&mut self.heads, start);
        set(&mut self.tails, start + count - 1);
    }

    fn unmark(&mut self, start: usize, count: usize) {
        for index in start..start + count {
            clear(&mut self.allocated, index);
        }
        clear(&mut self.heads, start);
        clear(&mut self.tails, start + count - 1);
    }
}

impl fmt::Debug for BitmapFrameAlloc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitmapFrameAlloc")
            .field("region", &self.region)
            .field("frames", &self.frames)
            .field("free", &self.free)
            .finish_non_exhaustive()
    }
}

/// Shrinks `range` to the whole frames it contains.
fn whole_frames(range: PhysicalRange) -> Option<PhysicalRange> {
    let start = range.start().align_up::<Size4K>()?;
    let end = range.end().align_down::<Size4K>();
    PhysicalRange::from_bounds(start, end).filter(|r| !r.is_empty())
}

/// The part of `range` above the first MiB, in whole frames.
fn above_low_memory(range: PhysicalRange) -> Option<PhysicalRange> {
    let floor = PhysicalAddress::new(LOW_MEMORY_RESERVED);
    let start = range.start().max(floor);
    whole_frames(PhysicalRange::from_bounds(start, range.end())?)
}

#[inline]
fn test(map: &[u64; WORDS], index: usize) -> bool {
    map[index / 64] & (1 << (index % 64)) != 0
}

#[inline]
fn set(map: &mut [u64; WORDS], index: usize) {
    map[index / 64] |= 1 << (index % 64);
}

#[inline]
fn clear(map: &mut [u64; WORDS], index: usize) {
    map[index / 64] &= !(1 << (index % 64));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_frames_rounds_inwards() {
        let range = PhysicalRange::new(PhysicalAddress::new(0x1800), 0x3000).unwrap();
        let frames = whole_frames(range).unwrap();
        assert_eq!(frames.start(), PhysicalAddress::new(0x2000));
        assert_eq!(frames.len(), 0x2000);

        let sliver = PhysicalRange::new(PhysicalAddress::new(0x1800), 0x1000).unwrap();
        assert_eq!(whole_frames(sliver), None);
    }

    #[test]
    fn low_memory_is_skipped() {
        let range = PhysicalRange::new(PhysicalAddress::zero(), 0x20_0000).unwrap();
        let usable = above_low_memory(range).unwrap();
        assert_eq!(usable.start(), PhysicalAddress::new(0x10_0000));
        assert_eq!(usable.len(), 0x10_0000);

        let below = PhysicalRange::new(PhysicalAddress::new(0x8_0000), 0x8_0000).unwrap();
        assert_eq!(above_low_memory(below), None);
    }

    #[test]
    fn bit_helpers() {
        let mut map = [0; WORDS];
        set(&mut map, 65);
        assert!(test(&map, 65));
        assert!(!test(&map, 64));
        clear(&mut map, 65);
        assert_eq!(map, [0; WORDS]);
    }
}
