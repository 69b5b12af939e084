//! Architecture capability descriptor.
//!
//! Everything the builder needs to know about the target's translation
//! scheme lives here, so the walk in [`AddressSpace`](crate::AddressSpace)
//! is written once for both architectures.

use core::fmt;
use kernel_info::boot::Arch;
use kernel_info::memory::{AARCH64_HIGH_BASE, BLOCK_SIZE, FRAME_SIZE, X86_64_HIGH_BASE};

/// The two halves of the virtual address space.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Region {
    /// Identity mappings below the canonical hole.
    Low,
    /// The kernel alias at `high_base + pa`.
    High,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::High => "high",
        })
    }
}

/// Static description of a translation regime (4 KiB granule, four levels).
///
/// Levels are numbered from the root: level 0 is the root table, level 2
/// holds 2 MiB blocks and level 3 holds 4 KiB pages.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ArchCapabilities {
    pub arch: Arch,
    pub granule: u64,
    pub block_size: u64,
    pub levels: u8,
    pub block_level: u8,
    pub leaf_level: u8,
    pub bits_per_level: u32,
    pub va_bits: u32,
    /// Exclusive end of the low half.
    pub low_end: u64,
    pub high_base: u64,
    /// Separate roots for the low and high halves (`TTBR0`/`TTBR1`).
    pub split_roots: bool,
    /// Whether 128-bit copies may be emitted. On aarch64 unaligned SIMD
    /// accesses to Device memory fault while translation is off.
    pub wide_copies_safe: bool,
}

impl ArchCapabilities {
    #[must_use]
    pub const fn aarch64() -> Self {
        Self {
            arch: Arch::Aarch64,
            granule: FRAME_SIZE,
            block_size: BLOCK_SIZE,
            levels: 4,
            block_level: 2,
            leaf_level: 3,
            bits_per_level: 9,
            va_bits: 48,
            low_end: 1 << 48,
            high_base: AARCH64_HIGH_BASE,
            split_roots: true,
            wide_copies_safe: false,
        }
    }

    #[must_use]
    pub const fn x86_64() -> Self {
        Self {
            arch: Arch::X86_64,
            granule: FRAME_SIZE,
            block_size: BLOCK_SIZE,
            levels: 4,
            block_level: 2,
            leaf_level: 3,
            bits_per_level: 9,
            va_bits: 48,
            low_end: 1 << 47,
            high_base: X86_64_HIGH_BASE,
            split_roots: false,
            wide_copies_safe: true,
        }
    }

    #[must_use]
    pub const fn for_arch(arch: Arch) -> Self {
        match arch {
            Arch::Aarch64 => Self::aarch64(),
            Arch::X86_64 => Self::x86_64(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn entries_per_table(&self) -> usize {
        1 << self.bits_per_level
    }

    /// Bit position of the lowest VA bit translated at `level`.
    #[inline]
    #[must_use]
    pub const fn level_shift(&self, level: u8) -> u32 {
        self.granule.trailing_zeros() + self.bits_per_level * (self.leaf_level - level) as u32
    }

    /// Bytes covered by one entry at `level`.
    #[inline]
    #[must_use]
    pub const fn level_span(&self, level: u8) -> u64 {
        1 << self.level_shift(level)
    }

    /// Table index of `va` at `level`.
    #[inline]
    #[must_use]
    pub const fn index(&self, va: u64, level: u8) -> usize {
        ((va >> self.level_shift(level)) & ((1 << self.bits_per_level) - 1)) as usize
    }

    /// Which half `va` belongs to, or `None` inside the canonical hole.
    #[must_use]
    pub const fn region_of(&self, va: u64) -> Option<Region> {
        if va < self.low_end {
            Some(Region::Low)
        } else if va >= self.high_base {
            Some(Region::High)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_geometry() {
        let caps = ArchCapabilities::aarch64();
        assert_eq!(caps.level_span(3), 4096);
        assert_eq!(caps.level_span(2), 2 * 1024 * 1024);
        assert_eq!(caps.level_span(1), 1 << 30);
        assert_eq!(caps.level_span(0), 1 << 39);
        assert_eq!(caps.entries_per_table(), 512);

        let va = 0xFFFF_0000_4020_3000;
        assert_eq!(caps.index(va, 0), 0);
        assert_eq!(caps.index(va, 1), 1);
        assert_eq!(caps.index(va, 2), 1);
        assert_eq!(caps.index(va, 3), 3);
    }

    #[test]
    fn canonical_halves() {
        let arm = ArchCapabilities::aarch64();
        assert_eq!(arm.region_of(0x4000_0000), Some(Region::Low));
        assert_eq!(arm.region_of(0x0000_FFFF_FFFF_F000), Some(Region::Low));
        assert_eq!(arm.region_of(0x0001_0000_0000_0000), None);
        assert_eq!(arm.region_of(0xFFFF_0000_4000_0000), Some(Region::High));

        let x86 = ArchCapabilities::x86_64();
        assert_eq!(x86.region_of(0x0000_8000_0000_0000), None);
        assert_eq!(x86.region_of(0xFFFF_8000_0000_0000), Some(Region::High));
        assert!(!x86.split_roots);
        assert!(x86.wide_copies_safe);
        assert!(!arm.wide_copies_safe);
    }
}
