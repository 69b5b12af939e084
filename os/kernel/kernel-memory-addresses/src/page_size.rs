use core::fmt;
use core::hash::Hash;

mod sealed {
    pub trait Sealed {}
}

/// Translation granule or block size understood by the mapper.
///
/// Only the 4 KiB granule and the 2 MiB block are supported; both are
/// shared by aarch64 (4 KiB translation granule) and `x86_64`.
pub trait PageSize:
    sealed::Sealed + Clone + Copy + Eq + Ord + Hash + fmt::Display + fmt::Debug
{
    /// Size in bytes (power of two).
    const SIZE: u64;
    /// `log2(SIZE)`.
    const SHIFT: u32;
    /// Short human readable label, e.g. `"4K"`.
    const LABEL: &'static str;

    /// Mask selecting the in-page offset bits.
    #[inline]
    #[must_use]
    fn offset_mask() -> u64 {
        Self::SIZE - 1
    }
}

macro_rules! page_size {
    ($(#[$meta:meta])* $name:ident, $shift:literal, $label:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name;

        impl sealed::Sealed for $name {}

        impl PageSize for $name {
            const SIZE: u64 = 1 << $shift;
            const SHIFT: u32 = $shift;
            const LABEL: &'static str = $label;
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(Self::LABEL)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(Self::LABEL)
            }
        }
    };
}

page_size!(
    /// 4 KiB translation granule (one frame).
    Size4K,
    12,
    "4K"
);

page_size!(
    /// 2 MiB block, mapped by a single level-2 entry.
    Size2M,
    21,
    "2M"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_match_shifts() {
        assert_eq!(Size4K::SIZE, 4096);
        assert_eq!(Size2M::SIZE, 2 * 1024 * 1024);
        assert_eq!(Size4K::offset_mask(), 0xFFF);
        assert_eq!(format!("{Size2M}"), "2M");
    }
}
