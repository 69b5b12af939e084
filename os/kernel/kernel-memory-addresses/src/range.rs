use crate::{Address, PhysicalAddress, VirtualAddress};
use core::fmt;

/// Half-open address interval `[start, start + length)`.
///
/// Constructed only through [`AddressRange::new`], which rejects ranges
/// whose end would wrap around the 64-bit address space.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct AddressRange<A: Address> {
    start: A,
    length: u64,
}

pub type PhysicalRange = AddressRange<PhysicalAddress>;
pub type VirtualRange = AddressRange<VirtualAddress>;

impl<A: Address> AddressRange<A> {
    /// Returns `None` if `start + length` overflows.
    #[inline]
    #[must_use]
    pub fn new(start: A, length: u64) -> Option<Self> {
        start.raw().checked_add(length)?;
        Some(Self { start, length })
    }

    /// Builds a range from its inclusive start and exclusive end.
    #[inline]
    #[must_use]
    pub fn from_bounds(start: A, end: A) -> Option<Self> {
        let length = end.raw().checked_sub(start.raw())?;
        Some(Self { start, length })
    }

    #[inline]
    #[must_use]
    pub const fn start(&self) -> A {
        self.start
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.length
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Exclusive end.
    #[inline]
    #[must_use]
    pub fn end(&self) -> A {
        A::from_raw(self.start.raw() + self.length)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, addr: A) -> bool {
        addr >= self.start && addr.raw() < self.end().raw()
    }

    /// Whether `other` lies completely inside `self`. Empty ranges are
    /// contained only if their start is.
    #[inline]
    #[must_use]
    pub fn contains_range(&self, other: &Self) -> bool {
        other.start >= self.start && other.end().raw() <= self.end().raw()
    }

    #[inline]
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start.raw() < other.end().raw() && other.start.raw() < self.end().raw()
    }

    /// The common part of two ranges, if any.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let start = self.start.raw().max(other.start.raw());
        let end = self.end().raw().min(other.end().raw());
        (start < end).then(|| Self {
            start: A::from_raw(start),
            length: end - start,
        })
    }
}

impl<A: Address> fmt::Debug for AddressRange<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[0x{:016X}..0x{:016X})",
            self.start.raw(),
            self.start.raw() + self.length
        )
    }
}
