//! # Physical and Virtual Address Types
//!
//! Strongly typed wrappers for the raw addresses handled by the frame
//! allocator and the translation builder.
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`PhysicalAddress`] | RAM or MMIO address as seen by the bus. |
//! | [`VirtualAddress`] | Address as seen through the translation tables. |
//! | [`AddressRange<A>`] | Half-open interval, never wrapping. |
//! | [`Size4K`], [`Size2M`] | Granule and block size markers ([`PageSize`]). |
//!
//! Both address types are `#[repr(transparent)]` over `u64`, so they can
//! be stored in `#[repr(C)]` hand-off structures unchanged. They are never
//! converted into one another implicitly; identity mappings build the
//! virtual address from the raw physical value explicitly.
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let pa = PhysicalAddress::new(0x4020_0000);
//! assert!(pa.is_aligned::<Size2M>());
//!
//! let ram = PhysicalRange::new(PhysicalAddress::new(0x4000_0000), 0x100_0000).unwrap();
//! assert!(ram.contains(pa));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod address;
mod page_size;
mod range;

pub use address::{Address, PhysicalAddress, VirtualAddress};
pub use page_size::{PageSize, Size2M, Size4K};
pub use range::{AddressRange, PhysicalRange, VirtualRange};

/// Align `x` down to `a` (a power of two).
///
/// ```
/// # use kernel_memory_addresses::align_down;
/// assert_eq!(align_down(0x1234, 0x1000), 0x1000);
/// ```
#[inline]
#[must_use]
pub const fn align_down(x: u64, a: u64) -> u64 {
    x & !(a - 1)
}

/// Align `x` up to `a` (a power of two); `None` on overflow.
///
/// ```
/// # use kernel_memory_addresses::align_up;
/// assert_eq!(align_up(0x1001, 0x1000), Some(0x2000));
/// assert_eq!(align_up(u64::MAX, 0x1000), None);
/// ```
#[inline]
#[must_use]
pub const fn align_up(x: u64, a: u64) -> Option<u64> {
    match x.checked_add(a - 1) {
        Some(v) => Some(v & !(a - 1)),
        None => None,
    }
}
