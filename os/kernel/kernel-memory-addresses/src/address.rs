use crate::PageSize;
use core::fmt;

/// Common operations shared by [`PhysicalAddress`] and [`VirtualAddress`].
///
/// Lets range and alignment helpers be written once for both spaces
/// without ever converting one kind of address into the other.
pub trait Address: Copy + Eq + Ord + fmt::Debug {
    /// Wraps a raw value.
    fn from_raw(value: u64) -> Self;

    /// Returns the raw value.
    fn raw(self) -> u64;
}

macro_rules! address_type {
    ($(#[$meta:meta])* $name:ident, $tag:literal) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name(u64);

        impl $name {
            #[inline]
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            #[inline]
            #[must_use]
            pub const fn zero() -> Self {
                Self(0)
            }

            #[inline]
            #[must_use]
            pub const fn as_u64(self) -> u64 {
                self.0
            }

            /// Whether the address sits on an `S` boundary.
            #[inline]
            #[must_use]
            pub const fn is_aligned<S: PageSize>(self) -> bool {
                self.0 & (S::SIZE - 1) == 0
            }

            /// Clears the in-page offset bits for size `S`.
            #[inline]
            #[must_use]
            pub const fn align_down<S: PageSize>(self) -> Self {
                Self(self.0 & !(S::SIZE - 1))
            }

            /// Rounds up to the next `S` boundary; `None` on overflow.
            #[inline]
            #[must_use]
            pub const fn align_up<S: PageSize>(self) -> Option<Self> {
                match self.0.checked_add(S::SIZE - 1) {
                    Some(v) => Some(Self(v & !(S::SIZE - 1))),
                    None => None,
                }
            }

            /// The in-page offset for size `S`.
            #[inline]
            #[must_use]
            pub const fn offset<S: PageSize>(self) -> u64 {
                self.0 & (S::SIZE - 1)
            }

            #[inline]
            #[must_use]
            pub const fn checked_add(self, bytes: u64) -> Option<Self> {
                match self.0.checked_add(bytes) {
                    Some(v) => Some(Self(v)),
                    None => None,
                }
            }

            /// Distance in bytes from `base` to `self`; `None` if `self < base`.
            #[inline]
            #[must_use]
            pub const fn checked_offset_from(self, base: Self) -> Option<u64> {
                self.0.checked_sub(base.0)
            }
        }

        impl Address for $name {
            #[inline]
            fn from_raw(value: u64) -> Self {
                Self(value)
            }

            #[inline]
            fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($tag, "(0x{:016X})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{:016X}", self.0)
            }
        }

        impl From<u64> for $name {
            #[inline]
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

address_type!(
    /// Physical memory address (RAM or MMIO).
    ///
    /// ```rust
    /// # use kernel_memory_addresses::*;
    /// let pa = PhysicalAddress::new(0x4000_1234);
    /// assert_eq!(pa.align_down::<Size4K>().as_u64(), 0x4000_1000);
    /// assert_eq!(pa.offset::<Size4K>(), 0x234);
    /// ```
    PhysicalAddress,
    "PA"
);

address_type!(
    /// Virtual address as seen through the translation tables.
    ///
    /// No canonicality check happens here; the mapper validates ranges
    /// against the architecture's address width.
    VirtualAddress,
    "VA"
);

impl PhysicalAddress {
    /// The address of a pointer, for identity-mapped memory.
    #[inline]
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize as u64)
    }
}

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize as u64)
    }

    /// The address as a raw pointer.
    ///
    /// Dereferencing it is only meaningful once the address is mapped.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn as_ptr<T>(self) -> *const T {
        self.0 as usize as *const T
    }
}
