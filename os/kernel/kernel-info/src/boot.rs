//! # Boot Hand-off
//!
//! The boot loader passes a pointer to a [`BootInfo`] in the first argument
//! register. The structure is packed and C-compatible; the kernel validates
//! it with [`BootInfo::validate`] and then works exclusively with the safe
//! [`MemoryDescription`] view produced by [`BootInfo::describe`].

use kernel_memory_addresses::{PhysicalAddress, PhysicalRange};

/// `"MiniOS"` in ASCII.
pub const BOOT_PROTOCOL_MAGIC: u64 = 0x4D69_6E69_4F53;

/// The only protocol revision understood by this kernel.
pub const BOOT_PROTOCOL_VERSION: u32 = 1;

/// Architecture the boot loader started the kernel on.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Arch {
    Aarch64 = 1,
    X86_64 = 2,
}

impl Arch {
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::Aarch64),
            2 => Some(Self::X86_64),
            _ => None,
        }
    }
}

/// Classification of a [`MemoryMapEntry`].
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RegionKind {
    Available = 1,
    Reserved = 2,
    AcpiReclaim = 3,
    AcpiNvs = 4,
    Bad = 5,
}

impl RegionKind {
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::Available),
            2 => Some(Self::Reserved),
            3 => Some(Self::AcpiReclaim),
            4 => Some(Self::AcpiNvs),
            5 => Some(Self::Bad),
            _ => None,
        }
    }
}

/// One physical memory region reported by the boot loader.
#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct MemoryMapEntry {
    pub base: u64,
    pub length: u64,
    pub kind: u32,
    /// Architecture specific; unused by the kernel.
    pub attributes: u32,
}

impl MemoryMapEntry {
    #[must_use]
    pub const fn new(base: u64, length: u64, kind: RegionKind) -> Self {
        Self {
            base,
            length,
            kind: kind as u32,
            attributes: 0,
        }
    }

    /// `None` for kinds this kernel does not know.
    #[must_use]
    pub const fn region_kind(&self) -> Option<RegionKind> {
        RegionKind::from_raw(self.kind)
    }

    /// The covered range, or `None` if it wraps the address space.
    #[must_use]
    pub fn range(&self) -> Option<PhysicalRange> {
        PhysicalRange::new(PhysicalAddress::new(self.base), self.length)
    }
}

impl core::fmt::Debug for MemoryMapEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let (base, length, kind) = (self.base, self.length, self.kind);
        f.debug_struct("MemoryMapEntry")
            .field("base", &format_args!("{base:#x}"))
            .field("length", &format_args!("{length:#x}"))
            .field("kind", &RegionKind::from_raw(kind))
            .finish_non_exhaustive()
    }
}

/// Information handed from the boot loader to the kernel entry point.
#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct BootInfo {
    pub magic: u64,
    pub arch: u32,
    pub version: u32,
    pub memory_map: *const MemoryMapEntry,
    pub memory_map_entries: u32,
    pub memory_map_size: u32,
    pub kernel_start: u64,
    pub kernel_size: u64,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum BootInfoError {
    #[error("boot info magic mismatch: {0:#x}")]
    BadMagic(u64),
    #[error("unsupported boot protocol version {0}")]
    UnsupportedVersion(u32),
    #[error("unknown architecture id {0}")]
    UnknownArch(u32),
    #[error("boot info carries no memory map")]
    EmptyMemoryMap,
    #[error("kernel image range wraps the address space")]
    InvalidKernelRange,
}

impl BootInfo {
    /// Checks magic, version and architecture.
    ///
    /// # Errors
    /// Returns the first field that does not match the protocol.
    pub const fn validate(&self) -> Result<Arch, BootInfoError> {
        let magic = self.magic;
        if magic != BOOT_PROTOCOL_MAGIC {
            return Err(BootInfoError::BadMagic(magic));
        }
        let version = self.version;
        if version != BOOT_PROTOCOL_VERSION {
            return Err(BootInfoError::UnsupportedVersion(version));
        }
        let arch = self.arch;
        match Arch::from_raw(arch) {
            Some(arch) => Ok(arch),
            None => Err(BootInfoError::UnknownArch(arch)),
        }
    }

    /// Validates the structure and borrows its memory map.
    ///
    /// # Errors
    /// See [`BootInfo::validate`]; additionally rejects an empty memory map.
    ///
    /// # Safety
    /// `memory_map` must point to `memory_map_entries` readable entries that
    /// outlive `self`.
    #[allow(unsafe_code)]
    pub unsafe fn describe<'a>(
        &'a self,
        device_windows: &'a [PhysicalRange],
    ) -> Result<MemoryDescription<'a>, BootInfoError> {
        let arch = self.validate()?;
        let ptr = self.memory_map;
        let count = self.memory_map_entries as usize;
        if ptr.is_null() || count == 0 {
            return Err(BootInfoError::EmptyMemoryMap);
        }

        // SAFETY: guaranteed by the caller.
        let regions = unsafe { core::slice::from_raw_parts(ptr, count) };
        let kernel = PhysicalRange::new(PhysicalAddress::new(self.kernel_start), self.kernel_size)
            .ok_or(BootInfoError::InvalidKernelRange)?;

        Ok(MemoryDescription {
            arch,
            regions,
            kernel,
            device_windows,
        })
    }
}

/// The validated, borrow-checked view of the boot hand-off consumed by the
/// frame allocator and the mapper.
#[derive(Debug, Copy, Clone)]
pub struct MemoryDescription<'a> {
    pub arch: Arch,
    pub regions: &'a [MemoryMapEntry],
    /// Physical load range of the kernel image.
    pub kernel: PhysicalRange,
    /// MMIO windows that may be mapped as device memory.
    pub device_windows: &'a [PhysicalRange],
}

impl MemoryDescription<'_> {
    /// Iterates the `Available` regions, skipping malformed entries.
    pub fn available(&self) -> impl Iterator<Item = PhysicalRange> + '_ {
        self.regions
            .iter()
            .filter(|e| e.region_kind() == Some(RegionKind::Available))
            .filter_map(MemoryMapEntry::range)
    }

    /// The largest `Available` region after trimming each one with
    /// `usable`, which drops a region by returning `None`. The first one
    /// wins on ties.
    #[must_use]
    pub fn largest_available<F>(&self, usable: F) -> Option<PhysicalRange>
    where
        F: FnMut(PhysicalRange) -> Option<PhysicalRange>,
    {
        self.available()
            .filter_map(usable)
            .fold(None, |best: Option<PhysicalRange>, r| match best {
                Some(b) if b.len() >= r.len() => Some(b),
                _ if r.is_empty() => best,
                _ => Some(r),
            })
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;

    fn boot_info(entries: &[MemoryMapEntry]) -> BootInfo {
        BootInfo {
            magic: BOOT_PROTOCOL_MAGIC,
            arch: Arch::Aarch64 as u32,
            version: BOOT_PROTOCOL_VERSION,
            memory_map: entries.as_ptr(),
            memory_map_entries: u32::try_from(entries.len()).unwrap(),
            memory_map_size: u32::try_from(size_of_val(entries)).unwrap(),
            kernel_start: 0x4008_0000,
            kernel_size: 0x20_0000,
        }
    }

    #[test]
    fn entry_layout_is_packed() {
        assert_eq!(size_of::<MemoryMapEntry>(), 24);
    }

    #[test]
    fn validate_checks_each_field() {
        let entries = [MemoryMapEntry::new(0x4000_0000, 0x800_0000, RegionKind::Available)];
        let mut info = boot_info(&entries);
        assert_eq!(info.validate(), Ok(Arch::Aarch64));

        info.version = 2;
        assert_eq!(info.validate(), Err(BootInfoError::UnsupportedVersion(2)));

        info.version = BOOT_PROTOCOL_VERSION;
        info.arch = 7;
        assert_eq!(info.validate(), Err(BootInfoError::UnknownArch(7)));

        info.magic = 0xdead;
        assert_eq!(info.validate(), Err(BootInfoError::BadMagic(0xdead)));
    }

    #[test]
    fn describe_rejects_empty_map() {
        let info = boot_info(&[]);
        let err = unsafe { info.describe(&[]) }.unwrap_err();
        assert_eq!(err, BootInfoError::EmptyMemoryMap);
    }

    #[test]
    fn largest_available_region_wins() {
        let entries = [
            MemoryMapEntry::new(0x0, 0x9_F000, RegionKind::Available),
            MemoryMapEntry::new(0x10_0000, 0x100_0000, RegionKind::Reserved),
            MemoryMapEntry::new(0x4000_0000, 0x800_0000, RegionKind::Available),
            MemoryMapEntry::new(0x5000_0000, 0x10_0000, RegionKind::Available),
            MemoryMapEntry {
                base: 0x6000_0000,
                length: 0x1000_0000,
                kind: 99,
                attributes: 0,
            },
        ];
        let info = boot_info(&entries);
        let desc = unsafe { info.describe(&[]) }.unwrap();
        let largest = desc.largest_available(Some).unwrap();
        assert_eq!(largest.start(), PhysicalAddress::new(0x4000_0000));
        assert_eq!(largest.len(), 0x800_0000);

        let below_1g = |r: PhysicalRange| Some(r).filter(|r| r.start().as_u64() < 0x4000_0000);
        let low = desc.largest_available(below_1g).unwrap();
        assert_eq!(low.start(), PhysicalAddress::zero());
        assert_eq!(desc.kernel.start(), PhysicalAddress::new(0x4008_0000));
    }
}
