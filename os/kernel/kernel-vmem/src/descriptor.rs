//! Table descriptor layouts and the per-architecture codec.
//!
//! The builder only ever handles [`TranslationEntry`] values; the raw `u64`
//! form exists inside table nodes and is produced and consumed here.

use crate::{AttributeIndex, AttributeTable, ArchCapabilities, MappingAttributes, MemoryKind};
use bitfield_struct::bitfield;
use kernel_info::boot::Arch;
use kernel_memory_addresses::PhysicalAddress;

/// aarch64 `VMSAv8-64` stage 1 descriptor, 4 KiB granule.
///
/// Bit 1 distinguishes table (levels 0..=2) from block descriptors and must
/// be set for pages at level 3.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct Aarch64Descriptor {
    pub valid: bool,
    pub table_or_page: bool,
    #[bits(3)]
    pub attr_index: u8,
    pub non_secure: bool,
    /// `AP[1]`: accessible from EL0.
    pub ap_el0: bool,
    /// `AP[2]`: read-only.
    pub ap_read_only: bool,
    #[bits(2)]
    pub shareability: u8,
    /// Access flag; without it the first access faults.
    pub access_flag: bool,
    pub not_global: bool,
    #[bits(36)]
    output_frame: u64,
    #[bits(4)]
    __res0: u8,
    pub contiguous: bool,
    /// Privileged execute-never.
    pub pxn: bool,
    /// Unprivileged execute-never.
    pub uxn: bool,
    #[bits(4)]
    pub software: u8,
    #[bits(5)]
    __ignored: u8,
}

impl Aarch64Descriptor {
    pub const INNER_SHAREABLE: u8 = 0b11;

    #[must_use]
    pub const fn with_output(self, pa: PhysicalAddress) -> Self {
        self.with_output_frame(pa.as_u64() >> 12)
    }

    #[must_use]
    pub const fn output(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.output_frame() << 12)
    }
}

/// `x86_64` 4-level paging entry (PML4E, PDPTE, PDE, PTE).
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct X86Descriptor {
    pub present: bool,
    pub writable: bool,
    pub user: bool,
    pub write_through: bool,
    pub cache_disable: bool,
    pub accessed: bool,
    pub dirty: bool,
    /// `PS` in PDEs and PDPTEs; `PAT` in PTEs.
    pub large_page: bool,
    pub global: bool,
    #[bits(3)]
    pub os_low: u8,
    #[bits(40)]
    frame: u64,
    #[bits(7)]
    pub os_high: u8,
    #[bits(4)]
    pub protection_key: u8,
    pub no_execute: bool,
}

impl X86Descriptor {
    #[must_use]
    pub const fn with_address(self, pa: PhysicalAddress) -> Self {
        self.with_frame(pa.as_u64() >> 12)
    }

    #[must_use]
    pub const fn address(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.frame() << 12)
    }
}

/// A leaf's target and attributes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Leaf {
    pub phys: PhysicalAddress,
    pub attributes: MappingAttributes,
}

/// Decoded form of one table slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TranslationEntry {
    Invalid,
    /// Next-level table at the given physical address.
    Table(PhysicalAddress),
    /// Large mapping at the block level.
    Block(Leaf),
    /// One granule at the leaf level.
    Page(Leaf),
}

impl TranslationEntry {
    /// Encodes this entry for a slot at `level`.
    #[must_use]
    pub const fn encode(self, caps: &ArchCapabilities, level: u8) -> u64 {
        match caps.arch {
            Arch::Aarch64 => encode_aarch64(self, caps, level),
            Arch::X86_64 => encode_x86_64(self),
        }
    }

    /// Decodes the raw slot content found at `level`.
    #[must_use]
    pub const fn decode(raw: u64, caps: &ArchCapabilities, level: u8) -> Self {
        match caps.arch {
            Arch::Aarch64 => decode_aarch64(raw, caps, level),
            Arch::X86_64 => decode_x86_64(raw, caps, level),
        }
    }
}

const fn encode_aarch64(entry: TranslationEntry, caps: &ArchCapabilities, level: u8) -> u64 {
    let leaf = match entry {
        TranslationEntry::Invalid => return 0,
        TranslationEntry::Table(pa) => {
            return Aarch64Descriptor::new()
                .with_valid(true)
                .with_table_or_page(true)
                .with_output(pa)
                .into_bits();
        }
        TranslationEntry::Block(leaf) | TranslationEntry::Page(leaf) => leaf,
    };

    let attrs = leaf.attributes;
    let shareability = match attrs.kind {
        MemoryKind::Normal => Aarch64Descriptor::INNER_SHAREABLE,
        MemoryKind::Device => 0,
    };
    Aarch64Descriptor::new()
        .with_valid(true)
        .with_table_or_page(level == caps.leaf_level)
        .with_attr_index(AttributeTable::index_of(attrs.kind).get())
        .with_ap_read_only(!attrs.is_writable())
        .with_shareability(shareability)
        .with_access_flag(true)
        .with_output(leaf.phys)
        .with_pxn(!attrs.executable)
        .with_uxn(true)
        .into_bits()
}

const fn decode_aarch64(raw: u64, caps: &ArchCapabilities, level: u8) -> TranslationEntry {
    let d = Aarch64Descriptor::from_bits(raw);
    if !d.valid() {
        return TranslationEntry::Invalid;
    }
    if level < caps.leaf_level && d.table_or_page() {
        return TranslationEntry::Table(d.output());
    }
    if level == caps.leaf_level && !d.table_or_page() {
        // Reserved encoding at the last level.
        return TranslationEntry::Invalid;
    }

    let kind = match AttributeTable::kind_of(AttributeIndex::new(d.attr_index())) {
        Some(kind) => kind,
        None => MemoryKind::Device,
    };
    let mut attributes = MappingAttributes::new(kind, !d.pxn());
    if d.ap_read_only() {
        attributes = attributes.read_only();
    }
    let leaf = Leaf {
        phys: d.output(),
        attributes,
    };
    if level == caps.leaf_level {
        TranslationEntry::Page(leaf)
    } else {
        TranslationEntry::Block(leaf)
    }
}

const fn encode_x86_64(entry: TranslationEntry) -> u64 {
    let (leaf, large) = match entry {
        TranslationEntry::Invalid => return 0,
        TranslationEntry::Table(pa) => {
            return X86Descriptor::new()
                .with_present(true)
                .with_writable(true)
                .with_address(pa)
                .into_bits();
        }
        TranslationEntry::Block(leaf) => (leaf, true),
        TranslationEntry::Page(leaf) => (leaf, false),
    };

    let attrs = leaf.attributes;
    let (pwt, pcd) = AttributeTable::x86_cache_bits(attrs.kind);
    X86Descriptor::new()
        .with_present(true)
        .with_writable(attrs.is_writable())
        .with_write_through(pwt)
        .with_cache_disable(pcd)
        .with_large_page(large)
        .with_address(leaf.phys)
        .with_no_execute(!attrs.executable)
        .into_bits()
}

const fn decode_x86_64(raw: u64, caps: &ArchCapabilities, level: u8) -> TranslationEntry {
    let d = X86Descriptor::from_bits(raw);
    if !d.present() {
        return TranslationEntry::Invalid;
    }
    if level < caps.leaf_level && !d.large_page() {
        return TranslationEntry::Table(d.address());
    }

    let kind = if d.cache_disable() {
        MemoryKind::Device
    } else {
        MemoryKind::Normal
    };
    let mut attributes = MappingAttributes::new(kind, !d.no_execute());
    if !d.writable() {
        attributes = attributes.read_only();
    }
    let leaf = Leaf {
        phys: d.address(),
        attributes,
    };
    if level == caps.leaf_level {
        TranslationEntry::Page(leaf)
    } else {
        TranslationEntry::Block(leaf)
    }
}
