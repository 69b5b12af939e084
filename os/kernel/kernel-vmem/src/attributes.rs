//! Memory kinds and their hardware attribute encodings.

use kernel_registers::aarch64::Mair;

/// What a mapping points at.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MemoryKind {
    /// Cacheable RAM.
    Normal,
    /// Memory-mapped I/O; strongly ordered, never cached.
    Device,
}

/// Index into the attribute table (`AttrIndx` on aarch64).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct AttributeIndex(u8);

impl AttributeIndex {
    #[inline]
    #[must_use]
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

/// The static kind ⇄ hardware attribute table.
///
/// | index | `MAIR` byte | meaning               |
/// |-------|-------------|-----------------------|
/// | 0     | `0x00`      | Device `nGnRnE`       |
/// | 1     | `0x04`      | Device `nGnRE`        |
/// | 2     | `0x0C`      | Device `GRE`          |
/// | 3     | `0x44`      | Normal non-cacheable  |
/// | 4     | `0xBB`      | Normal write-through  |
/// | 5     | `0xFF`      | Normal write-back     |
///
/// On `x86_64` the same kinds select `PWT`/`PCD` instead, relying on the
/// power-on `PAT` layout.
pub struct AttributeTable;

impl AttributeTable {
    pub const ENCODINGS: [u8; 6] = [0x00, 0x04, 0x0C, 0x44, 0xBB, 0xFF];

    pub const DEVICE: AttributeIndex = AttributeIndex(0);
    pub const NORMAL: AttributeIndex = AttributeIndex(5);

    #[must_use]
    pub const fn index_of(kind: MemoryKind) -> AttributeIndex {
        match kind {
            MemoryKind::Normal => Self::NORMAL,
            MemoryKind::Device => Self::DEVICE,
        }
    }

    /// `None` for indices outside the table.
    #[must_use]
    pub const fn kind_of(index: AttributeIndex) -> Option<MemoryKind> {
        match index.0 {
            0..=2 => Some(MemoryKind::Device),
            3..=5 => Some(MemoryKind::Normal),
            _ => None,
        }
    }

    #[must_use]
    pub const fn encoding(index: AttributeIndex) -> Option<u8> {
        let i = index.0 as usize;
        if i < Self::ENCODINGS.len() {
            Some(Self::ENCODINGS[i])
        } else {
            None
        }
    }

    /// The complete `MAIR_EL1` value; unused slots stay zero.
    #[must_use]
    pub const fn mair() -> Mair {
        let mut mair = Mair::new();
        let mut i = 0;
        while i < Self::ENCODINGS.len() {
            mair = mair.with_slot(i as u8, Self::ENCODINGS[i]);
            i += 1;
        }
        mair
    }

    /// `(PWT, PCD)` for `kind` on `x86_64`.
    #[must_use]
    pub const fn x86_cache_bits(kind: MemoryKind) -> (bool, bool) {
        match kind {
            MemoryKind::Normal => (false, false),
            MemoryKind::Device => (true, true),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum AccessPermission {
    ReadWrite,
    ReadOnly,
}

/// Everything a leaf descriptor says about its target besides the address.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct MappingAttributes {
    pub kind: MemoryKind,
    pub access: AccessPermission,
    pub executable: bool,
}

impl MappingAttributes {
    /// A kernel read-write mapping.
    #[must_use]
    pub const fn new(kind: MemoryKind, executable: bool) -> Self {
        Self {
            kind,
            access: AccessPermission::ReadWrite,
            executable,
        }
    }

    #[must_use]
    pub const fn read_only(self) -> Self {
        Self {
            access: AccessPermission::ReadOnly,
            ..self
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        matches!(self.access, AccessPermission::ReadWrite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_select_documented_slots() {
        assert_eq!(AttributeTable::index_of(MemoryKind::Normal).get(), 5);
        assert_eq!(AttributeTable::index_of(MemoryKind::Device).get(), 0);
        assert_eq!(AttributeTable::encoding(AttributeTable::NORMAL), Some(0xFF));
        assert_eq!(AttributeTable::encoding(AttributeIndex::new(6)), None);
    }

    #[test]
    fn every_slot_maps_back_to_a_kind() {
        for i in 0..3 {
            assert_eq!(AttributeTable::kind_of(AttributeIndex::new(i)), Some(MemoryKind::Device));
        }
        for i in 3..6 {
            assert_eq!(AttributeTable::kind_of(AttributeIndex::new(i)), Some(MemoryKind::Normal));
        }
        assert_eq!(AttributeTable::kind_of(AttributeIndex::new(7)), None);
    }

    #[test]
    fn mair_value() {
        assert_eq!(AttributeTable::mair().into_bits(), 0x0000_FFBB_440C_0400);
    }
}
