use super::system_register;
use bitfield_struct::bitfield;

/// `MAIR_EL1`: eight memory attribute encodings, selected by the
/// `AttrIndx` field of a translation descriptor.
#[bitfield(u64)]
pub struct Mair {
    pub attr0: u8,
    pub attr1: u8,
    pub attr2: u8,
    pub attr3: u8,
    pub attr4: u8,
    pub attr5: u8,
    pub attr6: u8,
    pub attr7: u8,
}

impl Mair {
    /// Returns a copy with slot `index` (0..8) set to `encoding`.
    #[must_use]
    pub const fn with_slot(self, index: u8, encoding: u8) -> Self {
        debug_assert!(index < 8);
        let shift = (index as u32 & 7) * 8;
        let bits = (self.into_bits() & !(0xFF << shift)) | ((encoding as u64) << shift);
        Self::from_bits(bits)
    }

    /// The encoding stored in slot `index` (0..8).
    #[must_use]
    pub const fn slot(self, index: u8) -> u8 {
        let shift = (index as u32 & 7) * 8;
        ((self.into_bits() >> shift) & 0xFF) as u8
    }
}

system_register!(Mair, "mair_el1", store);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_bytes() {
        let mair = Mair::new().with_slot(0, 0x00).with_slot(1, 0x04).with_slot(5, 0xFF);
        assert_eq!(mair.into_bits(), 0x0000_FF00_0000_0400);
        assert_eq!(mair.slot(5), 0xFF);
        assert_eq!(mair.attr1(), 0x04);
    }
}
