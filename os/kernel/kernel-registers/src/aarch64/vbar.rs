use super::system_register;
use bitfield_struct::bitfield;
use kernel_memory_addresses::VirtualAddress;

/// `VBAR_EL1`: base of the 2 KiB aligned exception vector table.
#[bitfield(u64)]
pub struct Vbar {
    #[bits(11)]
    _reserved_0_10: u16,
    #[bits(53)]
    base_2k: u64,
}

impl Vbar {
    /// `None` unless `table` is 2 KiB aligned.
    #[must_use]
    pub const fn from_table(table: VirtualAddress) -> Option<Self> {
        if table.as_u64() & 0x7FF != 0 {
            return None;
        }
        Some(Self::new().with_base_2k(table.as_u64() >> 11))
    }

    #[must_use]
    pub const fn table(self) -> VirtualAddress {
        VirtualAddress::new(self.base_2k() << 11)
    }
}

system_register!(Vbar, "vbar_el1", store);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_2k_alignment() {
        assert!(Vbar::from_table(VirtualAddress::new(0x4008_0400)).is_none());
        let vbar = Vbar::from_table(VirtualAddress::new(0x4008_0800)).unwrap();
        assert_eq!(vbar.into_bits(), 0x4008_0800);
        assert_eq!(vbar.table(), VirtualAddress::new(0x4008_0800));
    }
}
