use super::system_register;
use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalAddress;

/// `TTBR0_EL1`: root table of the low (identity) region.
#[bitfield(u64)]
pub struct Ttbr0 {
    /// Bit 0: common-not-private.
    pub cnp: bool,
    /// Bits 1–47: table base address bits `[47:1]`.
    #[bits(47)]
    baddr: u64,
    /// Bits 48–63: address space identifier.
    pub asid: u16,
}

/// `TTBR1_EL1`: root table of the high region.
#[bitfield(u64)]
pub struct Ttbr1 {
    pub cnp: bool,
    #[bits(47)]
    baddr: u64,
    pub asid: u16,
}

macro_rules! table_base {
    ($ty:ty) => {
        impl $ty {
            /// Builds the register value for a 4 KiB aligned root table.
            #[must_use]
            pub const fn from_table(root: PhysicalAddress) -> Self {
                debug_assert!(root.as_u64().trailing_zeros() >= 12, "root table must be 4K aligned");
                Self::new().with_baddr(root.as_u64() >> 1)
            }

            /// Physical address of the root table.
            #[must_use]
            pub const fn table(self) -> PhysicalAddress {
                PhysicalAddress::new(self.baddr() << 1)
            }
        }
    };
}

table_base!(Ttbr0);
table_base!(Ttbr1);

system_register!(Ttbr0, "ttbr0_el1", store);
system_register!(Ttbr1, "ttbr1_el1", store);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_round_trips_through_register_layout() {
        let root = PhysicalAddress::new(0x4012_3000);
        let ttbr = Ttbr1::from_table(root);
        assert_eq!(ttbr.into_bits(), 0x4012_3000);
        assert_eq!(ttbr.table(), root);
        assert_eq!(Ttbr0::from_table(root).with_asid(3).table(), root);
    }
}
