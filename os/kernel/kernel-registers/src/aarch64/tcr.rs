use super::system_register;
use bitfield_struct::bitfield;

/// `TCR_EL1`: translation control for both halves of the address space.
///
/// Fields suffixed `0` configure walks through `TTBR0_EL1` (low region),
/// fields suffixed `1` walks through `TTBR1_EL1` (high region).
#[bitfield(u64)]
pub struct Tcr {
    /// Bits 0–5: size offset of the low region, VA width is `64 - T0SZ`.
    #[bits(6)]
    pub t0sz: u8,
    #[bits(1)]
    _reserved_6: u8,
    /// Bit 7: disable walks through `TTBR0_EL1`.
    pub epd0: bool,
    /// Bits 8–9: inner cacheability of table walks (1 = WB/WA).
    #[bits(2)]
    pub irgn0: u8,
    /// Bits 10–11: outer cacheability of table walks (1 = WB/WA).
    #[bits(2)]
    pub orgn0: u8,
    /// Bits 12–13: shareability of table walks (3 = inner shareable).
    #[bits(2)]
    pub sh0: u8,
    /// Bits 14–15: granule for `TTBR0_EL1` (0 = 4 KiB).
    #[bits(2)]
    pub tg0: u8,
    /// Bits 16–21: size offset of the high region.
    #[bits(6)]
    pub t1sz: u8,
    /// Bit 22: ASID taken from `TTBR1_EL1` instead of `TTBR0_EL1`.
    pub a1: bool,
    /// Bit 23: disable walks through `TTBR1_EL1`.
    pub epd1: bool,
    #[bits(2)]
    pub irgn1: u8,
    #[bits(2)]
    pub orgn1: u8,
    #[bits(2)]
    pub sh1: u8,
    /// Bits 30–31: granule for `TTBR1_EL1` (2 = 4 KiB; encoding differs from TG0).
    #[bits(2)]
    pub tg1: u8,
    /// Bits 32–34: intermediate physical address size (5 = 48 bits).
    #[bits(3)]
    pub ips: u8,
    #[bits(1)]
    _reserved_35: u8,
    /// Bit 36: 16-bit ASIDs.
    pub as_16bit: bool,
    /// Bit 37: top byte ignored for the low region.
    pub tbi0: bool,
    /// Bit 38: top byte ignored for the high region.
    pub tbi1: bool,
    #[bits(25)]
    _reserved_39_63: u32,
}

impl Tcr {
    /// `TG0` encoding of the 4 KiB granule.
    pub const TG0_4K: u8 = 0b00;
    /// `TG1` encoding of the 4 KiB granule.
    pub const TG1_4K: u8 = 0b10;
    /// `IPS` encoding of a 48-bit physical address space.
    pub const IPS_48BIT: u8 = 0b101;
    /// Write-back, read-allocate, write-allocate cacheable walks.
    pub const WALK_WB_WA: u8 = 0b01;
    pub const INNER_SHAREABLE: u8 = 0b11;
}

system_register!(Tcr, "tcr_el1", store);
