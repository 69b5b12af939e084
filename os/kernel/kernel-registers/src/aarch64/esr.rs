use super::system_register;
use bitfield_struct::bitfield;

/// `ESR_EL1`: syndrome of the exception taken to EL1.
#[bitfield(u64)]
pub struct Esr {
    /// Bits 0–24: instruction specific syndrome.
    #[bits(25)]
    pub iss: u32,
    /// Bit 25: 32-bit instruction length.
    pub il: bool,
    /// Bits 26–31: exception class, see [`exception_class`].
    #[bits(6)]
    pub ec: u8,
    /// Bits 32–36: ISS2 (`FEAT_LS64` and friends).
    #[bits(5)]
    pub iss2: u8,
    #[bits(27)]
    _reserved_37_63: u32,
}

impl Esr {
    /// Data/instruction fault status code (`ISS[5:0]`) for aborts.
    #[must_use]
    pub const fn fault_status(self) -> u8 {
        (self.iss() & 0x3F) as u8
    }
}

/// Values of [`Esr::ec`].
pub mod exception_class {
    pub const UNKNOWN: u8 = 0x00;
    pub const ILLEGAL_STATE: u8 = 0x0E;
    pub const SVC64: u8 = 0x15;
    pub const INSTRUCTION_ABORT_LOWER_EL: u8 = 0x20;
    pub const INSTRUCTION_ABORT_SAME_EL: u8 = 0x21;
    pub const PC_ALIGNMENT: u8 = 0x22;
    pub const DATA_ABORT_LOWER_EL: u8 = 0x24;
    pub const DATA_ABORT_SAME_EL: u8 = 0x25;
    pub const SP_ALIGNMENT: u8 = 0x26;
    pub const SERROR: u8 = 0x2F;
    pub const BRK64: u8 = 0x3C;

    /// DFSC reported by a data abort caused by a misaligned access.
    pub const DFSC_ALIGNMENT: u8 = 0x21;
}

system_register!(Esr, "esr_el1");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_data_abort_syndrome() {
        // EC=0x25, IL=1, DFSC=0x07 (translation fault, level 3)
        let esr = Esr::from_bits(0x9600_0007);
        assert_eq!(esr.ec(), exception_class::DATA_ABORT_SAME_EL);
        assert!(esr.il());
        assert_eq!(esr.fault_status(), 0x07);
    }
}
