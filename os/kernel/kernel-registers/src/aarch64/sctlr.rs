use super::system_register;
use bitfield_struct::bitfield;

/// `SCTLR_EL1`, reduced to the bits the memory subsystem toggles.
///
/// The register has several RES1 bits, so it must always be updated by
/// read-modify-write; the padding fields keep whatever was loaded.
#[bitfield(u64)]
pub struct Sctlr {
    /// Bit 0: stage 1 translation enable.
    pub m_mmu: bool,
    /// Bit 1: alignment checking.
    pub a_alignment_check: bool,
    /// Bit 2: data cacheability.
    pub c_data_cache: bool,
    /// Bit 3: SP alignment check at EL1.
    pub sa_stack_alignment: bool,
    /// Bit 4: SP alignment check at EL0.
    pub sa0_stack_alignment_el0: bool,
    #[bits(7)]
    _bits_5_11: u8,
    /// Bit 12: instruction cacheability.
    pub i_instruction_cache: bool,
    #[bits(6)]
    _bits_13_18: u8,
    /// Bit 19: writable memory is execute-never.
    pub wxn_write_implies_xn: bool,
    #[bits(44)]
    _bits_20_63: u64,
}

system_register!(Sctlr, "sctlr_el1", store);
