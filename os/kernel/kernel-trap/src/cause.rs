//! Cause classification for aarch64 and `x86_64` exceptions.

use bitfield_struct::bitfield;
use core::fmt;
use kernel_registers::aarch64::{Esr, exception_class as ec};

/// Dispatch key of the fault dispatcher.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CauseClass {
    InstructionAbort = 0,
    DataAbort = 1,
    Alignment = 2,
    Undefined = 3,
    Interrupt = 4,
    Other = 5,
}

impl CauseClass {
    pub const COUNT: usize = 6;

    pub const ALL: [Self; Self::COUNT] = [
        Self::InstructionAbort,
        Self::DataAbort,
        Self::Alignment,
        Self::Undefined,
        Self::Interrupt,
        Self::Other,
    ];

    /// Slot in the handler table.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::InstructionAbort => "instruction abort",
            Self::DataAbort => "data abort",
            Self::Alignment => "alignment fault",
            Self::Undefined => "undefined operation",
            Self::Interrupt => "interrupt",
            Self::Other => "other",
        }
    }

    /// Whether the hardware reports a faulting data address for this class.
    #[must_use]
    pub const fn has_fault_address(self) -> bool {
        matches!(
            self,
            Self::InstructionAbort | Self::DataAbort | Self::Alignment
        )
    }

    /// Classifies an exception taken to EL1.
    ///
    /// Asynchronous vectors are decided by their kind alone; synchronous ones
    /// by the syndrome's exception class. Data aborts whose fault status says
    /// "alignment" are reported as [`CauseClass::Alignment`].
    #[must_use]
    pub const fn from_aarch64(kind: VectorKind, esr: Esr) -> Self {
        match kind {
            VectorKind::Irq | VectorKind::Fiq => Self::Interrupt,
            VectorKind::SError => Self::Other,
            VectorKind::Synchronous => match esr.ec() {
                ec::INSTRUCTION_ABORT_LOWER_EL | ec::INSTRUCTION_ABORT_SAME_EL => {
                    Self::InstructionAbort
                }
                ec::DATA_ABORT_LOWER_EL | ec::DATA_ABORT_SAME_EL => {
                    if esr.fault_status() == ec::DFSC_ALIGNMENT {
                        Self::Alignment
                    } else {
                        Self::DataAbort
                    }
                }
                ec::PC_ALIGNMENT | ec::SP_ALIGNMENT => Self::Alignment,
                ec::UNKNOWN | ec::ILLEGAL_STATE => Self::Undefined,
                _ => Self::Other,
            },
        }
    }

    /// Classifies an `x86_64` exception vector and its error code.
    #[must_use]
    pub const fn from_x86_64(vector: u8, error_code: u64) -> Self {
        match vector {
            x86_vector::PAGE_FAULT => {
                if PageFaultErrorCode::from_bits(error_code).instruction_fetch() {
                    Self::InstructionAbort
                } else {
                    Self::DataAbort
                }
            }
            x86_vector::ALIGNMENT_CHECK => Self::Alignment,
            x86_vector::INVALID_OPCODE => Self::Undefined,
            v if v >= x86_vector::FIRST_EXTERNAL => Self::Interrupt,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for CauseClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which of the four entries of a vector table group was taken.
#[repr(u64)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VectorKind {
    Synchronous = 0,
    Irq = 1,
    Fiq = 2,
    SError = 3,
}

impl VectorKind {
    /// Decodes the entry index `0..16` passed by the vector stubs; only the
    /// position within the group matters.
    #[must_use]
    pub const fn from_entry(entry: u64) -> Self {
        match entry & 3 {
            0 => Self::Synchronous,
            1 => Self::Irq,
            2 => Self::Fiq,
            _ => Self::SError,
        }
    }
}

/// `x86_64` exception vectors relevant to classification.
pub mod x86_vector {
    pub const INVALID_OPCODE: u8 = 6;
    pub const PAGE_FAULT: u8 = 14;
    pub const ALIGNMENT_CHECK: u8 = 17;
    pub const FIRST_EXTERNAL: u8 = 32;
}

/// `x86_64` page-fault error code (Intel SDM Vol. 3A, §4.7).
#[bitfield(u64)]
pub struct PageFaultErrorCode {
    /// Protection violation rather than a non-present page.
    pub present: bool,
    pub write: bool,
    pub user: bool,
    pub reserved_bit: bool,
    pub instruction_fetch: bool,
    pub protection_key: bool,
    pub shadow_stack: bool,
    #[bits(57)]
    __: u64,
}
