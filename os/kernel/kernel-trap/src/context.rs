use crate::CauseClass;
use kernel_memory_addresses::VirtualAddress;

/// Machine state saved by the vector stubs, in the order they push it.
///
/// On aarch64 `pc`, `status`, `syndrome` and `fault_address` hold
/// `ELR_EL1`, `SPSR_EL1`, `ESR_EL1` and `FAR_EL1`. On `x86_64` only the
/// first 16 registers are used, `syndrome` holds the error code and
/// `fault_address` holds `CR2`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TrapFrame {
    pub gpr: [u64; 31],
    pub sp: u64,
    pub pc: u64,
    pub status: u64,
    pub syndrome: u64,
    pub fault_address: u64,
}

impl TrapFrame {
    /// Byte size of the frame; the vector stubs reserve exactly this much.
    pub const SIZE: usize = 36 * 8;
}

const _: () = assert!(size_of::<TrapFrame>() == TrapFrame::SIZE);
const _: () = assert!(TrapFrame::SIZE.is_multiple_of(16));

/// The saved exception context handed to a fault handler.
///
/// Handlers receive a private copy. On [`Resume`](crate::Disposition::Resume)
/// the dispatcher writes it back into the trap frame, so edits made here
/// (skipping the faulting instruction, patching a return register) take
/// effect when execution continues.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ExceptionContext {
    frame: TrapFrame,
    cause: CauseClass,
}

impl ExceptionContext {
    #[must_use]
    pub const fn new(frame: TrapFrame, cause: CauseClass) -> Self {
        Self { frame, cause }
    }

    #[must_use]
    pub const fn cause(&self) -> CauseClass {
        self.cause
    }

    /// Address of the faulting instruction.
    #[must_use]
    pub const fn pc(&self) -> u64 {
        self.frame.pc
    }

    pub const fn set_pc(&mut self, pc: u64) {
        self.frame.pc = pc;
    }

    /// Skips `bytes` of instruction stream, e.g. `4` for one A64 instruction.
    pub const fn advance_pc(&mut self, bytes: u64) {
        self.frame.pc = self.frame.pc.wrapping_add(bytes);
    }

    /// Faulting data address, for the classes that report one.
    #[must_use]
    pub const fn fault_address(&self) -> Option<VirtualAddress> {
        if self.cause.has_fault_address() {
            Some(VirtualAddress::new(self.frame.fault_address))
        } else {
            None
        }
    }

    #[must_use]
    pub const fn syndrome(&self) -> u64 {
        self.frame.syndrome
    }

    #[must_use]
    pub const fn status(&self) -> u64 {
        self.frame.status
    }

    #[must_use]
    pub const fn sp(&self) -> u64 {
        self.frame.sp
    }

    #[must_use]
    pub const fn registers(&self) -> &[u64; 31] {
        &self.frame.gpr
    }

    pub const fn registers_mut(&mut self) -> &mut [u64; 31] {
        &mut self.frame.gpr
    }

    #[must_use]
    pub const fn frame(&self) -> &TrapFrame {
        &self.frame
    }

    pub(crate) const fn into_frame(self) -> TrapFrame {
        self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_address_only_for_memory_faults() {
        let frame = TrapFrame {
            fault_address: 0xdead_0000,
            ..TrapFrame::default()
        };
        let abort = ExceptionContext::new(frame, CauseClass::DataAbort);
        assert_eq!(abort.fault_address(), Some(VirtualAddress::new(0xdead_0000)));

        let irq = ExceptionContext::new(frame, CauseClass::Interrupt);
        assert_eq!(irq.fault_address(), None);
    }

    #[test]
    fn edits_are_carried_by_the_frame() {
        let mut ctx = ExceptionContext::new(
            TrapFrame {
                pc: 0x4008_1000,
                ..TrapFrame::default()
            },
            CauseClass::Undefined,
        );
        ctx.advance_pc(4);
        ctx.registers_mut()[0] = 7;
        let frame = ctx.into_frame();
        assert_eq!(frame.pc, 0x4008_1004);
        assert_eq!(frame.gpr[0], 7);
    }
}
