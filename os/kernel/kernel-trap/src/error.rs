use crate::CauseClass;
use core::fmt;
use kernel_memory_addresses::VirtualAddress;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum TrapError {
    #[error("vector table at {0:?} is not 2 KiB aligned")]
    MisalignedTable(VirtualAddress),
    #[error("the vector base register did not accept the table")]
    VectorInstallFailed,
}

/// Why a fault could not be handled.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum EscalationReason {
    /// No handler is registered for the cause class.
    NoHandler,
    /// The registered handler returned [`Decline`](crate::Disposition::Decline).
    Declined,
    /// A fault arrived after the dispatcher had already halted.
    Halted,
    /// A fault arrived before the vectors were installed.
    NotInstalled,
}

impl EscalationReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoHandler => "no handler",
            Self::Declined => "handler declined",
            Self::Halted => "already halted",
            Self::NotInstalled => "dispatcher not installed",
        }
    }
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An exception that could not be contained. Execution must not continue.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("unhandled {cause} at pc {pc:#018x} ({reason})")]
pub struct FaultEscalation {
    pub cause: CauseClass,
    pub pc: u64,
    pub fault_address: Option<VirtualAddress>,
    pub reason: EscalationReason,
    /// Whether the register dump reached the sink in full.
    pub dump_written: bool,
}
