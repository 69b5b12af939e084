//! Trap vector installation and the witness that it happened.

use crate::TrapError;

/// Points the CPU at the kernel's trap vectors.
///
/// Implementations must leave every vector entry valid once `install`
/// returns `Ok`; entries without a registered handler still reach the
/// dispatcher, which escalates them.
pub trait VectorInstaller {
    /// # Errors
    /// Fails if the hardware did not accept the vector table.
    fn install(&mut self) -> Result<(), TrapError>;
}

/// Proof that trap vectors are live.
///
/// Only [`FaultDispatcher::install`](crate::FaultDispatcher::install) can
/// create one. Memory services take it by reference, so they cannot be
/// initialized (or fault) before faults can be reported.
#[derive(Debug)]
pub struct Installed {
    _private: (),
}

impl Installed {
    pub(crate) const fn new() -> Self {
        Self { _private: () }
    }
}

/// Installs a vector table through `VBAR_EL1` and reads it back.
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
#[derive(Debug)]
pub struct Aarch64Vectors {
    table: kernel_memory_addresses::VirtualAddress,
}

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
impl Aarch64Vectors {
    /// # Safety
    /// `table` must be the address of a complete 16-entry vector table that
    /// stays mapped and executable for the lifetime of the kernel.
    #[must_use]
    pub const unsafe fn new(table: kernel_memory_addresses::VirtualAddress) -> Self {
        Self { table }
    }
}

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
impl VectorInstaller for Aarch64Vectors {
    fn install(&mut self) -> Result<(), TrapError> {
        use kernel_registers::aarch64::Vbar;
        use kernel_registers::{LoadRegisterUnsafe, StoreRegisterUnsafe};

        let vbar = Vbar::from_table(self.table).ok_or(TrapError::MisalignedTable(self.table))?;
        // SAFETY: we run at EL1 and the table is valid per `new`.
        let readback = unsafe {
            vbar.store_unsafe();
            core::arch::asm!("isb", options(nostack, preserves_flags));
            Vbar::load_unsafe()
        };
        if readback.into_bits() == vbar.into_bits() {
            Ok(())
        } else {
            Err(TrapError::VectorInstallFailed)
        }
    }
}
