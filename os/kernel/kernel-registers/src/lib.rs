//! # Typed System Registers
//!
//! Bit-exact models of the control registers the memory subsystem and the
//! fault dispatcher program, built with [`bitfield_struct`].
//!
//! | Feature   | Registers |
//! |-----------|-----------|
//! | `aarch64` | `MAIR_EL1`, `TCR_EL1`, `SCTLR_EL1`, `TTBR0_EL1`, `TTBR1_EL1`, `ESR_EL1`, `VBAR_EL1` |
//! | `asm`     | Real load/store implementations (only on the matching `target_arch`) |
//!
//! Without `asm`, or when compiled for a different architecture, the types
//! are plain values: they can be built, inspected and unit tested on the
//! host, which is how the translation builder derives its configuration.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "aarch64")]
pub mod aarch64;

/// Reads a privileged register.
pub trait LoadRegisterUnsafe {
    /// # Safety
    /// Requires the privilege level of the register (EL1).
    unsafe fn load_unsafe() -> Self;
}

/// Writes a privileged register.
pub trait StoreRegisterUnsafe {
    /// # Safety
    /// Requires the privilege level of the register, and the new value must
    /// describe a configuration the running code survives (valid table
    /// roots, mapped vector table, ...). The caller is responsible for any
    /// barrier needed before the change takes effect.
    unsafe fn store_unsafe(self);
}

/// Reads a register that is accessible without special privileges.
pub trait LoadRegister {
    fn load() -> Self;
}

/// Writes a register that is accessible without special privileges.
pub trait StoreRegister {
    fn store(self);
}

impl<T> LoadRegisterUnsafe for T
where
    T: LoadRegister,
{
    #[inline]
    unsafe fn load_unsafe() -> Self {
        <Self as LoadRegister>::load()
    }
}

impl<T> StoreRegisterUnsafe for T
where
    T: StoreRegister,
{
    #[inline]
    unsafe fn store_unsafe(self) {
        <Self as StoreRegister>::store(self);
    }
}
