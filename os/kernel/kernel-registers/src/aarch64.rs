//! # `AArch64` EL1 System Registers
//!
//! Every register here is a `#[bitfield(u64)]` value. The real `mrs`/`msr`
//! accessors exist only with the `asm` feature on `target_arch = "aarch64"`;
//! stores do not issue an `isb`, the caller sequences barriers explicitly.

mod esr;
mod mair;
mod sctlr;
mod tcr;
mod ttbr;
mod vbar;

pub use esr::{Esr, exception_class};
pub use mair::Mair;
pub use sctlr::Sctlr;
pub use tcr::Tcr;
pub use ttbr::{Ttbr0, Ttbr1};
pub use vbar::Vbar;

/// Implements [`LoadRegisterUnsafe`](crate::LoadRegisterUnsafe) (and
/// optionally [`StoreRegisterUnsafe`](crate::StoreRegisterUnsafe)) via
/// `mrs`/`msr` on the named system register.
macro_rules! system_register {
    ($ty:ty, $name:literal) => {
        #[cfg(all(feature = "asm", target_arch = "aarch64"))]
        impl $crate::LoadRegisterUnsafe for $ty {
            #[inline]
            unsafe fn load_unsafe() -> Self {
                let raw: u64;
                unsafe {
                    core::arch::asm!(
                        concat!("mrs {}, ", $name),
                        out(reg) raw,
                        options(nomem, nostack, preserves_flags)
                    );
                }
                Self::from_bits(raw)
            }
        }
    };
    ($ty:ty, $name:literal, store) => {
        system_register!($ty, $name);

        #[cfg(all(feature = "asm", target_arch = "aarch64"))]
        impl $crate::StoreRegisterUnsafe for $ty {
            #[inline]
            unsafe fn store_unsafe(self) {
                let raw = self.into_bits();
                unsafe {
                    core::arch::asm!(
                        concat!("msr ", $name, ", {}"),
                        in(reg) raw,
                        options(nostack, preserves_flags)
                    );
                }
            }
        }
    };
}

pub(crate) use system_register;
