//! The seam between the builder and the translation hardware.

use crate::{ArchCapabilities, AttributeTable};
use kernel_info::boot::Arch;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_registers::aarch64::Tcr;

/// Register values programmed before the roots are installed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TranslationConfig {
    /// `MAIR_EL1`; unused on `x86_64`, where the power-on `PAT` applies.
    pub mair: u64,
    /// `TCR_EL1`; unused on `x86_64`.
    pub tcr: u64,
}

impl TranslationConfig {
    #[must_use]
    pub const fn for_caps(caps: &ArchCapabilities) -> Self {
        match caps.arch {
            Arch::Aarch64 => Self {
                mair: AttributeTable::mair().into_bits(),
                tcr: aarch64_tcr(caps).into_bits(),
            },
            Arch::X86_64 => Self { mair: 0, tcr: 0 },
        }
    }
}

/// 48-bit halves, 4 KiB granules, write-back inner-shareable walks.
#[allow(clippy::cast_possible_truncation)]
const fn aarch64_tcr(caps: &ArchCapabilities) -> Tcr {
    let size_offset = (64 - caps.va_bits) as u8;
    Tcr::new()
        .with_t0sz(size_offset)
        .with_irgn0(Tcr::WALK_WB_WA)
        .with_orgn0(Tcr::WALK_WB_WA)
        .with_sh0(Tcr::INNER_SHAREABLE)
        .with_tg0(Tcr::TG0_4K)
        .with_t1sz(size_offset)
        .with_irgn1(Tcr::WALK_WB_WA)
        .with_orgn1(Tcr::WALK_WB_WA)
        .with_sh1(Tcr::INNER_SHAREABLE)
        .with_tg1(Tcr::TG1_4K)
        .with_ips(Tcr::IPS_48BIT)
}

/// Operations [`AddressSpace::activate`](crate::AddressSpace::activate) and
/// the memory façade need from the MMU.
///
/// The methods map one-to-one onto instructions or short instruction
/// sequences; ordering between them is the caller's business.
pub trait TranslationHardware {
    /// Programs the attribute and control registers.
    fn configure(&mut self, config: &TranslationConfig);

    /// Makes preceding table writes visible to the table walker.
    fn publish_table_writes(&mut self);

    /// Installs the roots; on single-root hardware `high` equals `low`.
    fn install_roots(&mut self, low: PhysicalAddress, high: PhysicalAddress);

    fn enable_translation(&mut self);

    /// Completes outstanding maintenance and resynchronises the instruction stream.
    fn synchronize(&mut self);

    fn invalidate_all(&mut self);

    fn invalidate_page(&mut self, va: VirtualAddress);

    fn translation_enabled(&self) -> bool;

    /// Reads the word at `pa` before translation is enabled.
    ///
    /// # Safety
    /// `pa` must be readable, 8-byte aligned RAM.
    unsafe fn read_physical(&self, pa: PhysicalAddress) -> u64;

    /// Reads the word at `va` through the current translation.
    ///
    /// # Safety
    /// `va` must be mapped to readable, 8-byte aligned RAM.
    unsafe fn read_virtual(&self, va: VirtualAddress) -> u64;
}

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub use self::aarch64::Aarch64Mmu;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
mod aarch64 {
    use super::{TranslationConfig, TranslationHardware};
    use core::arch::asm;
    use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
    use kernel_registers::aarch64::{Mair, Sctlr, Tcr, Ttbr0, Ttbr1};
    use kernel_registers::{LoadRegisterUnsafe, StoreRegisterUnsafe};

    /// The EL1 stage 1 MMU of the running core.
    pub struct Aarch64Mmu {
        _private: (),
    }

    impl Aarch64Mmu {
        /// # Safety
        /// Must run at EL1, and only one instance may exist.
        #[must_use]
        pub const unsafe fn new() -> Self {
            Self { _private: () }
        }
    }

    impl TranslationHardware for Aarch64Mmu {
        fn configure(&mut self, config: &TranslationConfig) {
            unsafe {
                Mair::from_bits(config.mair).store_unsafe();
                Tcr::from_bits(config.tcr).store_unsafe();
                asm!("isb", options(nostack, preserves_flags));
            }
        }

        fn publish_table_writes(&mut self) {
            unsafe { asm!("dsb ishst", options(nostack, preserves_flags)) };
        }

        fn install_roots(&mut self, low: PhysicalAddress, high: PhysicalAddress) {
            unsafe {
                Ttbr0::from_table(low).store_unsafe();
                Ttbr1::from_table(high).store_unsafe();
            }
        }

        fn enable_translation(&mut self) {
            unsafe {
                // WXN would turn the writable kernel text mapping execute-never.
                let sctlr = Sctlr::load_unsafe()
                    .with_m_mmu(true)
                    .with_c_data_cache(true)
                    .with_i_instruction_cache(true)
                    .with_wxn_write_implies_xn(false);
                sctlr.store_unsafe();
            }
        }

        fn synchronize(&mut self) {
            unsafe { asm!("dsb ish", "isb", options(nostack, preserves_flags)) };
        }

        fn invalidate_all(&mut self) {
            unsafe { asm!("tlbi vmalle1", options(nostack, preserves_flags)) };
        }

        fn invalidate_page(&mut self, va: VirtualAddress) {
            let operand = (va.as_u64() >> 12) & 0x0000_0FFF_FFFF_FFFF;
            unsafe { asm!("tlbi vaae1, {}", in(reg) operand, options(nostack, preserves_flags)) };
        }

        fn translation_enabled(&self) -> bool {
            unsafe { Sctlr::load_unsafe() }.m_mmu()
        }

        unsafe fn read_physical(&self, pa: PhysicalAddress) -> u64 {
            unsafe { core::ptr::read_volatile(pa.as_u64() as *const u64) }
        }

        unsafe fn read_virtual(&self, va: VirtualAddress) -> u64 {
            unsafe { core::ptr::read_volatile(va.as_ptr::<u64>()) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aarch64_tcr_value() {
        let config = TranslationConfig::for_caps(&ArchCapabilities::aarch64());
        let tcr = Tcr::from_bits(config.tcr);
        assert_eq!(tcr.t0sz(), 16);
        assert_eq!(tcr.t1sz(), 16);
        assert_eq!(tcr.tg0(), 0);
        assert_eq!(tcr.tg1(), 2);
        assert_eq!(tcr.sh0(), 3);
        assert_eq!(tcr.sh1(), 3);
        assert_eq!(tcr.irgn0(), 1);
        assert_eq!(tcr.orgn1(), 1);
        assert_eq!(tcr.ips(), 5);
        assert_eq!(config.mair, 0x0000_FFBB_440C_0400);
    }
}
