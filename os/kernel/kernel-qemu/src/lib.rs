//! # Low-Level Diagnostic Output
//!
//! The character sink used for log output and for the fault dispatcher's
//! halt dump. It must work before any memory service exists: no
//! allocation, no locks, no interrupts.
//!
//! | Build                         | Backend |
//! |-------------------------------|---------|
//! | `aarch64`, `target_os = "none"` | PL011 data register at [`QEMU_VIRT_UART0`](kernel_info::memory::QEMU_VIRT_UART0), polling `FR.TXFF` |
//! | hosted (tests, tools)         | standard error |
//! | `enabled` feature off         | discarded |
//!
//! ```bash
//! qemu-system-aarch64 -M virt -cpu cortex-a72 -nographic -kernel kernel
//! ```
//!
//! [`DebugSink`] implements [`core::fmt::Write`]; [`qemu_trace!`] formats
//! straight into it and [`QemuLogger`] routes the `log` facade through it.

#![cfg_attr(target_os = "none", no_std)]
#![allow(unsafe_code)]

pub mod logger;

pub use logger::QemuLogger;

use core::fmt;

/// Unbuffered character sink; every byte is emitted immediately.
#[derive(Debug, Default, Copy, Clone)]
pub struct DebugSink;

impl DebugSink {
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            backend::putc(b);
        }
    }
}

impl fmt::Write for DebugSink {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

#[cfg(all(feature = "enabled", target_os = "none", target_arch = "aarch64"))]
mod backend {
    use kernel_info::memory::QEMU_VIRT_UART0;

    const UARTDR: u64 = 0x00;
    const UARTFR: u64 = 0x18;
    const FR_TXFF: u32 = 1 << 5;

    #[inline]
    pub fn putc(byte: u8) {
        let dr = (QEMU_VIRT_UART0 + UARTDR) as *mut u32;
        let fr = (QEMU_VIRT_UART0 + UARTFR) as *const u32;
        // SAFETY: the PL011 window is identity mapped as device memory, or
        // translation is still off.
        unsafe {
            while fr.read_volatile() & FR_TXFF != 0 {
                core::hint::spin_loop();
            }
            dr.write_volatile(u32::from(byte));
        }
    }
}

#[cfg(all(feature = "enabled", not(target_os = "none")))]
mod backend {
    use std::io::Write;

    #[inline]
    pub fn putc(byte: u8) {
        let _ = std::io::stderr().write_all(&[byte]);
    }
}

#[cfg(not(feature = "enabled"))]
mod backend {
    #[inline]
    pub const fn putc(_byte: u8) {}
}

#[doc(hidden)]
#[inline]
pub fn qemu_write(args: fmt::Arguments<'_>) {
    // Best effort; the sink itself never fails.
    let _ = fmt::write(&mut DebugSink, args);
}

/// `print!`-style output straight to the [`DebugSink`], bypassing `log`.
#[macro_export]
macro_rules! qemu_trace {
    ($($arg:tt)*) => {{
        $crate::qemu_write(core::format_args!($($arg)*));
    }};
}
