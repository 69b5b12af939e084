//! # Kernel Entry Point
//!
//! On `aarch64-unknown-none-softfloat` this is the image QEMU boots with
//! `-kernel`; the entry sequence, the trap vectors and the panic handler
//! live in `aarch64.rs`. Hosted builds get a stub so the workspace builds
//! and tests on the development machine.
//!
//! ```bash
//! cargo build -p kernel --target aarch64-unknown-none-softfloat --release
//! qemu-system-aarch64 -M virt -cpu cortex-a72 -m 128M -nographic \
//!     -kernel target/aarch64-unknown-none-softfloat/release/kernel
//! ```

#![cfg_attr(target_os = "none", no_std, no_main)]
#![allow(unsafe_code)]

#[cfg(all(target_os = "none", target_arch = "aarch64"))]
mod aarch64;

#[cfg(all(target_os = "none", not(target_arch = "aarch64")))]
compile_error!("the bare-metal entry point is only implemented for aarch64");

#[cfg(not(target_os = "none"))]
fn main() {
    eprintln!(
        "kernel: this is a bare-metal image; build it for aarch64-unknown-none-softfloat and boot it in QEMU"
    );
}
