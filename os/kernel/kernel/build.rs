use kernel_info::memory;
use std::{env, path::PathBuf};

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("set by cargo"));
    let ld = manifest_dir.join("kernel.ld");
    println!("cargo:rerun-if-changed={}", ld.display());

    let load_address = memory::KERNEL_LOAD_ADDRESS;
    assert_eq!(
        load_address & 0xfff,
        0,
        "KERNEL_LOAD_ADDRESS must be 4 KiB aligned (got {load_address:#x})"
    );

    // Hosted builds (tests, the stub binary) link normally.
    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("none") {
        return;
    }

    println!("cargo:rustc-link-arg-bins=-T{}", ld.display());
    println!("cargo:rustc-link-arg-bins=--defsym=KERNEL_LOAD_ADDRESS={load_address:#x}");
}
