//! # Memory Layout

/// Size of one physical frame and of the translation granule.
pub const FRAME_SIZE: u64 = 4096;

/// Size of a level-2 block mapping.
pub const BLOCK_SIZE: u64 = 2 * 1024 * 1024;

/// Physical memory below this address is never handed to the frame
/// allocator (firmware tables, legacy areas, the boot loader's own data).
pub const LOW_MEMORY_RESERVED: u64 = 0x0010_0000; // 1 MiB

/// Upper bound on the frames tracked by one allocator bitmap (128 MiB).
pub const MAX_FRAMES: usize = 32 * 1024;

/// Frames drawn from the allocator to back translation-table nodes.
pub const NODE_POOL_FRAMES: usize = 64;

/// First address of the high region on aarch64 (`TTBR1_EL1`, 48-bit VA).
pub const AARCH64_HIGH_BASE: u64 = 0xffff_0000_0000_0000;

/// First address of the higher half on `x86_64` (4-level paging).
pub const X86_64_HIGH_BASE: u64 = 0xffff_8000_0000_0000;

/// Start of RAM on the QEMU `virt` machine.
pub const QEMU_VIRT_RAM_BASE: u64 = 0x4000_0000;

/// PL011 UART on the QEMU `virt` machine.
pub const QEMU_VIRT_UART0: u64 = 0x0900_0000;

/// Size of the PL011 register window.
pub const QEMU_VIRT_UART0_SIZE: u64 = 0x1000;

/// Where QEMU places a raw `-kernel` image on aarch64 `virt`.
///
/// # Kernel Build
/// Sourced by the kernel's `build.rs` to configure the linker.
pub const KERNEL_LOAD_ADDRESS: u64 = QEMU_VIRT_RAM_BASE + 0x8_0000;

/// Stack used from the entry point until bring-up completes.
pub const BOOT_STACK_SIZE: usize = 64 * 1024;

const _: () = {
    assert!(FRAME_SIZE.is_power_of_two());
    assert!(BLOCK_SIZE.is_multiple_of(FRAME_SIZE));
    assert!(LOW_MEMORY_RESERVED.is_multiple_of(FRAME_SIZE));
    assert!(MAX_FRAMES.is_multiple_of(64));
    assert!(NODE_POOL_FRAMES <= 256);
    assert!(BOOT_STACK_SIZE.is_multiple_of(4096));
    assert!(KERNEL_LOAD_ADDRESS.is_multiple_of(FRAME_SIZE));
    assert!(X86_64_HIGH_BASE > AARCH64_HIGH_BASE);
};
