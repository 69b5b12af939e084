//! Entry, trap vectors and panic handling for QEMU `virt`.

use core::arch::global_asm;
use kernel::{KernelError, SharedDispatcher, TrapOutcome, allocation_self_test, bring_up, route_trap};
use kernel_alloc::{BringUpError, IdentityMapper, MemoryManager};
use kernel_info::boot::{
    Arch, BootInfo, BootInfoError, MemoryDescription, MemoryMapEntry, RegionKind,
};
use kernel_info::memory::{
    BOOT_STACK_SIZE, QEMU_VIRT_RAM_BASE, QEMU_VIRT_UART0, QEMU_VIRT_UART0_SIZE,
};
use kernel_memory_addresses::{PhysicalAddress, PhysicalRange, VirtualAddress};
use kernel_qemu::{DebugSink, QemuLogger, qemu_trace};
use kernel_sync::SyncOnceCell;
use kernel_trap::{Aarch64Vectors, TrapFrame};
use kernel_vmem::Aarch64Mmu;
use log::{LevelFilter, error, info, warn};

static LOGGER: QemuLogger = QemuLogger::new(LevelFilter::Info);

static DISPATCHER: SharedDispatcher<DebugSink> = SyncOnceCell::new();

/// Used when `x0` does not point at a [`BootInfo`], e.g. when QEMU loads
/// the image directly and passes a device tree instead.
static QEMU_VIRT_MEMORY_MAP: [MemoryMapEntry; 1] = [MemoryMapEntry::new(
    QEMU_VIRT_RAM_BASE,
    128 * 1024 * 1024,
    RegionKind::Available,
)];

#[repr(C, align(16))]
struct BootStack([u8; BOOT_STACK_SIZE]);

#[unsafe(link_section = ".bss.boot")]
#[unsafe(no_mangle)]
static mut BOOT_STACK: BootStack = BootStack([0; BOOT_STACK_SIZE]);

unsafe extern "C" {
    static __kernel_start: u8;
    static __kernel_end: u8;
    static __exception_vectors: u8;
}

// Secondary cores park; the primary core clears .bss, switches to the boot
// stack and calls `kernel_entry` with the boot loader's x0 untouched.
global_asm!(
    r#"
    .section .text.boot, "ax"
    .global _start
_start:
    mrs     x1, mpidr_el1
    and     x1, x1, #0xff
    cbnz    x1, 3f

    adrp    x1, __bss_start
    add     x1, x1, :lo12:__bss_start
    adrp    x2, __bss_end
    add     x2, x2, :lo12:__bss_end
1:  cmp     x1, x2
    b.hs    2f
    str     xzr, [x1], #8
    b       1b

2:  adrp    x1, {stack}
    add     x1, x1, :lo12:{stack}
    mov     x2, #{stack_size}
    add     sp, x1, x2
    bl      {entry}

3:  wfe
    b       3b
"#,
    stack = sym BOOT_STACK,
    stack_size = const BOOT_STACK_SIZE,
    entry = sym kernel_entry,
);

// Sixteen 128-byte entries. Each saves x0/x1, records its index and joins
// the common path, which completes the TrapFrame and calls `trap_entry`.
global_asm!(
    r#"
    .macro TRAP_VECTOR index
    .balign 0x80
    sub     sp, sp, #{frame}
    stp     x0, x1, [sp, #0]
    mov     x1, #\index
    b       __trap_common
    .endm

    .section .text.vectors, "ax"
    .balign 0x800
    .global __exception_vectors
__exception_vectors:
    TRAP_VECTOR 0
    TRAP_VECTOR 1
    TRAP_VECTOR 2
    TRAP_VECTOR 3
    TRAP_VECTOR 4
    TRAP_VECTOR 5
    TRAP_VECTOR 6
    TRAP_VECTOR 7
    TRAP_VECTOR 8
    TRAP_VECTOR 9
    TRAP_VECTOR 10
    TRAP_VECTOR 11
    TRAP_VECTOR 12
    TRAP_VECTOR 13
    TRAP_VECTOR 14
    TRAP_VECTOR 15

__trap_common:
    stp     x2, x3, [sp, #16]
    stp     x4, x5, [sp, #32]
    stp     x6, x7, [sp, #48]
    stp     x8, x9, [sp, #64]
    stp     x10, x11, [sp, #80]
    stp     x12, x13, [sp, #96]
    stp     x14, x15, [sp, #112]
    stp     x16, x17, [sp, #128]
    stp     x18, x19, [sp, #144]
    stp     x20, x21, [sp, #160]
    stp     x22, x23, [sp, #176]
    stp     x24, x25, [sp, #192]
    stp     x26, x27, [sp, #208]
    stp     x28, x29, [sp, #224]
    str     x30, [sp, #240]
    add     x2, sp, #{frame}
    mrs     x3, elr_el1
    stp     x2, x3, [sp, #248]
    mrs     x2, spsr_el1
    mrs     x3, esr_el1
    stp     x2, x3, [sp, #264]
    mrs     x2, far_el1
    str     x2, [sp, #280]

    mov     x0, sp
    bl      {trap_entry}

    ldp     x2, x3, [sp, #256]
    msr     elr_el1, x2
    msr     spsr_el1, x3
    ldp     x2, x3, [sp, #16]
    ldp     x4, x5, [sp, #32]
    ldp     x6, x7, [sp, #48]
    ldp     x8, x9, [sp, #64]
    ldp     x10, x11, [sp, #80]
    ldp     x12, x13, [sp, #96]
    ldp     x14, x15, [sp, #112]
    ldp     x16, x17, [sp, #128]
    ldp     x18, x19, [sp, #144]
    ldp     x20, x21, [sp, #160]
    ldp     x22, x23, [sp, #176]
    ldp     x24, x25, [sp, #192]
    ldp     x26, x27, [sp, #208]
    ldp     x28, x29, [sp, #224]
    ldr     x30, [sp, #240]
    ldp     x0, x1, [sp, #0]
    add     sp, sp, #{frame}
    eret
"#,
    frame = const TrapFrame::SIZE,
    trap_entry = sym trap_entry,
);

/// Rust side of `_start`; runs on the boot stack with translation off.
#[unsafe(no_mangle)]
extern "C" fn kernel_entry(boot_info: *const BootInfo) -> ! {
    qemu_trace!("kernel: entered\n");
    if LOGGER.init().is_err() {
        qemu_trace!("kernel: logger already registered\n");
    }

    match kernel_main(boot_info) {
        Ok(memory) => {
            info!("bring-up complete: {:?}", memory.memory_get_stats());
            park()
        }
        Err(err) => {
            error!("bring-up failed: {err}");
            park()
        }
    }
}

fn kernel_main(boot_info: *const BootInfo) -> Result<MemoryManager<'static, Aarch64Mmu>, KernelError> {
    let uart = PhysicalRange::new(PhysicalAddress::new(QEMU_VIRT_UART0), QEMU_VIRT_UART0_SIZE);
    let description = describe(boot_info, uart.as_slice())?;

    // SAFETY: `__exception_vectors` is the 2 KiB aligned table above, and
    // it lies in the kernel image, which stays mapped executable.
    let mut vectors =
        unsafe { Aarch64Vectors::new(VirtualAddress::from_ptr(&raw const __exception_vectors)) };
    // SAFETY: we run at EL1 on the only core that was allowed past `_start`.
    let hw = unsafe { Aarch64Mmu::new() };

    let mut memory = bring_up(&DISPATCHER, &description, DebugSink, &mut vectors, &IdentityMapper, hw)?;
    allocation_self_test(&mut memory)?;
    Ok(memory)
}

/// The boot loader's description, or the QEMU `virt` defaults if `x0`
/// holds something else.
fn describe<'a>(
    boot_info: *const BootInfo,
    devices: &'a [PhysicalRange],
) -> Result<MemoryDescription<'a>, KernelError> {
    // SAFETY: the boot loader passes either null or readable memory in x0.
    if let Some(info) = unsafe { boot_info.as_ref() } {
        // SAFETY: the map pointer is only followed once the magic matched,
        // and the boot loader keeps the map alive.
        match unsafe { info.describe(devices) } {
            Ok(description) => return Ok(description),
            Err(err) => warn!("ignoring boot info: {err}"),
        }
    }

    let start = PhysicalAddress::from_ptr(&raw const __kernel_start);
    let end = PhysicalAddress::from_ptr(&raw const __kernel_end);
    let kernel = PhysicalRange::from_bounds(start, end)
        .ok_or(BringUpError::Boot(BootInfoError::InvalidKernelRange))?;
    Ok(MemoryDescription {
        arch: Arch::Aarch64,
        regions: &QEMU_VIRT_MEMORY_MAP,
        kernel,
        device_windows: devices,
    })
}

/// Called by `__trap_common` with the saved frame.
#[unsafe(no_mangle)]
extern "C" fn trap_entry(frame: &mut TrapFrame, vector: u64) {
    match route_trap(&DISPATCHER, frame, vector) {
        TrapOutcome::Resume => {}
        TrapOutcome::Halt(escalation) => {
            if !escalation.dump_written {
                qemu_trace!(
                    "kernel: register dump incomplete; pc {:#018x} far {:?}\n",
                    escalation.pc,
                    escalation.fault_address
                );
            }
            qemu_trace!("kernel: {escalation}; halting\n");
            park()
        }
        TrapOutcome::Recursive => {
            qemu_trace!("kernel: fault while dispatching a fault; halting\n");
            park()
        }
        TrapOutcome::NoDispatcher => {
            qemu_trace!("kernel: trap before the dispatcher existed; halting\n");
            park()
        }
    }
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo<'_>) -> ! {
    qemu_trace!("kernel panic: {info}\n");
    park()
}

fn park() -> ! {
    loop {
        // SAFETY: `wfe` only waits for an event.
        unsafe { core::arch::asm!("wfe", options(nomem, nostack, preserves_flags)) };
    }
}
