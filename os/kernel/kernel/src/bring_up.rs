use crate::KernelError;
use core::fmt;
use kernel_alloc::MemoryManager;
use kernel_info::boot::{Arch, MemoryDescription};
use kernel_sync::{SpinLock, SyncOnceCell};
use kernel_trap::{FaultDispatcher, Installed, VectorInstaller};
use kernel_vmem::{PhysMapper, TranslationHardware};
use log::{debug, info};

/// The dispatcher as the trap vectors see it: created once, then locked
/// per fault.
pub type SharedDispatcher<S> = SyncOnceCell<SpinLock<FaultDispatcher<S>>>;

/// Creates the dispatcher in `cell` and installs the trap vectors.
///
/// `configure` runs before installation, so handlers registered there are
/// live from the first fault on.
///
/// # Errors
/// [`KernelError::DispatcherExists`] if `cell` is already set, otherwise
/// the installer's failure.
pub fn install_dispatcher<S, V>(
    cell: &SharedDispatcher<S>,
    arch: Arch,
    sink: S,
    vectors: &mut V,
    configure: impl FnOnce(&mut FaultDispatcher<S>),
) -> Result<Installed, KernelError>
where
    S: fmt::Write,
    V: VectorInstaller,
{
    let lock = cell
        .set(SpinLock::new(FaultDispatcher::new(arch, sink)))
        .map_err(|_| KernelError::DispatcherExists)?;
    let installed = lock.with_lock(|dispatcher| {
        configure(dispatcher);
        dispatcher.install(vectors)
    })?;
    Ok(installed)
}

/// Installs the dispatcher, then brings the memory subsystem up on top of it.
///
/// # Errors
/// The first failing step; see [`KernelError`].
pub fn bring_up<'a, S, V, M, H>(
    cell: &SharedDispatcher<S>,
    description: &MemoryDescription<'_>,
    sink: S,
    vectors: &mut V,
    mapper: &M,
    hw: H,
) -> Result<MemoryManager<'a, H>, KernelError>
where
    S: fmt::Write,
    V: VectorInstaller,
    M: PhysMapper,
    H: TranslationHardware,
{
    let installed = install_dispatcher(cell, description.arch, sink, vectors, |_| {})?;
    log_memory_map(description);
    let memory = MemoryManager::bring_up(&installed, description, mapper, hw)?;
    info!("memory services online");
    Ok(memory)
}

/// Logs the memory description the boot loader handed over.
pub fn log_memory_map(description: &MemoryDescription<'_>) {
    info!(
        "{:?}: {} memory map entries, kernel image {:?}",
        description.arch,
        description.regions.len(),
        description.kernel
    );
    for entry in description.regions {
        debug!("  {entry:?}");
    }
    for window in description.device_windows {
        debug!("  device window {window:?}");
    }
}
