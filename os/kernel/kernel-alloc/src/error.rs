use kernel_info::boot::BootInfoError;
use kernel_trap::TrapError;
use kernel_vmem::{ActivationError, ArenaError, MappingError};

/// Failures of the frame allocator and of the frame-based façade calls.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum AllocError {
    #[error("no run of free frames is large enough")]
    OutOfMemory,
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] InvalidArgument),
}

/// Why an argument was rejected.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum InvalidArgument {
    #[error("zero frames requested")]
    ZeroCount,
    #[error("run lies outside the managed region")]
    OutOfRegion,
    #[error("address is not frame aligned")]
    Misaligned,
    #[error("frame is not allocated")]
    NotAllocated,
    #[error("run does not match a single allocation")]
    RunMismatch,
    #[error("region holds no whole frame")]
    EmptyRegion,
    #[error("memory map has no usable region")]
    NoUsableRegion,
}

/// Everything that can stop the memory subsystem from coming up.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum BringUpError {
    #[error(transparent)]
    Boot(#[from] BootInfoError),
    #[error(transparent)]
    Trap(#[from] TrapError),
    #[error(transparent)]
    Alloc(#[from] AllocError),
    #[error(transparent)]
    Arena(#[from] ArenaError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Activation(#[from] ActivationError),
}
