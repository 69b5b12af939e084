use kernel_alloc::{AllocError, BringUpError};
use kernel_trap::TrapError;

/// Why the kernel could not reach its idle loop.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum KernelError {
    #[error(transparent)]
    BringUp(#[from] BringUpError),
    #[error(transparent)]
    Alloc(#[from] AllocError),
    #[error("the fault dispatcher was already created")]
    DispatcherExists,
    #[error("allocation self-test received overlapping runs")]
    SelfTestOverlap,
    #[error("allocation self-test left {leaked} frames allocated")]
    SelfTestLeak { leaked: u64 },
}

impl From<TrapError> for KernelError {
    fn from(err: TrapError) -> Self {
        Self::BringUp(err.into())
    }
}
