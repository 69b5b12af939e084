use crate::Region;
use kernel_memory_addresses::VirtualAddress;

/// Rejections of [`AddressSpace::map`](crate::AddressSpace::map) and
/// [`AddressSpace::unmap`](crate::AddressSpace::unmap).
///
/// Every variant is reported before the tables or the record set are touched.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum MappingError {
    #[error("address or length is not 4 KiB aligned, or the length is zero")]
    Alignment,
    #[error("range overlaps a mapping with different attributes or offset")]
    Conflict,
    #[error("range wraps or leaves its canonical half")]
    InvalidRange,
    #[error("physical target lies outside every registered window")]
    InvalidTarget,
    #[error("range is not completely mapped")]
    NotMapped,
    #[error("out of table nodes or mapping records")]
    OutOfMemory,
}

/// Rejections of the memory handed to a [`TableArena`](crate::TableArena).
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ArenaError {
    #[error("node pool base is not 4 KiB aligned")]
    Misaligned,
    #[error("node pool is empty")]
    Empty,
    #[error("node pool exceeds the arena capacity")]
    TooLarge,
}

/// Why translation could not be brought up.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ActivationError {
    #[error("the {0} region has no mappings")]
    MissingRegion(Region),
    #[error("translation failed: {0}")]
    Fatal(FatalReason),
}

/// Unrecoverable outcomes of the post-enable probe.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum FatalReason {
    #[error("translation is not enabled after the enable sequence")]
    NotEnabled,
    #[error("probe at {virt} read {observed:#x}, expected {expected:#x}")]
    ProbeMismatch {
        virt: VirtualAddress,
        expected: u64,
        observed: u64,
    },
}
