use crate::KernelError;
use kernel_alloc::{MemoryManager, MemoryStatistics};
use kernel_info::memory::FRAME_SIZE;
use kernel_memory_addresses::PhysicalAddress;
use kernel_vmem::TranslationHardware;
use log::{debug, info, warn};

/// Page counts requested by [`allocation_self_test`], in order.
pub const SELF_TEST_RUNS: [usize; 3] = [1, 2, 4];

/// Allocates [`SELF_TEST_RUNS`], checks the runs are disjoint, frees them
/// in reverse order and checks the statistics came back unchanged.
///
/// # Errors
/// The allocator's error, or a self-test failure.
pub fn allocation_self_test<H: TranslationHardware>(
    memory: &mut MemoryManager<'_, H>,
) -> Result<MemoryStatistics, KernelError> {
    let before = memory.memory_get_stats();

    let mut runs = [(PhysicalAddress::zero(), 0); SELF_TEST_RUNS.len()];
    for (i, &pages) in SELF_TEST_RUNS.iter().enumerate() {
        match memory.memory_alloc_pages(pages) {
            Ok(base) => {
                debug!("self-test: {pages} page(s) at {base}");
                runs[i] = (base, pages);
            }
            Err(err) => {
                release(memory, &runs[..i])?;
                return Err(err.into());
            }
        }
    }

    let overlapping = runs.iter().enumerate().any(|(i, a)| {
        runs[i + 1..].iter().any(|b| {
            let (a_start, a_end) = span(a);
            let (b_start, b_end) = span(b);
            a_start < b_end && b_start < a_end
        })
    });
    release(memory, &runs)?;
    if overlapping {
        return Err(KernelError::SelfTestOverlap);
    }

    let after = memory.memory_get_stats();
    if after != before {
        let leaked = after.allocated_frames.saturating_sub(before.allocated_frames);
        warn!("self-test: statistics drifted from {before:?} to {after:?}");
        return Err(KernelError::SelfTestLeak { leaked });
    }
    info!(
        "allocation self-test passed: {} of {} frames free",
        after.free_frames, after.total_frames
    );
    Ok(after)
}

fn release<H: TranslationHardware>(
    memory: &mut MemoryManager<'_, H>,
    runs: &[(PhysicalAddress, usize)],
) -> Result<(), KernelError> {
    for &(base, pages) in runs.iter().rev() {
        memory.memory_free_pages(base, pages)?;
    }
    Ok(())
}

fn span(&(base, pages): &(PhysicalAddress, usize)) -> (u64, u64) {
    let start = base.as_u64();
    (start, start + pages as u64 * FRAME_SIZE)
}
