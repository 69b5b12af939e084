//! Bookkeeping of what is mapped and what may be mapped.

use crate::{MappingAttributes, MemoryKind};
use kernel_memory_addresses::{PhysicalAddress, PhysicalRange, VirtualAddress};

/// Capacity of the [`MappedRanges`] record set.
pub const MAX_MAPPED_RANGES: usize = 64;

/// Capacity of the [`PhysicalWindows`] set.
pub const MAX_PHYSICAL_WINDOWS: usize = 16;

/// One contiguous mapping `[virt, virt + length) → [phys, phys + length)`.
///
/// Bounds are handled as inclusive last addresses, so a record may end at
/// the top of the address space.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MappedRange {
    pub virt: VirtualAddress,
    pub phys: PhysicalAddress,
    pub length: u64,
    pub attributes: MappingAttributes,
}

impl MappedRange {
    const EMPTY: Self = Self {
        virt: VirtualAddress::zero(),
        phys: PhysicalAddress::zero(),
        length: 0,
        attributes: MappingAttributes::new(MemoryKind::Normal, false),
    };

    /// Last virtual address inside the range.
    #[inline]
    #[must_use]
    pub const fn virt_last(&self) -> u64 {
        self.virt.as_u64() + (self.length - 1)
    }

    /// Physical address `va` translates to; `va` must lie inside the range.
    #[inline]
    #[must_use]
    pub const fn phys_at(&self, va: u64) -> u64 {
        self.phys.as_u64() + (va - self.virt.as_u64())
    }

    /// Whether mapping `va → pa` with `attributes` agrees with this record:
    /// same attributes and the same VA→PA offset.
    #[must_use]
    pub fn agrees_with(&self, va: u64, pa: u64, attributes: MappingAttributes) -> bool {
        self.attributes == attributes
            && self.phys.as_u64().wrapping_sub(self.virt.as_u64()) == pa.wrapping_sub(va)
    }

    fn continues_into(&self, next: &Self) -> bool {
        self.virt_last().checked_add(1) == Some(next.virt.as_u64())
            && next.agrees_with(self.virt.as_u64(), self.phys.as_u64(), self.attributes)
    }
}

/// Sorted set of non-overlapping [`MappedRange`]s.
///
/// Adjacent records with the same attributes and offset are coalesced.
pub struct MappedRanges {
    records: [MappedRange; MAX_MAPPED_RANGES],
    len: usize,
}

impl Default for MappedRanges {
    fn default() -> Self {
        Self::new()
    }
}

impl MappedRanges {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: [MappedRange::EMPTY; MAX_MAPPED_RANGES],
            len: 0,
        }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[MappedRange] {
        &self.records[..self.len]
    }

    #[must_use]
    pub const fn free_slots(&self) -> usize {
        MAX_MAPPED_RANGES - self.len
    }

    /// Records intersecting `[start, last]`, in address order.
    pub fn overlapping(&self, start: u64, last: u64) -> impl Iterator<Item = &MappedRange> {
        self.as_slice()
            .iter()
            .filter(move |r| r.virt.as_u64() <= last && start <= r.virt_last())
    }

    /// The record containing `va`.
    #[must_use]
    pub fn find(&self, va: u64) -> Option<&MappedRange> {
        self.as_slice()
            .iter()
            .find(|r| r.virt.as_u64() <= va && va <= r.virt_last())
    }

    /// Sub-ranges `(first, last)` of `[start, last]` not covered by any
    /// record, in order.
    #[must_use]
    pub fn gaps(&self, start: u64, last: u64) -> Gaps<'_> {
        Gaps {
            records: self.as_slice(),
            cursor: Some(start),
            last,
        }
    }

    #[must_use]
    pub fn covers(&self, start: u64, last: u64) -> bool {
        self.gaps(start, last).next().is_none()
    }

    /// Extra slots [`MappedRanges::remove`] needs for `[start, last]`.
    #[must_use]
    pub fn removal_growth(&self, start: u64, last: u64) -> usize {
        usize::from(
            self.find(start)
                .is_some_and(|r| r.virt.as_u64() < start && last < r.virt_last()),
        )
    }

    /// Inserts an uncovered range, merging it with compatible neighbours.
    ///
    /// # Errors
    /// Returns the record back if no slot is left.
    pub fn insert(&mut self, record: MappedRange) -> Result<(), MappedRange> {
        let at = self.as_slice().partition_point(|r| r.virt < record.virt);

        let joins_left = at > 0 && self.records[at - 1].continues_into(&record);
        let joins_right = at < self.len && record.continues_into(&self.records[at]);

        match (joins_left, joins_right) {
            (true, true) => {
                self.records[at - 1].length += record.length + self.records[at].length;
                self.remove_slot(at);
            }
            (true, false) => self.records[at - 1].length += record.length,
            (false, true) => {
                let right = &mut self.records[at];
                right.virt = record.virt;
                right.phys = record.phys;
                right.length += record.length;
            }
            (false, false) => {
                if self.len == MAX_MAPPED_RANGES {
                    return Err(record);
                }
                self.records.copy_within(at..self.len, at + 1);
                self.records[at] = record;
                self.len += 1;
            }
        }
        Ok(())
    }

    /// Removes `[start, last]` from every record, trimming or splitting the
    /// records it touches. The caller checks [`MappedRanges::removal_growth`].
    pub fn remove(&mut self, start: u64, last: u64) {
        let mut i = 0;
        while i < self.len {
            let r = self.records[i];
            let (r_start, r_last) = (r.virt.as_u64(), r.virt_last());
            if r_last < start || last < r_start {
                i += 1;
                continue;
            }

            let keep_left = r_start < start;
            let keep_right = last < r_last;
            match (keep_left, keep_right) {
                (false, false) => {
                    self.remove_slot(i);
                    continue;
                }
                (true, false) => self.records[i].length = start - r_start,
                (false, true) => self.records[i] = tail(&r, last + 1),
                (true, true) => {
                    if self.len == MAX_MAPPED_RANGES {
                        // Unreachable after a `removal_growth` check.
                        return;
                    }
                    self.records[i].length = start - r_start;
                    self.records.copy_within(i + 1..self.len, i + 2);
                    self.records[i + 1] = tail(&r, last + 1);
                    self.len += 1;
                    i += 1;
                }
            }
            i += 1;
        }
    }

    fn remove_slot(&mut self, at: usize) {
        self.records.copy_within(at + 1..self.len, at);
        self.len -= 1;
    }
}

/// The part of `r` from `va` on.
fn tail(r: &MappedRange, va: u64) -> MappedRange {
    MappedRange {
        virt: VirtualAddress::new(va),
        phys: PhysicalAddress::new(r.phys_at(va)),
        length: r.virt_last() - va + 1,
        attributes: r.attributes,
    }
}

/// Iterator returned by [`MappedRanges::gaps`].
pub struct Gaps<'r> {
    records: &'r [MappedRange],
    /// Next uncovered candidate; `None` once the top of the space is passed.
    cursor: Option<u64>,
    last: u64,
}

impl Iterator for Gaps<'_> {
    type Item = (u64, u64);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(cursor) = self.cursor.filter(|&c| c <= self.last) {
            let records = self.records;
            match records.split_first() {
                Some((r, rest)) if r.virt_last() < cursor => self.records = rest,
                Some((r, rest)) if r.virt.as_u64() <= cursor => {
                    self.cursor = r.virt_last().checked_add(1);
                    self.records = rest;
                }
                next => {
                    let gap_last =
                        next.map_or(self.last, |(r, _)| (r.virt.as_u64() - 1).min(self.last));
                    self.cursor = gap_last.checked_add(1);
                    return Some((cursor, gap_last));
                }
            }
        }
        None
    }
}

/// Physical ranges leaf descriptors may point into.
#[derive(Debug, Default)]
pub struct PhysicalWindows {
    windows: [Option<PhysicalRange>; MAX_PHYSICAL_WINDOWS],
}

impl PhysicalWindows {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            windows: [None; MAX_PHYSICAL_WINDOWS],
        }
    }

    /// Registers `range`. Returns `false` when the set is full.
    pub fn allow(&mut self, range: PhysicalRange) -> bool {
        if self.windows.iter().flatten().any(|w| w.contains_range(&range)) {
            return true;
        }
        match self.windows.iter_mut().find(|w| w.is_none()) {
            Some(slot) => {
                *slot = Some(range);
                true
            }
            None => false,
        }
    }

    /// Whether `[start, start + length)` lies inside a single window.
    #[must_use]
    pub fn permits(&self, start: PhysicalAddress, length: u64) -> bool {
        PhysicalRange::new(start, length).is_some_and(|range| {
            self.windows
                .iter()
                .flatten()
                .any(|w| w.contains_range(&range))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(virt: u64, phys: u64, length: u64) -> MappedRange {
        MappedRange {
            virt: VirtualAddress::new(virt),
            phys: PhysicalAddress::new(phys),
            length,
            attributes: MappingAttributes::new(MemoryKind::Normal, false),
        }
    }

    #[test]
    fn adjacent_compatible_records_coalesce() {
        let mut set = MappedRanges::new();
        set.insert(record(0x3000, 0x3000, 0x1000)).unwrap();
        set.insert(record(0x1000, 0x1000, 0x1000)).unwrap();
        assert_eq!(set.as_slice().len(), 2);

        set.insert(record(0x2000, 0x2000, 0x1000)).unwrap();
        assert_eq!(set.as_slice(), &[record(0x1000, 0x1000, 0x3000)]);
    }

    #[test]
    fn different_offset_does_not_coalesce() {
        let mut set = MappedRanges::new();
        set.insert(record(0x1000, 0x1000, 0x1000)).unwrap();
        set.insert(record(0x2000, 0x9000, 0x1000)).unwrap();
        assert_eq!(set.as_slice().len(), 2);
    }

    #[test]
    fn gaps_between_records() {
        let mut set = MappedRanges::new();
        set.insert(record(0x2000, 0x2000, 0x1000)).unwrap();
        set.insert(record(0x5000, 0x5000, 0x2000)).unwrap();

        let gaps: Vec<_> = set.gaps(0x1000, 0x7FFF).collect();
        assert_eq!(gaps, [(0x1000, 0x1FFF), (0x3000, 0x4FFF), (0x7000, 0x7FFF)]);
        assert!(set.covers(0x5000, 0x6FFF));
        assert!(!set.covers(0x2000, 0x3FFF));
        assert_eq!(set.gaps(0x5800, 0x5FFF).next(), None);
    }

    #[test]
    fn removal_trims_and_splits() {
        let mut set = MappedRanges::new();
        set.insert(record(0x10_0000, 0x4010_0000, 0x10_0000)).unwrap();

        assert_eq!(set.removal_growth(0x14_0000, 0x14_FFFF), 1);
        set.remove(0x14_0000, 0x14_FFFF);
        assert_eq!(
            set.as_slice(),
            &[
                record(0x10_0000, 0x4010_0000, 0x4_0000),
                record(0x15_0000, 0x4015_0000, 0xB_0000),
            ]
        );

        assert_eq!(set.removal_growth(0x10_0000, 0x13_FFFF), 0);
        set.remove(0x10_0000, 0x13_FFFF);
        set.remove(0x1F_0000, 0x1F_FFFF);
        assert_eq!(set.as_slice(), &[record(0x15_0000, 0x4015_0000, 0xA_0000)]);
    }

    #[test]
    fn records_may_end_at_the_top_of_the_space() {
        let mut set = MappedRanges::new();
        let top = u64::MAX - 0x1FFF;
        set.insert(record(top, 0x4000_0000, 0x2000)).unwrap();
        assert_eq!(set.as_slice()[0].virt_last(), u64::MAX);
        assert!(set.covers(top, u64::MAX));
        assert_eq!(set.gaps(top - 0x1000, u64::MAX).collect::<Vec<_>>(), [(top - 0x1000, top - 1)]);

        set.remove(top + 0x1000, u64::MAX);
        assert_eq!(set.as_slice(), &[record(top, 0x4000_0000, 0x1000)]);
    }

    #[test]
    fn windows_require_full_containment() {
        let mut windows = PhysicalWindows::new();
        let ram = PhysicalRange::new(PhysicalAddress::new(0x4000_0000), 0x100_0000).unwrap();
        assert!(windows.allow(ram));
        assert!(windows.permits(PhysicalAddress::new(0x40FF_F000), 0x1000));
        assert!(!windows.permits(PhysicalAddress::new(0x40FF_F000), 0x2000));
        assert!(!windows.permits(PhysicalAddress::new(0x0900_0000), 0x1000));
    }
}
