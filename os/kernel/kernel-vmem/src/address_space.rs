//! # Address Space
//!
//! Builds the low (identity) and high (alias) translation regions into
//! arena-backed tables and switches the hardware over to them.
//!
//! ## Mapping
//!
//! [`AddressSpace::map`] validates everything before it writes anything:
//!
//! 1. alignment and canonical range of the virtual span,
//! 2. alignment and window membership of the physical target,
//! 3. agreement with every overlapping record (same attributes, same offset),
//! 4. node and record capacity for the uncovered gaps.
//!
//! Only then are the gaps filled. Each leaf is a 2 MiB block when the VA,
//! the PA and the remaining length are block aligned and the block slot
//! does not already hold a table; otherwise it is a 4 KiB page.
//!
//! ## Activation
//!
//! ```text
//! publish ─▶ configure ─▶ install roots ─▶ enable ─▶ sync ─▶ invalidate ─▶ sync ─▶ probe
//! ```
//!
//! The probe compares one Normal word per region, read through the new
//! translation, with the value read physically beforehand.

use crate::descriptor::{Leaf, TranslationEntry};
use crate::ranges::{MAX_MAPPED_RANGES, MappedRange, MappedRanges, PhysicalWindows};
use crate::{
    ActivationError, ArchCapabilities, FatalReason, MappingAttributes, MappingError, MemoryKind,
    NodeId, Region, TableArena, TranslationConfig, TranslationHardware,
};
use core::fmt;
use kernel_memory_addresses::{PhysicalAddress, PhysicalRange, Size4K, VirtualAddress, align_down};
use kernel_trap::Installed;
use log::{debug, error, info, trace, warn};

/// Deepest table walk supported (root plus three levels).
const MAX_LEVELS: usize = 4;

/// Result of [`AddressSpace::translate`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Translation {
    pub phys: PhysicalAddress,
    pub attributes: MappingAttributes,
    /// Level of the leaf that produced the translation.
    pub level: u8,
}

/// A validated `[start, last]` inside one region.
#[derive(Copy, Clone)]
struct Span {
    start: u64,
    last: u64,
    region: Region,
}

/// Tables already counted by a capacity estimate, one key per level.
///
/// Chunks are visited in ascending order, so remembering the last entry a
/// new table was planned for is enough to count each table once.
#[derive(Default)]
struct NodePlan {
    last: [Option<u64>; MAX_LEVELS],
}

pub struct AddressSpace<'a> {
    caps: ArchCapabilities,
    arena: TableArena<'a>,
    low_root: NodeId,
    high_root: NodeId,
    ranges: MappedRanges,
    windows: PhysicalWindows,
    active: bool,
}

impl<'a> AddressSpace<'a> {
    /// Creates empty roots in `arena`: two with split roots, one otherwise.
    ///
    /// Like the frame allocator, the builder requires the fault dispatcher
    /// to be installed first.
    ///
    /// # Errors
    /// [`MappingError::OutOfMemory`] if the arena cannot hold the roots.
    pub fn new(
        _installed: &Installed,
        caps: ArchCapabilities,
        mut arena: TableArena<'a>,
    ) -> Result<Self, MappingError> {
        debug_assert!(usize::from(caps.levels) <= MAX_LEVELS);
        let low_root = arena.allocate().ok_or(MappingError::OutOfMemory)?;
        let high_root = if caps.split_roots {
            arena.allocate().ok_or(MappingError::OutOfMemory)?
        } else {
            low_root
        };
        debug!(
            "address space: {:?}, roots {} / {}",
            caps.arch,
            arena.phys_of(low_root),
            arena.phys_of(high_root)
        );
        Ok(Self {
            caps,
            arena,
            low_root,
            high_root,
            ranges: MappedRanges::new(),
            windows: PhysicalWindows::new(),
            active: false,
        })
    }

    #[must_use]
    pub const fn capabilities(&self) -> &ArchCapabilities {
        &self.caps
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Physical addresses of the low and high roots.
    #[must_use]
    pub const fn roots(&self) -> (PhysicalAddress, PhysicalAddress) {
        (
            self.arena.phys_of(self.low_root),
            self.arena.phys_of(self.high_root),
        )
    }

    #[must_use]
    pub const fn arena(&self) -> &TableArena<'a> {
        &self.arena
    }

    /// Mapped ranges in ascending virtual order.
    #[must_use]
    pub fn mapped_ranges(&self) -> &[MappedRange] {
        self.ranges.as_slice()
    }

    /// Registers a physical range leaf descriptors may point into.
    ///
    /// # Errors
    /// [`MappingError::Alignment`] for empty or unaligned ranges,
    /// [`MappingError::OutOfMemory`] when no window slot is left.
    pub fn allow_target(&mut self, range: PhysicalRange) -> Result<(), MappingError> {
        if range.is_empty()
            || !range.start().is_aligned::<Size4K>()
            || range.len() % self.caps.granule != 0
        {
            return Err(MappingError::Alignment);
        }
        if !self.windows.allow(range) {
            return Err(MappingError::OutOfMemory);
        }
        trace!("physical window {range:?}");
        Ok(())
    }

    /// Maps `[virt, virt + length)` to `[phys, phys + length)` read-write.
    ///
    /// # Errors
    /// See [`MappingError`]; nothing is modified on error.
    pub fn map(
        &mut self,
        virt: VirtualAddress,
        length: u64,
        phys: PhysicalAddress,
        kind: MemoryKind,
        executable: bool,
    ) -> Result<(), MappingError> {
        self.map_with(virt, length, phys, MappingAttributes::new(kind, executable))
    }

    /// [`AddressSpace::map`] with explicit attributes.
    ///
    /// # Errors
    /// See [`MappingError`]; nothing is modified on error.
    pub fn map_with(
        &mut self,
        virt: VirtualAddress,
        length: u64,
        phys: PhysicalAddress,
        attributes: MappingAttributes,
    ) -> Result<(), MappingError> {
        let span = self.span(virt, length)?;
        if !phys.is_aligned::<Size4K>() {
            return Err(MappingError::Alignment);
        }
        if phys.checked_add(length - 1).is_none() {
            return Err(MappingError::InvalidRange);
        }
        if !self.windows.permits(phys, length) {
            warn!("map {virt}: target {phys} outside every window");
            return Err(MappingError::InvalidTarget);
        }
        if self
            .ranges
            .overlapping(span.start, span.last)
            .any(|r| !r.agrees_with(span.start, phys.as_u64(), attributes))
        {
            warn!("map {virt}+{length:#x}: conflicts with an existing mapping");
            return Err(MappingError::Conflict);
        }

        let mut gaps = [(0, 0); MAX_MAPPED_RANGES + 1];
        let mut gap_count = 0;
        for gap in self.ranges.gaps(span.start, span.last) {
            gaps[gap_count] = gap;
            gap_count += 1;
        }
        let gaps = &gaps[..gap_count];
        if gaps.is_empty() {
            trace!("map {virt}+{length:#x}: already mapped");
            return Ok(());
        }

        let pa_at = |va: u64| phys.as_u64() + (va - span.start);
        let root = self.root_of(span.region);

        let mut plan = NodePlan::default();
        let mut nodes = 0;
        for &(start, last) in gaps {
            nodes += self.count_new_tables(root, start, last, pa_at(start), &mut plan)?;
        }
        if nodes > self.arena.free_count() || gaps.len() > self.ranges.free_slots() {
            warn!(
                "map {virt}+{length:#x}: needs {nodes} tables, {} free",
                self.arena.free_count()
            );
            return Err(MappingError::OutOfMemory);
        }

        for &(start, last) in gaps {
            self.fill(root, start, last, pa_at(start), attributes)?;
            let record = MappedRange {
                virt: VirtualAddress::new(start),
                phys: PhysicalAddress::new(pa_at(start)),
                length: last - start + 1,
                attributes,
            };
            self.ranges
                .insert(record)
                .map_err(|_| MappingError::OutOfMemory)?;
        }

        debug!(
            "mapped {virt}+{length:#x} -> {phys} ({:?}{})",
            attributes.kind,
            if attributes.executable { ", exec" } else { "" }
        );
        Ok(())
    }

    /// Identity-maps `range`.
    ///
    /// # Errors
    /// As [`AddressSpace::map`].
    pub fn map_identity(
        &mut self,
        range: PhysicalRange,
        kind: MemoryKind,
        executable: bool,
    ) -> Result<(), MappingError> {
        let start = range.start();
        self.map(VirtualAddress::new(start.as_u64()), range.len(), start, kind, executable)
    }

    /// Maps `range` at `high_base + pa` and returns the alias base.
    ///
    /// # Errors
    /// As [`AddressSpace::map`].
    pub fn map_high_alias(
        &mut self,
        range: PhysicalRange,
        kind: MemoryKind,
        executable: bool,
    ) -> Result<VirtualAddress, MappingError> {
        let start = range.start();
        let virt = self
            .caps
            .high_base
            .checked_add(start.as_u64())
            .map(VirtualAddress::new)
            .ok_or(MappingError::InvalidRange)?;
        self.map(virt, range.len(), start, kind, executable)?;
        Ok(virt)
    }

    /// Removes `[virt, virt + length)`.
    ///
    /// Blocks only partly inside the range are split into pages first, and
    /// tables left empty are returned to the arena. The caller invalidates
    /// the affected TLB entries.
    ///
    /// # Errors
    /// [`MappingError::NotMapped`] unless the whole range is mapped; capacity
    /// for block splits is checked before anything is written.
    pub fn unmap(&mut self, virt: VirtualAddress, length: u64) -> Result<(), MappingError> {
        let span = self.span(virt, length)?;
        if !self.ranges.covers(span.start, span.last) {
            return Err(MappingError::NotMapped);
        }

        let root = self.root_of(span.region);
        let splits = self.count_splits(root, span);
        if splits > self.arena.free_count()
            || self.ranges.removal_growth(span.start, span.last) > self.ranges.free_slots()
        {
            return Err(MappingError::OutOfMemory);
        }

        let block = self.caps.block_size;
        let mut va = span.start;
        loop {
            let (table, level) = self.leaf_slot(root, va)?;
            if level == self.caps.block_level && (va % block != 0 || span.last - va < block - 1) {
                self.split_block(table, va)?;
                continue;
            }

            self.set_entry(table, va, level, TranslationEntry::Invalid);
            match va.checked_add(self.caps.level_span(level)) {
                Some(next) if next <= span.last => {
                    if next % self.caps.level_span(level - 1) == 0 {
                        self.prune(root, va);
                    }
                    va = next;
                }
                _ => {
                    self.prune(root, va);
                    break;
                }
            }
        }

        self.ranges.remove(span.start, span.last);
        debug!(
            "unmapped {virt}+{length:#x} ({splits} block splits, {} tables in use)",
            self.arena.in_use()
        );
        Ok(())
    }

    /// Walks the tables for `va`.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<Translation> {
        let raw = va.as_u64();
        let mut node = self.root_of(self.caps.region_of(raw)?);
        for level in 0..=self.caps.leaf_level {
            match self.entry(node, raw, level) {
                TranslationEntry::Invalid => return None,
                TranslationEntry::Table(pa) => node = self.arena.resolve(pa)?,
                TranslationEntry::Block(leaf) | TranslationEntry::Page(leaf) => {
                    let offset = raw & (self.caps.level_span(level) - 1);
                    return Some(Translation {
                        phys: PhysicalAddress::new(leaf.phys.as_u64() + offset),
                        attributes: leaf.attributes,
                        level,
                    });
                }
            }
        }
        None
    }

    /// Switches the hardware to these tables and verifies the result.
    ///
    /// # Errors
    /// [`ActivationError::MissingRegion`] before touching the hardware if a
    /// region has no mappings; [`ActivationError::Fatal`] if translation did
    /// not come up or a probe read disagrees.
    pub fn activate<H: TranslationHardware>(&mut self, hw: &mut H) -> Result<(), ActivationError> {
        let mut probes = [None; 2];
        for (probe, region) in probes.iter_mut().zip([Region::Low, Region::High]) {
            if !self.has_region(region) {
                return Err(ActivationError::MissingRegion(region));
            }
            *probe = self.probe_site(region).map(|(virt, phys)| {
                // SAFETY: probe sites are Normal mappings inside a registered window.
                let expected = unsafe { hw.read_physical(phys) };
                (virt, expected)
            });
        }

        let config = TranslationConfig::for_caps(&self.caps);
        let (low, high) = self.roots();

        hw.publish_table_writes();
        hw.configure(&config);
        hw.install_roots(low, high);
        hw.enable_translation();
        hw.synchronize();
        hw.invalidate_all();
        hw.synchronize();

        if !hw.translation_enabled() {
            error!("translation did not come up");
            return Err(ActivationError::Fatal(FatalReason::NotEnabled));
        }
        for (virt, expected) in probes.into_iter().flatten() {
            // SAFETY: the probe site is mapped Normal memory under the new tables.
            let observed = unsafe { hw.read_virtual(virt) };
            if observed != expected {
                error!("probe at {virt}: read {observed:#x}, expected {expected:#x}");
                return Err(ActivationError::Fatal(FatalReason::ProbeMismatch {
                    virt,
                    expected,
                    observed,
                }));
            }
        }

        self.active = true;
        self.caps.wide_copies_safe = true;
        info!(
            "translation active: roots {low} / {high}, {} ranges, {} tables",
            self.ranges.as_slice().len(),
            self.arena.in_use()
        );
        Ok(())
    }

    fn span(&self, virt: VirtualAddress, length: u64) -> Result<Span, MappingError> {
        if length == 0 || !virt.is_aligned::<Size4K>() || length % self.caps.granule != 0 {
            return Err(MappingError::Alignment);
        }
        let start = virt.as_u64();
        let last = start
            .checked_add(length - 1)
            .ok_or(MappingError::InvalidRange)?;
        let region = self
            .caps
            .region_of(start)
            .ok_or(MappingError::InvalidRange)?;
        if self.caps.region_of(last) != Some(region) {
            return Err(MappingError::InvalidRange);
        }
        Ok(Span { start, last, region })
    }

    const fn root_of(&self, region: Region) -> NodeId {
        match region {
            Region::Low => self.low_root,
            Region::High => self.high_root,
        }
    }

    fn has_region(&self, region: Region) -> bool {
        self.ranges
            .as_slice()
            .iter()
            .any(|r| self.caps.region_of(r.virt.as_u64()) == Some(region))
    }

    fn probe_site(&self, region: Region) -> Option<(VirtualAddress, PhysicalAddress)> {
        self.ranges
            .as_slice()
            .iter()
            .find(|r| {
                r.attributes.kind == MemoryKind::Normal
                    && self.caps.region_of(r.virt.as_u64()) == Some(region)
            })
            .map(|r| (r.virt, r.phys))
    }

    fn entry(&self, node: NodeId, va: u64, level: u8) -> TranslationEntry {
        let raw = self.arena.read(node, self.caps.index(va, level));
        TranslationEntry::decode(raw, &self.caps, level)
    }

    fn set_entry(&mut self, node: NodeId, va: u64, level: u8, entry: TranslationEntry) {
        let raw = entry.encode(&self.caps, level);
        self.arena.write(node, self.caps.index(va, level), raw);
    }

    /// The table the slot for `va` at `level` points to, if any.
    fn child(&self, node: NodeId, va: u64, level: u8) -> Result<Option<NodeId>, MappingError> {
        match self.entry(node, va, level) {
            TranslationEntry::Invalid => Ok(None),
            TranslationEntry::Table(pa) => match self.arena.resolve(pa) {
                Some(id) => Ok(Some(id)),
                None => {
                    error!("table descriptor for {va:#x} at level {level} points to {pa}");
                    Err(MappingError::Conflict)
                }
            },
            TranslationEntry::Block(_) | TranslationEntry::Page(_) => Err(MappingError::Conflict),
        }
    }

    /// Level of the leaf that maps the chunk starting at `va`; `to_last`
    /// is the distance to the last byte of the range.
    fn leaf_level_for(&self, root: NodeId, va: u64, pa: u64, to_last: u64) -> Result<u8, MappingError> {
        let block = self.caps.block_size;
        if va % block != 0 || pa % block != 0 || to_last < block - 1 {
            return Ok(self.caps.leaf_level);
        }
        let mut node = root;
        for level in 0..self.caps.block_level {
            match self.child(node, va, level)? {
                Some(next) => node = next,
                None => return Ok(self.caps.block_level),
            }
        }
        Ok(match self.entry(node, va, self.caps.block_level) {
            TranslationEntry::Table(_) => self.caps.leaf_level,
            _ => self.caps.block_level,
        })
    }

    fn count_new_tables(
        &self,
        root: NodeId,
        start: u64,
        last: u64,
        pa: u64,
        plan: &mut NodePlan,
    ) -> Result<usize, MappingError> {
        let mut count = 0;
        let (mut va, mut pa) = (start, pa);
        loop {
            let leaf_level = self.leaf_level_for(root, va, pa, last - va)?;
            let mut node = Some(root);
            for level in 0..leaf_level {
                let next = match node {
                    Some(id) => self.child(id, va, level)?,
                    None => None,
                };
                if next.is_none() {
                    let key = va >> self.caps.level_shift(level);
                    let last = &mut plan.last[usize::from(level)];
                    if *last != Some(key) {
                        *last = Some(key);
                        count += 1;
                    }
                }
                node = next;
            }
            let step = self.caps.level_span(leaf_level);
            match va.checked_add(step) {
                Some(next) if next <= last => (va, pa) = (next, pa + step),
                _ => return Ok(count),
            }
        }
    }

    fn fill(
        &mut self,
        root: NodeId,
        start: u64,
        last: u64,
        pa: u64,
        attributes: MappingAttributes,
    ) -> Result<(), MappingError> {
        let (mut va, mut pa) = (start, pa);
        loop {
            let level = self.leaf_level_for(root, va, pa, last - va)?;
            let table = self.ensure_tables(root, va, level)?;
            let leaf = Leaf {
                phys: PhysicalAddress::new(pa),
                attributes,
            };
            let entry = if level == self.caps.leaf_level {
                TranslationEntry::Page(leaf)
            } else {
                TranslationEntry::Block(leaf)
            };
            self.set_entry(table, va, level, entry);

            let step = self.caps.level_span(level);
            match va.checked_add(step) {
                Some(next) if next <= last => (va, pa) = (next, pa + step),
                _ => return Ok(()),
            }
        }
    }

    /// Walks to the table holding `va`'s slot at `level`, creating tables
    /// for invalid intermediate slots.
    fn ensure_tables(&mut self, root: NodeId, va: u64, level: u8) -> Result<NodeId, MappingError> {
        let mut node = root;
        for l in 0..level {
            node = match self.child(node, va, l)? {
                Some(next) => next,
                None => {
                    let next = self.arena.allocate().ok_or(MappingError::OutOfMemory)?;
                    let table = TranslationEntry::Table(self.arena.phys_of(next));
                    self.set_entry(node, va, l, table);
                    next
                }
            };
        }
        Ok(node)
    }

    /// The table and level of the leaf mapping `va`.
    fn leaf_slot(&self, root: NodeId, va: u64) -> Result<(NodeId, u8), MappingError> {
        let mut node = root;
        for level in 0..=self.caps.leaf_level {
            match self.entry(node, va, level) {
                TranslationEntry::Table(pa) => {
                    node = self.arena.resolve(pa).ok_or(MappingError::NotMapped)?;
                }
                TranslationEntry::Block(_) | TranslationEntry::Page(_) => return Ok((node, level)),
                TranslationEntry::Invalid => return Err(MappingError::NotMapped),
            }
        }
        Err(MappingError::NotMapped)
    }

    /// Blocks an unmap of `span` only partly covers.
    fn count_splits(&self, root: NodeId, span: Span) -> usize {
        let block = self.caps.block_size;
        let mut count = 0;
        let mut last = None;
        for (edge, probe) in [(span.start, span.start), (span.last.wrapping_add(1), span.last)] {
            if edge % block == 0 {
                continue;
            }
            let base = align_down(probe, block);
            if last == Some(base) {
                continue;
            }
            if matches!(self.leaf_slot(root, probe), Ok((_, level)) if level == self.caps.block_level) {
                count += 1;
                last = Some(base);
            }
        }
        count
    }

    /// Replaces the block holding `va` by a table of pages with the same
    /// targets and attributes.
    fn split_block(&mut self, table: NodeId, va: u64) -> Result<(), MappingError> {
        let level = self.caps.block_level;
        let TranslationEntry::Block(leaf) = self.entry(table, va, level) else {
            return Err(MappingError::NotMapped);
        };
        let pages = self.arena.allocate().ok_or(MappingError::OutOfMemory)?;
        let base = align_down(va, self.caps.block_size);
        let granule = self.caps.granule;
        for i in 0..self.caps.entries_per_table() as u64 {
            let page = Leaf {
                phys: PhysicalAddress::new(leaf.phys.as_u64() + i * granule),
                attributes: leaf.attributes,
            };
            self.set_entry(pages, base + i * granule, self.caps.leaf_level, TranslationEntry::Page(page));
        }
        let next = TranslationEntry::Table(self.arena.phys_of(pages));
        self.set_entry(table, va, level, next);
        trace!("split block at {base:#x}");
        Ok(())
    }

    /// Releases the tables on `va`'s path that no longer map anything.
    fn prune(&mut self, root: NodeId, va: u64) {
        let mut path = [root; MAX_LEVELS];
        let mut depth = 0;
        for level in 0..self.caps.leaf_level {
            match self.child(path[depth], va, level) {
                Ok(Some(next)) => {
                    depth += 1;
                    path[depth] = next;
                }
                _ => break,
            }
        }
        while depth > 0 && self.arena.is_vacant(path[depth]) {
            self.arena.release(path[depth]);
            #[allow(clippy::cast_possible_truncation)]
            self.set_entry(path[depth - 1], va, (depth - 1) as u8, TranslationEntry::Invalid);
            depth -= 1;
        }
    }
}

impl fmt::Debug for AddressSpace<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (low, high) = self.roots();
        f.debug_struct("AddressSpace")
            .field("arch", &self.caps.arch)
            .field("low_root", &low)
            .field("high_root", &high)
            .field("ranges", &self.ranges.as_slice().len())
            .field("arena", &self.arena)
            .field("active", &self.active)
            .finish()
    }
}
