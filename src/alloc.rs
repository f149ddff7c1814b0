//! Slot range allocation for the shared particle pool.
//!
//! Many emitters share one pair of device buffers. The [`SlotAllocator`] hands
//! each pooled emitter a contiguous range of slots and takes it back when the
//! emitter goes away. It owns no GPU resources at all, which keeps it trivially
//! unit-testable; the pool injects one allocator per rendering context and
//! passes it by reference to every emitter constructor.
//!
//! Range starts are aligned to the compute pass write-back granularity.
//! Adjacent free ranges are coalesced on every `free`, which bounds
//! fragmentation growth over long sessions.

/// Default alignment granularity in slots for allocated range starts.
pub const WRITE_ALIGN: u32 = 8;

/// A contiguous range of slots within the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRange {
    pub start: u32,
    pub count: u32,
}

impl SlotRange {
    pub fn end(&self) -> u32 {
        self.start + self.count
    }

    pub fn contains(&self, index: u32) -> bool {
        index >= self.start && index < self.end()
    }
}

/// Ownership token for an allocated range. Returned by [`SlotAllocator::allocate`]
/// and consumed by [`SlotAllocator::free`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeHandle {
    id: u64,
    range: SlotRange,
}

impl RangeHandle {
    pub fn range(&self) -> SlotRange {
        self.range
    }
}

/// Diagnostic snapshot of the allocator. No correctness dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Total slots managed by the allocator.
    pub capacity: u32,
    /// Slots currently owned by emitters.
    pub allocated: u32,
    /// Slots permanently lost to sub-alignment fragmentation.
    pub wasted: u32,
    /// Number of live allocations.
    pub emitter_count: usize,
}

/// First-fit range allocator with aligned starts and free-list coalescing.
#[derive(Debug)]
pub struct SlotAllocator {
    capacity: u32,
    align: u32,
    next_id: u64,
    allocated: Vec<RangeHandle>,
    /// Free ranges, kept sorted by start index.
    free: Vec<SlotRange>,
    wasted: u32,
    /// Whether an allocation failure has already been logged this session.
    reported_exhaustion: bool,
}

impl SlotAllocator {
    /// Create an allocator over `capacity` slots with the default alignment.
    pub fn new(capacity: u32) -> Self {
        Self::with_alignment(capacity, WRITE_ALIGN)
    }

    /// Create an allocator with an explicit alignment granularity.
    ///
    /// `align` must be at least 1. Alignment exists because the output region
    /// of a compute pass must start at an aligned offset.
    pub fn with_alignment(capacity: u32, align: u32) -> Self {
        let align = align.max(1);
        let free = if capacity > 0 {
            vec![SlotRange {
                start: 0,
                count: capacity,
            }]
        } else {
            Vec::new()
        };
        Self {
            capacity,
            align,
            next_id: 0,
            allocated: Vec::new(),
            free,
            wasted: 0,
            reported_exhaustion: false,
        }
    }

    /// Total slots managed.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Alignment granularity in slots.
    pub fn alignment(&self) -> u32 {
        self.align
    }

    /// Allocate a contiguous aligned range of at least `count` slots.
    ///
    /// `count` is rounded up to the alignment granularity. Free ranges are
    /// scanned in index order and the first one whose aligned start still fits
    /// the rounded count wins. Returns `None` when no free range satisfies the
    /// request; the caller is expected to degrade to a standalone or CPU
    /// emitter rather than treat this as an error.
    pub fn allocate(&mut self, count: u32) -> Option<RangeHandle> {
        if count == 0 || count > self.capacity {
            return None;
        }
        let count = round_up(count, self.align);

        let mut pick = None;
        for (i, r) in self.free.iter().enumerate() {
            let aligned_start = round_up(r.start, self.align);
            let skip = aligned_start - r.start;
            if skip < r.count && r.count - skip >= count {
                pick = Some((i, aligned_start, skip));
                break;
            }
        }

        let (index, start, skip) = match pick {
            Some(p) => p,
            None => {
                if !self.reported_exhaustion {
                    log::warn!(
                        "slot pool exhausted: {} slots requested, {} of {} allocated",
                        count,
                        self.allocated_slots(),
                        self.capacity
                    );
                    self.reported_exhaustion = true;
                }
                return None;
            }
        };

        let region = self.free.remove(index);

        // Prefix before the aligned start: returned to the free list when it
        // spans at least one alignment unit, otherwise dropped as permanent
        // internal fragmentation. With an aligned pool the skip is always
        // zero; the waste path only triggers for oddly-sized pools.
        if skip >= self.align {
            self.insert_free(SlotRange {
                start: region.start,
                count: skip,
            });
        } else {
            self.wasted += skip;
        }

        let tail = region.count - skip - count;
        if tail > 0 {
            self.insert_free(SlotRange {
                start: start + count,
                count: tail,
            });
        }

        let handle = RangeHandle {
            id: self.next_id,
            range: SlotRange { start, count },
        };
        self.next_id += 1;
        self.allocated.push(handle);
        log::debug!("allocated slots [{}, {})", start, start + count);
        Some(handle)
    }

    /// Return a range to the free list and coalesce adjacent free ranges.
    pub fn free(&mut self, handle: RangeHandle) {
        let Some(pos) = self.allocated.iter().position(|h| h.id == handle.id) else {
            return; // already freed, or from another allocator
        };
        let handle = self.allocated.swap_remove(pos);
        self.insert_free(handle.range);
        self.coalesce();
        self.reported_exhaustion = false;
        log::debug!(
            "freed slots [{}, {})",
            handle.range.start,
            handle.range.end()
        );
    }

    /// Diagnostic snapshot.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.capacity,
            allocated: self.allocated_slots(),
            wasted: self.wasted,
            emitter_count: self.allocated.len(),
        }
    }

    /// Slots currently sitting on the free list.
    pub fn free_slots(&self) -> u32 {
        self.free.iter().map(|r| r.count).sum()
    }

    fn allocated_slots(&self) -> u32 {
        self.allocated.iter().map(|h| h.range.count).sum()
    }

    /// Insert preserving sort-by-start order.
    fn insert_free(&mut self, range: SlotRange) {
        let pos = self
            .free
            .iter()
            .position(|r| r.start > range.start)
            .unwrap_or(self.free.len());
        self.free.insert(pos, range);
    }

    /// Merge every pair of free ranges where one ends exactly where the next
    /// starts. The list is already sorted by start index.
    fn coalesce(&mut self) {
        let mut i = 0;
        while i + 1 < self.free.len() {
            if self.free[i].end() == self.free[i + 1].start {
                self.free[i].count += self.free[i + 1].count;
                self.free.remove(i + 1);
            } else {
                i += 1;
            }
        }
    }
}

fn round_up(value: u32, align: u32) -> u32 {
    // Saturates near u32::MAX; a saturated count fits no range and the
    // allocation falls through to None.
    value.div_ceil(align).saturating_mul(align)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// allocated + free + wasted must partition the capacity at every
    /// observation point.
    fn assert_partition(a: &SlotAllocator) {
        let s = a.stats();
        assert_eq!(
            s.allocated + a.free_slots() + s.wasted,
            s.capacity,
            "partition invariant violated"
        );
    }

    fn assert_no_overlap(a: &SlotAllocator) {
        for (i, h1) in a.allocated.iter().enumerate() {
            for h2 in a.allocated.iter().skip(i + 1) {
                let r1 = h1.range;
                let r2 = h2.range;
                assert!(
                    r1.end() <= r2.start || r2.end() <= r1.start,
                    "ranges {:?} and {:?} overlap",
                    r1,
                    r2
                );
            }
        }
    }

    #[test]
    fn allocate_and_free_roundtrip() {
        let mut a = SlotAllocator::new(64);
        assert_partition(&a);

        let h = a.allocate(10).unwrap();
        assert_eq!(h.range().count, 16); // rounded to alignment 8
        assert_eq!(h.range().start % WRITE_ALIGN, 0);
        assert_partition(&a);

        a.free(h);
        assert_eq!(a.stats().allocated, 0);
        assert_eq!(a.free_slots(), 64);
        assert_partition(&a);
    }

    #[test]
    fn all_starts_aligned() {
        let mut a = SlotAllocator::new(256);
        let handles: Vec<_> = (0..6).filter_map(|_| a.allocate(13)).collect();
        assert_eq!(handles.len(), 6);
        for h in &handles {
            assert_eq!(h.range().start % WRITE_ALIGN, 0);
        }
        assert_no_overlap(&a);
        assert_partition(&a);
    }

    #[test]
    fn exhaustion_returns_none() {
        let mut a = SlotAllocator::new(16);
        let h = a.allocate(16).unwrap();
        assert!(a.allocate(1).is_none());
        a.free(h);
        assert!(a.allocate(1).is_some());
    }

    #[test]
    fn zero_count_is_rejected() {
        let mut a = SlotAllocator::new(16);
        assert!(a.allocate(0).is_none());
        assert_partition(&a);
    }

    #[test]
    fn oversized_count_is_rejected_without_overflow() {
        let mut a = SlotAllocator::new(64);
        assert!(a.allocate(65).is_none());
        assert!(a.allocate(u32::MAX).is_none());
        assert!(a.allocate(u32::MAX - 3).is_none());
        assert_partition(&a);
        // The pool is untouched and still serves normal requests.
        assert!(a.allocate(64).is_some());
    }

    #[test]
    fn coalescing_merges_adjacent_ranges() {
        let mut a = SlotAllocator::with_alignment(64, 1);
        let h1 = a.allocate(16).unwrap();
        let h2 = a.allocate(16).unwrap();
        let h3 = a.allocate(16).unwrap();
        assert_eq!(a.free.len(), 1); // just the tail

        // Free the two leading ranges: they are index-adjacent and must merge
        // into one free range whose count is the sum of the two.
        a.free(h1);
        a.free(h2);
        assert_eq!(a.free.len(), 2);
        assert_eq!(a.free[0], SlotRange { start: 0, count: 32 });

        // Freeing the third merges everything back into one range.
        a.free(h3);
        assert_eq!(a.free.len(), 1);
        assert_eq!(a.free[0], SlotRange { start: 0, count: 64 });
        assert_partition(&a);
    }

    #[test]
    fn freed_range_is_reused() {
        // allocate(10), allocate(10), free(first), allocate(10) on a pool of
        // 20 must succeed by reusing the freed range, not fail.
        let mut a = SlotAllocator::with_alignment(20, 1);
        let h1 = a.allocate(10).unwrap();
        let _h2 = a.allocate(10).unwrap();
        assert!(a.allocate(10).is_none());

        a.free(h1);
        let h3 = a.allocate(10).unwrap();
        assert_eq!(h3.range(), SlotRange { start: 0, count: 10 });
        assert_partition(&a);
    }

    #[test]
    fn double_free_is_ignored() {
        let mut a = SlotAllocator::new(32);
        let h = a.allocate(8).unwrap();
        a.free(h);
        a.free(h);
        assert_eq!(a.free_slots(), 32);
        assert_partition(&a);
    }

    #[test]
    fn subunit_tail_cannot_satisfy_requests() {
        // A pool that is not a multiple of the alignment leaves a trailing
        // fragment smaller than one alignment unit. It stays on the free list
        // but can never satisfy a request, since requests round up.
        let mut a = SlotAllocator::with_alignment(20, 8);
        let h1 = a.allocate(16).unwrap();
        assert!(a.allocate(1).is_none()); // 4 trailing slots, sub-alignment
        a.free(h1);
        assert_partition(&a);
    }

    #[test]
    fn stats_track_emitter_count() {
        let mut a = SlotAllocator::new(128);
        let h1 = a.allocate(8).unwrap();
        let h2 = a.allocate(8).unwrap();
        assert_eq!(a.stats().emitter_count, 2);
        assert_eq!(a.stats().allocated, 16);
        a.free(h1);
        assert_eq!(a.stats().emitter_count, 1);
        a.free(h2);
        assert_eq!(a.stats().emitter_count, 0);
    }

    #[test]
    fn randomized_churn_preserves_invariants() {
        use rand::rngs::SmallRng;
        use rand::{Rng, SeedableRng};

        let mut rng = SmallRng::seed_from_u64(7);
        let mut a = SlotAllocator::new(1024);
        let mut live: Vec<RangeHandle> = Vec::new();

        for _ in 0..2000 {
            if rng.gen_bool(0.6) || live.is_empty() {
                let want = rng.gen_range(1..64);
                if let Some(h) = a.allocate(want) {
                    live.push(h);
                }
            } else {
                let idx = rng.gen_range(0..live.len());
                a.free(live.swap_remove(idx));
            }
            assert_partition(&a);
            assert_no_overlap(&a);
        }

        for h in live {
            a.free(h);
        }
        assert_eq!(a.free_slots(), 1024);
        assert_eq!(a.free.len(), 1);
    }
}
