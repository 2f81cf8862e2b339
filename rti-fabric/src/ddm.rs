//! DDM regions and the range-overlap predicate (§3 "Region/Extent").
//!
//! Region geometry stops at axis-aligned range overlap; anything past that
//! (region composition, extent transforms) is out of scope here.

use std::collections::HashMap;

use rti_core::{DimensionHandle, RegionToken};
use serde::{Deserialize, Serialize};

/// A half-open range `[lower, upper)` on one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub lower: i64,
    pub upper: i64,
}

impl Range {
    pub fn new(lower: i64, upper: i64) -> Self {
        Range { lower, upper }
    }

    /// `¬(a.lower ≥ b.upper ∨ a.upper ≤ b.lower)`; equal lower bounds overlap (§3).
    fn overlaps(&self, other: &Range) -> bool {
        !(self.lower >= other.upper || self.upper <= other.lower)
    }
}

/// A region: one range per dimension it spans.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub ranges: HashMap<DimensionHandle, Range>,
}

impl Region {
    pub fn new() -> Self {
        Region::default()
    }

    pub fn with_range(mut self, dim: DimensionHandle, range: Range) -> Self {
        self.ranges.insert(dim, range);
        self
    }

    /// Two regions overlap iff they share at least one dimension and, for
    /// every dimension they share, their ranges overlap (§3). Regions with no
    /// dimension in common belong to unrelated routing spaces and never overlap.
    pub fn overlaps(&self, other: &Region) -> bool {
        let mut shared = false;
        for (dim, range) in &self.ranges {
            if let Some(other_range) = other.ranges.get(dim) {
                shared = true;
                if !range.overlaps(other_range) {
                    return false;
                }
            }
        }
        shared
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &DimensionHandle> {
        self.ranges.keys()
    }
}

/// Per-federation store of region instances, addressed by [`RegionToken`].
#[derive(Debug, Clone, Default)]
pub struct RegionStore {
    regions: HashMap<RegionToken, Region>,
    next: u64,
}

impl RegionStore {
    pub fn new() -> Self {
        RegionStore::default()
    }

    pub fn create(&mut self, region: Region) -> RegionToken {
        let token = RegionToken::from(self.next as usize);
        self.next += 1;
        self.regions.insert(token, region);
        token
    }

    pub fn get(&self, token: RegionToken) -> Option<&Region> {
        self.regions.get(&token)
    }

    pub fn remove(&mut self, token: RegionToken) -> Option<Region> {
        self.regions.remove(&token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dim(n: usize) -> DimensionHandle {
        DimensionHandle::from(n)
    }

    #[test]
    fn disjoint_ranges_do_not_overlap() {
        let a = Region::new().with_range(dim(1), Range::new(0, 10));
        let b = Region::new().with_range(dim(1), Range::new(10, 20));
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn touching_lower_bounds_count_as_overlap() {
        let a = Region::new().with_range(dim(1), Range::new(0, 10));
        let b = Region::new().with_range(dim(1), Range::new(0, 5));
        assert!(a.overlaps(&b));
    }

    #[test]
    fn overlap_is_symmetric() {
        let a = Region::new().with_range(dim(1), Range::new(0, 10)).with_range(dim(2), Range::new(5, 15));
        let b = Region::new().with_range(dim(1), Range::new(5, 20)).with_range(dim(2), Range::new(0, 6));
        assert_eq!(a.overlaps(&b), b.overlaps(&a));
    }

    #[test]
    fn a_region_overlaps_itself() {
        let a = Region::new().with_range(dim(1), Range::new(0, 10));
        assert!(a.overlaps(&a.clone()));
    }

    #[test]
    fn disjoint_dimension_sets_do_not_overlap() {
        let a = Region::new().with_range(dim(1), Range::new(0, 10));
        let b = Region::new().with_range(dim(2), Range::new(0, 10));
        assert!(!a.overlaps(&b));
    }

    fn arb_range() -> impl Strategy<Value = Range> {
        (-100i64..100, -100i64..100).prop_map(|(a, b)| Range::new(a.min(b), a.max(b) + 1))
    }

    proptest! {
        #[test]
        fn overlap_is_symmetric_for_any_two_single_dimension_regions(a in arb_range(), b in arb_range()) {
            let ra = Region::new().with_range(dim(1), a);
            let rb = Region::new().with_range(dim(1), b);
            prop_assert_eq!(ra.overlaps(&rb), rb.overlaps(&ra));
        }

        #[test]
        fn every_region_overlaps_itself_on_any_range(r in arb_range()) {
            let region = Region::new().with_range(dim(1), r);
            prop_assert!(region.overlaps(&region.clone()));
        }
    }
}
