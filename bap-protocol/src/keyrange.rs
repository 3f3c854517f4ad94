//! `KeyRange` and the coalescing filter set: adjacent or overlapping
//! ranges with the same disposition are merged into one.

use crate::keycode::KeyCode;

/// An inclusive pair of key codes. Invariant: `first <= last`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRange {
    pub first: KeyCode,
    pub last: KeyCode,
}

impl KeyRange {
    pub fn new(first: KeyCode, last: KeyCode) -> Option<Self> {
        if first.0 <= last.0 {
            Some(KeyRange { first, last })
        } else {
            None
        }
    }

    pub fn single(code: KeyCode) -> Self {
        KeyRange { first: code, last: code }
    }

    pub fn contains(&self, code: KeyCode) -> bool {
        self.first.0 <= code.0 && code.0 <= self.last.0
    }

    fn overlaps_or_adjacent(&self, other: &KeyRange) -> bool {
        // Adjacent means other.first immediately follows self.last (or
        // vice versa), which would otherwise leave two ranges of the same
        // disposition needlessly split (testable property 4).
        let a_end = self.last.0.saturating_add(1);
        let b_end = other.last.0.saturating_add(1);
        self.first.0 <= b_end && other.first.0 <= a_end
    }
}

/// A disposition a range of key codes can have for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Accept,
    Ignore,
}

/// A per-connection filter: a sorted list of non-overlapping inclusive
/// ranges, each tagged `Accept` or `Ignore`. Default disposition for any
/// code not covered by an explicit range is `Accept` (brltty's historical
/// default: everything is delivered until explicitly ignored).
#[derive(Debug, Clone, Default)]
pub struct KeyFilter {
    ranges: Vec<(KeyRange, Disposition)>,
}

impl KeyFilter {
    pub fn new() -> Self {
        KeyFilter { ranges: Vec::new() }
    }

    /// Binary search on `first` for the range (if any) containing `code`.
    pub fn admits(&self, code: KeyCode) -> bool {
        match self.locate(code) {
            Some(idx) => self.ranges[idx].1 == Disposition::Accept,
            None => true,
        }
    }

    fn locate(&self, code: KeyCode) -> Option<usize> {
        // self.ranges is sorted and non-overlapping, so a binary search on
        // `first` followed by a containment check on the candidate (and
        // its predecessor, since `code` may fall strictly between the
        // located range's bounds) suffices.
        let idx = self
            .ranges
            .partition_point(|(r, _)| r.first.0 <= code.0);
        if idx > 0 {
            if let Some((r, _)) = self.ranges.get(idx - 1) {
                if r.contains(code) {
                    return Some(idx - 1);
                }
            }
        }
        None
    }

    /// Stores `range` with `disposition`, overriding whatever disposition
    /// any existing range held over the overlap: the most recent call
    /// covering a given code wins, same as `remove` carving out
    /// not-ignored-anymore codes.
    pub fn add(&mut self, range: KeyRange, disposition: Disposition) {
        let mut result = Vec::with_capacity(self.ranges.len() + 1);
        for (r, d) in self.ranges.drain(..) {
            subtract(r, range, d, &mut result);
        }
        result.push((range, disposition));
        self.ranges = result;
        self.coalesce();
    }

    pub fn remove(&mut self, range: KeyRange) {
        // Removing means "forget any disposition over this range" —
        // equivalent to subtracting it from every stored range.
        let mut result = Vec::with_capacity(self.ranges.len());
        for (r, d) in self.ranges.drain(..) {
            subtract(r, range, d, &mut result);
        }
        self.ranges = result;
        self.coalesce();
    }

    /// Merges adjacent/overlapping ranges sharing the same disposition
    /// (testable property 4: "ranges are non-overlapping and maximal").
    fn coalesce(&mut self) {
        self.ranges.sort_by_key(|(r, _)| r.first.0);
        let mut merged: Vec<(KeyRange, Disposition)> = Vec::with_capacity(self.ranges.len());
        for (r, d) in self.ranges.drain(..) {
            if let Some((last_r, last_d)) = merged.last_mut() {
                if *last_d == d && last_r.overlaps_or_adjacent(&r) {
                    if r.last.0 > last_r.last.0 {
                        last_r.last = r.last;
                    }
                    continue;
                }
            }
            merged.push((r, d));
        }
        self.ranges = merged;
    }

    pub fn ranges(&self) -> &[(KeyRange, Disposition)] {
        &self.ranges
    }
}

fn subtract(
    range: KeyRange,
    cut: KeyRange,
    disposition: Disposition,
    out: &mut Vec<(KeyRange, Disposition)>,
) {
    if cut.last.0 < range.first.0 || cut.first.0 > range.last.0 {
        out.push((range, disposition));
        return;
    }
    if cut.first.0 > range.first.0 {
        if let Some(left) = KeyRange::new(range.first, KeyCode(cut.first.0 - 1)) {
            out.push((left, disposition));
        }
    }
    if cut.last.0 < range.last.0 {
        if let Some(right) = KeyRange::new(KeyCode(cut.last.0 + 1), range.last) {
            out.push((right, disposition));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kc(v: u64) -> KeyCode {
        KeyCode(v)
    }

    #[test]
    fn default_admits_everything() {
        let f = KeyFilter::new();
        assert!(f.admits(kc(5)));
    }

    #[test]
    fn ignore_then_accept_coalesces_to_nothing_special() {
        let mut f = KeyFilter::new();
        f.add(KeyRange::new(kc(0), kc(100)).unwrap(), Disposition::Ignore);
        assert!(!f.admits(kc(50)));
        f.remove(KeyRange::new(kc(40), kc(60)).unwrap());
        assert!(f.admits(kc(50)));
        assert!(!f.admits(kc(10)));
        assert!(!f.admits(kc(90)));
    }

    #[test]
    fn adjacent_ranges_with_same_disposition_merge() {
        let mut f = KeyFilter::new();
        f.add(KeyRange::new(kc(0), kc(9)).unwrap(), Disposition::Ignore);
        f.add(KeyRange::new(kc(10), kc(19)).unwrap(), Disposition::Ignore);
        assert_eq!(f.ranges().len(), 1);
        let (r, d) = f.ranges()[0];
        assert_eq!(r.first, kc(0));
        assert_eq!(r.last, kc(19));
        assert_eq!(d, Disposition::Ignore);
    }

    #[test]
    fn overlapping_range_with_different_disposition_overrides_the_overlap() {
        let mut f = KeyFilter::new();
        f.add(KeyRange::new(kc(0), kc(19)).unwrap(), Disposition::Ignore);
        f.add(KeyRange::new(kc(10), kc(29)).unwrap(), Disposition::Accept);
        // The second call wins over the whole overlap (10..=19): those
        // codes are no longer ignored even though the first call covered
        // them first.
        assert!(!f.admits(kc(5)));
        assert!(f.admits(kc(15)));
        assert!(f.admits(kc(25)));
        assert_eq!(f.ranges().len(), 2);
        let (r0, d0) = f.ranges()[0];
        assert_eq!((r0.first, r0.last, d0), (kc(0), kc(9), Disposition::Ignore));
        let (r1, d1) = f.ranges()[1];
        assert_eq!((r1.first, r1.last, d1), (kc(10), kc(29), Disposition::Accept));
    }

    #[test]
    fn invalid_range_rejected() {
        assert!(KeyRange::new(kc(10), kc(5)).is_none());
    }
}
