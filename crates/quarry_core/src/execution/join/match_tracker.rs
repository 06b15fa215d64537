use std::ops::Range;

/// Tracks which rows of one join input found a partner.
#[derive(Debug, Default)]
pub struct MatchTracker {
    matches: Vec<bool>,
}

impl MatchTracker {
    pub fn empty() -> Self {
        MatchTracker {
            matches: Vec::new(),
        }
    }

    /// Ensures that the tracker fits exactly `num_rows`.
    ///
    /// Calling this more than once for the same input will not clear any
    /// existing match values.
    pub fn ensure_initialized(&mut self, num_rows: usize) {
        self.matches.resize(num_rows, false);
    }

    /// Clears the matches.
    pub fn reset(&mut self) {
        self.matches.clear()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn set_match(&mut self, row_idx: usize) {
        self.matches[row_idx] = true;
    }

    pub fn set_matches(&mut self, matches: impl IntoIterator<Item = usize>) {
        matches.into_iter().for_each(|idx| self.set_match(idx));
    }

    pub fn is_match(&self, row_idx: usize) -> bool {
        self.matches.get(row_idx).copied().unwrap_or(false)
    }

    /// Indices of rows that found a partner within `rows`, relative to the
    /// start of the range.
    pub fn matched(&self, rows: Range<usize>) -> MatchIndexIter<'_, true> {
        MatchIndexIter::new(&self.matches[rows])
    }

    /// Indices of rows that never found a partner within `rows`, relative to
    /// the start of the range.
    pub fn unmatched(&self, rows: Range<usize>) -> NotMatchIter<'_> {
        MatchIndexIter::new(&self.matches[rows])
    }
}

/// Returns indices for rows that did not match.
///
/// Used to produce the null padded output of outer and anti joins.
pub type NotMatchIter<'a> = MatchIndexIter<'a, false>;

/// Returns indices for rows where `matches[row_idx] == B`.
#[derive(Debug, Clone)]
pub struct MatchIndexIter<'a, const B: bool> {
    matches: &'a [bool],
    idx: usize,
    rem_count: usize,
}

impl<'a, const B: bool> MatchIndexIter<'a, B> {
    fn new(matches: &'a [bool]) -> Self {
        let count = matches.iter().filter(|&&did_match| did_match == B).count();

        MatchIndexIter {
            matches,
            idx: 0,
            rem_count: count,
        }
    }
}

impl<const B: bool> Iterator for MatchIndexIter<'_, B> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.rem_count == 0 {
                return None;
            }

            let idx = self.idx;
            let v = self.matches[idx];
            self.idx += 1;

            if v == B {
                self.rem_count -= 1;
                return Some(idx);
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.rem_count, Some(self.rem_count))
    }
}

impl<const B: bool> ExactSizeIterator for MatchIndexIter<'_, B> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_rows_match() {
        let mut tracker = MatchTracker::empty();
        tracker.ensure_initialized(4);
        tracker.set_matches(0..4);

        assert_eq!(0, tracker.unmatched(0..4).len());
        assert_eq!(vec![0, 1, 2, 3], tracker.matched(0..4).collect::<Vec<_>>());
    }

    #[test]
    fn no_rows_match() {
        let mut tracker = MatchTracker::empty();
        tracker.ensure_initialized(4);

        assert_eq!(vec![0, 1, 2, 3], tracker.unmatched(0..4).collect::<Vec<_>>());
    }

    #[test]
    fn some_rows_match_with_offset() {
        let mut tracker = MatchTracker::empty();
        tracker.ensure_initialized(6);
        tracker.set_matches([1, 3, 4]);

        // Relative to the start of the range.
        assert_eq!(vec![0, 3], tracker.unmatched(2..6).collect::<Vec<_>>());
        assert_eq!(vec![1, 2], tracker.matched(2..6).collect::<Vec<_>>());
        assert!(tracker.is_match(4));
        assert!(!tracker.is_match(5));
        assert!(!tracker.is_match(100));
    }

    #[test]
    fn unmatched_with_gaps() {
        let mut tracker = MatchTracker::empty();
        tracker.ensure_initialized(8);
        tracker.set_matches([2, 5]);

        let unmatched = tracker.unmatched(1..8);
        assert_eq!(5, unmatched.len());
        assert_eq!(vec![0, 2, 3, 5, 6], unmatched.collect::<Vec<_>>());
        assert_eq!(vec![1, 4], tracker.matched(1..8).collect::<Vec<_>>());
        assert_eq!(vec![0, 1], tracker.unmatched(6..8).collect::<Vec<_>>());
        assert_eq!(0, tracker.matched(6..8).len());
    }

    #[test]
    fn ensure_initialized_keeps_matches() {
        let mut tracker = MatchTracker::empty();
        tracker.ensure_initialized(2);
        tracker.set_match(1);
        tracker.ensure_initialized(2);
        assert!(tracker.is_match(1));

        tracker.reset();
        assert!(tracker.is_empty());
    }
}
