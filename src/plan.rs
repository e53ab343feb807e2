//! Partitioning of a file's byte length into contiguous worker ranges.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WcError};

/// Half-open byte interval `[start, end)` over a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ByteRange {
    /// Inclusive start offset.
    pub start: u64,
    /// Exclusive end offset.
    pub end: u64,
}

impl ByteRange {
    /// Creates a range; `start` must not exceed `end`.
    #[must_use]
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "range start {start} exceeds end {end}");
        Self { start, end }
    }

    /// Range covering an entire source of `size` bytes.
    #[must_use]
    pub fn whole(size: u64) -> Self {
        Self::new(0, size)
    }

    /// Number of bytes covered by the range.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Returns `true` when the range covers no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Splits `size` bytes into `workers` contiguous ranges.
///
/// Range `i` is `[size*i/workers, size*(i+1)/workers)` using floor division, so the ranges never
/// overlap, the last one always ends at `size`, and their union is exactly `[0, size)`.  Ranges
/// may be empty when there are more workers than bytes.  A worker count below two is rejected:
/// callers route those cases to the direct or sequential scanners instead.
pub fn plan_ranges(size: u64, workers: usize) -> Result<Vec<ByteRange>> {
    if workers <= 1 {
        return Err(WcError::InvalidConfig(format!(
            "range planning requires at least two workers (got {workers})"
        )));
    }
    let total = u128::from(size);
    let count = workers as u128;
    let boundary = |index: usize| -> Result<u64> {
        u64::try_from(total * index as u128 / count)
            .map_err(|_| WcError::InvalidConfig("range boundary exceeds u64".into()))
    };

    let mut ranges = Vec::with_capacity(workers);
    let mut start = 0u64;
    for index in 1..=workers {
        let end = boundary(index)?;
        ranges.push(ByteRange::new(start, end));
        start = end;
    }
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_fewer_than_two_workers() {
        for workers in [0, 1] {
            let err = plan_ranges(100, workers).expect_err("planning should fail");
            assert!(matches!(err, WcError::InvalidConfig(message) if message.contains("two workers")));
        }
    }

    #[test]
    fn remainder_lands_in_later_ranges() {
        let ranges = plan_ranges(10, 3).expect("plan");
        assert_eq!(
            ranges,
            vec![
                ByteRange::new(0, 3),
                ByteRange::new(3, 6),
                ByteRange::new(6, 10)
            ]
        );
    }

    #[test]
    fn zero_size_yields_empty_ranges() {
        let ranges = plan_ranges(0, 4).expect("plan");
        assert_eq!(ranges.len(), 4);
        assert!(ranges.iter().all(ByteRange::is_empty));
    }

    #[test]
    fn more_workers_than_bytes() {
        let ranges = plan_ranges(3, 8).expect("plan");
        assert_eq!(ranges.len(), 8);
        assert_eq!(ranges.last().map(|r| r.end), Some(3));
        assert_eq!(ranges.iter().map(ByteRange::len).sum::<u64>(), 3);
    }

    #[test]
    fn huge_sizes_do_not_overflow() {
        let ranges = plan_ranges(u64::MAX, 7).expect("plan");
        assert_eq!(ranges[0].start, 0);
        assert_eq!(ranges[6].end, u64::MAX);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn range_helpers() {
        let range = ByteRange::new(4, 9);
        assert_eq!(range.len(), 5);
        assert_eq!(range.to_string(), "[4, 9)");
        assert_eq!(ByteRange::whole(12), ByteRange::new(0, 12));
    }
}
