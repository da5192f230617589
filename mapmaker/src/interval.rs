//! Inclusive sample intervals.

use std::ops::{Range, RangeInclusive};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An inclusive range of valid samples, `first..=last`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    first: usize,
    last: usize,
}

impl Interval {
    pub fn new(first: usize, last: usize) -> Result<Self> {
        if last < first {
            return Err(Error::InvalidInterval { first, last });
        }
        Ok(Self { first, last })
    }

    /// Interval covering the half-open span `start..stop`, or `None` if the
    /// span is empty.
    pub fn from_span(start: usize, stop: usize) -> Option<Self> {
        (stop > start).then(|| Self {
            first: start,
            last: stop - 1,
        })
    }

    #[inline]
    pub fn first(&self) -> usize {
        self.first
    }

    #[inline]
    pub fn last(&self) -> usize {
        self.last
    }

    /// Number of samples covered. Always at least 1.
    #[inline]
    pub fn sample_count(&self) -> usize {
        self.last - self.first + 1
    }

    #[inline]
    pub fn samples(&self) -> RangeInclusive<usize> {
        self.first..=self.last
    }

    /// Same samples as [`samples`](Self::samples), as a half-open range.
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.first..self.last + 1
    }

    #[inline]
    pub fn contains(&self, sample: usize) -> bool {
        self.first <= sample && sample <= self.last
    }
}

/// Checks that intervals are ordered, non-overlapping and inside `0..n_samp`.
pub fn validate_intervals(intervals: &[Interval], n_samp: usize) -> Result<()> {
    let mut previous_last: Option<usize> = None;
    for (index, interval) in intervals.iter().enumerate() {
        // deserialized intervals skip `Interval::new`
        if interval.last < interval.first {
            return Err(Error::InvalidInterval {
                first: interval.first,
                last: interval.last,
            });
        }
        if interval.last >= n_samp {
            return Err(Error::IntervalOutOfRange {
                index,
                first: interval.first,
                last: interval.last,
                n_samp,
            });
        }
        if let Some(previous_last) = previous_last {
            if interval.first <= previous_last {
                return Err(Error::IntervalOverlap {
                    index,
                    first: interval.first,
                    previous_last,
                });
            }
        }
        previous_last = Some(interval.last);
    }
    Ok(())
}

/// Total samples covered by all intervals.
pub fn total_samples(intervals: &[Interval]) -> usize {
    intervals.iter().map(Interval::sample_count).sum()
}
