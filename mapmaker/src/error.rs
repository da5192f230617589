//! Error types for the noise-weighted projection.

use thiserror::Error;

/// Errors raised while validating projection inputs.
///
/// Every variant is detected before the accumulator is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Dimension '{name}' must be non-zero")]
    ZeroDimension { name: &'static str },

    #[error("Buffer '{buffer}' has {actual} elements, expected {expected}")]
    LengthMismatch {
        buffer: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Buffer '{buffer}' has {len} elements, not a whole number of rows of {row_len}")]
    RaggedBuffer {
        buffer: &'static str,
        len: usize,
        row_len: usize,
    },

    #[error("Detector {detector}: {table} row {row} is outside 0..{rows}")]
    RowOutOfRange {
        table: &'static str,
        detector: usize,
        row: i32,
        rows: usize,
    },

    #[error("Interval last sample {last} precedes first sample {first}")]
    InvalidInterval { first: usize, last: usize },

    #[error("Interval {index} ({first}..={last}) exceeds the {n_samp} available samples")]
    IntervalOutOfRange {
        index: usize,
        first: usize,
        last: usize,
        n_samp: usize,
    },

    #[error("Interval {index} starts at sample {first}, not after the previous interval ending at {previous_last}")]
    IntervalOverlap {
        index: usize,
        first: usize,
        previous_last: usize,
    },

    #[error("zmap shape {actual:?} does not match expected {expected:?}")]
    ZMapShape {
        expected: [usize; 3],
        actual: [usize; 3],
    },
}

pub type Result<T> = std::result::Result<T, Error>;
