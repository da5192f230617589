//! Borrowed projection inputs and their validation.
//!
//! Every time-ordered buffer is a flat row-major array of `rows * n_samp`
//! samples (`rows * n_samp * nnz` for weights). Detectors reach their rows
//! through the four index tables, and several detectors may share a row.

use crate::error::{Error, Result};

/// Borrowed inputs of one projection call.
///
/// The number of detectors is the length of `pixel_index`; the other
/// per-detector tables must agree with it.
#[derive(Debug, Clone, Copy)]
pub struct Projection<'a> {
    pub pixel_index: &'a [i32],
    pub weight_index: &'a [i32],
    pub flag_index: &'a [i32],
    pub data_index: &'a [i32],
    pub pixels: &'a [i64],
    pub weights: &'a [f64],
    pub det_data: &'a [f64],
    pub det_flags: &'a [u8],
    pub det_scale: &'a [f64],
    pub shared_flags: &'a [u8],
    pub n_samp: usize,
    pub nnz: usize,
}

/// Dimensions inferred from a validated [`Projection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionShape {
    pub n_det: usize,
    pub n_samp: usize,
    pub nnz: usize,
    pub pixel_rows: usize,
    pub weight_rows: usize,
    pub flag_rows: usize,
    pub data_rows: usize,
}

/// Rows one detector reads in each time-ordered buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorRows {
    pub pixel: usize,
    pub weight: usize,
    pub flag: usize,
    pub data: usize,
}

/// The samples of one detector, resolved through its row indices.
#[derive(Debug, Clone, Copy)]
pub struct DetectorView<'a> {
    pub pixels: &'a [i64],
    /// `n_samp * nnz` weights of this detector.
    pub weights: &'a [f64],
    pub data: &'a [f64],
    pub flags: &'a [u8],
    pub scale: f64,
    /// Offset of `weights` inside the full weights buffer.
    pub weight_offset: usize,
}

/// A [`Projection`] whose shapes and row indices have been checked.
#[derive(Debug, Clone)]
pub struct CheckedProjection<'a> {
    projection: Projection<'a>,
    shape: ProjectionShape,
    rows: Vec<DetectorRows>,
}

impl<'a> Projection<'a> {
    #[inline]
    pub fn n_det(&self) -> usize {
        self.pixel_index.len()
    }

    /// Checks buffer lengths and resolves every detector's rows.
    pub fn validate(&self) -> Result<CheckedProjection<'a>> {
        let n_det = self.n_det();
        let n_samp = self.n_samp;
        let nnz = self.nnz;

        if nnz == 0 {
            return Err(Error::ZeroDimension { name: "nnz" });
        }
        if n_samp == 0
            && !(self.pixels.is_empty()
                && self.weights.is_empty()
                && self.det_data.is_empty()
                && self.det_flags.is_empty())
        {
            return Err(Error::ZeroDimension { name: "n_samp" });
        }

        expect_len("weight_index", self.weight_index.len(), n_det)?;
        expect_len("flag_index", self.flag_index.len(), n_det)?;
        expect_len("data_index", self.data_index.len(), n_det)?;
        expect_len("det_scale", self.det_scale.len(), n_det)?;
        expect_len("shared_flags", self.shared_flags.len(), n_samp)?;

        let shape = ProjectionShape {
            n_det,
            n_samp,
            nnz,
            pixel_rows: row_count("pixels", self.pixels.len(), n_samp)?,
            weight_rows: row_count("weights", self.weights.len(), n_samp * nnz)?,
            flag_rows: row_count("det_flags", self.det_flags.len(), n_samp)?,
            data_rows: row_count("det_data", self.det_data.len(), n_samp)?,
        };

        let rows = (0..n_det)
            .map(|idet| {
                let check = |table, index: &[i32], rows| {
                    // no sample is ever read from an empty timeline
                    let rows = if n_samp == 0 { None } else { Some(rows) };
                    checked_row(table, idet, index[idet], rows)
                };
                Ok(DetectorRows {
                    pixel: check("pixel_index", self.pixel_index, shape.pixel_rows)?,
                    weight: check("weight_index", self.weight_index, shape.weight_rows)?,
                    flag: check("flag_index", self.flag_index, shape.flag_rows)?,
                    data: check("data_index", self.data_index, shape.data_rows)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(CheckedProjection {
            projection: *self,
            shape,
            rows,
        })
    }
}

impl<'a> CheckedProjection<'a> {
    #[inline]
    pub fn shape(&self) -> &ProjectionShape {
        &self.shape
    }

    #[inline]
    pub fn projection(&self) -> &Projection<'a> {
        &self.projection
    }

    #[inline]
    pub fn rows(&self) -> &[DetectorRows] {
        &self.rows
    }

    /// Row slices of detector `idet`.
    pub fn detector(&self, idet: usize) -> DetectorView<'a> {
        let n_samp = self.shape.n_samp;
        let nnz = self.shape.nnz;
        let rows = self.rows[idet];
        let p = &self.projection;
        let weight_offset = rows.weight * n_samp * nnz;

        DetectorView {
            pixels: &p.pixels[rows.pixel * n_samp..(rows.pixel + 1) * n_samp],
            weights: &p.weights[weight_offset..weight_offset + n_samp * nnz],
            data: &p.det_data[rows.data * n_samp..(rows.data + 1) * n_samp],
            flags: &p.det_flags[rows.flag * n_samp..(rows.flag + 1) * n_samp],
            scale: p.det_scale[idet],
            weight_offset,
        }
    }
}

fn expect_len(buffer: &'static str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(Error::LengthMismatch {
            buffer,
            expected,
            actual,
        });
    }
    Ok(())
}

fn row_count(buffer: &'static str, len: usize, row_len: usize) -> Result<usize> {
    if row_len == 0 {
        return Ok(0);
    }
    if len % row_len != 0 {
        return Err(Error::RaggedBuffer {
            buffer,
            len,
            row_len,
        });
    }
    Ok(len / row_len)
}

/// `rows == None` accepts any non-negative row.
fn checked_row(
    table: &'static str,
    detector: usize,
    row: i32,
    rows: Option<usize>,
) -> Result<usize> {
    match (usize::try_from(row), rows) {
        (Ok(r), None) => Ok(r),
        (Ok(r), Some(rows)) if r < rows => Ok(r),
        _ => Err(Error::RowOutOfRange {
            table,
            detector,
            row,
            rows: rows.unwrap_or(0),
        }),
    }
}
