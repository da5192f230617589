//! Local pixel-domain accumulator.

use common::Buffer3;

use crate::error::{Error, Result};
use crate::layout::SubmapLayout;

/// Accumulator of shape `[n_local_submap, n_pix_submap, nnz]`.
///
/// Only ever added to by the projection; callers zero it between uses.
#[derive(Debug, Clone, PartialEq)]
pub struct ZMap {
    buffer: Buffer3<f64>,
}

impl ZMap {
    /// Zero-filled accumulator.
    pub fn new(n_local_submap: usize, n_pix_submap: usize, nnz: usize) -> Self {
        Self {
            buffer: Buffer3::new_default(n_local_submap, n_pix_submap, nnz),
        }
    }

    /// Zero-filled accumulator sized for `layout`.
    pub fn for_layout(layout: &SubmapLayout<'_>, nnz: usize) -> Self {
        Self::new(layout.n_local_submap(), layout.n_pix_submap(), nnz)
    }

    /// Wraps existing values, e.g. an accumulator carried over from a previous call.
    pub fn from_values(
        n_local_submap: usize,
        n_pix_submap: usize,
        nnz: usize,
        values: Vec<f64>,
    ) -> Result<Self> {
        let expected = n_local_submap * n_pix_submap * nnz;
        if values.len() != expected {
            return Err(Error::LengthMismatch {
                buffer: "zmap",
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            buffer: Buffer3::new(n_local_submap, n_pix_submap, nnz, values),
        })
    }

    /// `[n_local_submap, n_pix_submap, nnz]`.
    #[inline]
    pub fn shape(&self) -> [usize; 3] {
        [self.buffer.planes(), self.buffer.rows(), self.buffer.cols()]
    }

    #[inline]
    pub fn n_local_submap(&self) -> usize {
        self.buffer.planes()
    }

    #[inline]
    pub fn n_pix_submap(&self) -> usize {
        self.buffer.rows()
    }

    #[inline]
    pub fn nnz(&self) -> usize {
        self.buffer.cols()
    }

    /// Number of values stored per local submap.
    #[inline]
    pub fn submap_len(&self) -> usize {
        self.buffer.plane_len()
    }

    #[inline]
    pub fn get(&self, local_submap: usize, subpixel: usize, component: usize) -> f64 {
        *self.buffer.get(local_submap, subpixel, component)
    }

    /// All `nnz` components of one pixel.
    pub fn pixel(&self, local_submap: usize, subpixel: usize) -> &[f64] {
        let start = self.buffer.index(local_submap, subpixel, 0);
        &self.buffer[start..start + self.nnz()]
    }

    pub fn submap(&self, local_submap: usize) -> &[f64] {
        self.buffer.plane(local_submap)
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        self.buffer.values()
    }

    #[inline]
    pub fn values_mut(&mut self) -> &mut [f64] {
        self.buffer.values_mut()
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
    }

    pub fn into_buffer(self) -> Buffer3<f64> {
        self.buffer
    }

    /// Fails unless the accumulator matches `layout` and `nnz`.
    pub fn check_layout(&self, layout: &SubmapLayout<'_>, nnz: usize) -> Result<()> {
        let expected = [layout.n_local_submap(), layout.n_pix_submap(), nnz];
        let actual = self.shape();
        if expected != actual {
            return Err(Error::ZMapShape { expected, actual });
        }
        Ok(())
    }
}
