//! Global pixel to local submap translation.

use crate::error::{Error, Result};

/// Where an owned pixel lives in the local accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelLocation {
    pub local_submap: usize,
    pub subpixel: usize,
}

impl PixelLocation {
    /// Flat offset of component 0 in a `[n_local_submap, n_pix_submap, nnz]` buffer.
    #[inline]
    pub fn zmap_offset(&self, n_pix_submap: usize, nnz: usize) -> usize {
        nnz * (self.local_submap * n_pix_submap + self.subpixel)
    }
}

/// How the full sky is split into submaps and which of them this process owns.
///
/// `global2local[g]` is the local slot of global submap `g`, or a negative
/// value when the submap is not stored locally.
#[derive(Debug, Clone, Copy)]
pub struct SubmapLayout<'a> {
    global2local: &'a [i64],
    n_pix_submap: usize,
    n_local_submap: usize,
}

impl<'a> SubmapLayout<'a> {
    pub fn new(
        global2local: &'a [i64],
        n_pix_submap: usize,
        n_local_submap: usize,
    ) -> Result<Self> {
        if n_pix_submap == 0 {
            return Err(Error::ZeroDimension {
                name: "n_pix_submap",
            });
        }
        Ok(Self {
            global2local,
            n_pix_submap,
            n_local_submap,
        })
    }

    #[inline]
    pub fn global2local(&self) -> &'a [i64] {
        self.global2local
    }

    #[inline]
    pub fn n_pix_submap(&self) -> usize {
        self.n_pix_submap
    }

    #[inline]
    pub fn n_local_submap(&self) -> usize {
        self.n_local_submap
    }

    #[inline]
    pub fn n_global_submap(&self) -> usize {
        self.global2local.len()
    }

    /// Number of locally owned global submaps.
    pub fn owned_count(&self) -> usize {
        self.global2local
            .iter()
            .filter(|&&local| local >= 0 && (local as u64) < self.n_local_submap as u64)
            .count()
    }

    /// Translates a global pixel into its local submap and subpixel.
    ///
    /// Returns `None` for negative pixels and for pixels whose submap is not
    /// owned: beyond the table, mapped to a negative slot, or mapped past
    /// `n_local_submap`.
    #[inline]
    pub fn locate(&self, pixel: i64) -> Option<PixelLocation> {
        if pixel < 0 {
            return None;
        }
        let pixel = pixel as u64;
        let n_pix_submap = self.n_pix_submap as u64;
        let global = pixel / n_pix_submap;
        let local = *self.global2local.get(usize::try_from(global).ok()?)?;
        if local < 0 || local as u64 >= self.n_local_submap as u64 {
            return None;
        }
        Some(PixelLocation {
            local_submap: local as usize,
            subpixel: (pixel - global * n_pix_submap) as usize,
        })
    }
}
