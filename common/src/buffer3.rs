use std::ops::{Deref, DerefMut, Index, IndexMut, Range};
use std::slice;

/// Dense row-major 3-D buffer indexed `(plane, row, col)`.
///
/// `plane` is the slowest axis, `col` the fastest, so a single plane is a
/// contiguous `rows * cols` slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer3<T> {
    values: Vec<T>,
    planes: usize,
    rows: usize,
    cols: usize,
}

impl<T> Buffer3<T> {
    pub fn new(planes: usize, rows: usize, cols: usize, values: Vec<T>) -> Self {
        assert_eq!(
            values.len(),
            planes * rows * cols,
            "values length must equal planes * rows * cols"
        );
        Self {
            values,
            planes,
            rows,
            cols,
        }
    }

    #[inline]
    pub fn index(&self, plane: usize, row: usize, col: usize) -> usize {
        debug_assert!(plane < self.planes && row < self.rows && col < self.cols);
        (plane * self.rows + row) * self.cols + col
    }

    #[inline]
    pub fn get(&self, plane: usize, row: usize, col: usize) -> &T {
        &self.values[self.index(plane, row, col)]
    }

    #[inline]
    pub fn get_mut(&mut self, plane: usize, row: usize, col: usize) -> &mut T {
        let idx = self.index(plane, row, col);
        &mut self.values[idx]
    }

    #[inline]
    pub fn planes(&self) -> usize {
        self.planes
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of elements in one plane.
    #[inline]
    pub fn plane_len(&self) -> usize {
        self.rows * self.cols
    }

    #[inline]
    pub fn plane(&self, plane: usize) -> &[T] {
        let len = self.plane_len();
        &self.values[plane * len..(plane + 1) * len]
    }

    #[inline]
    pub fn plane_mut(&mut self, plane: usize) -> &mut [T] {
        let len = self.plane_len();
        &mut self.values[plane * len..(plane + 1) * len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    #[inline]
    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    #[inline]
    pub fn into_vec(self) -> Vec<T> {
        self.values
    }

    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.values.iter()
    }
}

impl<T: Default + Clone> Buffer3<T> {
    pub fn new_default(planes: usize, rows: usize, cols: usize) -> Self {
        Self {
            values: vec![T::default(); planes * rows * cols],
            planes,
            rows,
            cols,
        }
    }
}

impl<T: Clone> Buffer3<T> {
    pub fn new_filled(planes: usize, rows: usize, cols: usize, value: T) -> Self {
        Self {
            values: vec![value; planes * rows * cols],
            planes,
            rows,
            cols,
        }
    }

    #[inline]
    pub fn fill(&mut self, value: T) {
        self.values.fill(value);
    }
}

impl<T> Index<(usize, usize, usize)> for Buffer3<T> {
    type Output = T;

    #[inline]
    fn index(&self, (plane, row, col): (usize, usize, usize)) -> &Self::Output {
        &self.values[(plane * self.rows + row) * self.cols + col]
    }
}

impl<T> IndexMut<(usize, usize, usize)> for Buffer3<T> {
    #[inline]
    fn index_mut(&mut self, (plane, row, col): (usize, usize, usize)) -> &mut Self::Output {
        &mut self.values[(plane * self.rows + row) * self.cols + col]
    }
}

impl<T> Index<Range<usize>> for Buffer3<T> {
    type Output = [T];

    #[inline]
    fn index(&self, range: Range<usize>) -> &Self::Output {
        &self.values[range]
    }
}

impl<T> Deref for Buffer3<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.values
    }
}

impl<T> DerefMut for Buffer3<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.values
    }
}

impl<T> From<Buffer3<T>> for Vec<T> {
    #[inline]
    fn from(buffer: Buffer3<T>) -> Self {
        buffer.values
    }
}
