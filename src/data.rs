//! Dense row-major matrix for encoded feature batches.
//!
//! Missing values are `f64::NAN`. The encoder never substitutes 0.0 for a
//! missing slot: several encodings use 0.0 as a legitimate value, and tree
//! scorers route missing values through dedicated default branches. The NaN
//! sentinel must therefore survive assembly verbatim.

use std::iter::FusedIterator;

/// Dense row-major matrix.
///
/// Rows are contiguous, which is the layout tree-ensemble scorers consume.
#[derive(Debug, Clone, PartialEq)]
pub struct RowMatrix<T = f64> {
    data: Box<[T]>,
    n_rows: usize,
    n_cols: usize,
}

impl<T> RowMatrix<T> {
    /// Create a matrix from flat row-major data.
    ///
    /// # Panics
    ///
    /// Panics if `data.len() != n_rows * n_cols`.
    pub fn from_vec(data: Vec<T>, n_rows: usize, n_cols: usize) -> Self {
        assert_eq!(
            data.len(),
            n_rows * n_cols,
            "data length {} does not match dimensions {}x{}",
            data.len(),
            n_rows,
            n_cols
        );
        Self {
            data: data.into_boxed_slice(),
            n_rows,
            n_cols,
        }
    }

    /// Stack encoded rows into a matrix.
    ///
    /// # Panics
    ///
    /// Panics if any row's length differs from `n_cols`. Encoded row width
    /// derives purely from model metadata, so unequal widths indicate a bug,
    /// not bad input.
    pub fn from_rows(rows: Vec<Vec<T>>, n_cols: usize) -> Self {
        let n_rows = rows.len();
        let mut data = Vec::with_capacity(n_rows * n_cols);
        for row in rows {
            assert_eq!(
                row.len(),
                n_cols,
                "encoded row has width {}, expected {}",
                row.len(),
                n_cols
            );
            data.extend(row);
        }
        Self::from_vec(data, n_rows, n_cols)
    }

    /// Number of rows.
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of columns.
    #[inline]
    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// Flat row-major data.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// A row as a contiguous slice. O(1).
    ///
    /// # Panics
    ///
    /// Panics if `row >= n_rows`.
    #[inline]
    pub fn row_slice(&self, row: usize) -> &[T] {
        assert!(row < self.n_rows, "row index {} out of bounds", row);
        let start = row * self.n_cols;
        &self.data[start..start + self.n_cols]
    }

    /// Iterate over rows.
    pub fn rows(&self) -> RowIter<'_, T> {
        RowIter {
            matrix: self,
            row: 0,
        }
    }
}

impl<T: Copy> RowMatrix<T> {
    /// Element at (row, col), or `None` if out of bounds.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        if row >= self.n_rows || col >= self.n_cols {
            return None;
        }
        Some(self.data[row * self.n_cols + col])
    }
}

impl RowMatrix<f64> {
    /// True if any element is the NaN missing sentinel.
    #[allow(clippy::eq_op)]
    pub fn has_missing(&self) -> bool {
        self.data.iter().any(|&x| x != x)
    }

    /// Fraction of non-missing elements. Empty matrices count as fully dense.
    #[allow(clippy::eq_op)]
    pub fn density(&self) -> f64 {
        if self.n_rows == 0 || self.n_cols == 0 {
            return 1.0;
        }
        let present = self.data.iter().filter(|&&x| x == x).count();
        present as f64 / (self.n_rows * self.n_cols) as f64
    }
}

/// Iterator over the rows of a [`RowMatrix`].
#[derive(Debug, Clone)]
pub struct RowIter<'a, T> {
    matrix: &'a RowMatrix<T>,
    row: usize,
}

impl<'a, T> Iterator for RowIter<'a, T> {
    type Item = &'a [T];

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.row >= self.matrix.n_rows {
            return None;
        }
        let slice = self.matrix.row_slice(self.row);
        self.row += 1;
        Some(slice)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.matrix.n_rows - self.row;
        (remaining, Some(remaining))
    }
}

impl<T> ExactSizeIterator for RowIter<'_, T> {}
impl<T> FusedIterator for RowIter<'_, T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rows_stacks_in_order() {
        let m = RowMatrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]], 2);
        assert_eq!(m.n_rows(), 2);
        assert_eq!(m.n_cols(), 2);
        assert_eq!(m.row_slice(0), &[1.0, 2.0]);
        assert_eq!(m.row_slice(1), &[3.0, 4.0]);
    }

    #[test]
    fn from_rows_empty_batch() {
        let m: RowMatrix<f64> = RowMatrix::from_rows(vec![], 5);
        assert_eq!(m.n_rows(), 0);
        assert_eq!(m.n_cols(), 5);
        assert_eq!(m.density(), 1.0);
    }

    #[test]
    #[should_panic(expected = "encoded row has width")]
    fn from_rows_ragged_panics() {
        RowMatrix::from_rows(vec![vec![1.0, 2.0], vec![3.0]], 2);
    }

    #[test]
    fn get_bounds() {
        let m = RowMatrix::from_vec(vec![1.0, 2.0, 3.0, 4.0], 2, 2);
        assert_eq!(m.get(1, 1), Some(4.0));
        assert_eq!(m.get(2, 0), None);
        assert_eq!(m.get(0, 2), None);
    }

    #[test]
    fn missing_sentinel_survives_assembly() {
        let m = RowMatrix::from_rows(vec![vec![0.0, f64::NAN], vec![1.0, 2.0]], 2);
        assert!(m.has_missing());
        assert_eq!(m.density(), 0.75);
        // 0.0 is a value, not a missing marker.
        assert_eq!(m.get(0, 0), Some(0.0));
        assert!(m.get(0, 1).unwrap().is_nan());
    }

    #[test]
    fn rows_iterator() {
        let m = RowMatrix::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, 2);
        let rows: Vec<&[f64]> = m.rows().collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2], &[5.0, 6.0]);
    }
}
