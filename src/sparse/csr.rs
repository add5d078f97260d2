use crate::sparse::csc::{CscMatrix, Dim};
use crate::sparse::error::CsrError;

/// Compressed Sparse Row view of a CSC matrix.
///
/// Built by a three-phase pipeline: `prepare` counts per-row lengths into
/// `row_ptr`, `build` places column indices and values in order, `finalize`
/// marks the view valid. The owning [`CscMatrix`] drops the view whenever
/// its storage is mutated.
#[derive(Debug, Clone)]
pub struct CsrMatrix {
    pub dim: Dim,
    /// Row pointers, len = nrows + 1
    pub row_ptr: Vec<usize>,
    /// Column indices, len = nnz
    pub col_idx: Vec<usize>,
    /// Nonzero values, len = nnz
    pub values: Vec<f64>,
    /// Cleared when the source CSC changes; set by `finalize`.
    pub valid: bool,
}

impl CsrMatrix {
    /// Phase 1: allocate and count per-row lengths into `row_ptr`
    /// (prefix-summed so `row_ptr[i]..row_ptr[i+1]` spans row i).
    fn prepare(dim: &Dim, row_idx: &[usize]) -> CsrMatrix {
        let mut row_ptr = vec![0usize; dim.nrows + 1];
        for &r in row_idx {
            row_ptr[r + 1] += 1;
        }
        for i in 0..dim.nrows {
            row_ptr[i + 1] += row_ptr[i];
        }
        let nnz = row_idx.len();
        CsrMatrix {
            dim: dim.clone(),
            row_ptr,
            col_idx: vec![0; nnz],
            values: vec![0.0; nnz],
            valid: false,
        }
    }

    /// Phase 2: place `col_idx` and `values` column by column. Within a
    /// row the columns come out ascending because the source is walked in
    /// column order.
    fn build(&mut self, col_ptr: &[usize], row_idx: &[usize], values: &[f64]) {
        let mut next = self.row_ptr.clone();
        for j in 0..self.dim.ncols {
            for k in col_ptr[j]..col_ptr[j + 1] {
                let r = row_idx[k];
                let p = next[r];
                self.col_idx[p] = j;
                self.values[p] = values[k];
                next[r] += 1;
            }
        }
    }

    /// Phase 3: mark the view usable.
    fn finalize(&mut self) {
        self.valid = true;
    }

    pub fn from_parts(dim: &Dim, col_ptr: &[usize], row_idx: &[usize], values: &[f64]) -> CsrMatrix {
        let mut csr = CsrMatrix::prepare(dim, row_idx);
        csr.build(col_ptr, row_idx, values);
        csr.finalize();
        csr
    }

    pub fn from_csc(a: &CscMatrix) -> CsrMatrix {
        CsrMatrix::from_parts(&a.dim, &a.col_ptr, &a.row_idx, &a.values)
    }

    pub fn nnz(&self) -> usize {
        self.col_idx.len()
    }

    /// `(column_indices, values)` slices for row i.
    pub fn row(&self, i: usize) -> (&[usize], &[f64]) {
        let (s, e) = (self.row_ptr[i], self.row_ptr[i + 1]);
        (&self.col_idx[s..e], &self.values[s..e])
    }

    pub fn check_invariants(&self) -> Result<(), CsrError> {
        if !self.valid {
            return Err(CsrError::Invalidated);
        }
        if self.row_ptr.len() != self.dim.nrows + 1 {
            return Err(CsrError::RowPointersLength {
                expected: self.dim.nrows + 1,
                actual: self.row_ptr.len(),
            });
        }
        if self.row_ptr[0] != 0 {
            return Err(CsrError::RowPointer {
                index: 0,
                expected: 0,
                actual: self.row_ptr[0],
            });
        }
        if *self.row_ptr.last().unwrap_or(&0) != self.nnz() {
            return Err(CsrError::RowPointer {
                index: self.dim.nrows,
                expected: self.nnz(),
                actual: *self.row_ptr.last().unwrap_or(&0),
            });
        }
        for i in 0..self.dim.nrows {
            let (s, e) = (self.row_ptr[i], self.row_ptr[i + 1]);
            if s > e || e > self.nnz() {
                return Err(CsrError::RowPointer {
                    index: i,
                    expected: s,
                    actual: e,
                });
            }
            for &c in &self.col_idx[s..e] {
                if c >= self.dim.ncols {
                    return Err(CsrError::ColumnIndexOutOfRange {
                        index: c,
                        max: self.dim.ncols,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::csc::CscBuilder;

    #[test]
    fn build_and_access_rows() {
        // A = [ 10  0  3
        //       0 20  0
        //       2  0 35 ]
        let mut b = CscBuilder::new(3, 3);
        b.push(0, 0, 10.0).unwrap();
        b.push(2, 0, 3.0).unwrap();
        b.push(1, 1, 20.0).unwrap();
        b.push(0, 2, 2.0).unwrap();
        b.push(2, 2, 35.0).unwrap();
        let mut a = b.build().unwrap();

        let csr = a.rows_view();
        assert_eq!(csr.nnz(), 5);
        assert_eq!(csr.row_ptr, vec![0, 2, 3, 5]);

        let (c0, v0) = csr.row(0);
        assert_eq!(c0, &[0, 2]);
        assert_eq!(v0, &[10.0, 3.0]);

        let (c1, v1) = csr.row(1);
        assert_eq!(c1, &[1]);
        assert_eq!(v1, &[20.0]);

        let (c2, v2) = csr.row(2);
        assert_eq!(c2, &[0, 2]);
        assert_eq!(v2, &[2.0, 35.0]);

        assert!(csr.check_invariants().is_ok());
    }

    #[test]
    fn mutation_invalidates_view() {
        let mut b = CscBuilder::new(2, 2);
        b.push(0, 0, 1.0).unwrap();
        b.push(1, 1, 2.0).unwrap();
        let mut a = b.build().unwrap();

        a.rows_view();
        a.set_value(0, 0, 3.0).unwrap();
        assert!(a.cached_rows().is_none());

        // rebuilt view sees the new value
        let csr = a.rows_view();
        assert_eq!(csr.row(0).1, &[3.0]);
    }

    #[test]
    fn invalidated_view_fails_checks() {
        let mut csr = CsrMatrix::from_parts(
            &Dim { nrows: 1, ncols: 1 },
            &[0, 1],
            &[0],
            &[1.0],
        );
        assert!(csr.check_invariants().is_ok());
        csr.valid = false;
        assert_eq!(csr.check_invariants(), Err(CsrError::Invalidated));
    }
}
