use crate::sparse::csr::CsrMatrix;
use crate::sparse::error::CscError;
use crate::sparse::kernel;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dim {
    pub nrows: usize,
    pub ncols: usize,
}

/// Compressed Sparse Column matrix.
///
/// `col_ptr` has length `ncols + 1` with `col_ptr[0] == 0` and
/// `col_ptr[ncols] == nnz`; `row_idx`/`values` hold the nonzeros of each
/// column with strictly increasing row indices. An optional CSR view of the
/// same matrix can be built on demand; any mutation of the CSC storage
/// drops that view.
#[derive(Debug, Clone)]
pub struct CscMatrix {
    pub dim: Dim,
    /// Column pointers, len = ncols + 1
    pub col_ptr: Vec<usize>,
    /// Row indices, len = nnz
    pub row_idx: Vec<usize>,
    /// Nonzero values, len = nnz
    pub values: Vec<f64>,
    rows: Option<CsrMatrix>,
}

impl CscMatrix {
    pub fn new(dim: Dim, col_ptr: Vec<usize>, row_idx: Vec<usize>, values: Vec<f64>) -> Self {
        Self {
            dim,
            col_ptr,
            row_idx,
            values,
            rows: None,
        }
    }

    /// An `nrows x ncols` matrix with no stored entries.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self::new(Dim { nrows, ncols }, vec![0; ncols + 1], Vec::new(), Vec::new())
    }

    /// number of stored nonzeros
    pub fn nnz(&self) -> usize {
        self.row_idx.len()
    }

    pub fn is_square(&self) -> bool {
        self.dim.nrows == self.dim.ncols
    }

    pub fn check_invariants(&self) -> Result<(), CscError> {
        if self.col_ptr.len() != self.dim.ncols + 1 {
            return Err(CscError::ColumnPointersLength {
                expected: self.dim.ncols + 1,
                actual: self.col_ptr.len(),
            });
        }
        if self.col_ptr[0] != 0 {
            return Err(CscError::ColumnPointer {
                index: 0,
                expected: 0,
                actual: self.col_ptr[0],
            });
        }
        if *self.col_ptr.last().unwrap_or(&0) != self.nnz() {
            return Err(CscError::ColumnPointer {
                index: self.dim.ncols,
                expected: self.nnz(),
                actual: *self.col_ptr.last().unwrap_or(&0),
            });
        }
        if self.row_idx.len() != self.values.len() {
            return Err(CscError::IndexValueLengthMismatch {
                row_indices: self.row_idx.len(),
                values: self.values.len(),
            });
        }
        for j in 0..self.dim.ncols {
            let (start, end) = (self.col_ptr[j], self.col_ptr[j + 1]);
            if start > end || end > self.nnz() {
                return Err(CscError::ColumnPointer {
                    index: j,
                    expected: start,
                    actual: end,
                });
            }
            let mut prev = None;
            for k in start..end {
                let r = self.row_idx[k];
                if r >= self.dim.nrows {
                    return Err(CscError::RowIndexOutOfRange {
                        index: r,
                        max: self.dim.nrows,
                    });
                }
                if let Some(p) = prev {
                    if r <= p {
                        return Err(CscError::RowsNotIncreasing {
                            col: j,
                            prev: p,
                            next: r,
                        });
                    }
                }
                if !self.values[k].is_finite() {
                    return Err(CscError::NonFiniteEntry { row: r, col: j });
                }
                prev = Some(r);
            }
        }
        Ok(())
    }

    /// `(row_indices, values)` slices for column j
    pub fn col(&self, j: usize) -> (&[usize], &[f64]) {
        let (s, e) = (self.col_ptr[j], self.col_ptr[j + 1]);
        (&self.row_idx[s..e], &self.values[s..e])
    }

    pub fn col_start(&self, j: usize) -> usize {
        self.col_ptr[j]
    }

    pub fn col_end(&self, j: usize) -> usize {
        self.col_ptr[j + 1]
    }

    pub fn row_index(&self, k: usize) -> usize {
        self.row_idx[k]
    }

    pub fn value(&self, k: usize) -> f64 {
        self.values[k]
    }

    /// Stored value at (i, j), or 0.0 when the position is not in the
    /// pattern. Row indices per column are sorted, so binary search.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        let (rows, vals) = self.col(j);
        match rows.binary_search(&i) {
            Ok(p) => vals[p],
            Err(_) => 0.0,
        }
    }

    /// `y[rows] += alpha * values` over the entries of column j.
    pub fn axpy_col(&self, j: usize, alpha: f64, y: &mut [f64]) {
        let (rows, vals) = self.col(j);
        for (&i, &v) in rows.iter().zip(vals.iter()) {
            y[i] += alpha * v;
        }
    }

    /// Overwrite the stored value at (i, j). Fails when the position is not
    /// in the sparsity pattern or the value is not finite. Any write drops
    /// the CSR view.
    pub fn set_value(&mut self, i: usize, j: usize, value: f64) -> Result<(), CscError> {
        if i >= self.dim.nrows || j >= self.dim.ncols {
            return Err(CscError::EntryOutOfBounds {
                row: i,
                col: j,
                nrows: self.dim.nrows,
                ncols: self.dim.ncols,
            });
        }
        if !value.is_finite() {
            return Err(CscError::NonFiniteEntry { row: i, col: j });
        }
        let start = self.col_ptr[j];
        let (rows, _) = self.col(j);
        match rows.binary_search(&i) {
            Ok(p) => {
                self.values[start + p] = value;
                self.invalidate_rows();
                Ok(())
            }
            Err(_) => Err(CscError::EntryOutOfBounds {
                row: i,
                col: j,
                nrows: self.dim.nrows,
                ncols: self.dim.ncols,
            }),
        }
    }

    /// Row-major view of the matrix, built on first use and retained until
    /// the next mutation.
    pub fn rows_view(&mut self) -> &CsrMatrix {
        if self.rows.is_none() {
            let view = CsrMatrix::from_parts(&self.dim, &self.col_ptr, &self.row_idx, &self.values);
            self.rows = Some(view);
        }
        self.rows.as_ref().expect("row view just built")
    }

    /// The CSR view if one is currently built and valid.
    pub fn cached_rows(&self) -> Option<&CsrMatrix> {
        self.rows.as_ref().filter(|r| r.valid)
    }

    pub fn invalidate_rows(&mut self) {
        self.rows = None;
    }
}

/// Builder from (col, row, value) triplets.
///
/// Entries are bucketed per column, then `build` sorts each column by row,
/// sums duplicates, and drops exact zeros.
#[derive(Debug)]
pub struct CscBuilder {
    dim: Dim,
    cols: Vec<Vec<(usize, f64)>>,
}

impl CscBuilder {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            dim: Dim { nrows, ncols },
            cols: vec![Vec::new(); ncols],
        }
    }

    pub fn push(&mut self, col: usize, row: usize, value: f64) -> Result<(), CscError> {
        if col >= self.dim.ncols || row >= self.dim.nrows {
            return Err(CscError::EntryOutOfBounds {
                row,
                col,
                nrows: self.dim.nrows,
                ncols: self.dim.ncols,
            });
        }
        if !value.is_finite() {
            return Err(CscError::NonFiniteEntry { row, col });
        }
        if value != 0.0 {
            self.cols[col].push((row, value));
        }
        Ok(())
    }

    pub fn build(self) -> Result<CscMatrix, CscError> {
        let ncols = self.dim.ncols;
        let mut col_ptr = Vec::with_capacity(ncols + 1);
        col_ptr.push(0);
        let mut row_idx = Vec::new();
        let mut values = Vec::new();

        let mut idx_buf: Vec<usize> = Vec::new();
        let mut val_buf: Vec<f64> = Vec::new();
        for entries in self.cols {
            idx_buf.clear();
            val_buf.clear();
            for (r, v) in entries {
                idx_buf.push(r);
                val_buf.push(v);
            }
            kernel::sort_pairs(&mut idx_buf, &mut val_buf);

            // combine duplicates, drop zero sums
            let mut k = 0;
            while k < idx_buf.len() {
                let r = idx_buf[k];
                let mut acc = val_buf[k];
                k += 1;
                while k < idx_buf.len() && idx_buf[k] == r {
                    acc += val_buf[k];
                    k += 1;
                }
                if acc != 0.0 {
                    row_idx.push(r);
                    values.push(acc);
                }
            }
            col_ptr.push(row_idx.len());
        }

        let a = CscMatrix::new(self.dim, col_ptr, row_idx, values);
        debug_assert!(a.check_invariants().is_ok());
        Ok(a)
    }
}
