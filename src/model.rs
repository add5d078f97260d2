//! Read-only problem view consumed by the solver core.
//!
//! A problem is `min c'x  s.t.  A x {<=,=} rhs, lb <= x <= ub` after
//! normalization: `>=` rows are negated into `<=` rows at build time and the
//! per-row orientation is remembered so duals and activities can be mapped
//! back. Every row owns one slack column, so the solver sees a uniform
//! column space of `n` structural columns followed by `m` unit slack
//! columns.

use thiserror::Error;

use crate::env::INFINITY;
use crate::sparse::kernel;
use crate::sparse::{CscBuilder, CscError, CscMatrix};

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error(transparent)]
    Matrix(#[from] CscError),

    #[error("row sense '{0}' is not one of '<', '=', '>'")]
    InvalidSense(char),

    #[error("objective coefficient {index} is not finite")]
    NonFiniteObjective { index: usize },

    #[error("right-hand side {index} is not finite")]
    NonFiniteRhs { index: usize },

    #[error("bound {index} is NaN")]
    NanBound { index: usize },

    #[error("column index {index} out of range ({max} columns)")]
    ColumnOutOfRange { index: usize, max: usize },

    #[error("row index {index} out of range ({max} rows)")]
    RowOutOfRange { index: usize, max: usize },
}

/// Row sense after normalization; `Ge` only appears pre-normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSense {
    Le,
    Eq,
    Ge,
}

impl RowSense {
    pub fn from_char(c: char) -> Result<RowSense, ModelError> {
        match c {
            '<' => Ok(RowSense::Le),
            '=' => Ok(RowSense::Eq),
            '>' => Ok(RowSense::Ge),
            other => Err(ModelError::InvalidSense(other)),
        }
    }

    pub fn as_char(self) -> char {
        match self {
            RowSense::Le => '<',
            RowSense::Eq => '=',
            RowSense::Ge => '>',
        }
    }
}

/// Incremental construction surface for [`LpProblem`].
#[derive(Debug)]
pub struct LpProblemBuilder {
    nrows: usize,
    ncols: usize,
    entries: CscBuilder,
    obj: Vec<f64>,
    lb: Vec<f64>,
    ub: Vec<f64>,
    senses: Vec<RowSense>,
    rhs: Vec<f64>,
}

impl LpProblemBuilder {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            entries: CscBuilder::new(nrows, ncols),
            obj: vec![0.0; ncols],
            // default bounds 0 <= x < +inf
            lb: vec![0.0; ncols],
            ub: vec![INFINITY; ncols],
            senses: vec![RowSense::Le; nrows],
            rhs: vec![0.0; nrows],
        }
    }

    pub fn coefficient(&mut self, row: usize, col: usize, value: f64) -> Result<(), ModelError> {
        self.entries.push(col, row, value)?;
        Ok(())
    }

    pub fn objective(&mut self, col: usize, value: f64) -> Result<(), ModelError> {
        if col >= self.ncols {
            return Err(ModelError::ColumnOutOfRange {
                index: col,
                max: self.ncols,
            });
        }
        self.obj[col] = value;
        Ok(())
    }

    pub fn bounds(&mut self, col: usize, lb: f64, ub: f64) -> Result<(), ModelError> {
        if col >= self.ncols {
            return Err(ModelError::ColumnOutOfRange {
                index: col,
                max: self.ncols,
            });
        }
        self.lb[col] = lb;
        self.ub[col] = ub;
        Ok(())
    }

    pub fn row(&mut self, row: usize, sense: char, rhs: f64) -> Result<(), ModelError> {
        if row >= self.nrows {
            return Err(ModelError::RowOutOfRange {
                index: row,
                max: self.nrows,
            });
        }
        self.senses[row] = RowSense::from_char(sense)?;
        self.rhs[row] = rhs;
        Ok(())
    }

    /// Validate, build the CSC matrix, and normalize `>=` rows into `<=`
    /// rows by negating their coefficients and right-hand side.
    pub fn finalize(self) -> Result<LpProblem, ModelError> {
        for (j, &c) in self.obj.iter().enumerate() {
            if !c.is_finite() {
                return Err(ModelError::NonFiniteObjective { index: j });
            }
        }
        for (i, &b) in self.rhs.iter().enumerate() {
            if !b.is_finite() {
                return Err(ModelError::NonFiniteRhs { index: i });
            }
        }
        for j in 0..self.ncols {
            if self.lb[j].is_nan() || self.ub[j].is_nan() {
                return Err(ModelError::NanBound { index: j });
            }
        }

        let mut a = self.entries.build()?;
        let mut senses = self.senses;
        let mut rhs = self.rhs;
        let mut row_scale = vec![1.0; self.nrows];
        let flip: Vec<bool> = senses.iter().map(|s| *s == RowSense::Ge).collect();
        if flip.iter().any(|&f| f) {
            for k in 0..a.nnz() {
                if flip[a.row_idx[k]] {
                    a.values[k] = -a.values[k];
                }
            }
            a.invalidate_rows();
            for i in 0..self.nrows {
                if flip[i] {
                    rhs[i] = -rhs[i];
                    row_scale[i] = -1.0;
                    senses[i] = RowSense::Le;
                }
            }
        }

        // map IEEE infinities onto the sentinel so bound tests stay simple
        let clamp = |v: f64| {
            if v == f64::INFINITY {
                INFINITY
            } else if v == f64::NEG_INFINITY {
                -INFINITY
            } else {
                v
            }
        };
        let lb = self.lb.into_iter().map(clamp).collect();
        let ub = self.ub.into_iter().map(clamp).collect();

        let problem = LpProblem {
            a,
            obj: self.obj,
            lb,
            ub,
            senses,
            rhs,
            row_scale,
        };
        problem.a.check_invariants()?;
        Ok(problem)
    }
}

/// The normalized problem the solver reads.
#[derive(Debug, Clone)]
pub struct LpProblem {
    a: CscMatrix,
    obj: Vec<f64>,
    lb: Vec<f64>,
    ub: Vec<f64>,
    senses: Vec<RowSense>,
    rhs: Vec<f64>,
    row_scale: Vec<f64>,
}

impl LpProblem {
    pub fn builder(nrows: usize, ncols: usize) -> LpProblemBuilder {
        LpProblemBuilder::new(nrows, ncols)
    }

    pub fn num_rows(&self) -> usize {
        self.a.dim.nrows
    }

    /// Structural columns only.
    pub fn num_structural(&self) -> usize {
        self.a.dim.ncols
    }

    /// Structural plus slack columns.
    pub fn num_cols(&self) -> usize {
        self.num_structural() + self.num_rows()
    }

    pub fn nnz(&self) -> usize {
        self.a.nnz()
    }

    pub fn matrix(&self) -> &CscMatrix {
        &self.a
    }

    pub fn matrix_mut(&mut self) -> &mut CscMatrix {
        &mut self.a
    }

    pub fn rhs(&self) -> &[f64] {
        &self.rhs
    }

    pub fn senses(&self) -> &[RowSense] {
        &self.senses
    }

    /// +1 for rows kept as given, -1 for rows negated from `>=`.
    pub fn row_scale(&self) -> &[f64] {
        &self.row_scale
    }

    pub fn is_slack(&self, col: usize) -> bool {
        col >= self.num_structural()
    }

    pub fn slack_row(&self, col: usize) -> Option<usize> {
        col.checked_sub(self.num_structural())
            .filter(|&i| i < self.num_rows())
    }

    pub fn obj_coef(&self, col: usize) -> f64 {
        if col < self.num_structural() {
            self.obj[col]
        } else {
            0.0
        }
    }

    pub fn objective(&self) -> &[f64] {
        &self.obj
    }

    /// Bounds of any column in the uniform space; slack bounds encode the
    /// row sense (`<=` rows: [0, inf), `=` rows: [0, 0]).
    pub fn col_bounds(&self, col: usize) -> (f64, f64) {
        if let Some(i) = self.slack_row(col) {
            match self.senses[i] {
                RowSense::Eq => (0.0, 0.0),
                _ => (0.0, INFINITY),
            }
        } else {
            (self.lb[col], self.ub[col])
        }
    }

    pub fn structural_bounds(&self) -> (&[f64], &[f64]) {
        (&self.lb, &self.ub)
    }

    /// Visit the nonzeros of column `col` in the uniform space.
    pub fn for_each_col_entry(&self, col: usize, mut f: impl FnMut(usize, f64)) {
        if let Some(i) = self.slack_row(col) {
            f(i, 1.0);
        } else {
            let (rows, vals) = self.a.col(col);
            for (&r, &v) in rows.iter().zip(vals.iter()) {
                f(r, v);
            }
        }
    }

    /// `y . A[:, col]` in the uniform column space.
    pub fn col_dot(&self, col: usize, y: &[f64]) -> f64 {
        if let Some(i) = self.slack_row(col) {
            y[i]
        } else {
            let (rows, vals) = self.a.col(col);
            kernel::sparse_dot(rows, vals, y)
        }
    }

    /// Gather column `col` into parallel sparse buffers.
    pub fn gather_col(&self, col: usize, idx: &mut Vec<usize>, val: &mut Vec<f64>) {
        idx.clear();
        val.clear();
        self.for_each_col_entry(col, |i, v| {
            idx.push(i);
            val.push(v);
        });
    }

    /// Scatter column `col` into a dense, pre-zeroed vector of length m.
    pub fn scatter_col(&self, col: usize, out: &mut [f64]) {
        self.for_each_col_entry(col, |i, v| out[i] = v);
    }
}
