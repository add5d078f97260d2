//! LU factors of the last refactored basis.
//!
//! Left-looking column factorization with partial pivoting over the basis
//! columns, stored column-wise: the unit diagonal of L is implicit and the
//! diagonal of U is held separately. Row pivoting is implicit through
//! `prow` (elimination position -> original row); the column permutation is
//! the identity because columns are eliminated in basis-header order.

use super::BasisError;
use crate::model::LpProblem;

#[derive(Debug, Clone)]
pub struct LuFactors {
    m: usize,
    /// position k -> original row chosen as pivot at step k
    prow: Vec<usize>,
    /// original row -> elimination position
    pinv: Vec<usize>,
    /// column permutation, identity (kept so solves and snapshots carry
    /// the full permutation pair)
    pcol: Vec<usize>,

    l_colptr: Vec<usize>,
    /// original row indices, unit diagonal not stored
    l_rows: Vec<usize>,
    l_vals: Vec<f64>,

    u_colptr: Vec<usize>,
    /// elimination positions j < k, diagonal not stored
    u_pos: Vec<usize>,
    u_vals: Vec<f64>,
    u_diag: Vec<f64>,

    pub valid: bool,

    // factorization workspace
    w: Vec<f64>,
    pattern: Vec<usize>,
    mark: Vec<u32>,
    stamp: u32,
    pivotal: Vec<bool>,
}

impl LuFactors {
    pub fn new(m: usize) -> Self {
        Self {
            m,
            prow: Vec::with_capacity(m),
            pinv: vec![0; m],
            pcol: (0..m).collect(),
            l_colptr: vec![0],
            l_rows: Vec::new(),
            l_vals: Vec::new(),
            u_colptr: vec![0],
            u_pos: Vec::new(),
            u_vals: Vec::new(),
            u_diag: vec![0.0; m],
            valid: false,
            w: vec![0.0; m],
            pattern: Vec::with_capacity(m),
            mark: vec![0; m],
            stamp: 0,
            pivotal: vec![false; m],
        }
    }

    pub fn dim(&self) -> usize {
        self.m
    }

    /// Stored nonzeros of L, excluding the unit diagonal.
    pub fn lnz(&self) -> usize {
        self.l_vals.len()
    }

    /// Stored nonzeros of U, excluding the diagonal.
    pub fn unz(&self) -> usize {
        self.u_vals.len()
    }

    pub fn row_permutation(&self) -> &[usize] {
        &self.prow
    }

    /// Inverse of the row permutation: original row -> elimination
    /// position.
    pub fn row_positions(&self) -> &[usize] {
        &self.pinv
    }

    pub fn col_permutation(&self) -> &[usize] {
        &self.pcol
    }

    fn l_col(&self, k: usize) -> (&[usize], &[f64]) {
        let (s, e) = (self.l_colptr[k], self.l_colptr[k + 1]);
        (&self.l_rows[s..e], &self.l_vals[s..e])
    }

    fn u_col(&self, k: usize) -> (&[usize], &[f64]) {
        let (s, e) = (self.u_colptr[k], self.u_colptr[k + 1]);
        (&self.u_pos[s..e], &self.u_vals[s..e])
    }

    fn next_stamp(&mut self) -> u32 {
        if self.stamp == u32::MAX {
            self.mark.fill(0);
            self.stamp = 0;
        }
        self.stamp += 1;
        self.stamp
    }

    /// Factorize the basis described by `header` over the problem's uniform
    /// column space. Permutations are reset to identity and rebuilt.
    pub fn factorize(
        &mut self,
        problem: &LpProblem,
        header: &[usize],
        pivot_tol: f64,
    ) -> Result<(), BasisError> {
        let m = self.m;
        debug_assert_eq!(header.len(), m);

        self.valid = false;
        self.prow.clear();
        self.pinv.fill(0);
        self.pivotal.fill(false);
        self.l_colptr.clear();
        self.l_colptr.push(0);
        self.l_rows.clear();
        self.l_vals.clear();
        self.u_colptr.clear();
        self.u_colptr.push(0);
        self.u_pos.clear();
        self.u_vals.clear();
        self.u_diag.fill(0.0);
        self.w.fill(0.0);

        for k in 0..m {
            let stamp = self.next_stamp();
            self.pattern.clear();

            // scatter basis column k into the dense work vector
            let col = header[k];
            if col >= problem.num_cols() {
                return Err(BasisError::VariableOutOfRange {
                    var: col,
                    max: problem.num_cols(),
                });
            }
            // borrow pieces locally so the closure does not capture self
            {
                let w = &mut self.w;
                let mark = &mut self.mark;
                let pattern = &mut self.pattern;
                problem.for_each_col_entry(col, |i, v| {
                    w[i] = v;
                    if mark[i] != stamp {
                        mark[i] = stamp;
                        pattern.push(i);
                    }
                });
            }

            // eliminate with every previous pivot column in order
            for j in 0..k {
                let pj = self.prow[j];
                if self.mark[pj] != stamp {
                    continue;
                }
                let t = self.w[pj];
                self.w[pj] = 0.0;
                if t == 0.0 {
                    continue;
                }
                self.u_pos.push(j);
                self.u_vals.push(t);
                let (s, e) = (self.l_colptr[j], self.l_colptr[j + 1]);
                for p in s..e {
                    let i = self.l_rows[p];
                    self.w[i] -= self.l_vals[p] * t;
                    if self.mark[i] != stamp {
                        self.mark[i] = stamp;
                        self.pattern.push(i);
                    }
                }
            }

            // partial pivoting over the rows not yet pivotal
            let mut piv = None;
            let mut best = 0.0;
            for &i in &self.pattern {
                if !self.pivotal[i] && self.w[i].abs() > best {
                    best = self.w[i].abs();
                    piv = Some(i);
                }
            }
            let piv = match piv {
                Some(i) if best >= pivot_tol => i,
                _ => {
                    for &i in &self.pattern {
                        self.w[i] = 0.0;
                    }
                    return Err(BasisError::SingularBasis {
                        step: k,
                        var: col,
                    });
                }
            };

            self.u_diag[k] = self.w[piv];
            for &i in &self.pattern {
                if !self.pivotal[i] && i != piv && self.w[i] != 0.0 {
                    self.l_rows.push(i);
                    self.l_vals.push(self.w[i] / self.u_diag[k]);
                }
            }
            for &i in &self.pattern {
                self.w[i] = 0.0;
            }

            self.pivotal[piv] = true;
            self.pinv[piv] = k;
            self.prow.push(piv);
            self.l_colptr.push(self.l_vals.len());
            self.u_colptr.push(self.u_vals.len());
        }

        self.valid = true;
        Ok(())
    }

    /// Solve `B x = b`. On entry `w` holds b indexed by original row; it is
    /// consumed as scratch. On exit `out[k]` is the solution component for
    /// basis position k.
    pub fn solve(&self, w: &mut [f64], out: &mut [f64]) {
        debug_assert!(self.valid);
        let m = self.m;

        // forward substitution through L (unit diagonal implicit)
        for k in 0..m {
            let t = w[self.prow[k]];
            if t == 0.0 {
                continue;
            }
            let (rows, vals) = self.l_col(k);
            for (&i, &l) in rows.iter().zip(vals.iter()) {
                w[i] -= l * t;
            }
        }

        // back substitution through U, scatter-subtract per finished column
        for k in (0..m).rev() {
            let xk = w[self.prow[k]] / self.u_diag[k];
            w[self.prow[k]] = xk;
            if xk == 0.0 {
                continue;
            }
            let (pos, vals) = self.u_col(k);
            for (&j, &u) in pos.iter().zip(vals.iter()) {
                w[self.prow[j]] -= u * xk;
            }
        }

        for k in 0..m {
            out[k] = w[self.prow[k]];
        }
    }

    /// Solve `y' B = c'`. On entry `c` holds the right-hand side in basis
    /// position space; it is consumed as scratch. On exit `out[i]` is the
    /// solution component for row i.
    pub fn solve_transpose(&self, c: &mut [f64], out: &mut [f64]) {
        debug_assert!(self.valid);
        let m = self.m;

        // U' z = c, positions ascending (gather per column)
        for k in 0..m {
            let mut acc = c[k];
            let (pos, vals) = self.u_col(k);
            for (&j, &u) in pos.iter().zip(vals.iter()) {
                acc -= u * c[j];
            }
            c[k] = acc / self.u_diag[k];
        }

        // L' y = z, positions descending, result lands at the pivot row
        for k in (0..m).rev() {
            let mut acc = c[k];
            let (rows, vals) = self.l_col(k);
            for (&i, &l) in rows.iter().zip(vals.iter()) {
                acc -= l * out[i];
            }
            out[self.prow[k]] = acc;
        }
    }
}
