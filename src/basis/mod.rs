//! Basis representation: variable status, basis header, LU factors of the
//! last refactorization, and the eta chain layered on top of them.
//!
//! The inverse is the product form `B^-1 = E_k ... E_1 (LU)^-1`: FTRAN
//! solves through the LU factors and then applies the etas oldest first,
//! BTRAN applies the etas newest first as transposes and then solves the
//! transposed factors.

pub mod eta;
pub mod lu;
pub mod snapshot;

pub use eta::{EtaKind, EtaRecord, EtaStore};
pub use lu::LuFactors;
pub use snapshot::BasisSnapshot;

use thiserror::Error;
use tracing::debug;

use crate::model::LpProblem;
use crate::status::VarStatus;

#[derive(Debug, Error)]
pub enum BasisError {
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("row {row} out of range ({m} rows)")]
    RowOutOfRange { row: usize, m: usize },

    #[error("variable {var} out of range ({max} columns)")]
    VariableOutOfRange { var: usize, max: usize },

    #[error("wrong number of basic variables: expected {expected}, found {actual}")]
    WrongBasicCount { expected: usize, actual: usize },

    #[error("variable {var} is basic in more than one row")]
    DuplicateBasic { var: usize },

    #[error("header and status disagree at row {row} (variable {var})")]
    InconsistentHeader { row: usize, var: usize },

    #[error("pivot value {value:e} in row {row} is below the pivot tolerance")]
    SingularPivot { row: usize, value: f64 },

    #[error("basis is numerically singular at elimination step {step} (variable {var})")]
    SingularBasis { step: usize, var: usize },

    #[error("snapshot is not valid")]
    InvalidSnapshot,

    #[error("unknown status code {code} for variable {var}")]
    InvalidStatusCode { var: usize, code: i32 },
}

/// Selectable validation classes, checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidateFlags(u32);

impl ValidateFlags {
    pub const COUNT: ValidateFlags = ValidateFlags(1);
    pub const BOUNDS: ValidateFlags = ValidateFlags(2);
    pub const DUPLICATES: ValidateFlags = ValidateFlags(4);
    pub const CONSISTENCY: ValidateFlags = ValidateFlags(8);
    pub const ALL: ValidateFlags = ValidateFlags(0xf);

    pub fn contains(self, other: ValidateFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ValidateFlags {
    type Output = ValidateFlags;
    fn bitor(self, rhs: ValidateFlags) -> ValidateFlags {
        ValidateFlags(self.0 | rhs.0)
    }
}

#[derive(Debug)]
pub struct BasisState {
    m: usize,
    n: usize,
    header: Vec<usize>,
    status: Vec<VarStatus>,
    pub etas: EtaStore,
    lu: Option<LuFactors>,
    /// Length of the current eta chain.
    pub eta_count: usize,
    pub pivots_since_refactor: usize,
    pub refactor_count: usize,
    /// Pivot value of the most recent update, for the numerical refactor
    /// trigger.
    pub last_pivot_value: f64,

    // scratch: row-space and position-space dense vectors, plus the sparse
    // buffers a pivot gathers its eta portion into
    work: Vec<f64>,
    work_pos: Vec<f64>,
    eta_idx: Vec<usize>,
    eta_val: Vec<f64>,
}

impl BasisState {
    /// Allocate a basis for m rows over n columns (structural + slack).
    /// Header and status are not meaningful until a warm start fills them.
    pub fn new(m: usize, n: usize) -> Self {
        Self {
            m,
            n,
            header: vec![usize::MAX; m],
            status: vec![VarStatus::AtLower; n],
            etas: EtaStore::new(),
            lu: None,
            eta_count: 0,
            pivots_since_refactor: 0,
            refactor_count: 0,
            last_pivot_value: 0.0,
            work: vec![0.0; m],
            work_pos: vec![0.0; m],
            eta_idx: Vec::with_capacity(m),
            eta_val: Vec::with_capacity(m),
        }
    }

    pub fn num_rows(&self) -> usize {
        self.m
    }

    pub fn num_cols(&self) -> usize {
        self.n
    }

    pub fn header(&self) -> &[usize] {
        &self.header
    }

    pub fn status(&self, var: usize) -> VarStatus {
        self.status[var]
    }

    pub fn statuses(&self) -> &[VarStatus] {
        &self.status
    }

    pub(crate) fn set_status(&mut self, var: usize, status: VarStatus) {
        self.status[var] = status;
    }

    pub fn factors(&self) -> Option<&LuFactors> {
        self.lu.as_ref().filter(|lu| lu.valid)
    }

    fn drop_factors(&mut self) {
        if let Some(lu) = self.lu.as_mut() {
            lu.valid = false;
        }
    }

    /// Install a basis from an explicit list of basic variables, one per
    /// row. Clears the eta chain and pivot counters; every variable not in
    /// the list becomes nonbasic at its lower bound.
    pub fn warm_start(&mut self, basic: &[usize]) -> Result<(), BasisError> {
        if basic.len() != self.m {
            return Err(BasisError::SizeMismatch {
                expected: self.m,
                actual: basic.len(),
            });
        }
        for &var in basic {
            if var >= self.n {
                return Err(BasisError::VariableOutOfRange {
                    var,
                    max: self.n,
                });
            }
        }
        self.etas.reset();
        self.eta_count = 0;
        self.pivots_since_refactor = 0;
        self.last_pivot_value = 0.0;
        self.drop_factors();

        self.status.fill(VarStatus::AtLower);
        for (row, &var) in basic.iter().enumerate() {
            if self.status[var].is_basic() {
                return Err(BasisError::DuplicateBasic { var });
            }
            self.header[row] = var;
            self.status[var] = VarStatus::Basic(row);
        }
        Ok(())
    }

    /// Install a basis from a captured snapshot with matching dimensions.
    pub fn warm_start_from_snapshot(&mut self, snap: &BasisSnapshot) -> Result<(), BasisError> {
        if !snap.valid {
            return Err(BasisError::InvalidSnapshot);
        }
        if snap.m != self.m || snap.n != self.n {
            return Err(BasisError::SizeMismatch {
                expected: self.m,
                actual: snap.m,
            });
        }
        self.etas.reset();
        self.eta_count = 0;
        self.pivots_since_refactor = 0;
        self.last_pivot_value = 0.0;
        self.drop_factors();

        self.header.copy_from_slice(&snap.header);
        for (var, &code) in snap.status_codes.iter().enumerate() {
            self.status[var] = VarStatus::from_code(code)
                .ok_or(BasisError::InvalidStatusCode { var, code })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), BasisError> {
        self.validate_ex(ValidateFlags::ALL)
    }

    /// Check the selected invariant classes, failing on the first violated
    /// one: COUNT (exactly m basic), BOUNDS (header indices in range),
    /// DUPLICATES, CONSISTENCY (`status[header[r]] == Basic(r)`).
    pub fn validate_ex(&self, flags: ValidateFlags) -> Result<(), BasisError> {
        if flags.contains(ValidateFlags::COUNT) {
            let basic = self.status.iter().filter(|s| s.is_basic()).count();
            if basic != self.m {
                return Err(BasisError::WrongBasicCount {
                    expected: self.m,
                    actual: basic,
                });
            }
        }
        if flags.contains(ValidateFlags::BOUNDS) {
            for &var in &self.header {
                if var >= self.n {
                    return Err(BasisError::VariableOutOfRange {
                        var,
                        max: self.n,
                    });
                }
            }
        }
        if flags.contains(ValidateFlags::DUPLICATES) {
            let mut seen = vec![false; self.n];
            for &var in &self.header {
                if let Some(slot) = seen.get_mut(var) {
                    if *slot {
                        return Err(BasisError::DuplicateBasic { var });
                    }
                    *slot = true;
                }
            }
        }
        if flags.contains(ValidateFlags::CONSISTENCY) {
            for (row, &var) in self.header.iter().enumerate() {
                let consistent = var < self.n && self.status[var] == VarStatus::Basic(row);
                if !consistent {
                    return Err(BasisError::InconsistentHeader { row, var });
                }
            }
        }
        Ok(())
    }

    /// Solve `B x = column`. The input is dense over the rows; the result
    /// component k belongs to the variable basic in row k.
    pub fn ftran(&mut self, column: &[f64], result: &mut [f64]) -> Result<(), BasisError> {
        if column.len() != self.m || result.len() != self.m {
            return Err(BasisError::SizeMismatch {
                expected: self.m,
                actual: column.len().min(result.len()),
            });
        }
        match self.lu.as_ref().filter(|lu| lu.valid) {
            Some(lu) => {
                self.work.copy_from_slice(column);
                lu.solve(&mut self.work, result);
            }
            None => result.copy_from_slice(column),
        }
        for rec in self.etas.iter_oldest_first() {
            self.etas.apply(rec, result);
        }
        Ok(())
    }

    fn btran_in_place(&mut self, result: &mut [f64]) {
        for rec in self.etas.iter_newest_first() {
            self.etas.apply_transpose(rec, &mut self.work_pos);
        }
        match self.lu.as_ref().filter(|lu| lu.valid) {
            Some(lu) => lu.solve_transpose(&mut self.work_pos, result),
            None => result.copy_from_slice(&self.work_pos),
        }
    }

    /// Solve `y' B = c'` for a dense c given in basis-position space.
    pub fn btran(&mut self, c: &[f64], result: &mut [f64]) -> Result<(), BasisError> {
        if c.len() != self.m || result.len() != self.m {
            return Err(BasisError::SizeMismatch {
                expected: self.m,
                actual: c.len().min(result.len()),
            });
        }
        self.work_pos.copy_from_slice(c);
        self.btran_in_place(result);
        Ok(())
    }

    /// Solve `y' B = e_r'` for basis row r.
    pub fn btran_unit(&mut self, row: usize, result: &mut [f64]) -> Result<(), BasisError> {
        if row >= self.m {
            return Err(BasisError::RowOutOfRange { row, m: self.m });
        }
        if result.len() != self.m {
            return Err(BasisError::SizeMismatch {
                expected: self.m,
                actual: result.len(),
            });
        }
        self.work_pos.fill(0.0);
        self.work_pos[row] = 1.0;
        self.btran_in_place(result);
        Ok(())
    }

    /// Replace the variable basic in `pivot_row` with `entering`, recording
    /// the update as a new eta at the head of the chain.
    ///
    /// `alpha` is the FTRAN'd entering column; its entry in the pivot row
    /// must clear the pivot tolerance or the update is refused and the
    /// caller decides (typically a forced refactorization). The leaving
    /// variable is set nonbasic at lower by convention; callers needing
    /// upper-bound semantics rewrite it after return. `col_idx`/`col_val`
    /// are the entering variable's original sparse column, kept on the
    /// record.
    #[allow(clippy::too_many_arguments)]
    pub fn pivot_with_eta(
        &mut self,
        pivot_row: usize,
        alpha: &[f64],
        entering: usize,
        leaving: usize,
        obj_coef: f64,
        col_idx: &[usize],
        col_val: &[f64],
        pivot_tol: f64,
    ) -> Result<(), BasisError> {
        if pivot_row >= self.m {
            return Err(BasisError::RowOutOfRange {
                row: pivot_row,
                m: self.m,
            });
        }
        if entering >= self.n {
            return Err(BasisError::VariableOutOfRange {
                var: entering,
                max: self.n,
            });
        }
        if self.header[pivot_row] != leaving {
            return Err(BasisError::InconsistentHeader {
                row: pivot_row,
                var: leaving,
            });
        }
        let pivot_value = alpha[pivot_row];
        if pivot_value.abs() < pivot_tol {
            return Err(BasisError::SingularPivot {
                row: pivot_row,
                value: pivot_value,
            });
        }

        self.eta_idx.clear();
        self.eta_val.clear();
        for (i, &v) in alpha.iter().enumerate() {
            if i != pivot_row && v != 0.0 {
                self.eta_idx.push(i);
                self.eta_val.push(v);
            }
        }
        self.etas.push_record(
            EtaKind::Pivot,
            pivot_row,
            entering,
            pivot_value,
            VarStatus::Basic(pivot_row),
            obj_coef,
            Some(pivot_row),
            &self.eta_idx,
            &self.eta_val,
            col_idx,
            col_val,
        );

        self.header[pivot_row] = entering;
        self.status[entering] = VarStatus::Basic(pivot_row);
        self.status[leaving] = VarStatus::AtLower;
        self.eta_count += 1;
        self.pivots_since_refactor += 1;
        self.last_pivot_value = pivot_value;
        Ok(())
    }

    /// Discard the eta chain and rebuild the factorization from the current
    /// header. For basic variables fixed at equal bounds a refactor record
    /// is appended so the chain documents the bound fix.
    pub fn refactor(&mut self, problem: &LpProblem, pivot_tol: f64) -> Result<(), BasisError> {
        self.etas.reset();
        self.eta_count = 0;
        self.pivots_since_refactor = 0;
        self.refactor_count += 1;

        let lu = self.lu.get_or_insert_with(|| LuFactors::new(self.m));
        lu.factorize(problem, &self.header, pivot_tol)?;

        for row in 0..self.m {
            let var = self.header[row];
            let (lb, ub) = problem.col_bounds(var);
            if lb == ub {
                self.etas.push_record(
                    EtaKind::Refactor,
                    row,
                    var,
                    1.0,
                    VarStatus::Basic(row),
                    problem.obj_coef(var),
                    None,
                    &[],
                    &[],
                    &[],
                    &[],
                );
                self.eta_count += 1;
            }
        }
        debug!(
            refactor = self.refactor_count,
            lnz = self.lu.as_ref().map(|l| l.lnz()).unwrap_or(0),
            unz = self.lu.as_ref().map(|l| l.unz()).unwrap_or(0),
            "rebuilt basis factorization"
        );
        Ok(())
    }

    /// Capture the current header/status (and optionally the LU factors).
    pub fn snapshot(&self, iteration: usize, include_factors: bool) -> BasisSnapshot {
        BasisSnapshot {
            m: self.m,
            n: self.n,
            iteration,
            header: self.header.clone(),
            status_codes: self.status.iter().map(|s| s.to_code()).collect(),
            factors: if include_factors {
                self.lu.clone().filter(|lu| lu.valid)
            } else {
                None
            },
            valid: true,
        }
    }
}
