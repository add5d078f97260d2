//! The solve umbrella: init, setup, preprocess, Phase I/II loops,
//! termination, and solution extraction.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::SolverContext;
use crate::basis::BasisError;
use crate::env::SolverEnv;
use crate::error::SolverError;
use crate::model::LpProblem;
use crate::status::{IterateStatus, Phase, SolveMode, Status, VarStatus};

/// Narrow per-iteration view handed to callbacks. Callbacks may poll the
/// environment's terminate flag but must not block.
#[derive(Debug, Clone, Copy)]
pub struct IterationInfo {
    pub iteration: usize,
    pub phase: Phase,
    pub objective: f64,
    pub infeasibility: f64,
}

/// User hooks invoked on the solver's thread around each iteration.
pub trait SimplexCallback {
    fn pre_iterate(&mut self, _info: &IterationInfo) {}
    fn post_iterate(&mut self, _info: &IterationInfo) {}
}

/// The durable basis handoff: portable status codes for the structural
/// variables and for the row slacks. The eta chain is never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortableBasis {
    pub variable_status: Vec<i32>,
    pub constraint_status: Vec<i32>,
}

/// Extracted solution. Vectors cover the structural columns; duals are
/// reported in the caller's original row orientation.
#[derive(Debug, Clone)]
pub struct Solution {
    pub status: Status,
    pub objective: f64,
    pub x: Array1<f64>,
    pub duals: Array1<f64>,
    pub reduced_costs: Array1<f64>,
    pub iterations: usize,
    pub basis: PortableBasis,
}

impl<'a> SolverContext<'a> {
    /// Portable `{variable_status, constraint_status}` form of the basis.
    pub fn portable_basis(&self) -> PortableBasis {
        let n_struct = self.problem.num_structural();
        PortableBasis {
            variable_status: (0..n_struct)
                .map(|j| self.basis.status(j).to_code())
                .collect(),
            constraint_status: (n_struct..self.n)
                .map(|j| self.basis.status(j).to_code())
                .collect(),
        }
    }

    /// Install a portable basis: rebuild the header from the basic codes,
    /// re-apply the nonbasic statuses, place nonbasic values on their
    /// bounds, and refresh the basic values.
    pub fn set_portable_basis(&mut self, portable: &PortableBasis) -> Result<(), SolverError> {
        let n_struct = self.problem.num_structural();
        if portable.variable_status.len() != n_struct
            || portable.constraint_status.len() != self.m
        {
            return Err(SolverError::Basis(BasisError::SizeMismatch {
                expected: n_struct + self.m,
                actual: portable.variable_status.len() + portable.constraint_status.len(),
            }));
        }
        let codes: Vec<i32> = portable
            .variable_status
            .iter()
            .chain(portable.constraint_status.iter())
            .copied()
            .collect();

        let mut statuses = Vec::with_capacity(self.n);
        let mut header = vec![usize::MAX; self.m];
        for (j, &code) in codes.iter().enumerate() {
            let status = VarStatus::from_code(code)
                .ok_or(SolverError::Basis(BasisError::InvalidStatusCode {
                    var: j,
                    code,
                }))?;
            if let Some(row) = status.basic_row() {
                if row >= self.m || header[row] != usize::MAX {
                    return Err(SolverError::Basis(BasisError::InconsistentHeader {
                        row: row.min(self.m.saturating_sub(1)),
                        var: j,
                    }));
                }
                header[row] = j;
            }
            statuses.push(status);
        }
        if header.iter().any(|&j| j == usize::MAX) {
            return Err(SolverError::Basis(BasisError::WrongBasicCount {
                expected: self.m,
                actual: header.iter().filter(|&&j| j != usize::MAX).count(),
            }));
        }

        self.basis.warm_start(&header)?;
        for (j, status) in statuses.iter().enumerate() {
            if !status.is_basic() {
                self.basis.set_status(j, *status);
                self.x[j] = match status {
                    VarStatus::AtUpper => self.ub[j],
                    VarStatus::Free => 0.0,
                    _ => self.lb[j],
                };
            }
        }
        self.basis.refactor(self.problem, self.pivot_tol)?;
        self.recompute_basic_values()?;
        self.basis.validate()?;
        Ok(())
    }

    fn iteration_info(&self) -> IterationInfo {
        IterationInfo {
            iteration: self.iterations,
            phase: self.phase,
            objective: self.obj_value,
            infeasibility: self.basic_infeasibility(),
        }
    }

    /// Final extraction: drop any perturbation, refresh the basic values
    /// with one clean FTRAN, recompute objective/duals/reduced costs from
    /// the real objective, and package the portable basis.
    fn extract(&mut self, status: Status) -> Solution {
        self.unperturb();
        if self.recompute_basic_values().is_err() {
            debug!("final basic-value refresh failed; reporting last values");
        }
        // duals always come from the real objective
        self.phase = Phase::PhaseTwo;
        let _ = self.compute_duals();
        let _ = self.compute_reduced_costs();
        let objective = self.real_objective();
        self.obj_value = objective;

        let n_struct = self.problem.num_structural();
        let duals: Vec<f64> = self
            .pi
            .iter()
            .zip(self.problem.row_scale().iter())
            .map(|(&p, &s)| p * s)
            .collect();
        Solution {
            status,
            objective,
            x: Array1::from(self.x[..n_struct].to_vec()),
            duals: Array1::from(duals),
            reduced_costs: Array1::from(self.d[..n_struct].to_vec()),
            iterations: self.iterations,
            basis: self.portable_basis(),
        }
    }
}

/// Solve an LP with the default (no-op) callbacks.
pub fn solve_lp(problem: &LpProblem, env: &SolverEnv) -> Result<Solution, SolverError> {
    solve_lp_with(problem, env, None)
}

/// Solve an LP: setup, preprocess, Phase I loop, phase transition,
/// Phase II loop, extraction. The terminate flag is polled once per
/// iteration; setting it ends the solve with `IterationLimit` after the
/// in-flight iteration completes.
pub fn solve_lp_with(
    problem: &LpProblem,
    env: &SolverEnv,
    mut callback: Option<&mut dyn SimplexCallback>,
) -> Result<Solution, SolverError> {
    let params = env.effective();
    if params.solve_mode == SolveMode::Barrier {
        return Err(SolverError::NotSupported(SolveMode::Barrier));
    }

    let mut ctx = SolverContext::new(problem, env)?;
    ctx.setup(env)?;

    if ctx.preprocess(env, false) == Status::Infeasible {
        info!("preprocess found crossed bounds");
        return Ok(ctx.extract(Status::Infeasible));
    }

    let status = loop {
        if env.terminate_requested() {
            info!("terminate requested, stopping");
            break Status::IterationLimit;
        }
        if ctx.iterations >= params.iteration_limit {
            info!(limit = params.iteration_limit, "iteration limit reached");
            break Status::IterationLimit;
        }

        if let Some(cb) = callback.as_mut() {
            cb.pre_iterate(&ctx.iteration_info());
        }
        let token = if ctx.dual_mode {
            ctx.dual_iterate()
        } else {
            ctx.primal_iterate()
        };
        if let Some(cb) = callback.as_mut() {
            cb.post_iterate(&ctx.iteration_info());
        }
        if env.output_flag && env.verbosity >= 2 {
            debug!(
                iteration = ctx.iterations,
                phase = ctx.phase as i32,
                objective = ctx.obj_value,
                "iteration done"
            );
        }

        match token {
            IterateStatus::Continue => {
                if ctx.refactor_due(&params) {
                    if let Err(err) = ctx.force_refactor() {
                        debug!(%err, "scheduled refactorization failed");
                        break Status::Numerical;
                    }
                }
                if ctx.consecutive_degenerate > 40 && !ctx.perturbed {
                    ctx.perturb();
                }
            }
            IterateStatus::Optimal => {
                if ctx.phase == Phase::PhaseOne && !ctx.dual_mode {
                    match ctx.phase_end() {
                        Status::Ok => continue,
                        other => break other,
                    }
                } else {
                    break Status::Optimal;
                }
            }
            IterateStatus::Infeasible => break Status::Infeasible,
            IterateStatus::Unbounded => break Status::Unbounded,
            IterateStatus::Error => break Status::Numerical,
        }
    };

    let solution = ctx.extract(status);
    if env.output_flag && env.verbosity >= 1 {
        info!(
            status = solution.status.code(),
            iterations = solution.iterations,
            objective = solution.objective,
            "solve finished"
        );
    }
    Ok(solution)
}
