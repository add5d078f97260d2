//! Simplex driver: setup, iteration, termination.

pub mod iterate;
pub mod phase;
pub mod solve;

pub use solve::{solve_lp, solve_lp_with, IterationInfo, PortableBasis, SimplexCallback, Solution};

use tracing::{debug, info};

use crate::basis::{BasisError, BasisState};
use crate::env::{EffectiveParams, SolverEnv};
use crate::model::LpProblem;
use crate::pricing::{PricingContext, PricingError, PricingStrategy};
use crate::sparse::kernel;
use crate::status::{Phase, SolveMode, Status, VarStatus};

/// Iteration-level counters surfaced on the context.
#[derive(Debug, Default, Clone)]
pub struct SolveStats {
    pub pivots: usize,
    pub bound_flips: usize,
    pub degenerate_steps: usize,
    pub phase1_iterations: usize,
    pub forced_refactors: usize,
}

/// Working state of one solve. Owns the basis, the pricing context, and
/// working copies of bounds/objective; the problem itself is read-only.
#[derive(Debug)]
pub struct SolverContext<'a> {
    pub(crate) problem: &'a LpProblem,
    pub(crate) m: usize,
    /// Total columns: structural + slack.
    pub(crate) n: usize,
    pub phase: Phase,
    pub(crate) mode: SolveMode,
    pub(crate) dual_mode: bool,
    pub iterations: usize,
    pub tolerance: f64,
    pub(crate) feas_tol: f64,
    pub(crate) pivot_tol: f64,
    pub(crate) infinity: f64,
    /// Current-phase objective estimate, updated per pivot; the reported
    /// objective is recomputed from scratch at extraction.
    pub obj_value: f64,
    pub(crate) obj_scale: f64,

    pub(crate) obj: Vec<f64>,
    pub(crate) lb: Vec<f64>,
    pub(crate) ub: Vec<f64>,
    pub(crate) orig_lb: Vec<f64>,
    pub(crate) orig_ub: Vec<f64>,

    pub x: Vec<f64>,
    pub pi: Vec<f64>,
    pub d: Vec<f64>,
    pub(crate) phase1_cost: Vec<f64>,

    // scratch
    pub(crate) cost_b: Vec<f64>,
    pub(crate) dense_col: Vec<f64>,
    pub(crate) alpha: Vec<f64>,
    pub(crate) rho: Vec<f64>,
    pub(crate) xb: Vec<f64>,
    pub(crate) col_idx: Vec<usize>,
    pub(crate) col_val: Vec<f64>,

    pub basis: BasisState,
    pub pricing: PricingContext,

    pub(crate) perturbed: bool,
    pub(crate) consecutive_degenerate: usize,
    pub stats: SolveStats,
}

impl<'a> SolverContext<'a> {
    pub fn new(problem: &'a LpProblem, env: &SolverEnv) -> Result<Self, PricingError> {
        let m = problem.num_rows();
        let n = problem.num_cols();
        let params = env.effective();

        let mut lb = vec![0.0; n];
        let mut ub = vec![0.0; n];
        let mut obj = vec![0.0; n];
        for j in 0..n {
            let (l, u) = problem.col_bounds(j);
            lb[j] = l;
            ub[j] = u;
            obj[j] = problem.obj_coef(j);
        }

        let mut pricing = PricingContext::new(n, 8)?;
        pricing.init(params.pricing);

        Ok(Self {
            problem,
            m,
            n,
            phase: Phase::Setup,
            mode: params.solve_mode,
            dual_mode: false,
            iterations: 0,
            tolerance: params.optimality_tol,
            feas_tol: params.feasibility_tol,
            pivot_tol: params.pivot_tol,
            infinity: params.infinity,
            obj_value: 0.0,
            obj_scale: 1.0,
            orig_lb: lb.clone(),
            orig_ub: ub.clone(),
            lb,
            ub,
            obj,
            x: vec![0.0; n],
            pi: vec![0.0; m],
            d: vec![0.0; n],
            phase1_cost: vec![0.0; n],
            cost_b: vec![0.0; m],
            dense_col: vec![0.0; m],
            alpha: vec![0.0; m],
            rho: vec![0.0; m],
            xb: vec![0.0; m],
            col_idx: Vec::with_capacity(m),
            col_val: Vec::with_capacity(m),
            basis: BasisState::new(m, n),
            pricing,
            perturbed: false,
            consecutive_degenerate: 0,
            stats: SolveStats::default(),
        })
    }

    pub fn num_rows(&self) -> usize {
        self.m
    }

    pub fn num_cols(&self) -> usize {
        self.n
    }

    pub(crate) fn is_inf(&self, v: f64) -> bool {
        v.abs() >= self.infinity
    }

    /// Bound-infeasibility scan, `simplex_preprocess`. Returns
    /// `Status::Infeasible` without touching state when some `lb > ub`
    /// beyond the feasibility tolerance.
    pub fn preprocess(&self, _env: &SolverEnv, skip: bool) -> Status {
        if skip {
            return Status::Ok;
        }
        for j in 0..self.n {
            if self.orig_lb[j] > self.orig_ub[j] + self.feas_tol {
                return Status::Infeasible;
            }
        }
        Status::Ok
    }

    /// Cold-start setup: all-slack basis, nonbasic structurals at their
    /// nearest finite bound, reduced costs seeded from the objective, and
    /// phase selection from the resulting basic values.
    pub fn setup(&mut self, env: &SolverEnv) -> Result<(), BasisError> {
        let params = env.effective();
        self.tolerance = params.optimality_tol;
        self.iterations = 0;
        self.obj_value = 0.0;
        self.pi.fill(0.0);
        self.d.copy_from_slice(&self.obj);

        let n_struct = self.problem.num_structural();
        let slacks: Vec<usize> = (n_struct..self.n).collect();
        self.basis.warm_start(&slacks)?;

        let mut dual_ok = true;
        for j in 0..n_struct {
            let (l, u) = (self.orig_lb[j], self.orig_ub[j]);
            let l_fin = !self.is_inf(l);
            let u_fin = !self.is_inf(u);
            let status = if l_fin && u_fin && l == u {
                VarStatus::Fixed
            } else if self.mode == SolveMode::Dual {
                // arrange dual feasibility when the bounds allow it
                if self.obj[j] >= 0.0 && l_fin {
                    VarStatus::AtLower
                } else if self.obj[j] <= 0.0 && u_fin {
                    VarStatus::AtUpper
                } else if l_fin {
                    dual_ok = false;
                    VarStatus::AtLower
                } else if u_fin {
                    dual_ok = false;
                    VarStatus::AtUpper
                } else {
                    if self.obj[j] != 0.0 {
                        dual_ok = false;
                    }
                    VarStatus::Free
                }
            } else if l_fin {
                VarStatus::AtLower
            } else if u_fin {
                VarStatus::AtUpper
            } else {
                VarStatus::Free
            };
            self.basis.set_status(j, status);
            self.x[j] = match status {
                VarStatus::AtLower | VarStatus::Fixed => l,
                VarStatus::AtUpper => u,
                _ => 0.0,
            };
        }
        self.dual_mode = self.mode == SolveMode::Dual && dual_ok;
        if self.mode == SolveMode::Dual && !dual_ok {
            debug!("no dual-feasible cold start, falling back to primal");
        }

        // slack values close the row residuals: s = rhs - A x_struct
        kernel::spmv_csc(
            self.problem.matrix(),
            &self.x[..n_struct],
            &mut self.dense_col,
            false,
        );
        for i in 0..self.m {
            self.x[n_struct + i] = self.problem.rhs()[i] - self.dense_col[i];
        }

        self.pricing.init(self.pricing.strategy());
        self.obj_value = kernel::dot(&self.obj, &self.x);

        self.phase = if self.dual_mode {
            Phase::PhaseTwo
        } else if self.basic_infeasibility() > self.feas_tol {
            Phase::PhaseOne
        } else {
            Phase::PhaseTwo
        };
        info!(
            phase = self.phase as i32,
            rows = self.m,
            cols = self.n,
            "simplex setup complete"
        );
        Ok(())
    }

    /// Sum of bound violations over the basic variables, against the true
    /// bounds.
    pub(crate) fn basic_infeasibility(&self) -> f64 {
        let mut total = 0.0;
        for &j in self.basis.header() {
            let v = self.x[j];
            if v < self.orig_lb[j] - self.feas_tol {
                total += self.orig_lb[j] - v;
            } else if v > self.orig_ub[j] + self.feas_tol {
                total += v - self.orig_ub[j];
            }
        }
        total
    }

    /// Phase-I cost: -1 for basic variables below their lower bound, +1
    /// above their upper bound, 0 elsewhere. Rebuilt every iteration.
    pub(crate) fn rebuild_phase1_cost(&mut self) {
        self.phase1_cost.fill(0.0);
        for &j in self.basis.header() {
            let v = self.x[j];
            if v < self.lb[j] - self.feas_tol {
                self.phase1_cost[j] = -1.0;
            } else if v > self.ub[j] + self.feas_tol {
                self.phase1_cost[j] = 1.0;
            }
        }
    }

    /// BTRAN of the basic cost vector into pi.
    pub(crate) fn compute_duals(&mut self) -> Result<(), BasisError> {
        let phase1 = self.phase == Phase::PhaseOne;
        for (k, &j) in self.basis.header().iter().enumerate() {
            self.cost_b[k] = if phase1 {
                self.phase1_cost[j]
            } else {
                self.obj[j]
            };
        }
        self.basis.btran(&self.cost_b, &mut self.pi)
    }

    /// Full reduced-cost recomputation, `d_j = c_j - pi . A_j` for every
    /// nonbasic column. Returns false when an accumulator went non-finite.
    pub(crate) fn compute_reduced_costs(&mut self) -> bool {
        let phase1 = self.phase == Phase::PhaseOne;
        for j in 0..self.n {
            if self.basis.status(j).is_basic() {
                self.d[j] = 0.0;
                continue;
            }
            let c = if phase1 {
                self.phase1_cost[j]
            } else {
                self.obj[j]
            };
            let dj = c - self.problem.col_dot(j, &self.pi);
            if !dj.is_finite() {
                return false;
            }
            self.d[j] = dj;
        }
        true
    }

    /// Recompute the basic values by one FTRAN of the nonbasic residual,
    /// clearing accumulated drift. Used after refactorization and before
    /// extraction.
    pub(crate) fn recompute_basic_values(&mut self) -> Result<(), BasisError> {
        self.dense_col.copy_from_slice(self.problem.rhs());
        for j in 0..self.n {
            if self.basis.status(j).is_basic() || self.x[j] == 0.0 {
                continue;
            }
            let xj = self.x[j];
            let dense = &mut self.dense_col;
            self.problem.for_each_col_entry(j, |i, v| dense[i] -= v * xj);
        }
        let (dense_col, xb) = (&mut self.dense_col, &mut self.xb);
        self.basis.ftran(dense_col, xb)?;
        for (k, &j) in self.basis.header().iter().enumerate() {
            self.x[j] = self.xb[k];
        }
        Ok(())
    }

    /// `simplex_post_iterate`: true when a refactorization is due, either
    /// on the pivot-count schedule, the eta-chain cap, or a suspiciously
    /// small accepted pivot.
    pub fn refactor_due(&self, params: &EffectiveParams) -> bool {
        if self.basis.pivots_since_refactor >= params.refactor_interval {
            return true;
        }
        if self.basis.eta_count >= params.max_eta_count {
            return true;
        }
        self.basis.pivots_since_refactor > 0
            && self.basis.last_pivot_value.abs() < params.pivot_tol * 100.0
    }

    /// Forced refactorization plus a clean recomputation of the basic
    /// values.
    pub(crate) fn force_refactor(&mut self) -> Result<(), BasisError> {
        self.basis.refactor(self.problem, self.pivot_tol)?;
        self.recompute_basic_values()?;
        self.stats.forced_refactors += 1;
        Ok(())
    }

    /// Real objective from scratch: `c . x` over the structural columns.
    pub(crate) fn real_objective(&self) -> f64 {
        let n_struct = self.problem.num_structural();
        kernel::dot(self.problem.objective(), &self.x[..n_struct]) * self.obj_scale
    }

    pub fn set_pricing_strategy(&mut self, strategy: PricingStrategy) {
        self.pricing.init(strategy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::SolverEnv;
    use crate::model::LpProblem;
    use crate::status::Phase;

    fn feasible_problem() -> LpProblem {
        // min x + 2y,  x + y <= 10,  0 <= x, y <= 10
        let mut b = LpProblem::builder(1, 2);
        b.objective(0, 1.0).unwrap();
        b.objective(1, 2.0).unwrap();
        b.coefficient(0, 0, 1.0).unwrap();
        b.coefficient(0, 1, 1.0).unwrap();
        b.bounds(0, 0.0, 10.0).unwrap();
        b.bounds(1, 0.0, 10.0).unwrap();
        b.row(0, '<', 10.0).unwrap();
        b.finalize().unwrap()
    }

    #[test]
    fn setup_selects_phase_two_when_feasible() {
        let problem = feasible_problem();
        let env = SolverEnv::default();
        let mut ctx = SolverContext::new(&problem, &env).unwrap();
        ctx.setup(&env).unwrap();
        assert_eq!(ctx.phase, Phase::PhaseTwo);
        // slack basic at the full rhs
        assert_eq!(ctx.x[2], 10.0);
        ctx.basis.validate().unwrap();
        // cold-start reduced costs equal the objective
        assert_eq!(ctx.d[..2], [1.0, 2.0]);
    }

    #[test]
    fn setup_selects_phase_one_when_rows_violated() {
        // x + y >= 3 normalizes to -x - y <= -3; the slack starts at -3
        let mut b = LpProblem::builder(1, 2);
        b.coefficient(0, 0, 1.0).unwrap();
        b.coefficient(0, 1, 1.0).unwrap();
        b.row(0, '>', 3.0).unwrap();
        let problem = b.finalize().unwrap();
        let env = SolverEnv::default();
        let mut ctx = SolverContext::new(&problem, &env).unwrap();
        ctx.setup(&env).unwrap();
        assert_eq!(ctx.phase, Phase::PhaseOne);
        assert!((ctx.basic_infeasibility() - 3.0).abs() < 1e-12);

        ctx.rebuild_phase1_cost();
        // the violated slack carries phase-I cost -1
        assert_eq!(ctx.phase1_cost[2], -1.0);
    }

    #[test]
    fn preprocess_flags_crossed_bounds() {
        let mut b = LpProblem::builder(1, 1);
        b.coefficient(0, 0, 1.0).unwrap();
        b.bounds(0, 5.0, 3.0).unwrap();
        b.row(0, '<', 10.0).unwrap();
        let problem = b.finalize().unwrap();
        let env = SolverEnv::default();
        let ctx = SolverContext::new(&problem, &env).unwrap();
        assert_eq!(ctx.preprocess(&env, false), Status::Infeasible);
        assert_eq!(ctx.preprocess(&env, false).code(), 3);
        assert_eq!(ctx.preprocess(&env, true), Status::Ok);
    }

    #[test]
    fn refactor_schedule_triggers() {
        let problem = feasible_problem();
        let mut env = SolverEnv::default();
        env.refactor_interval = 2;
        let params = env.effective();
        let mut ctx = SolverContext::new(&problem, &env).unwrap();
        ctx.setup(&env).unwrap();
        assert!(!ctx.refactor_due(&params));
        ctx.basis.pivots_since_refactor = 2;
        assert!(ctx.refactor_due(&params));
        ctx.basis.pivots_since_refactor = 1;
        ctx.basis.eta_count = params.max_eta_count;
        assert!(ctx.refactor_due(&params));
        ctx.basis.eta_count = 0;
        ctx.basis.last_pivot_value = params.pivot_tol;
        assert!(ctx.refactor_due(&params));
    }
}
