//! Primal and dual simplex iterations.
//!
//! One primal iteration: BTRAN the basic costs into pi, recompute reduced
//! costs, price out an entering variable, FTRAN its column, run the
//! two-pass (Harris) ratio test, then either flip a bound or pivot with a
//! new eta. A refused (singular) pivot forces one refactorization and a
//! single retry; a second failure surfaces as an internal error.

use tracing::trace;

use super::SolverContext;
use crate::basis::BasisError;
use crate::pricing::PricingCache;
use crate::status::{IterateStatus, Phase, VarStatus};

/// Steps at or below this count as degenerate.
const DEGENERATE_STEP: f64 = 1e-12;

/// Outcome of the ratio test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum RatioOutcome {
    Unbounded,
    BoundFlip { step: f64 },
    Pivot { row: usize, step: f64, to_upper: bool },
}

impl<'a> SolverContext<'a> {
    /// Blocking bound for the variable basic in some row, given its
    /// movement direction. Returns `(target, hits_upper)`, or None when the
    /// movement is unblocked. A basic variable outside its bounds (Phase I)
    /// blocks only at the bound it is returning to.
    fn ratio_target(&self, j: usize, decreasing: bool) -> Option<(f64, bool)> {
        let v = self.x[j];
        let (l, u) = (self.lb[j], self.ub[j]);
        if decreasing {
            if v > u + self.feas_tol {
                if self.is_inf(u) { None } else { Some((u, true)) }
            } else if v >= l - self.feas_tol {
                if self.is_inf(l) { None } else { Some((l, false)) }
            } else {
                None
            }
        } else if v < l - self.feas_tol {
            if self.is_inf(l) { None } else { Some((l, false)) }
        } else if v <= u + self.feas_tol {
            if self.is_inf(u) { None } else { Some((u, true)) }
        } else {
            None
        }
    }

    /// Two-pass ratio test over the FTRAN'd entering column in
    /// `self.alpha`. Pass one finds the tolerance-relaxed maximum step;
    /// pass two picks, among rows blocking within that step, the one with
    /// the largest pivot magnitude. The entering variable's own range
    /// competes as a bound flip.
    pub(crate) fn ratio_test(&self, entering: usize, sigma: f64) -> RatioOutcome {
        let ftol = self.feas_tol;
        let drop_tol = self.pivot_tol;

        let own_range = {
            let (l, u) = (self.lb[entering], self.ub[entering]);
            if self.is_inf(l) || self.is_inf(u) {
                f64::INFINITY
            } else {
                u - l
            }
        };

        let mut t_max = own_range;
        for k in 0..self.m {
            let a = sigma * self.alpha[k];
            if a.abs() < drop_tol {
                continue;
            }
            let j = self.basis.header()[k];
            let Some((target, _)) = self.ratio_target(j, a > 0.0) else {
                continue;
            };
            let v = self.x[j];
            let relaxed = if a > 0.0 {
                (v - target + ftol) / a
            } else {
                (target + ftol - v) / (-a)
            };
            if relaxed < t_max {
                t_max = relaxed;
            }
        }

        if t_max.is_infinite() {
            return RatioOutcome::Unbounded;
        }

        let mut best: Option<(usize, f64, bool)> = None;
        let mut best_mag = 0.0;
        for k in 0..self.m {
            let a = sigma * self.alpha[k];
            if a.abs() < drop_tol {
                continue;
            }
            let j = self.basis.header()[k];
            let Some((target, to_upper)) = self.ratio_target(j, a > 0.0) else {
                continue;
            };
            let v = self.x[j];
            let strict = if a > 0.0 {
                (v - target) / a
            } else {
                (target - v) / (-a)
            };
            if strict <= t_max && self.alpha[k].abs() > best_mag {
                best_mag = self.alpha[k].abs();
                best = Some((k, strict.max(0.0), to_upper));
            }
        }

        match best {
            Some((row, step, to_upper)) => {
                if own_range < step {
                    RatioOutcome::BoundFlip { step: own_range }
                } else {
                    RatioOutcome::Pivot {
                        row,
                        step,
                        to_upper,
                    }
                }
            }
            None => {
                if own_range.is_finite() {
                    RatioOutcome::BoundFlip { step: own_range }
                } else {
                    RatioOutcome::Unbounded
                }
            }
        }
    }

    /// Entering variable reaches its opposite bound before any basic
    /// variable blocks: statuses flip, no basis change.
    fn apply_bound_flip(&mut self, entering: usize, sigma: f64, step: f64) {
        let disp = sigma * step;
        for k in 0..self.m {
            let j = self.basis.header()[k];
            self.x[j] -= disp * self.alpha[k];
        }
        if sigma > 0.0 {
            self.x[entering] = self.ub[entering];
            self.basis.set_status(entering, VarStatus::AtUpper);
        } else {
            self.x[entering] = self.lb[entering];
            self.basis.set_status(entering, VarStatus::AtLower);
        }
        self.obj_value += self.d[entering] * disp;
        self.stats.bound_flips += 1;
        self.pricing.invalidate(PricingCache::ALL);
        trace!(entering, step, "bound flip");
    }

    /// Value and status bookkeeping after `pivot_with_eta` succeeded. The
    /// header changed only in the pivot row, which is skipped, so the loop
    /// sees the same variables as before the pivot.
    fn apply_pivot_step(
        &mut self,
        entering: usize,
        leaving: usize,
        row: usize,
        sigma: f64,
        step: f64,
        to_upper: bool,
    ) {
        let disp = sigma * step;
        if disp != 0.0 {
            for k in 0..self.m {
                if k == row {
                    continue;
                }
                let j = self.basis.header()[k];
                self.x[j] -= disp * self.alpha[k];
            }
        }
        self.x[entering] += disp;

        let (l, u) = (self.lb[leaving], self.ub[leaving]);
        self.x[leaving] = if to_upper { u } else { l };
        // pivot_with_eta parks the leaving variable at lower; the ratio
        // test direction decides the real side
        let status = if l == u {
            VarStatus::Fixed
        } else if to_upper {
            VarStatus::AtUpper
        } else {
            VarStatus::AtLower
        };
        self.basis.set_status(leaving, status);

        self.obj_value += self.d[entering] * disp;
        self.stats.pivots += 1;
        if step <= DEGENERATE_STEP {
            self.stats.degenerate_steps += 1;
            self.consecutive_degenerate += 1;
        } else {
            self.consecutive_degenerate = 0;
        }
        self.pricing.invalidate(PricingCache::ALL);
    }

    /// One primal iteration. Status tokens: Continue, Optimal (pricing
    /// found no candidate), Unbounded (Phase II ratio test unblocked),
    /// Error (second numerical failure).
    pub fn primal_iterate(&mut self) -> IterateStatus {
        self.iterations += 1;
        if self.phase == Phase::PhaseOne {
            self.stats.phase1_iterations += 1;
        }

        for attempt in 0..2 {
            if self.phase == Phase::PhaseOne {
                self.rebuild_phase1_cost();
            }
            if self.compute_duals().is_err() || !self.compute_reduced_costs() {
                if attempt == 0 && self.force_refactor().is_ok() {
                    continue;
                }
                return IterateStatus::Error;
            }

            let tol = self.tolerance;
            let entering = match self.pricing.select(self.basis.statuses(), &self.d, tol) {
                Some(j) => j,
                None => return IterateStatus::Optimal,
            };
            let sigma = match self.basis.status(entering) {
                VarStatus::AtLower => 1.0,
                VarStatus::AtUpper => -1.0,
                VarStatus::Free => {
                    if self.d[entering] < 0.0 {
                        1.0
                    } else {
                        -1.0
                    }
                }
                _ => return IterateStatus::Error,
            };

            self.problem
                .gather_col(entering, &mut self.col_idx, &mut self.col_val);
            self.dense_col.fill(0.0);
            self.problem.scatter_col(entering, &mut self.dense_col);
            if self.basis.ftran(&self.dense_col, &mut self.alpha).is_err() {
                if attempt == 0 && self.force_refactor().is_ok() {
                    continue;
                }
                return IterateStatus::Error;
            }

            match self.ratio_test(entering, sigma) {
                RatioOutcome::Unbounded => {
                    return if self.phase == Phase::PhaseTwo {
                        IterateStatus::Unbounded
                    } else {
                        IterateStatus::Error
                    };
                }
                RatioOutcome::BoundFlip { step } => {
                    self.apply_bound_flip(entering, sigma, step);
                    return IterateStatus::Continue;
                }
                RatioOutcome::Pivot {
                    row,
                    step,
                    to_upper,
                } => {
                    let leaving = self.basis.header()[row];
                    // the weight update needs the pivot row of the old basis
                    if self.basis.btran_unit(row, &mut self.rho).is_err() {
                        return IterateStatus::Error;
                    }
                    let obj_coef = self.problem.obj_coef(entering);
                    match self.basis.pivot_with_eta(
                        row,
                        &self.alpha,
                        entering,
                        leaving,
                        obj_coef,
                        &self.col_idx,
                        &self.col_val,
                        self.pivot_tol,
                    ) {
                        Ok(()) => {}
                        Err(BasisError::SingularPivot { row, value }) => {
                            trace!(row, value, "singular pivot, forcing refactor");
                            if attempt == 0 && self.force_refactor().is_ok() {
                                continue;
                            }
                            return IterateStatus::Error;
                        }
                        Err(_) => return IterateStatus::Error,
                    }
                    self.apply_pivot_step(entering, leaving, row, sigma, step, to_upper);
                    self.pricing.update_after_pivot(
                        self.problem,
                        self.basis.statuses(),
                        entering,
                        leaving,
                        row,
                        &self.alpha,
                        &self.rho,
                    );
                    return IterateStatus::Continue;
                }
            }
        }
        IterateStatus::Error
    }

    /// One dual iteration (solve_mode 1): the most bound-violated basic
    /// variable leaves, the dual ratio test over the BTRAN'd pivot row
    /// picks the enterer. Infeasible here means the dual is unbounded, so
    /// the primal has no feasible point.
    pub fn dual_iterate(&mut self) -> IterateStatus {
        self.iterations += 1;

        for attempt in 0..2 {
            if self.compute_duals().is_err() || !self.compute_reduced_costs() {
                if attempt == 0 && self.force_refactor().is_ok() {
                    continue;
                }
                return IterateStatus::Error;
            }

            // leaving row: largest bound violation
            let mut row = None;
            let mut worst = self.feas_tol;
            for k in 0..self.m {
                let j = self.basis.header()[k];
                let v = self.x[j];
                let viol = if v < self.lb[j] {
                    self.lb[j] - v
                } else if v > self.ub[j] {
                    v - self.ub[j]
                } else {
                    0.0
                };
                if viol > worst {
                    worst = viol;
                    row = Some(k);
                }
            }
            let Some(r) = row else {
                return IterateStatus::Optimal;
            };

            let leaving = self.basis.header()[r];
            let v = self.x[leaving];
            let to_upper = v > self.ub[leaving];
            let target = if to_upper {
                self.ub[leaving]
            } else {
                self.lb[leaving]
            };
            // sign of the required change of the leaving value
            let s = if to_upper { -1.0 } else { 1.0 };

            if self.basis.btran_unit(r, &mut self.rho).is_err() {
                if attempt == 0 && self.force_refactor().is_ok() {
                    continue;
                }
                return IterateStatus::Error;
            }

            // dual ratio test: smallest |d_j| / |a_rj| among columns whose
            // movement drives the leaving value toward its bound while
            // keeping dual feasibility
            let mut entering = None;
            let mut best_ratio = f64::INFINITY;
            let mut best_mag = 0.0;
            for j in 0..self.n {
                let status = self.basis.status(j);
                let a = match status {
                    VarStatus::AtLower | VarStatus::AtUpper | VarStatus::Free => {
                        self.problem.col_dot(j, &self.rho)
                    }
                    VarStatus::Basic(_) | VarStatus::Fixed => continue,
                };
                if a.abs() < self.pivot_tol {
                    continue;
                }
                let eligible = match status {
                    VarStatus::AtLower => a * s < 0.0,
                    VarStatus::AtUpper => a * s > 0.0,
                    VarStatus::Free => true,
                    _ => false,
                };
                if !eligible {
                    continue;
                }
                let ratio = self.d[j].abs() / a.abs();
                if ratio < best_ratio - 1e-12
                    || (ratio < best_ratio + 1e-12 && a.abs() > best_mag)
                {
                    best_ratio = ratio;
                    best_mag = a.abs();
                    entering = Some(j);
                }
            }
            let Some(q) = entering else {
                // dual unbounded: no primal feasible point exists
                return IterateStatus::Infeasible;
            };

            self.problem.gather_col(q, &mut self.col_idx, &mut self.col_val);
            self.dense_col.fill(0.0);
            self.problem.scatter_col(q, &mut self.dense_col);
            if self.basis.ftran(&self.dense_col, &mut self.alpha).is_err() {
                if attempt == 0 && self.force_refactor().is_ok() {
                    continue;
                }
                return IterateStatus::Error;
            }

            let a_rq = self.alpha[r];
            let sigma = match self.basis.status(q) {
                VarStatus::AtLower => 1.0,
                VarStatus::AtUpper => -1.0,
                VarStatus::Free => {
                    if a_rq * s < 0.0 {
                        1.0
                    } else {
                        -1.0
                    }
                }
                _ => return IterateStatus::Error,
            };
            let denom = sigma * a_rq;
            let step = if denom != 0.0 {
                ((v - target) / denom).max(0.0)
            } else {
                0.0
            };

            let obj_coef = self.problem.obj_coef(q);
            match self.basis.pivot_with_eta(
                r,
                &self.alpha,
                q,
                leaving,
                obj_coef,
                &self.col_idx,
                &self.col_val,
                self.pivot_tol,
            ) {
                Ok(()) => {}
                Err(BasisError::SingularPivot { .. }) => {
                    if attempt == 0 && self.force_refactor().is_ok() {
                        continue;
                    }
                    return IterateStatus::Error;
                }
                Err(_) => return IterateStatus::Error,
            }
            self.apply_pivot_step(q, leaving, r, sigma, step, to_upper);
            self.pricing.update_after_pivot(
                self.problem,
                self.basis.statuses(),
                q,
                leaving,
                r,
                &self.alpha,
                &self.rho,
            );
            return IterateStatus::Continue;
        }
        IterateStatus::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::SolverEnv;
    use crate::model::LpProblem;
    use crate::status::Phase;

    /// min -x - y,  x - y <= 1,  x, y >= 0 (no upper bounds)
    fn unbounded_problem() -> LpProblem {
        let mut b = LpProblem::builder(1, 2);
        b.objective(0, -1.0).unwrap();
        b.objective(1, -1.0).unwrap();
        b.coefficient(0, 0, 1.0).unwrap();
        b.coefficient(0, 1, -1.0).unwrap();
        b.row(0, '<', 1.0).unwrap();
        b.finalize().unwrap()
    }

    #[test]
    fn already_optimal_problem_reports_optimal() {
        // min x + 2y with x, y at lower bounds is optimal immediately
        let mut b = LpProblem::builder(1, 2);
        b.objective(0, 1.0).unwrap();
        b.objective(1, 2.0).unwrap();
        b.coefficient(0, 0, 1.0).unwrap();
        b.coefficient(0, 1, 1.0).unwrap();
        b.row(0, '<', 10.0).unwrap();
        let problem = b.finalize().unwrap();
        let env = SolverEnv::default();
        let mut ctx = SolverContext::new(&problem, &env).unwrap();
        ctx.setup(&env).unwrap();
        assert_eq!(ctx.primal_iterate(), IterateStatus::Optimal);
        assert_eq!(ctx.iterations, 1);
    }

    #[test]
    fn unbounded_is_detected_in_phase_two() {
        let problem = unbounded_problem();
        let env = SolverEnv::default();
        let mut ctx = SolverContext::new(&problem, &env).unwrap();
        ctx.setup(&env).unwrap();
        assert_eq!(ctx.phase, Phase::PhaseTwo);

        // first iteration pivots x into the basis, second runs off to
        // infinity along y
        let mut saw_unbounded = false;
        for _ in 0..5 {
            match ctx.primal_iterate() {
                IterateStatus::Continue => {}
                IterateStatus::Unbounded => {
                    saw_unbounded = true;
                    break;
                }
                other => panic!("unexpected token {other:?}"),
            }
        }
        assert!(saw_unbounded);
    }

    #[test]
    fn iteration_counter_always_advances() {
        let problem = unbounded_problem();
        let env = SolverEnv::default();
        let mut ctx = SolverContext::new(&problem, &env).unwrap();
        ctx.setup(&env).unwrap();
        let before = ctx.iterations;
        let _ = ctx.primal_iterate();
        assert_eq!(ctx.iterations, before + 1);
    }

    #[test]
    fn pivot_counters_and_eta_head_after_one_pivot() {
        let problem = unbounded_problem();
        let env = SolverEnv::default();
        let mut ctx = SolverContext::new(&problem, &env).unwrap();
        ctx.setup(&env).unwrap();
        assert_eq!(ctx.basis.eta_count, 0);
        assert_eq!(ctx.primal_iterate(), IterateStatus::Continue);
        assert_eq!(ctx.basis.eta_count, 1);
        let rec = ctx.basis.etas.record(ctx.basis.etas.head().unwrap());
        assert_eq!(rec.kind, crate::basis::EtaKind::Pivot);
        assert_eq!(rec.pivot_row, 0);
        ctx.basis.validate().unwrap();
    }
}
