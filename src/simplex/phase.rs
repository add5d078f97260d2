//! Phase transition and degeneracy perturbation.

use tracing::{debug, info};

use super::SolverContext;
use crate::status::{Phase, Status};

/// Deterministic xorshift64* stream used to shape the perturbation.
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 0x9e3779b97f4a7c15 } else { seed },
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545f4914f6cdd1d)
    }

    /// Uniform-ish value in [0.5, 1.0).
    fn next_unit(&mut self) -> f64 {
        0.5 + (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64 * 0.5
    }
}

const PERTURB_SEED: u64 = 0x51_6d_70_6c_78;

impl<'a> SolverContext<'a> {
    /// Called when Phase I reports pricing optimality. When the remaining
    /// infeasibility is within tolerance the context switches to Phase II
    /// and the reduced costs are rebuilt from the real objective;
    /// otherwise the problem is infeasible.
    pub fn phase_end(&mut self) -> Status {
        let infeasibility = self.basic_infeasibility();
        if infeasibility > self.feas_tol {
            info!(infeasibility, "phase I optimal with residual infeasibility");
            return Status::Infeasible;
        }
        self.phase = Phase::PhaseTwo;
        self.obj_value = self.real_objective();
        if self.compute_duals().is_err() {
            return Status::Numerical;
        }
        if !self.compute_reduced_costs() {
            return Status::Numerical;
        }
        info!(
            iterations = self.iterations,
            objective = self.obj_value,
            "phase I complete, entering phase II"
        );
        Status::Ok
    }

    /// Apply a small deterministic outward perturbation to the working
    /// bounds to break degenerate ties. Idempotent: a second call is a
    /// no-op.
    pub fn perturb(&mut self) -> Status {
        if self.perturbed {
            return Status::Ok;
        }
        let mut rng = XorShift64::new(PERTURB_SEED);
        let scale = self.feas_tol * 1e-2;
        for j in 0..self.n {
            let (l, u) = (self.orig_lb[j], self.orig_ub[j]);
            if l == u {
                // fixed variables keep their point bound
                continue;
            }
            if !self.is_inf(l) {
                self.lb[j] = l - scale * rng.next_unit() * (1.0 + l.abs());
            }
            if !self.is_inf(u) {
                self.ub[j] = u + scale * rng.next_unit() * (1.0 + u.abs());
            }
        }
        self.perturbed = true;
        self.consecutive_degenerate = 0;
        debug!("bounds perturbed against degeneracy");
        Status::Ok
    }

    /// Remove an active perturbation: restore the true bounds, snap the
    /// nonbasic values back onto them, and recompute the basic values so
    /// the perturbed state cannot leak into the reported solution. Returns
    /// false when no perturbation was active.
    pub fn unperturb(&mut self) -> bool {
        if !self.perturbed {
            return false;
        }
        self.lb.copy_from_slice(&self.orig_lb);
        self.ub.copy_from_slice(&self.orig_ub);
        for j in 0..self.n {
            use crate::status::VarStatus::*;
            match self.basis.status(j) {
                AtLower | Fixed => self.x[j] = self.lb[j],
                AtUpper => self.x[j] = self.ub[j],
                Free | Basic(_) => {}
            }
        }
        self.perturbed = false;
        if self.recompute_basic_values().is_err() {
            debug!("basic-value refresh after unperturb failed; keeping last values");
        }
        self.obj_value = self.real_objective();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::SolverEnv;
    use crate::model::LpProblem;
    use crate::status::{IterateStatus, Phase};

    fn infeasible_rows_problem() -> LpProblem {
        // x + y <= 1 and x + y >= 3 cannot both hold
        let mut b = LpProblem::builder(2, 2);
        b.coefficient(0, 0, 1.0).unwrap();
        b.coefficient(0, 1, 1.0).unwrap();
        b.coefficient(1, 0, 1.0).unwrap();
        b.coefficient(1, 1, 1.0).unwrap();
        b.row(0, '<', 1.0).unwrap();
        b.row(1, '>', 3.0).unwrap();
        b.finalize().unwrap()
    }

    #[test]
    fn phase_one_ends_infeasible_when_residual_remains() {
        let problem = infeasible_rows_problem();
        let env = SolverEnv::default();
        let mut ctx = SolverContext::new(&problem, &env).unwrap();
        ctx.setup(&env).unwrap();
        assert_eq!(ctx.phase, Phase::PhaseOne);

        let mut tok = IterateStatus::Continue;
        for _ in 0..20 {
            tok = ctx.primal_iterate();
            if tok != IterateStatus::Continue {
                break;
            }
        }
        assert_eq!(tok, IterateStatus::Optimal);
        // phase I stalled with positive infeasibility
        assert!(ctx.basic_infeasibility() > 1.0);
        assert_eq!(ctx.phase_end(), Status::Infeasible);
    }

    #[test]
    fn perturbation_is_idempotent_and_reversible() {
        let mut b = LpProblem::builder(1, 2);
        b.coefficient(0, 0, 1.0).unwrap();
        b.coefficient(0, 1, 1.0).unwrap();
        b.bounds(0, 0.0, 5.0).unwrap();
        b.bounds(1, 1.0, 1.0).unwrap();
        b.row(0, '<', 10.0).unwrap();
        let problem = b.finalize().unwrap();
        let env = SolverEnv::default();
        let mut ctx = SolverContext::new(&problem, &env).unwrap();
        ctx.setup(&env).unwrap();

        assert!(!ctx.unperturb());

        assert_eq!(ctx.perturb(), Status::Ok);
        let lb_after = ctx.lb.clone();
        assert!(lb_after[0] < 0.0);
        // fixed variable untouched
        assert_eq!(ctx.lb[1], 1.0);
        assert_eq!(ctx.ub[1], 1.0);

        // second call changes nothing
        assert_eq!(ctx.perturb(), Status::Ok);
        assert_eq!(ctx.lb, lb_after);

        assert!(ctx.unperturb());
        assert_eq!(ctx.lb, ctx.orig_lb);
        assert_eq!(ctx.ub, ctx.orig_ub);
        assert!(!ctx.unperturb());
    }
}
