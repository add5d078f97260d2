use std::sync::atomic::{AtomicBool, Ordering};

use crate::pricing::PricingStrategy;
use crate::status::SolveMode;

/// Sentinel magnitude treated as infinity for bounds.
pub const INFINITY: f64 = 1e100;

/// Configuration bag consumed by the solver core.
///
/// Construct with [`SolverEnv::default`] and adjust fields; `validate`
/// clamps every numeric option into its documented range the way the
/// solve entry points expect.
#[derive(Debug)]
pub struct SolverEnv {
    /// Primal feasibility tolerance, range [1e-9, 1e-2].
    pub feasibility_tol: f64,
    /// Dual (reduced-cost) tolerance, range [1e-9, 1e-2].
    pub optimality_tol: f64,
    /// Bound magnitude treated as unbounded.
    pub infinity: f64,
    /// Pivots between refactorizations, range [1, 10000].
    pub refactor_interval: usize,
    /// Eta-chain length that forces a refactorization, range [10, 1000].
    pub max_eta_count: usize,
    /// Lower bound on an acceptable |pivot element|.
    pub pivot_tol: f64,
    /// Hard cap on simplex iterations across both phases.
    pub iteration_limit: usize,
    pub solve_mode: SolveMode,
    pub pricing: PricingStrategy,
    pub output_flag: bool,
    /// 0 silent, 1 phase summaries, 2 per-iteration records.
    pub verbosity: u8,
    /// Cooperative cancellation flag, polled once per iteration.
    pub terminate: AtomicBool,
}

impl Default for SolverEnv {
    fn default() -> Self {
        Self {
            feasibility_tol: 1e-6,
            optimality_tol: 1e-6,
            infinity: INFINITY,
            refactor_interval: 50,
            max_eta_count: 100,
            pivot_tol: 1e-8,
            iteration_limit: 10_000,
            solve_mode: SolveMode::Auto,
            pricing: PricingStrategy::Auto,
            output_flag: false,
            verbosity: 0,
            terminate: AtomicBool::new(false),
        }
    }
}

impl SolverEnv {
    /// Clamp every option into its documented range.
    pub fn validate(&mut self) {
        self.feasibility_tol = self.feasibility_tol.clamp(1e-9, 1e-2);
        self.optimality_tol = self.optimality_tol.clamp(1e-9, 1e-2);
        if !self.infinity.is_finite() || self.infinity <= 0.0 {
            self.infinity = INFINITY;
        }
        self.refactor_interval = self.refactor_interval.clamp(1, 10_000);
        self.max_eta_count = self.max_eta_count.clamp(10, 1_000);
        self.pivot_tol = self.pivot_tol.clamp(1e-14, 1e-2);
        self.iteration_limit = self.iteration_limit.max(1);
        self.verbosity = self.verbosity.min(2);
    }

    /// Snapshot of the numeric options, clamped into range, for one solve.
    pub fn effective(&self) -> EffectiveParams {
        EffectiveParams {
            feasibility_tol: self.feasibility_tol.clamp(1e-9, 1e-2),
            optimality_tol: self.optimality_tol.clamp(1e-9, 1e-2),
            infinity: if self.infinity.is_finite() && self.infinity > 0.0 {
                self.infinity
            } else {
                INFINITY
            },
            refactor_interval: self.refactor_interval.clamp(1, 10_000),
            max_eta_count: self.max_eta_count.clamp(10, 1_000),
            pivot_tol: self.pivot_tol.clamp(1e-14, 1e-2),
            iteration_limit: self.iteration_limit.max(1),
            solve_mode: self.solve_mode,
            pricing: self.pricing,
        }
    }

    /// True when `value` is at or beyond the configured infinity.
    pub fn is_infinite(&self, value: f64) -> bool {
        value.abs() >= self.infinity
    }

    pub fn request_terminate(&self) {
        self.terminate.store(true, Ordering::Relaxed);
    }

    pub fn terminate_requested(&self) -> bool {
        self.terminate.load(Ordering::Relaxed)
    }
}

/// Clamped per-solve copies of the numeric options.
#[derive(Debug, Clone, Copy)]
pub struct EffectiveParams {
    pub feasibility_tol: f64,
    pub optimality_tol: f64,
    pub infinity: f64,
    pub refactor_interval: usize,
    pub max_eta_count: usize,
    pub pivot_tol: f64,
    pub iteration_limit: usize,
    pub solve_mode: SolveMode,
    pub pricing: PricingStrategy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_in_range() {
        let mut env = SolverEnv::default();
        let before = env.effective();
        env.validate();
        let after = env.effective();
        assert_eq!(before.feasibility_tol, after.feasibility_tol);
        assert_eq!(before.refactor_interval, after.refactor_interval);
    }

    #[test]
    fn validate_clamps() {
        let mut env = SolverEnv {
            feasibility_tol: 1.0,
            optimality_tol: 0.0,
            refactor_interval: 0,
            max_eta_count: 5,
            iteration_limit: 0,
            verbosity: 9,
            ..Default::default()
        };
        env.validate();
        assert_eq!(env.feasibility_tol, 1e-2);
        assert_eq!(env.optimality_tol, 1e-9);
        assert_eq!(env.refactor_interval, 1);
        assert_eq!(env.max_eta_count, 10);
        assert_eq!(env.iteration_limit, 1);
        assert_eq!(env.verbosity, 2);
    }

    #[test]
    fn terminate_flag_roundtrip() {
        let env = SolverEnv::default();
        assert!(!env.terminate_requested());
        env.request_terminate();
        assert!(env.terminate_requested());
    }

    #[test]
    fn infinity_sentinel() {
        let env = SolverEnv::default();
        assert!(env.is_infinite(1e100));
        assert!(env.is_infinite(-1e100));
        assert!(!env.is_infinite(1e99));
    }
}
