//! Entering-variable selection.
//!
//! Strategies: full (Dantzig largest-violation), partial pricing over
//! variable levels with two-phase escalation, and weighted selection
//! (steepest-edge / Devex reference weights). All strategies share the same
//! attractiveness rule on the reduced costs; a return of "no candidate" is
//! the optimality signal.

use thiserror::Error;
use tracing::trace;

use crate::model::LpProblem;
use crate::status::VarStatus;

#[derive(Debug, Error, PartialEq)]
pub enum PricingError {
    #[error("pricing context needs at least one variable")]
    EmptyProblem,

    #[error("unknown pricing strategy code {0}")]
    UnknownStrategy(i32),
}

/// Strategy codes as configured: 0 auto, 1 partial, 2 steepest-edge,
/// 3 Devex. Auto resolves to full pricing below 1000 variables and partial
/// above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum PricingStrategy {
    Auto = 0,
    Partial = 1,
    SteepestEdge = 2,
    Devex = 3,
}

impl PricingStrategy {
    pub fn from_code(code: i32) -> Result<PricingStrategy, PricingError> {
        match code {
            0 => Ok(PricingStrategy::Auto),
            1 => Ok(PricingStrategy::Partial),
            2 => Ok(PricingStrategy::SteepestEdge),
            3 => Ok(PricingStrategy::Devex),
            other => Err(PricingError::UnknownStrategy(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effective {
    Full,
    Partial,
    Weighted,
}

/// Dirty-cache flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingCache(u8);

impl PricingCache {
    pub const CANDIDATES: PricingCache = PricingCache(1);
    pub const REDUCED_COSTS: PricingCache = PricingCache(2);
    pub const WEIGHTS: PricingCache = PricingCache(4);
    pub const ALL: PricingCache = PricingCache(7);

    pub fn contains(self, other: PricingCache) -> bool {
        self.0 & other.0 == other.0
    }
}

#[derive(Debug, Default, Clone)]
pub struct PricingStats {
    pub candidates_scanned: usize,
    pub level_escalations: usize,
}

/// Weights beyond this trigger a reference-framework reset.
const WEIGHT_RESET: f64 = 1e7;
/// Auto strategy switches to partial pricing above this variable count.
const PARTIAL_THRESHOLD: usize = 1000;

#[derive(Debug)]
pub struct PricingContext {
    num_vars: usize,
    strategy: PricingStrategy,
    effective: Effective,
    max_levels: usize,
    level_size: usize,
    cursor: usize,
    /// Cached candidate count per level; None marks a stale cache.
    level_counts: Vec<Option<usize>>,
    level_candidates: Vec<Vec<usize>>,
    /// Reference weights for steepest-edge / Devex.
    pub weights: Vec<f64>,
    dirty: u8,
    pub stats: PricingStats,
}

impl PricingContext {
    pub fn new(num_vars: usize, max_levels: usize) -> Result<Self, PricingError> {
        if num_vars == 0 {
            return Err(PricingError::EmptyProblem);
        }
        let max_levels = max_levels.max(1).min(num_vars);
        let level_size = num_vars.div_ceil(max_levels);
        let mut ctx = Self {
            num_vars,
            strategy: PricingStrategy::Auto,
            effective: Effective::Full,
            max_levels,
            level_size,
            cursor: 0,
            level_counts: vec![None; max_levels],
            level_candidates: vec![Vec::new(); max_levels],
            weights: vec![1.0; num_vars],
            dirty: PricingCache::ALL.0,
            stats: PricingStats::default(),
        };
        ctx.init(PricingStrategy::Auto);
        Ok(ctx)
    }

    pub fn init(&mut self, strategy: PricingStrategy) {
        self.strategy = strategy;
        self.effective = match strategy {
            PricingStrategy::Auto => {
                if self.num_vars < PARTIAL_THRESHOLD {
                    Effective::Full
                } else {
                    Effective::Partial
                }
            }
            PricingStrategy::Partial => Effective::Partial,
            PricingStrategy::SteepestEdge | PricingStrategy::Devex => Effective::Weighted,
        };
        self.cursor = 0;
        self.weights.fill(1.0);
        self.invalidate(PricingCache::ALL);
    }

    pub fn strategy(&self) -> PricingStrategy {
        self.strategy
    }

    pub fn num_levels(&self) -> usize {
        self.max_levels
    }

    pub fn invalidate(&mut self, flags: PricingCache) {
        self.dirty |= flags.0;
        if flags.contains(PricingCache::CANDIDATES) {
            self.level_counts.fill(None);
        }
    }

    pub fn is_dirty(&self, flags: PricingCache) -> bool {
        self.dirty & flags.0 != 0
    }

    pub fn mark_clean(&mut self, flags: PricingCache) {
        self.dirty &= !flags.0;
    }

    /// KKT sign rule: a nonbasic variable is attractive when moving off its
    /// bound would improve the (minimization) objective.
    pub fn is_attractive(status: VarStatus, d: f64, tol: f64) -> bool {
        match status {
            VarStatus::AtLower => d < -tol,
            VarStatus::AtUpper => d > tol,
            VarStatus::Free => d.abs() > tol,
            VarStatus::Basic(_) | VarStatus::Fixed => false,
        }
    }

    fn level_range(&self, level: usize) -> std::ops::Range<usize> {
        let start = (level * self.level_size).min(self.num_vars);
        let end = ((level + 1) * self.level_size).min(self.num_vars);
        start..end
    }

    /// Scan one level's slice of the variable range and collect its
    /// candidates. Returns the count; 0 across all levels means optimal.
    pub fn candidates_level(
        &mut self,
        level: usize,
        statuses: &[VarStatus],
        d: &[f64],
        tol: f64,
    ) -> usize {
        let range = self.level_range(level);
        self.stats.candidates_scanned += range.len();
        let buf = &mut self.level_candidates[level];
        buf.clear();
        for j in range {
            if Self::is_attractive(statuses[j], d[j], tol) {
                buf.push(j);
            }
        }
        let count = buf.len();
        self.level_counts[level] = Some(count);
        count
    }

    /// Candidates collected by the last scan of `level`.
    pub fn level_candidates(&self, level: usize) -> &[usize] {
        &self.level_candidates[level]
    }

    /// Largest-|d| choice among all attractive variables.
    fn select_dantzig(&mut self, statuses: &[VarStatus], d: &[f64], tol: f64) -> Option<usize> {
        let mut best = None;
        let mut best_score = tol;
        for j in 0..self.num_vars {
            if Self::is_attractive(statuses[j], d[j], tol) {
                let score = d[j].abs();
                if score > best_score {
                    best_score = score;
                    best = Some(j);
                }
            }
        }
        self.stats.candidates_scanned += self.num_vars;
        best
    }

    /// Partial pricing: scan the cursor level; when it comes up empty,
    /// escalate to a full scan of the remaining variables.
    fn select_partial(&mut self, statuses: &[VarStatus], d: &[f64], tol: f64) -> Option<usize> {
        let level = self.cursor;
        self.cursor = (self.cursor + 1) % self.max_levels;

        let count = match self.level_counts[level] {
            Some(cached) if !self.is_dirty(PricingCache::CANDIDATES) => cached,
            _ => self.candidates_level(level, statuses, d, tol),
        };
        if count > 0 {
            let mut best = None;
            let mut best_score = 0.0;
            for &j in &self.level_candidates[level] {
                let score = d[j].abs();
                if score > best_score {
                    best_score = score;
                    best = Some(j);
                }
            }
            return best;
        }

        // two-phase escalation: the near section was clean, sweep the rest
        self.stats.level_escalations += 1;
        trace!(level, "partial pricing escalated to full scan");
        self.select_dantzig(statuses, d, tol)
    }

    /// Steepest-edge style choice: maximize d^2 / max(weight, 1). Zero or
    /// stale weights fall back to 1, and ties break on the smaller index.
    pub fn select_weighted(&self, statuses: &[VarStatus], d: &[f64], tol: f64) -> Option<usize> {
        let mut best = None;
        let mut best_score = 0.0;
        for j in 0..self.num_vars {
            if !Self::is_attractive(statuses[j], d[j], tol) {
                continue;
            }
            let w = self.weights[j].max(1.0);
            let score = d[j] * d[j] / w;
            if score > best_score {
                best_score = score;
                best = Some(j);
            }
        }
        best
    }

    /// Choose the entering variable, or None for optimality.
    pub fn select(&mut self, statuses: &[VarStatus], d: &[f64], tol: f64) -> Option<usize> {
        debug_assert_eq!(statuses.len(), self.num_vars);
        debug_assert_eq!(d.len(), self.num_vars);
        let choice = match self.effective {
            Effective::Full => self.select_dantzig(statuses, d, tol),
            Effective::Partial => self.select_partial(statuses, d, tol),
            Effective::Weighted => {
                self.stats.candidates_scanned += self.num_vars;
                self.select_weighted(statuses, d, tol)
            }
        };
        self.mark_clean(PricingCache::CANDIDATES);
        choice
    }

    /// Reference-weight update after a pivot, in the Devex shape: the
    /// leaving variable inherits the entering weight through the pivot
    /// element, and every nonbasic variable with a nonzero entry in the
    /// pivot row is bumped to at least `(a_rj / a_rq)^2 * w_q`. The
    /// entering weight itself uses the exact squared norm of the FTRAN'd
    /// column.
    pub fn update_after_pivot(
        &mut self,
        problem: &LpProblem,
        statuses: &[VarStatus],
        entering: usize,
        leaving: usize,
        pivot_row: usize,
        alpha: &[f64],
        rho: &[f64],
    ) {
        if self.effective != Effective::Weighted {
            return;
        }
        let a_rq = alpha[pivot_row];
        if a_rq == 0.0 {
            return;
        }
        let gamma_q: f64 = alpha.iter().map(|v| v * v).sum();
        let w_q = match self.strategy {
            PricingStrategy::SteepestEdge => gamma_q.max(1.0),
            _ => self.weights[entering].max(1.0),
        };

        for j in 0..self.num_vars {
            if j == entering || j == leaving {
                continue;
            }
            match statuses[j] {
                VarStatus::Basic(_) | VarStatus::Fixed => continue,
                _ => {}
            }
            let a_rj = problem.col_dot(j, rho);
            if a_rj == 0.0 {
                continue;
            }
            let ratio = a_rj / a_rq;
            let candidate = ratio * ratio * w_q;
            if candidate > self.weights[j] {
                self.weights[j] = candidate;
            }
        }
        self.weights[leaving] = (w_q / (a_rq * a_rq)).max(1.0);
        self.weights[entering] = 1.0;

        if self.weights.iter().any(|&w| w > WEIGHT_RESET) {
            trace!("reference weights overflowed, resetting framework");
            self.weights.fill(1.0);
        }
        self.invalidate(PricingCache::CANDIDATES);
        self.mark_clean(PricingCache::WEIGHTS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statuses(codes: &[i32]) -> Vec<VarStatus> {
        codes.iter().map(|&c| VarStatus::from_code(c).unwrap()).collect()
    }

    #[test]
    fn rejects_empty_problem() {
        assert_eq!(PricingContext::new(0, 4).unwrap_err(), PricingError::EmptyProblem);
    }

    #[test]
    fn attractiveness_follows_status_sign_rules() {
        let tol = 1e-6;
        assert!(PricingContext::is_attractive(VarStatus::AtLower, -1.0, tol));
        assert!(!PricingContext::is_attractive(VarStatus::AtLower, 1.0, tol));
        assert!(PricingContext::is_attractive(VarStatus::AtUpper, 1.0, tol));
        assert!(!PricingContext::is_attractive(VarStatus::AtUpper, -1.0, tol));
        assert!(PricingContext::is_attractive(VarStatus::Free, -1.0, tol));
        assert!(PricingContext::is_attractive(VarStatus::Free, 1.0, tol));
        assert!(!PricingContext::is_attractive(VarStatus::Basic(0), -9.0, tol));
        assert!(!PricingContext::is_attractive(VarStatus::Fixed, -9.0, tol));
        // within tolerance is not attractive
        assert!(!PricingContext::is_attractive(VarStatus::AtLower, -1e-9, tol));
    }

    #[test]
    fn dantzig_picks_largest_violation() {
        let mut ctx = PricingContext::new(4, 2).unwrap();
        let st = statuses(&[-1, -1, -2, 0]);
        let d = [-0.5, -2.0, 3.0, -9.0];
        // basic variable is never a candidate even with huge |d|
        assert_eq!(ctx.select(&st, &d, 1e-6), Some(2));
    }

    #[test]
    fn optimality_returns_none_everywhere() {
        let mut ctx = PricingContext::new(3, 2).unwrap();
        let st = statuses(&[-1, -2, 0]);
        // all reduced costs satisfy their sign condition
        let d = [0.5, -0.5, 0.0];
        assert_eq!(ctx.select(&st, &d, 1e-6), None);
        assert_eq!(ctx.select_weighted(&st, &d, 1e-6), None);

        ctx.init(PricingStrategy::Partial);
        assert_eq!(ctx.select(&st, &d, 1e-6), None);
        // the empty near-section scan escalated
        assert_eq!(ctx.stats.level_escalations, 1);
    }

    #[test]
    fn candidate_scan_fills_level_buffer() {
        let mut ctx = PricingContext::new(6, 3).unwrap();
        let st = statuses(&[-1, -1, -1, -2, -3, 0]);
        let d = [-1.0, 0.5, -0.2, 0.3, 0.4, 0.0];
        // level 0 covers variables 0..2
        let count = ctx.candidates_level(0, &st, &d, 1e-6);
        assert_eq!(count, 1);
        assert_eq!(ctx.level_candidates(0), &[0]);
        // level 1 covers 2..4: j=2 attractive (lower, d<0), j=3 attractive
        let count = ctx.candidates_level(1, &st, &d, 1e-6);
        assert_eq!(count, 2);
        assert_eq!(ctx.level_candidates(1), &[2, 3]);
        // level 2 covers 4..6: free with |d|>tol
        let count = ctx.candidates_level(2, &st, &d, 1e-6);
        assert_eq!(count, 1);
    }

    #[test]
    fn weighted_select_prefers_low_weight() {
        let mut ctx = PricingContext::new(2, 1).unwrap();
        ctx.init(PricingStrategy::SteepestEdge);
        let st = statuses(&[-1, -1]);
        let d = [-2.0, -2.0];
        ctx.weights[0] = 16.0;
        ctx.weights[1] = 1.0;
        // equal |d|, lower weight wins
        assert_eq!(ctx.select(&st, &d, 1e-6), Some(1));
        // zero weight is treated as 1, and ties break to the smaller index
        ctx.weights[0] = 0.0;
        assert_eq!(ctx.select(&st, &d, 1e-6), Some(0));
    }

    #[test]
    fn invalidate_resets_cached_counts() {
        let mut ctx = PricingContext::new(4, 2).unwrap();
        let st = statuses(&[-1, -1, -1, -1]);
        let d = [-1.0, 0.0, 0.0, 0.0];
        ctx.candidates_level(0, &st, &d, 1e-6);
        assert_eq!(ctx.level_counts[0], Some(1));
        ctx.invalidate(PricingCache::CANDIDATES);
        assert_eq!(ctx.level_counts[0], None);
        assert!(ctx.is_dirty(PricingCache::CANDIDATES));
    }
}
