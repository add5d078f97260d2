//! Invariants of the basis subsystem: validation after warm starts,
//! FTRAN/BTRAN round trips and duality, eta immutability, and snapshot
//! behavior.

use rstest::rstest;

use etalon::basis::BasisState;
use etalon::sparse::kernel::{self, NormKind};
use etalon::{EtaKind, LpProblem, ValidateFlags, VarStatus};

/// m x m problem whose structural columns form a well-conditioned basis
/// (diagonal 4, sub-diagonal 1), plus the usual slack identity.
fn banded_problem(m: usize) -> LpProblem {
    let mut b = LpProblem::builder(m, m);
    for j in 0..m {
        b.coefficient(j, j, 4.0).unwrap();
        if j + 1 < m {
            b.coefficient(j + 1, j, 1.0).unwrap();
        }
        b.row(j, '<', 1.0).unwrap();
    }
    b.finalize().unwrap()
}

fn basis_residual(problem: &LpProblem, basis: &BasisState, x: &[f64], b: &[f64]) -> f64 {
    let m = b.len();
    let mut ax = vec![0.0; m];
    for (k, &col) in basis.header().iter().enumerate() {
        problem.for_each_col_entry(col, |i, v| ax[i] += v * x[k]);
    }
    ax.iter()
        .zip(b.iter())
        .map(|(a, bi)| (a - bi).abs())
        .fold(0.0, f64::max)
}

#[rstest]
#[case(1, 4)]
#[case(3, 6)]
#[case(7, 20)]
fn warm_start_with_distinct_vars_validates(#[case] m: usize, #[case] n: usize) {
    let mut basis = BasisState::new(m, n);
    let picks: Vec<usize> = (0..m).map(|r| (r * 2) % n).collect();
    // fall back to 0..m when the stride collides
    let picks = if picks.iter().collect::<std::collections::BTreeSet<_>>().len() == m {
        picks
    } else {
        (0..m).collect()
    };
    basis.warm_start(&picks).unwrap();
    basis.validate().unwrap();
    basis.validate_ex(ValidateFlags::ALL).unwrap();

    // status values of the basic set are a permutation of 0..m
    let mut rows: Vec<usize> = (0..n)
        .filter_map(|j| basis.status(j).basic_row())
        .collect();
    rows.sort_unstable();
    assert_eq!(rows, (0..m).collect::<Vec<_>>());
    for (r, &j) in basis.header().iter().enumerate() {
        assert_eq!(basis.status(j), VarStatus::Basic(r));
    }
}

#[test]
fn identity_basis_ftran_is_identity() {
    let mut basis = BasisState::new(3, 6);
    basis.warm_start(&[3, 4, 5]).unwrap();
    let input = [1.0, 2.0, 3.0];
    let mut out = [0.0; 3];
    basis.ftran(&input, &mut out).unwrap();
    for i in 0..3 {
        assert!((out[i] - input[i]).abs() < 1e-10);
    }
}

#[test]
fn identity_basis_btran_last_row_is_unit() {
    let mut basis = BasisState::new(3, 6);
    basis.warm_start(&[3, 4, 5]).unwrap();
    let mut out = [0.0; 3];
    basis.btran_unit(2, &mut out).unwrap();
    for (i, &v) in out.iter().enumerate() {
        let want = if i == 2 { 1.0 } else { 0.0 };
        assert!((v - want).abs() < 1e-10);
    }
}

/// Build a basis over the banded structural columns through genuine pivots
/// so both the LU factors and a nontrivial eta chain are exercised.
fn pivoted_basis(problem: &LpProblem, m: usize) -> BasisState {
    let mut basis = BasisState::new(m, 2 * m);
    let slacks: Vec<usize> = (m..2 * m).collect();
    basis.warm_start(&slacks).unwrap();
    basis.refactor(problem, 1e-10).unwrap();
    assert!(basis.factors().is_some());

    let mut idx = Vec::new();
    let mut val = Vec::new();
    let mut dense = vec![0.0; m];
    let mut alpha = vec![0.0; m];
    for j in 0..m {
        problem.gather_col(j, &mut idx, &mut val);
        dense.fill(0.0);
        problem.scatter_col(j, &mut dense);
        basis.ftran(&dense, &mut alpha).unwrap();
        let leaving = basis.header()[j];
        basis
            .pivot_with_eta(j, &alpha, j, leaving, 0.0, &idx, &val, 1e-10)
            .unwrap();
    }
    basis
}

#[rstest]
#[case(2)]
#[case(5)]
fn ftran_btran_duality(#[case] m: usize) {
    let problem = banded_problem(m);
    let mut basis = pivoted_basis(&problem, m);

    let c: Vec<f64> = (0..m).map(|i| (i as f64) - 1.5).collect();
    let tol = 10.0 * f64::EPSILON * kernel::norm(&c, NormKind::Two).max(1.0);

    let mut ftran_c = vec![0.0; m];
    basis.ftran(&c, &mut ftran_c).unwrap();
    assert!(basis_residual(&problem, &basis, &ftran_c, &c) < 1e-9);

    for r in 0..m {
        let mut y = vec![0.0; m];
        basis.btran_unit(r, &mut y).unwrap();
        let dot = kernel::dot(&y, &c);
        assert!(
            (dot - ftran_c[r]).abs() <= tol.max(1e-9),
            "duality failed at row {r}: {dot} vs {}",
            ftran_c[r]
        );
    }
}

#[test]
fn pivot_leaves_previous_eta_head_untouched() {
    let m = 4;
    let problem = banded_problem(m);
    let mut basis = pivoted_basis(&problem, m);

    let old_head_id = basis.etas.head().unwrap();
    let old_head = basis.etas.record(old_head_id).clone();

    // one more pivot: bring a slack back in over row 0
    let slack = m;
    let mut idx = Vec::new();
    let mut val = Vec::new();
    let mut dense = vec![0.0; m];
    let mut alpha = vec![0.0; m];
    problem.gather_col(slack, &mut idx, &mut val);
    problem.scatter_col(slack, &mut dense);
    basis.ftran(&dense, &mut alpha).unwrap();
    let leaving = basis.header()[0];
    basis
        .pivot_with_eta(0, &alpha, slack, leaving, 0.0, &idx, &val, 1e-10)
        .unwrap();

    let new_head_id = basis.etas.head().unwrap();
    let new_head = basis.etas.record(new_head_id);
    assert_eq!(new_head.kind, EtaKind::Pivot);
    assert_eq!(new_head.pivot_row, 0);
    assert_eq!(new_head.next, Some(old_head_id));
    // the previous head is reachable and bitwise unchanged
    assert_eq!(*basis.etas.record(old_head_id), old_head);
}

#[test]
fn pivot_updates_counters_and_head_record() {
    let m = 3;
    let problem = banded_problem(m);
    let mut basis = BasisState::new(m, 2 * m);
    basis.warm_start(&[3, 4, 5]).unwrap();
    assert_eq!(basis.eta_count, 0);

    let mut idx = Vec::new();
    let mut val = Vec::new();
    let mut dense = vec![0.0; m];
    let mut alpha = vec![0.0; m];
    problem.gather_col(1, &mut idx, &mut val);
    problem.scatter_col(1, &mut dense);
    basis.ftran(&dense, &mut alpha).unwrap();

    basis
        .pivot_with_eta(1, &alpha, 1, 4, 0.0, &idx, &val, 1e-10)
        .unwrap();
    assert_eq!(basis.eta_count, 1);
    let head = basis.etas.record(basis.etas.head().unwrap());
    assert_eq!(head.kind, EtaKind::Pivot);
    assert_eq!(head.pivot_row, 1);
    assert_eq!(head.pivot_var, 1);
    assert_eq!(head.leaving_row, Some(1));

    // the record keeps the entering variable's original sparse column
    let (ci, cv) = basis.etas.col_portion(head);
    assert_eq!(ci, &[1u32, 2u32]);
    assert_eq!(cv, &[4.0, 1.0]);
}

#[test]
fn snapshot_restore_is_idempotent() {
    let m = 4;
    let problem = banded_problem(m);
    let mut basis = pivoted_basis(&problem, m);

    let snap = basis.snapshot(17, true);
    assert!(snap.valid);
    assert_eq!(snap.iteration, 17);

    // disturb the basis, then restore
    let slacks: Vec<usize> = (m..2 * m).collect();
    basis.warm_start(&slacks).unwrap();
    basis.warm_start_from_snapshot(&snap).unwrap();
    let again = basis.snapshot(17, false);
    assert_eq!(snap.diff(&again), Some(0));
    assert!(snap.equal(&again));

    let mut dead = snap.clone();
    dead.invalidate();
    assert!(!dead.valid);
    assert_eq!(dead.diff(&again), None);
}

#[test]
fn pricing_optimality_law() {
    use etalon::pricing::PricingContext;

    // statuses and reduced costs all satisfying the KKT sign conditions
    let statuses = vec![
        VarStatus::AtLower,
        VarStatus::AtUpper,
        VarStatus::Free,
        VarStatus::Basic(0),
        VarStatus::Fixed,
    ];
    let d = [0.3, -0.3, 0.0, 0.0, 5.0];
    let mut ctx = PricingContext::new(5, 2).unwrap();

    let mut total = 0;
    for level in 0..ctx.num_levels() {
        total += ctx.candidates_level(level, &statuses, &d, 1e-6);
    }
    assert_eq!(total, 0);
    assert_eq!(ctx.select_weighted(&statuses, &d, 1e-6), None);
    assert_eq!(ctx.select(&statuses, &d, 1e-6), None);
}
