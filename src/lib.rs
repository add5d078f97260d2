//! Sparse revised-simplex linear programming core.
//!
//! The crate is organized leaves-first: [`sparse`] holds the CSC/CSR
//! containers and scalar kernels, [`basis`] owns the product-form basis
//! representation (LU factors of the last refactorization plus an eta
//! chain) with FTRAN/BTRAN and pivot updates, [`pricing`] chooses entering
//! variables, and [`simplex`] drives Phase I / Phase II to a terminal
//! status.
//!
//! ```
//! use etalon::{solve_lp, LpProblem, SolverEnv, Status};
//!
//! // min x + 2y  s.t.  x + y <= 10,  0 <= x, y <= 10
//! let mut b = LpProblem::builder(1, 2);
//! b.objective(0, 1.0).unwrap();
//! b.objective(1, 2.0).unwrap();
//! b.coefficient(0, 0, 1.0).unwrap();
//! b.coefficient(0, 1, 1.0).unwrap();
//! b.bounds(0, 0.0, 10.0).unwrap();
//! b.bounds(1, 0.0, 10.0).unwrap();
//! b.row(0, '<', 10.0).unwrap();
//! let problem = b.finalize().unwrap();
//!
//! let env = SolverEnv::default();
//! let solution = solve_lp(&problem, &env).unwrap();
//! assert_eq!(solution.status, Status::Optimal);
//! assert!(solution.objective.abs() < 1e-9);
//! ```

pub mod basis;
pub mod env;
pub mod error;
pub mod model;
pub mod pricing;
pub mod simplex;
pub mod sparse;
pub mod status;

pub use basis::{BasisSnapshot, BasisState, EtaKind, EtaRecord, ValidateFlags};
pub use env::{SolverEnv, INFINITY};
pub use error::SolverError;
pub use model::{LpProblem, LpProblemBuilder, ModelError, RowSense};
pub use pricing::{PricingContext, PricingStrategy};
pub use simplex::{
    solve_lp, solve_lp_with, IterationInfo, PortableBasis, SimplexCallback, Solution,
    SolverContext,
};
pub use status::{IterateStatus, Phase, SolveMode, Status, VarStatus};
