use serde::{Deserialize, Serialize};

/// Terminal and API-level status codes.
///
/// The numeric values are part of the portable surface and must stay stable;
/// callers that bridge to other languages compare against `code()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum Status {
    Ok = 0,
    Optimal = 2,
    Infeasible = 3,
    Unbounded = 5,
    IterationLimit = 7,
    Numerical = 12,
    NullArgument = 10001,
    InvalidArgument = 10002,
    NotSupported = 10003,
}

impl Status {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// True for statuses that end a solve (everything except `Ok`).
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::Ok)
    }
}

/// Per-iteration token returned by the iteration functions.
///
/// This is a separate token space from [`Status`]; the driver maps it to a
/// terminal status at the end of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum IterateStatus {
    Continue = 0,
    Optimal = 1,
    Infeasible = 2,
    Unbounded = 3,
    Error = 12,
}

/// Status of a single variable, with the portable wire encoding:
/// `k >= 0` basic in row k, `-1` at lower, `-2` at upper, `-3` free,
/// `-4` fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarStatus {
    Basic(usize),
    AtLower,
    AtUpper,
    Free,
    Fixed,
}

impl VarStatus {
    pub fn to_code(self) -> i32 {
        match self {
            VarStatus::Basic(row) => row as i32,
            VarStatus::AtLower => -1,
            VarStatus::AtUpper => -2,
            VarStatus::Free => -3,
            VarStatus::Fixed => -4,
        }
    }

    pub fn from_code(code: i32) -> Option<VarStatus> {
        match code {
            -1 => Some(VarStatus::AtLower),
            -2 => Some(VarStatus::AtUpper),
            -3 => Some(VarStatus::Free),
            -4 => Some(VarStatus::Fixed),
            row if row >= 0 => Some(VarStatus::Basic(row as usize)),
            _ => None,
        }
    }

    pub fn is_basic(self) -> bool {
        matches!(self, VarStatus::Basic(_))
    }

    pub fn basic_row(self) -> Option<usize> {
        match self {
            VarStatus::Basic(row) => Some(row),
            _ => None,
        }
    }
}

/// Solve algorithm selector. Barrier is reserved; auto resolves to primal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum SolveMode {
    Primal = 0,
    Dual = 1,
    Barrier = 2,
    Auto = 3,
}

impl SolveMode {
    pub fn from_code(code: i32) -> Option<SolveMode> {
        match code {
            0 => Some(SolveMode::Primal),
            1 => Some(SolveMode::Dual),
            2 => Some(SolveMode::Barrier),
            3 => Some(SolveMode::Auto),
            _ => None,
        }
    }
}

/// Solver phase: 0 during setup, then Phase I (feasibility) and
/// Phase II (optimality).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Phase {
    Setup = 0,
    PhaseOne = 1,
    PhaseTwo = 2,
}
