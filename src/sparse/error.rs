use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CscError {
    #[error("column pointer array has length {actual}, expected {expected}")]
    ColumnPointersLength { expected: usize, actual: usize },

    #[error("column pointer {index} is {actual}, expected {expected}")]
    ColumnPointer {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("row index {index} out of range (nrows = {max})")]
    RowIndexOutOfRange { index: usize, max: usize },

    #[error("column {col}: row indices not strictly increasing ({prev} then {next})")]
    RowsNotIncreasing { col: usize, prev: usize, next: usize },

    #[error("row index array has {row_indices} entries but values has {values}")]
    IndexValueLengthMismatch { row_indices: usize, values: usize },

    #[error("entry ({row}, {col}) out of bounds for a {nrows}x{ncols} matrix")]
    EntryOutOfBounds {
        row: usize,
        col: usize,
        nrows: usize,
        ncols: usize,
    },

    #[error("entry ({row}, {col}) is not finite")]
    NonFiniteEntry { row: usize, col: usize },
}

#[derive(Debug, Error, PartialEq)]
pub enum CsrError {
    #[error("row pointer array has length {actual}, expected {expected}")]
    RowPointersLength { expected: usize, actual: usize },

    #[error("row pointer {index} is {actual}, expected {expected}")]
    RowPointer {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("column index {index} out of range (ncols = {max})")]
    ColumnIndexOutOfRange { index: usize, max: usize },

    #[error("row view was invalidated by a matrix mutation")]
    Invalidated,
}
