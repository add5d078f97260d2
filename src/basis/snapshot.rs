//! Captured basis states for warm starts and regression comparison.

use super::lu::LuFactors;

/// Copy of `{header, status, iteration, dimensions}`, optionally with the
/// LU factors of the moment of capture. The `valid` flag is set on creation
/// and cleared by `invalidate`; an invalidated snapshot compares unequal to
/// everything and cannot seed a warm start.
#[derive(Debug, Clone)]
pub struct BasisSnapshot {
    pub m: usize,
    pub n: usize,
    pub iteration: usize,
    pub header: Vec<usize>,
    /// Portable status codes, one per variable.
    pub status_codes: Vec<i32>,
    pub factors: Option<LuFactors>,
    pub valid: bool,
}

impl BasisSnapshot {
    /// Count of differing header and status positions, or None when the
    /// dimensions do not match (the portable API maps None to -1).
    pub fn diff(&self, other: &BasisSnapshot) -> Option<usize> {
        if !self.valid || !other.valid {
            return None;
        }
        if self.m != other.m || self.n != other.n {
            return None;
        }
        let header_diff = self
            .header
            .iter()
            .zip(other.header.iter())
            .filter(|(a, b)| a != b)
            .count();
        let status_diff = self
            .status_codes
            .iter()
            .zip(other.status_codes.iter())
            .filter(|(a, b)| a != b)
            .count();
        Some(header_diff + status_diff)
    }

    pub fn equal(&self, other: &BasisSnapshot) -> bool {
        self.diff(other) == Some(0)
    }

    /// Portable form of [`diff`](Self::diff): the count, or -1 on a
    /// dimension mismatch or invalidated snapshot.
    pub fn diff_code(&self, other: &BasisSnapshot) -> i64 {
        match self.diff(other) {
            Some(count) => count as i64,
            None => -1,
        }
    }

    /// Release the captured buffers and clear the valid flag. Safe to call
    /// repeatedly.
    pub fn invalidate(&mut self) {
        self.header = Vec::new();
        self.status_codes = Vec::new();
        self.factors = None;
        self.valid = false;
    }
}
