//! Scalar numeric kernels shared by every upper layer: CSC mat-vec,
//! dense and sparse dot products, vector norms, and index sorts.

use crate::sparse::csc::CscMatrix;

/// `y <- A x` (or `y <- y + A x` when `accumulate`), column-wise over the
/// CSC storage. Columns whose `x` entry is exactly zero are skipped.
pub fn spmv_csc(a: &CscMatrix, x: &[f64], y: &mut [f64], accumulate: bool) {
    debug_assert_eq!(x.len(), a.dim.ncols);
    debug_assert_eq!(y.len(), a.dim.nrows);

    if !accumulate {
        y.fill(0.0);
    }
    for j in 0..a.dim.ncols {
        let xj = x[j];
        if xj == 0.0 {
            continue;
        }
        let (rows, vals) = a.col(j);
        for (&i, &v) in rows.iter().zip(vals.iter()) {
            y[i] += v * xj;
        }
    }
}

/// Plain dense dot product; length zero returns 0.
pub fn dot(x: &[f64], y: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), y.len());
    x.iter().zip(y.iter()).map(|(a, b)| a * b).sum()
}

/// Dot of a sparse vector `(indices, values)` against a dense `y`.
/// Indices need not be sorted; duplicates are not expected.
pub fn sparse_dot(indices: &[usize], values: &[f64], y: &[f64]) -> f64 {
    debug_assert_eq!(indices.len(), values.len());
    indices
        .iter()
        .zip(values.iter())
        .map(|(&i, &v)| v * y[i])
        .sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormKind {
    Inf,
    One,
    Two,
}

impl NormKind {
    /// Portable norm type codes: 0 = Linf, 1 = L1, 2 = L2.
    pub fn from_code(code: i32) -> Option<NormKind> {
        match code {
            0 => Some(NormKind::Inf),
            1 => Some(NormKind::One),
            2 => Some(NormKind::Two),
            _ => None,
        }
    }
}

/// Vector norm. The L2 path uses a scaled accumulator so very large
/// entries do not overflow the running sum of squares.
pub fn norm(x: &[f64], kind: NormKind) -> f64 {
    match kind {
        NormKind::Inf => x.iter().map(|v| v.abs()).fold(0.0, f64::max),
        NormKind::One => x.iter().map(|v| v.abs()).sum(),
        NormKind::Two => {
            let mut scale = 0.0_f64;
            let mut ssq = 1.0_f64;
            for &v in x {
                if v == 0.0 {
                    continue;
                }
                let a = v.abs();
                if scale < a {
                    ssq = 1.0 + ssq * (scale / a) * (scale / a);
                    scale = a;
                } else {
                    ssq += (a / scale) * (a / scale);
                }
            }
            scale * ssq.sqrt()
        }
    }
}

/// Below this length the sorts fall back to insertion sort.
const SMALL_SORT: usize = 16;

/// Sort an index slice ascending in place.
pub fn sort_indices(idx: &mut [usize]) {
    if idx.len() <= SMALL_SORT {
        insertion_indices(idx);
    } else {
        quicksort_indices(idx);
    }
}

fn insertion_indices(idx: &mut [usize]) {
    for i in 1..idx.len() {
        let key = idx[i];
        let mut j = i;
        while j > 0 && idx[j - 1] > key {
            idx[j] = idx[j - 1];
            j -= 1;
        }
        idx[j] = key;
    }
}

fn quicksort_indices(idx: &mut [usize]) {
    if idx.len() <= SMALL_SORT {
        insertion_indices(idx);
        return;
    }
    let n = idx.len();
    // middle element as pivot, parked at the end for the partition scan
    idx.swap(n / 2, n - 1);
    let pivot = idx[n - 1];
    let mut store = 0;
    for i in 0..n - 1 {
        if idx[i] < pivot {
            idx.swap(i, store);
            store += 1;
        }
    }
    idx.swap(store, n - 1);
    let (left, right) = idx.split_at_mut(store);
    quicksort_indices(left);
    quicksort_indices(&mut right[1..]);
}

/// Sort parallel `(index, value)` arrays ascending by index in place.
/// Stability is not required.
pub fn sort_pairs(idx: &mut [usize], val: &mut [f64]) {
    debug_assert_eq!(idx.len(), val.len());
    if idx.len() <= SMALL_SORT {
        insertion_pairs(idx, val);
    } else {
        quicksort_pairs(idx, val);
    }
}

fn insertion_pairs(idx: &mut [usize], val: &mut [f64]) {
    for i in 1..idx.len() {
        let (ki, kv) = (idx[i], val[i]);
        let mut j = i;
        while j > 0 && idx[j - 1] > ki {
            idx[j] = idx[j - 1];
            val[j] = val[j - 1];
            j -= 1;
        }
        idx[j] = ki;
        val[j] = kv;
    }
}

fn quicksort_pairs(idx: &mut [usize], val: &mut [f64]) {
    if idx.len() <= SMALL_SORT {
        insertion_pairs(idx, val);
        return;
    }
    let n = idx.len();
    idx.swap(n / 2, n - 1);
    val.swap(n / 2, n - 1);
    let pivot = idx[n - 1];
    let mut store = 0;
    for i in 0..n - 1 {
        if idx[i] < pivot {
            idx.swap(i, store);
            val.swap(i, store);
            store += 1;
        }
    }
    idx.swap(store, n - 1);
    val.swap(store, n - 1);
    let (li, ri) = idx.split_at_mut(store);
    let (lv, rv) = val.split_at_mut(store);
    quicksort_pairs(li, lv);
    quicksort_pairs(&mut ri[1..], &mut rv[1..]);
}
