//! Eta records and their backing arena.
//!
//! The basis inverse is layered as a product of elementary (eta) matrices on
//! top of the last refactorization. Records are immutable once published:
//! construction writes into the arena, then a single prepend onto the chain
//! makes the record visible. Records are keyed by `u32` arena indices and
//! laid out contiguously in creation order, so chronological traversal is
//! sequential memory access even though the chain itself links newest-first.

use crate::status::VarStatus;

/// Record type tags: refactorization/bound-fix records and pivot updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EtaKind {
    Refactor = 1,
    Pivot = 2,
}

/// One elementary transformation. The row portion holds the nonzeros of the
/// transformed entering column except the pivot entry itself; `pivot_value`
/// is raw (unscaled). Pivot records additionally carry the entering
/// variable's original sparse column and the leaving row.
#[derive(Debug, Clone, PartialEq)]
pub struct EtaRecord {
    pub kind: EtaKind,
    pub pivot_row: usize,
    pub pivot_var: usize,
    pub pivot_value: f64,
    /// Status of the affected variable after the update.
    pub var_status: VarStatus,
    /// Objective coefficient of the affected variable at update time.
    pub obj_coef: f64,
    pub nnz: u32,
    chunk: u32,
    offset: u32,
    pub col_nnz: u32,
    col_chunk: u32,
    col_offset: u32,
    pub leaving_row: Option<usize>,
    /// Next-oldest record in the chain.
    pub next: Option<u32>,
}

impl EtaRecord {
    /// A record whose application is the identity (empty row portion and
    /// unit pivot); emitted by refactorization for bound-fixed variables.
    pub fn is_identity(&self) -> bool {
        self.nnz == 0 && self.pivot_value == 1.0
    }
}

#[derive(Debug)]
struct Chunk {
    idx: Vec<u32>,
    val: Vec<f64>,
    cap: usize,
}

impl Chunk {
    fn with_cap(cap: usize) -> Self {
        Self {
            idx: Vec::with_capacity(cap),
            val: Vec::with_capacity(cap),
            cap,
        }
    }

    fn used(&self) -> usize {
        self.idx.len()
    }
}

/// Entries in the first chunk.
const INITIAL_CHUNK: usize = 256;
/// Cap on the doubling chunk-size progression.
const MAX_CHUNK: usize = 1 << 16;

/// Bump-style chunked arena holding every eta record and the chain head.
///
/// The fast path of an allocation is a length check on the active chunk.
/// When the active chunk cannot fit a request, the next chunk doubles in
/// size (capped), and an oversized request gets a chunk of exactly its own
/// size. `reset` rewinds to the first chunk and retains all chunks for
/// reuse; `free` releases them.
#[derive(Debug)]
pub struct EtaStore {
    chunks: Vec<Chunk>,
    active: usize,
    records: Vec<EtaRecord>,
    head: Option<u32>,
}

impl Default for EtaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EtaStore {
    pub fn new() -> Self {
        Self {
            chunks: vec![Chunk::with_cap(INITIAL_CHUNK)],
            active: 0,
            records: Vec::new(),
            head: None,
        }
    }

    pub fn head(&self) -> Option<u32> {
        self.head
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, id: u32) -> &EtaRecord {
        &self.records[id as usize]
    }

    /// Records in creation order (oldest first) — the FTRAN order.
    pub fn iter_oldest_first(&self) -> impl Iterator<Item = &EtaRecord> {
        self.records.iter()
    }

    /// Records newest first — the BTRAN order, equal to walking the chain.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &EtaRecord> {
        self.records.iter().rev()
    }

    /// Total entries currently allocated across the chunk list.
    pub fn entries_in_use(&self) -> usize {
        self.chunks.iter().map(Chunk::used).sum()
    }

    /// Move `active` to a chunk that can take `n` more entries.
    fn reserve_block(&mut self, n: usize) {
        if self.chunks.is_empty() {
            self.chunks.push(Chunk::with_cap(INITIAL_CHUNK.max(n)));
            self.active = 0;
        }
        if self.chunks[self.active].used() + n <= self.chunks[self.active].cap {
            return;
        }
        let mut next = self.active + 1;
        while next < self.chunks.len() {
            if self.chunks[next].used() + n <= self.chunks[next].cap {
                self.active = next;
                return;
            }
            next += 1;
        }
        let mut cap = (self.chunks[self.chunks.len() - 1].cap * 2).min(MAX_CHUNK);
        if n > cap {
            cap = n;
        }
        self.chunks.push(Chunk::with_cap(cap));
        self.active = self.chunks.len() - 1;
    }

    /// Append a sparse block to the arena; returns (chunk, offset).
    fn push_block(&mut self, rows: &[usize], vals: &[f64]) -> (u32, u32) {
        debug_assert_eq!(rows.len(), vals.len());
        self.reserve_block(rows.len());
        let chunk = &mut self.chunks[self.active];
        let offset = chunk.used() as u32;
        for (&r, &v) in rows.iter().zip(vals.iter()) {
            chunk.idx.push(r as u32);
            chunk.val.push(v);
        }
        (self.active as u32, offset)
    }

    /// Construct and publish a record. The prepend onto the chain is the
    /// single step that makes it visible.
    #[allow(clippy::too_many_arguments)]
    pub fn push_record(
        &mut self,
        kind: EtaKind,
        pivot_row: usize,
        pivot_var: usize,
        pivot_value: f64,
        var_status: VarStatus,
        obj_coef: f64,
        leaving_row: Option<usize>,
        rows: &[usize],
        row_vals: &[f64],
        col_rows: &[usize],
        col_vals: &[f64],
    ) -> u32 {
        let (chunk, offset) = self.push_block(rows, row_vals);
        let (col_chunk, col_offset) = self.push_block(col_rows, col_vals);
        let id = self.records.len() as u32;
        self.records.push(EtaRecord {
            kind,
            pivot_row,
            pivot_var,
            pivot_value,
            var_status,
            obj_coef,
            nnz: rows.len() as u32,
            chunk,
            offset,
            col_nnz: col_rows.len() as u32,
            col_chunk,
            col_offset,
            leaving_row,
            next: self.head,
        });
        self.head = Some(id);
        id
    }

    /// Row portion of a record as parallel slices.
    pub fn row_portion(&self, rec: &EtaRecord) -> (&[u32], &[f64]) {
        let chunk = &self.chunks[rec.chunk as usize];
        let (s, e) = (rec.offset as usize, rec.offset as usize + rec.nnz as usize);
        (&chunk.idx[s..e], &chunk.val[s..e])
    }

    /// Column portion (the entering variable's original sparse column).
    pub fn col_portion(&self, rec: &EtaRecord) -> (&[u32], &[f64]) {
        let chunk = &self.chunks[rec.col_chunk as usize];
        let (s, e) = (
            rec.col_offset as usize,
            rec.col_offset as usize + rec.col_nnz as usize,
        );
        (&chunk.idx[s..e], &chunk.val[s..e])
    }

    /// Apply the elementary transformation to a column vector in place:
    /// scale the pivot entry by 1/pivot_value, then subtract the scaled
    /// row portion.
    pub fn apply(&self, rec: &EtaRecord, x: &mut [f64]) {
        if rec.is_identity() {
            return;
        }
        let t = x[rec.pivot_row] / rec.pivot_value;
        x[rec.pivot_row] = t;
        if t == 0.0 {
            return;
        }
        let (idx, val) = self.row_portion(rec);
        for (&i, &v) in idx.iter().zip(val.iter()) {
            x[i as usize] -= v * t;
        }
    }

    /// Apply the transposed transformation to a row vector in place; only
    /// the pivot component changes.
    pub fn apply_transpose(&self, rec: &EtaRecord, y: &mut [f64]) {
        if rec.is_identity() {
            return;
        }
        let (idx, val) = self.row_portion(rec);
        let mut acc = y[rec.pivot_row];
        for (&i, &v) in idx.iter().zip(val.iter()) {
            acc -= v * y[i as usize];
        }
        y[rec.pivot_row] = acc / rec.pivot_value;
    }

    /// Rewind the arena to empty, retaining every chunk for reuse.
    pub fn reset(&mut self) {
        for chunk in &mut self.chunks {
            chunk.idx.clear();
            chunk.val.clear();
        }
        self.active = 0;
        self.records.clear();
        self.head = None;
    }

    /// Release every chunk.
    pub fn free(&mut self) {
        self.chunks.clear();
        self.active = 0;
        self.records.clear();
        self.head = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_simple(store: &mut EtaStore, row: usize, pivot: f64, rows: &[usize], vals: &[f64]) -> u32 {
        store.push_record(
            EtaKind::Pivot,
            row,
            7,
            pivot,
            VarStatus::Basic(row),
            0.0,
            Some(row),
            rows,
            vals,
            &[],
            &[],
        )
    }

    #[test]
    fn chain_links_newest_first() {
        let mut store = EtaStore::new();
        let a = push_simple(&mut store, 0, 2.0, &[], &[]);
        let b = push_simple(&mut store, 1, 4.0, &[0], &[1.0]);
        assert_eq!(store.head(), Some(b));
        assert_eq!(store.record(b).next, Some(a));
        assert_eq!(store.record(a).next, None);

        let order: Vec<f64> = store.iter_oldest_first().map(|r| r.pivot_value).collect();
        assert_eq!(order, vec![2.0, 4.0]);
    }

    #[test]
    fn apply_and_transpose_agree_with_dense() {
        // E from alpha = [3, 6] pivoting in row 0: E*x divides x[0] by 3 and
        // subtracts 6*t from x[1].
        let mut store = EtaStore::new();
        let id = push_simple(&mut store, 0, 3.0, &[1], &[6.0]);
        let rec = store.record(id);

        let mut x = [9.0, 1.0];
        store.apply(rec, &mut x);
        assert_eq!(x, [3.0, 1.0 - 18.0]);

        // transpose on e_1 only changes the pivot component
        let mut y = [0.0, 1.0];
        store.apply_transpose(rec, &mut y);
        assert_eq!(y, [(0.0 - 6.0) / 3.0, 1.0]);
    }

    #[test]
    fn identity_records_are_noops() {
        let mut store = EtaStore::new();
        let id = store.push_record(
            EtaKind::Refactor,
            2,
            5,
            1.0,
            VarStatus::Fixed,
            0.0,
            None,
            &[],
            &[],
            &[],
            &[],
        );
        let rec = store.record(id);
        assert!(rec.is_identity());
        let mut x = [1.0, 2.0, 3.0];
        store.apply(rec, &mut x);
        assert_eq!(x, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn reset_retains_chunks() {
        let mut store = EtaStore::new();
        // overflow the first chunk so a second gets allocated
        let rows: Vec<usize> = (0..400).collect();
        let vals = vec![1.0; 400];
        push_simple(&mut store, 0, 1.5, &rows, &vals);
        let chunks_before = store.chunks.len();
        assert!(chunks_before >= 2);

        store.reset();
        assert_eq!(store.len(), 0);
        assert_eq!(store.head(), None);
        assert_eq!(store.entries_in_use(), 0);
        assert_eq!(store.chunks.len(), chunks_before);

        store.free();
        assert!(store.chunks.is_empty());
        // arena re-initializes lazily after free
        push_simple(&mut store, 0, 2.0, &[1], &[1.0]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn oversized_request_gets_exact_chunk() {
        let mut store = EtaStore::new();
        let rows: Vec<usize> = (0..(MAX_CHUNK + 10)).collect();
        let vals = vec![1.0; MAX_CHUNK + 10];
        push_simple(&mut store, 0, 1.0, &rows, &vals);
        assert!(store.chunks.iter().any(|c| c.cap == MAX_CHUNK + 10));
    }
}
