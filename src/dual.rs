/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Dual certificate storage: per-clique λ tables and the per-variable height table.
//!
//! # Layout
//!
//! ```text
//! DualTable:   [ clique 0: k0 × L ][ clique 1: k1 × L ] ...   (one arena, offsets per clique)
//! HeightTable: [ var 0: L ][ var 1: L ] ...
//! ```
//!
//! `λ_C(i, l)` lives at `offsets[C] + i * L + l`.
//!
//! `h(v, l) = unary(v, l) + Σ_{(C, i) ∋ v} λ_C(i, l)` is kept up to date by the
//! solver every time a λ entry touching `(v, l)` changes.

use alloc::vec::Vec;

use crate::energy::{Energy, Label, VarId};

// ─── DualTable ──────────────────────────────────────────────────────────────

/// Arena of per-clique dual variables, indexed by (clique, member, label).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DualTable {
    values: Vec<Energy>,
    offsets: Vec<usize>,
    num_labels: usize,
}

impl DualTable {
    /// Zero-initialised table for cliques of the given sizes.
    pub fn new<I>(clique_sizes: I, num_labels: usize) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        let mut offsets = Vec::new();
        let mut len = 0usize;
        for k in clique_sizes {
            offsets.push(len);
            len += k * num_labels;
        }
        offsets.push(len);
        Self {
            values: alloc::vec![0; len],
            offsets,
            num_labels,
        }
    }

    /// Number of cliques in the table.
    pub fn num_cliques(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// `λ_clique(member, label)`.
    pub fn get(&self, clique: usize, member: usize, label: Label) -> Energy {
        self.values[self.offsets[clique] + member * self.num_labels + label]
    }

    /// Mutable `λ_clique(member, label)`.
    pub fn get_mut(&mut self, clique: usize, member: usize, label: Label) -> &mut Energy {
        &mut self.values[self.offsets[clique] + member * self.num_labels + label]
    }

    /// Flat `k × L` block of one clique.
    pub fn clique(&self, clique: usize) -> &[Energy] {
        &self.values[self.offsets[clique]..self.offsets[clique + 1]]
    }

    #[cfg_attr(not(feature = "serde"), allow(dead_code))]
    pub(crate) fn clique_mut(&mut self, clique: usize) -> &mut [Energy] {
        let (start, end) = (self.offsets[clique], self.offsets[clique + 1]);
        &mut self.values[start..end]
    }

    /// Smallest dual value in the table, `None` when empty.
    pub fn min_value(&self) -> Option<Energy> {
        self.values.iter().copied().min()
    }
}

// ─── HeightTable ────────────────────────────────────────────────────────────

/// Per-(variable, label) heights.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeightTable {
    values: Vec<Energy>,
    num_labels: usize,
}

impl HeightTable {
    /// Zero table for `num_vars × num_labels`.
    pub fn new(num_vars: usize, num_labels: usize) -> Self {
        Self {
            values: alloc::vec![0; num_vars * num_labels],
            num_labels,
        }
    }

    /// `h(var, label)`.
    pub fn get(&self, var: VarId, label: Label) -> Energy {
        self.values[var * self.num_labels + label]
    }

    /// Add `delta` to `h(var, label)`.
    pub fn add(&mut self, var: VarId, label: Label, delta: Energy) {
        self.values[var * self.num_labels + label] += delta;
    }

    /// Overwrite `h(var, label)`.
    pub fn set(&mut self, var: VarId, label: Label, value: Energy) {
        self.values[var * self.num_labels + label] = value;
    }

    /// All heights of one variable.
    pub fn row(&self, var: VarId) -> &[Energy] {
        &self.values[var * self.num_labels..(var + 1) * self.num_labels]
    }

    /// Number of variables covered.
    pub fn num_vars(&self) -> usize {
        if self.num_labels == 0 {
            0
        } else {
            self.values.len() / self.num_labels
        }
    }

    /// Number of labels per variable.
    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    #[cfg_attr(not(feature = "serde"), allow(dead_code))]
    pub(crate) fn as_slice(&self) -> &[Energy] {
        &self.values
    }

    #[cfg_attr(not(feature = "serde"), allow(dead_code))]
    pub(crate) fn as_mut_slice(&mut self) -> &mut [Energy] {
        &mut self.values
    }
}

// ─── EvenSplit ──────────────────────────────────────────────────────────────

/// Exact integer split of `total` into `parts` shares.
///
/// Shares are `avg + 1` for the first `remainder` members and `avg` for the rest,
/// so they always sum to `total`. Negative totals use floor division: a negative
/// truncated remainder wraps to `remainder + parts` with `avg - 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvenSplit {
    /// Base share of every member.
    pub avg: Energy,
    /// Number of leading members receiving one extra unit, `0 <= remainder < parts`.
    pub remainder: Energy,
}

impl EvenSplit {
    /// Split `total` over `parts` members. `parts` must be positive.
    pub fn new(total: Energy, parts: usize) -> Self {
        let k = parts as Energy;
        let mut avg = total / k;
        let mut remainder = total % k;
        if remainder < 0 {
            avg -= 1;
            remainder += k;
        }
        Self { avg, remainder }
    }

    /// Share of the member at local position `i`.
    pub fn share(&self, i: usize) -> Energy {
        if (i as Energy) < self.remainder {
            self.avg + 1
        } else {
            self.avg
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sums_exactly() {
        for total in -200..=200 {
            for parts in 1..=9usize {
                let split = EvenSplit::new(total, parts);
                let sum: Energy = (0..parts).map(|i| split.share(i)).sum();
                assert_eq!(sum, total, "total {} parts {}", total, parts);
                assert!(split.remainder >= 0 && split.remainder < parts as Energy);
            }
        }
    }

    #[test]
    fn test_split_non_negative_matches_avg_remainder() {
        let split = EvenSplit::new(11, 3);
        assert_eq!(split, EvenSplit { avg: 3, remainder: 2 });
        assert_eq!([split.share(0), split.share(1), split.share(2)], [4, 4, 3]);
    }

    #[test]
    fn test_split_negative_wraps_remainder() {
        // -7 / 3 truncates to -2 rem -1; wrapped to avg -3 rem 2
        let split = EvenSplit::new(-7, 3);
        assert_eq!(split, EvenSplit { avg: -3, remainder: 2 });
        assert_eq!([split.share(0), split.share(1), split.share(2)], [-2, -2, -3]);
    }

    #[test]
    fn test_dual_table_layout() {
        let mut d = DualTable::new([2usize, 3], 4);
        assert_eq!(d.num_cliques(), 2);
        assert_eq!(d.clique(0).len(), 8);
        assert_eq!(d.clique(1).len(), 12);
        *d.get_mut(1, 2, 3) = 9;
        assert_eq!(d.get(1, 2, 3), 9);
        assert_eq!(d.clique(1)[2 * 4 + 3], 9);
        assert_eq!(d.get(0, 1, 3), 0);
        assert_eq!(d.min_value(), Some(0));
    }

    #[test]
    fn test_height_table_rows() {
        let mut h = HeightTable::new(3, 2);
        h.add(1, 1, 5);
        h.add(1, 1, -2);
        h.set(2, 0, 7);
        assert_eq!(h.get(1, 1), 3);
        assert_eq!(h.row(2), &[7, 0]);
        assert_eq!(h.num_vars(), 3);
    }
}
