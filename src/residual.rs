/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Residual fusion tables for one clique.
//!
//! For a clique of size `k` the fusion table has `2^k` entries indexed by a
//! bitmask over members: bit `i` set means member `i` takes its fused label,
//! clear means it keeps its current label.
//!
//! Masks are visited in reflected Gray-code order (`g = a ^ (a >> 1)`), so
//! consecutive masks differ in exactly one bit. The label tuple is patched in
//! place for that one member instead of being rebuilt, and the clique energy
//! is evaluated exactly `2^k` times.
//!
//! The residual handed to the flow oracle is
//!
//! ```text
//! r(S) = g(S) − Σ_{i∈S} λ(i, fused_i) − Σ_{i∉S} λ(i, current_i)
//! ```
//!
//! which is zero at `S = ∅` whenever the dual is tight.

use crate::energy::{Clique, Energy, Label, LabelBuf};

/// Index of the member flipped between Gray codes of `a - 1` and `a`, plus the new code.
fn gray_step(a: usize) -> (usize, usize) {
    let gray = a ^ (a >> 1);
    let prev = (a - 1) ^ ((a - 1) >> 1);
    let diff = gray ^ prev;
    (diff.trailing_zeros() as usize, gray)
}

/// Fill `table` with the clique energy of every fusion assignment.
///
/// `current`, `fused` hold the member labels in clique order and
/// `table.len() == 1 << clique.size()`.
pub fn fill_fusion_table<C>(clique: &C, current: &[Label], fused: &[Label], table: &mut [Energy])
where
    C: Clique + ?Sized,
{
    let k = current.len();
    let mut buf = LabelBuf::new();
    for &l in current.iter().take(buf.capacity()) {
        let _ = buf.push(l);
    }
    table[0] = clique.energy(&buf);
    for a in 1..(1usize << k) {
        let (idx, gray) = gray_step(a);
        buf[idx] = if gray & (1 << idx) != 0 { fused[idx] } else { current[idx] };
        table[gray] = clique.energy(&buf);
    }
}

/// Subtract the linear dual term from every entry of `table`.
///
/// Entry `S` loses `fused_lambda[i]` for members in `S` and
/// `current_lambda[i]` for the others. Walked in Gray-code order with a
/// running sum, one addition per mask.
pub fn subtract_linear(table: &mut [Energy], fused_lambda: &[Energy], current_lambda: &[Energy]) {
    let k = current_lambda.len();
    let mut linear: Energy = current_lambda.iter().sum();
    table[0] -= linear;
    for a in 1..(1usize << k) {
        let (idx, gray) = gray_step(a);
        if gray & (1 << idx) != 0 {
            linear += fused_lambda[idx] - current_lambda[idx];
        } else {
            linear += current_lambda[idx] - fused_lambda[idx];
        }
        table[gray] -= linear;
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::energy::{FnClique, PottsClique, VarId};
    use alloc::vec;
    use alloc::vec::Vec;

    /// Direct evaluation of every mask, no Gray-code reuse.
    fn brute_force_table<C: Clique + ?Sized>(clique: &C, current: &[Label], fused: &[Label]) -> Vec<Energy> {
        let k = current.len();
        (0..(1usize << k))
            .map(|mask| {
                let labels: Vec<Label> = (0..k)
                    .map(|i| if mask & (1 << i) != 0 { fused[i] } else { current[i] })
                    .collect();
                clique.energy(&labels)
            })
            .collect()
    }

    fn weighted_clique(k: usize) -> FnClique<impl Fn(&[Label]) -> Energy> {
        let nodes: Vec<VarId> = (0..k).collect();
        FnClique::new(nodes, |labels: &[Label]| {
            labels
                .iter()
                .enumerate()
                .map(|(i, &l)| ((i + 1) * (l + 1) * (l + 2)) as Energy)
                .sum::<Energy>()
                + labels.windows(2).filter(|w| w[0] != w[1]).count() as Energy * 3
        })
    }

    #[test]
    fn test_gray_table_matches_brute_force() {
        for k in 1..=7usize {
            let clique = weighted_clique(k);
            let current: Vec<Label> = (0..k).map(|i| i % 3).collect();
            let fused: Vec<Label> = (0..k).map(|i| (i * 2 + 1) % 4).collect();
            let mut table = vec![0; 1 << k];
            fill_fusion_table(&clique, &current, &fused, &mut table);
            assert_eq!(table, brute_force_table(&clique, &current, &fused), "k = {}", k);
        }
    }

    #[test]
    fn test_gray_table_evaluates_once_per_mask() {
        use core::cell::Cell;
        let calls = Cell::new(0usize);
        let clique = FnClique::new(vec![0, 1, 2, 3, 4], |_: &[Label]| {
            calls.set(calls.get() + 1);
            0
        });
        let mut table = vec![0; 32];
        fill_fusion_table(&clique, &[0; 5], &[1; 5], &mut table);
        assert_eq!(calls.get(), 32);
    }

    #[test]
    fn test_potts_fusion_table() {
        let clique = PottsClique::new(vec![0, 1, 2], 4);
        let mut table = vec![0; 8];
        fill_fusion_table(&clique, &[0, 0, 1], &[1, 1, 1], &mut table);
        // only all-fused (0b111) and members 0,1 fused (0b011) agree
        assert_eq!(table, vec![4, 4, 4, 0, 4, 4, 4, 0]);
    }

    #[test]
    fn test_subtract_linear_matches_direct_sum() {
        let k = 4usize;
        let fused_lambda = [3, -1, 4, 2];
        let current_lambda = [1, 5, -2, 0];
        let mut table: Vec<Energy> = (0..(1 << k)).map(|m| (m * 7 % 11) as Energy).collect();
        let before = table.clone();
        subtract_linear(&mut table, &fused_lambda, &current_lambda);
        for mask in 0..(1usize << k) {
            let linear: Energy = (0..k)
                .map(|i| if mask & (1 << i) != 0 { fused_lambda[i] } else { current_lambda[i] })
                .sum();
            assert_eq!(table[mask], before[mask] - linear, "mask {:#b}", mask);
        }
    }
}
