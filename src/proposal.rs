/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Fusion-move proposal strategies.
//!
//! A strategy fills the fusion labeling for the next iteration from the
//! iteration counter, the current labeling and the height table. The two
//! shipped strategies are alpha expansions (every variable is proposed the
//! same label); a custom closure may propose anything.
//!
//! # Invariants
//! - **Range**: proposals are clamped into `[0, num_labels)` after the
//!   strategy runs; out-of-range labels are never rejected.

use alloc::boxed::Box;
use core::fmt;

use crate::dual::HeightTable;
use crate::energy::{Energy, Label};

/// Custom proposal closure: `(iteration, current, proposed)`.
///
/// `proposed` has the same length as `current` and arrives holding the
/// previous proposal.
pub type ProposalCallback = Box<dyn FnMut(usize, &[Label], &mut [Label])>;

// ─── ProposalKind ───────────────────────────────────────────────────────────

/// Configurable subset of the strategies, usable in [`crate::SospdConfig`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProposalKind {
    /// Propose label `iteration mod num_labels` everywhere.
    CyclicAlpha,
    /// Propose the label with the largest total height drop everywhere.
    #[default]
    HeightAlpha,
}

// ─── ProposalStrategy ───────────────────────────────────────────────────────

/// Strategy the solver consults at the start of every iteration.
pub enum ProposalStrategy {
    /// Cyclic alpha expansion.
    CyclicAlpha,
    /// Height-weighted alpha expansion.
    HeightAlpha,
    /// Caller-supplied proposal.
    Custom(ProposalCallback),
}

impl ProposalStrategy {
    /// Number of consecutive no-change iterations after which the strategy
    /// cannot find a better labeling.
    ///
    /// A cyclic sweep needs every label proposed once; the other strategies
    /// are judged after a single idle iteration.
    pub fn patience(&self, num_labels: usize) -> usize {
        match self {
            Self::CyclicAlpha => num_labels.max(1),
            Self::HeightAlpha | Self::Custom(_) => 1,
        }
    }

    /// Write the proposal for `iteration` into `proposed`, clamped into range.
    pub fn propose(
        &mut self,
        iteration: usize,
        heights: &HeightTable,
        current: &[Label],
        proposed: &mut [Label],
    ) {
        let num_labels = heights.num_labels();
        match self {
            Self::CyclicAlpha => proposed.fill(cyclic_alpha(iteration, num_labels)),
            Self::HeightAlpha => proposed.fill(height_alpha(heights, current)),
            Self::Custom(callback) => callback(iteration, current, proposed),
        }
        let top = num_labels.saturating_sub(1);
        for label in proposed.iter_mut() {
            *label = (*label).min(top);
        }
    }

    /// Short name for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CyclicAlpha => "cyclic-alpha",
            Self::HeightAlpha => "height-alpha",
            Self::Custom(_) => "custom",
        }
    }
}

impl Default for ProposalStrategy {
    fn default() -> Self {
        ProposalKind::default().into()
    }
}

impl From<ProposalKind> for ProposalStrategy {
    fn from(kind: ProposalKind) -> Self {
        match kind {
            ProposalKind::CyclicAlpha => Self::CyclicAlpha,
            ProposalKind::HeightAlpha => Self::HeightAlpha,
        }
    }
}

impl fmt::Debug for ProposalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Alpha expansions ───────────────────────────────────────────────────────

/// Label proposed by cyclic alpha expansion at `iteration`.
pub fn cyclic_alpha(iteration: usize, num_labels: usize) -> Label {
    if num_labels == 0 {
        0
    } else {
        iteration % num_labels
    }
}

/// Label with the largest source capacity `Σ_i max(0, h(i, x_i) − h(i, l))`.
///
/// Ties keep the lowest label. Returns 0 when no label has positive capacity.
pub fn height_alpha(heights: &HeightTable, current: &[Label]) -> Label {
    let mut best = 0;
    let mut alpha = 0;
    for l in 0..heights.num_labels() {
        let capacity: Energy = current
            .iter()
            .enumerate()
            .map(|(i, &x)| (heights.get(i, x) - heights.get(i, l)).max(0))
            .sum();
        if capacity > best {
            best = capacity;
            alpha = l;
        }
    }
    alpha
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn heights(rows: &[&[i64]]) -> HeightTable {
        let mut h = HeightTable::new(rows.len(), rows[0].len());
        for (i, row) in rows.iter().enumerate() {
            for (l, &v) in row.iter().enumerate() {
                h.set(i, l, v);
            }
        }
        h
    }

    #[test]
    fn test_cyclic_alpha_wraps() {
        assert_eq!(cyclic_alpha(0, 3), 0);
        assert_eq!(cyclic_alpha(4, 3), 1);
        assert_eq!(cyclic_alpha(7, 1), 0);
    }

    #[test]
    fn test_height_alpha_picks_largest_drop() {
        // label 2 drops var 0 by 5; label 1 drops var 1 by 3
        let h = heights(&[&[6, 6, 1], &[4, 1, 4]]);
        assert_eq!(height_alpha(&h, &[0, 0]), 2);
    }

    #[test]
    fn test_height_alpha_ties_keep_first() {
        let h = heights(&[&[5, 2, 2]]);
        assert_eq!(height_alpha(&h, &[0]), 1);
    }

    #[test]
    fn test_height_alpha_defaults_to_zero() {
        let h = heights(&[&[1, 3, 5], &[2, 2, 9]]);
        assert_eq!(height_alpha(&h, &[0, 1]), 0);
    }

    #[test]
    fn test_custom_proposal_is_clamped() {
        let mut strategy = ProposalStrategy::Custom(Box::new(|iter: usize, current: &[Label], proposed: &mut [Label]| {
            for (p, &c) in proposed.iter_mut().zip(current) {
                *p = c + iter * 10;
            }
        }));
        let h = HeightTable::new(3, 4);
        let mut proposed = vec![0; 3];
        strategy.propose(0, &h, &[0, 2, 3], &mut proposed);
        assert_eq!(proposed, vec![0, 2, 3]);
        strategy.propose(1, &h, &[0, 2, 3], &mut proposed);
        assert_eq!(proposed, vec![3, 3, 3]);
    }

    #[test]
    fn test_patience() {
        assert_eq!(ProposalStrategy::CyclicAlpha.patience(5), 5);
        assert_eq!(ProposalStrategy::HeightAlpha.patience(5), 1);
        assert_eq!(ProposalStrategy::from(ProposalKind::CyclicAlpha).name(), "cyclic-alpha");
        assert_eq!(ProposalStrategy::default().name(), "height-alpha");
    }
}
