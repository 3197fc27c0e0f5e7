/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Portable snapshot of a solver's primal and dual state.
//!
//! A snapshot captures everything the outer loop needs to resume: the
//! labeling, the per-clique dual tables, the heights, the iteration counter
//! and the convergence streak. The energy model and the flow oracle are not
//! stored; a snapshot is restored into a solver built over the same model.
//!
//! # Layout
//!
//! ```text
//! version            u16 = 1
//! iteration          u64
//! unchanged_streak   u64
//! state              SolverState
//! num_labels         u64
//! labels             [Label; num_vars]
//! dual               [[Energy; k_c × num_labels]; num_cliques]
//! heights            [Energy; num_vars × num_labels]
//! ```
//!
//! # no_std
//!
//! This module requires the `serde` feature and only uses `alloc`.

use alloc::vec::Vec;

use crate::energy::{Energy, EnergyModel, Label};
use crate::error::{SospdError, SospdResult};
use crate::flow::SubmodularFlow;
use crate::sospd::{gather_labels, SolverState, Sospd};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u16 = 1;

/// Serializable solver state.
///
/// # Example
///
/// ```rust,ignore
/// use sospd_core::snapshot::SospdSnapshot;
///
/// let snapshot = SospdSnapshot::from_solver(&solver);
/// let json = serde_json::to_string(&snapshot).unwrap();
/// let restored: SospdSnapshot = serde_json::from_str(&json).unwrap();
/// other_solver.restore(&restored)?;
/// ```
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SospdSnapshot {
    /// Format version, [`SNAPSHOT_VERSION`] for new snapshots.
    pub version: u16,
    /// Completed iterations.
    pub iteration: u64,
    /// Consecutive iterations without a label change.
    pub unchanged_streak: u64,
    /// Solver state at capture time.
    pub state: SolverState,
    /// Number of labels of the model.
    pub num_labels: u64,
    /// Current labeling, one entry per variable.
    pub labels: Vec<Label>,
    /// Dual table of every clique, member-major (`member * num_labels + label`).
    pub dual: Vec<Vec<Energy>>,
    /// Heights, variable-major (`var * num_labels + label`).
    pub heights: Vec<Energy>,
}

impl SospdSnapshot {
    /// Capture the state of `solver`.
    pub fn from_solver<E, F>(solver: &Sospd<'_, E, F>) -> Self
    where
        E: EnergyModel + ?Sized,
        F: SubmodularFlow,
    {
        Self {
            version: SNAPSHOT_VERSION,
            iteration: solver.iteration as u64,
            unchanged_streak: solver.unchanged_streak as u64,
            state: solver.state,
            num_labels: solver.num_labels as u64,
            labels: solver.labels.clone(),
            dual: (0..solver.dual.num_cliques())
                .map(|c| solver.dual.clique(c).to_vec())
                .collect(),
            heights: solver.heights.as_slice().to_vec(),
        }
    }

    /// Number of variables covered.
    pub fn num_vars(&self) -> usize {
        self.labels.len()
    }
}

impl<'e, E, F> Sospd<'e, E, F>
where
    E: EnergyModel + ?Sized,
    F: SubmodularFlow,
{
    /// Replace the solver state with `snapshot`.
    ///
    /// Every dimension is checked against the energy model, and the snapshot
    /// must carry a tight dual with consistent heights. The labeling, dual and
    /// counters are left untouched when a check fails.
    pub fn restore(&mut self, snapshot: &SospdSnapshot) -> SospdResult<()> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SospdError::SnapshotMismatch("unsupported snapshot version"));
        }
        if snapshot.state == SolverState::Uninitialized {
            return Err(SospdError::SnapshotMismatch("snapshot of an uninitialised solver"));
        }
        let energy = self.energy;
        let num_vars = energy.num_vars();
        let num_labels = energy.num_labels();
        if snapshot.num_labels != num_labels as u64 {
            return Err(SospdError::SnapshotMismatch("label count differs"));
        }
        if snapshot.labels.len() != num_vars {
            return Err(SospdError::SnapshotMismatch("variable count differs"));
        }
        if let Some(&label) = snapshot.labels.iter().find(|&&l| l >= num_labels) {
            return Err(SospdError::LabelOutOfRange { label, num_labels });
        }
        if snapshot.dual.len() != energy.num_cliques() {
            return Err(SospdError::SnapshotMismatch("clique count differs"));
        }
        for (c, block) in snapshot.dual.iter().enumerate() {
            if block.len() != energy.clique(c).size() * num_labels {
                return Err(SospdError::SnapshotMismatch("clique dual table size differs"));
            }
        }
        if snapshot.heights.len() != num_vars * num_labels {
            return Err(SospdError::SnapshotMismatch("height table size differs"));
        }
        let iteration = usize::try_from(snapshot.iteration)
            .map_err(|_| SospdError::SnapshotMismatch("iteration counter overflows usize"))?;
        let unchanged_streak = usize::try_from(snapshot.unchanged_streak)
            .map_err(|_| SospdError::SnapshotMismatch("streak overflows usize"))?;

        if self.state == SolverState::Uninitialized {
            self.prepare()?;
        }

        for (c, block) in snapshot.dual.iter().enumerate() {
            let clique = energy.clique(c);
            let labels = gather_labels(clique.nodes(), &snapshot.labels);
            let lambda_sum: Energy = labels
                .iter()
                .enumerate()
                .map(|(i, &l)| block[i * num_labels + l])
                .sum();
            if lambda_sum != clique.energy(&labels) {
                return Err(SospdError::SnapshotMismatch("dual is not tight at the snapshot labeling"));
            }
        }

        for v in 0..num_vars {
            for l in 0..num_labels {
                let expected = energy.unary(v, l)
                    + self.node_cliques[v]
                        .iter()
                        .map(|&(c, i)| snapshot.dual[c][i * num_labels + l])
                        .sum::<Energy>();
                if snapshot.heights[v * num_labels + l] != expected {
                    return Err(SospdError::SnapshotMismatch("heights disagree with the dual"));
                }
            }
        }

        self.labels.copy_from_slice(&snapshot.labels);
        for (c, block) in snapshot.dual.iter().enumerate() {
            self.dual.clique_mut(c).copy_from_slice(block);
        }
        self.heights.as_mut_slice().copy_from_slice(&snapshot.heights);
        self.iteration = iteration;
        self.unchanged_streak = unchanged_streak;
        self.state = snapshot.state;
        log::info!(
            "restored snapshot at iteration {} ({:?})",
            self.iteration,
            self.state
        );
        Ok(())
    }
}
