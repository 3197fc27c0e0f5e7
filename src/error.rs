/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Error hierarchy for the SoSPD optimiser.
//!
//! Two kinds of failure exist and neither is retried:
//!
//! - **Precondition violations**: malformed input (oversized or empty cliques,
//!   negative clique energies, out-of-range variables or labels).
//! - **Invariant violations**: the dual certificate lost tightness or became
//!   infeasible. These indicate a non-submodular fusion energy or a bug, and
//!   carry the full residual table of the offending clique.
//!
//! Every variant is fatal for the solver instance that produced it.

use alloc::vec::Vec;

use thiserror::Error;

use crate::energy::Energy;

/// Root error type for all SoSPD failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SospdError {
    /// A clique has more members than the structural cap allows.
    #[error("clique {clique} has {size} members, the limit is {max}")]
    CliqueTooLarge {
        /// Clique index in model order.
        clique: usize,
        /// Number of members.
        size: usize,
        /// Maximum supported size.
        max: usize,
    },

    /// A clique has no members.
    #[error("clique {clique} has no members")]
    EmptyClique {
        /// Clique index in model order.
        clique: usize,
    },

    /// A variable index is outside `[0, num_vars)`.
    #[error("variable {var} out of range, model has {num_vars} variables")]
    VariableOutOfRange {
        /// Offending variable index.
        var: usize,
        /// Number of variables in the model.
        num_vars: usize,
    },

    /// A label is outside `[0, num_labels)`.
    #[error("label {label} out of range, model has {num_labels} labels")]
    LabelOutOfRange {
        /// Offending label.
        label: usize,
        /// Number of labels in the model.
        num_labels: usize,
    },

    /// The model declares zero labels.
    #[error("energy model has no labels")]
    NoLabels,

    /// A unary cost vector has the wrong length.
    #[error("unary cost vector has {got} entries, expected {expected}")]
    UnaryLength {
        /// Number of labels in the model.
        expected: usize,
        /// Length that was supplied.
        got: usize,
    },

    /// A clique evaluated to a negative energy.
    #[error("clique {clique} evaluated to negative energy {energy}")]
    NegativeEnergy {
        /// Clique index in model order.
        clique: usize,
        /// The negative value.
        energy: Energy,
    },

    /// A flow clique table does not have `2^k` entries.
    #[error("energy table of flow clique {clique} has {got} entries, expected {expected}")]
    EnergyTableSize {
        /// Flow clique index.
        clique: usize,
        /// Required length (`2^k`).
        expected: usize,
        /// Supplied length.
        got: usize,
    },

    /// The flow oracle's graph does not mirror the energy model.
    #[error("flow graph has {got} cliques, energy model has {expected}")]
    FlowGraphMismatch {
        /// Clique count of the energy model.
        expected: usize,
        /// Clique count of the flow graph.
        got: usize,
    },

    /// The stay-everywhere entry of a residual table is not zero.
    ///
    /// The dual no longer sums to the clique energy at the current labeling.
    #[error("tightness violated in clique {clique}: residual of the stay assignment is {residual}, table {table:?}")]
    TightnessViolated {
        /// Clique index in model order.
        clique: usize,
        /// Value of the all-zero mask entry (should be 0).
        residual: Energy,
        /// Full residual energy table, indexed by fusion bitmask.
        table: Vec<Energy>,
    },

    /// The clique energy at the new labeling exceeds its dual sum.
    #[error("dual infeasible in clique {clique}: energy {energy}, dual sum {lambda_sum}, correction {correction}, table {table:?}")]
    DualInfeasible {
        /// Clique index in model order.
        clique: usize,
        /// Clique energy at the new labeling.
        energy: Energy,
        /// Sum of the clique's duals at the new labeling.
        lambda_sum: Energy,
        /// `energy - lambda_sum` (positive here).
        correction: Energy,
        /// Residual energy table handed to the flow oracle this iteration.
        table: Vec<Energy>,
    },

    /// The lower bound only supports cliques of exactly three members.
    #[error("lower bound needs 3-member cliques, clique {clique} has {size}")]
    LowerBoundCliqueSize {
        /// Clique index in model order.
        clique: usize,
        /// Its size.
        size: usize,
    },

    /// A snapshot does not fit the energy model it is restored into.
    #[error("snapshot does not match the energy model: {0}")]
    SnapshotMismatch(&'static str),
}

/// Convenience alias used throughout the crate.
pub type SospdResult<T> = Result<T, SospdError>;
