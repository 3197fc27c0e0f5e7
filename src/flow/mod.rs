/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Flow oracle: the binary sum-of-submodular max-flow / min-cut solver SoSPD delegates to.
//!
//! Each SoSPD iteration is a two-label problem over the graph
//!
//! ```text
//! E(S) = constant + Σ_i unary_i(x_i) + Σ_C table_C(S ∩ C)
//! ```
//!
//! where `S` is the set of nodes taking label 1 ("switch to the fused label")
//! and every clique table is indexed by a member bitmask. The solver returns the
//! minimising `S` and, per clique, the flow potentials `alpha_ci` it routed
//! through each member.
//!
//! Any max-flow implementation conforming to [`SubmodularFlow`] can drive the
//! optimiser. [`AugmentingFlow`] is the bundled one.

pub mod augmenting;

use alloc::vec::Vec;

use crate::energy::Energy;
use crate::error::SospdResult;

pub use augmenting::AugmentingFlow;

/// Node index in the flow graph. SoSPD uses one node per model variable.
pub type NodeId = usize;

/// Configuration handed to the flow oracle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlowParams {
    /// `fixed_vars[i]` is true when node `i` cannot change label this round
    /// (its current and fused labels coincide). Length `num_nodes`; missing
    /// entries count as free.
    pub fixed_vars: Vec<bool>,
}

/// One clique of the flow graph: members, energy table and post-solve potentials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowClique {
    nodes: Vec<NodeId>,
    energy: Vec<Energy>,
    alpha_ci: Vec<Energy>,
}

impl FlowClique {
    /// Clique over `nodes` with a `2^k` entry energy table.
    pub fn new(nodes: Vec<NodeId>, energy: Vec<Energy>) -> Self {
        let k = nodes.len();
        Self {
            nodes,
            energy,
            alpha_ci: alloc::vec![0; k],
        }
    }

    /// Member nodes, bit `i` of a table index refers to `nodes()[i]`.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Number of members.
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    /// Energy table indexed by member bitmask.
    pub fn energy_table(&self) -> &[Energy] {
        &self.energy
    }

    /// Mutable energy table; rewritten by SoSPD before every solve.
    pub fn energy_table_mut(&mut self) -> &mut [Energy] {
        &mut self.energy
    }

    /// Flow potential routed through each member by the last solve.
    pub fn alpha_ci(&self) -> &[Energy] {
        &self.alpha_ci
    }

    /// Mutable flow potentials, for oracle implementations.
    pub fn alpha_ci_mut(&mut self) -> &mut [Energy] {
        &mut self.alpha_ci
    }
}

/// Binary sum-of-submodular flow solver consumed by SoSPD.
///
/// Contract of [`SubmodularFlow::solve`]: the returned labeling minimises
/// `E(S)` over sets `S` of free nodes, and for every clique and every subset
/// `T` of its free members, `Σ_{i∈T} alpha_ci[i] <= table(T) - table(∅)`.
pub trait SubmodularFlow {
    /// Oracle configuration.
    fn params(&self) -> &FlowParams;

    /// Mutable oracle configuration.
    fn params_mut(&mut self) -> &mut FlowParams;

    /// Append `count` nodes. Returns the id of the first one.
    fn add_node(&mut self, count: usize) -> NodeId;

    /// Number of nodes.
    fn num_nodes(&self) -> usize;

    /// Append a clique with an initial `2^k` energy table. Returns its index.
    fn add_clique(&mut self, nodes: &[NodeId], energy: Vec<Energy>) -> SospdResult<usize>;

    /// All cliques in insertion order.
    fn cliques(&self) -> &[FlowClique];

    /// Mutable access to all cliques.
    fn cliques_mut(&mut self) -> &mut [FlowClique];

    /// Reset every unary term to zero.
    fn clear_unaries(&mut self);

    /// Add `e0` to the cost of `node` taking label 0 and `e1` for label 1.
    fn add_unary_term(&mut self, node: NodeId, e0: Energy, e1: Energy);

    /// Current constant term.
    fn constant_term(&self) -> Energy;

    /// Add `delta` to the constant term.
    fn add_constant_term(&mut self, delta: Energy);

    /// Solve the min-cut problem. Returns the minimum energy `E(S)`.
    fn solve(&mut self) -> SospdResult<Energy>;

    /// Label of `node` after the last solve; `true` is label 1.
    fn label(&self, node: NodeId) -> bool;
}
