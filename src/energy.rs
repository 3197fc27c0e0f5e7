/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Multi-label energy model: variables, labels, unary costs and cliques.
//!
//! The optimiser only ever reads an energy model. Any type implementing
//! [`EnergyModel`] can be minimised; [`MultilabelEnergy`] is the owned,
//! validated container shipped with the crate.
//!
//! ```text
//! E(x) = Σ_i unary(i, x_i) + Σ_C f_C(x_C)
//! ```
//!
//! # Invariants
//! - **Clique size**: every clique has between 1 and [`MAX_CLIQUE_SIZE`] members.
//! - **Non-negative energies**: clique energies are non-negative integers.
//! - **Immutability**: the model is never mutated by the solver.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::error::{SospdError, SospdResult};

/// Variable index in `[0, num_vars)`.
pub type VarId = usize;

/// Label index in `[0, num_labels)`.
pub type Label = usize;

/// Integer energy value. Clique energies are non-negative; duals and residuals may not be.
pub type Energy = i64;

/// Structural cap on clique size. Fusion tables have `2^k` entries.
pub const MAX_CLIQUE_SIZE: usize = 32;

/// Fixed-capacity label tuple for one clique, kept on the stack.
pub type LabelBuf = heapless::Vec<Label, MAX_CLIQUE_SIZE>;

// ─── Traits ─────────────────────────────────────────────────────────────────

/// A higher-order term: an ordered member list and an energy over their labels.
pub trait Clique {
    /// Member variables, in the order `energy` receives their labels.
    fn nodes(&self) -> &[VarId];

    /// Number of members.
    fn size(&self) -> usize {
        self.nodes().len()
    }

    /// Energy of the clique when member `i` takes `labels[i]`.
    ///
    /// `labels.len() == self.size()`. Must be non-negative.
    fn energy(&self, labels: &[Label]) -> Energy;
}

/// Read-only view of a multi-label energy function.
pub trait EnergyModel {
    /// Number of variables.
    fn num_vars(&self) -> usize;

    /// Number of labels every variable can take.
    fn num_labels(&self) -> usize;

    /// Unary cost of assigning `label` to `var`.
    fn unary(&self, var: VarId, label: Label) -> Energy;

    /// Number of cliques.
    fn num_cliques(&self) -> usize;

    /// Clique at `index`, `index < num_cliques()`.
    fn clique(&self, index: usize) -> &dyn Clique;

    /// Total energy of a full labeling.
    fn compute_energy(&self, labels: &[Label]) -> Energy {
        let mut total: Energy = labels
            .iter()
            .enumerate()
            .map(|(i, &l)| self.unary(i, l))
            .sum();
        let mut buf = LabelBuf::new();
        for c in 0..self.num_cliques() {
            let clique = self.clique(c);
            buf.clear();
            for &node in clique.nodes().iter().take(MAX_CLIQUE_SIZE) {
                // Capacity is MAX_CLIQUE_SIZE and we take at most that many.
                let _ = buf.push(labels[node]);
            }
            total += clique.energy(&buf);
        }
        total
    }
}

// ─── MultilabelEnergy ───────────────────────────────────────────────────────

/// Owned energy model with validated insertion.
///
/// Unary costs are stored row-major (`var * num_labels + label`) and default to 0.
pub struct MultilabelEnergy {
    num_labels: usize,
    unary: Vec<Energy>,
    cliques: Vec<Box<dyn Clique>>,
}

impl MultilabelEnergy {
    /// Create an empty model over `num_labels` labels.
    pub fn new(num_labels: usize) -> SospdResult<Self> {
        if num_labels == 0 {
            return Err(SospdError::NoLabels);
        }
        Ok(Self {
            num_labels,
            unary: Vec::new(),
            cliques: Vec::new(),
        })
    }

    /// Add one variable with zero unary costs. Returns its id.
    pub fn add_var(&mut self) -> VarId {
        self.add_vars(1)
    }

    /// Add `count` variables with zero unary costs. Returns the first new id.
    pub fn add_vars(&mut self, count: usize) -> VarId {
        let first = self.num_vars();
        self.unary.resize((first + count) * self.num_labels, 0);
        first
    }

    /// Add `costs[l]` to the unary cost of `var` at every label `l`.
    pub fn add_unary_term(&mut self, var: VarId, costs: &[Energy]) -> SospdResult<()> {
        let num_vars = self.num_vars();
        if var >= num_vars {
            return Err(SospdError::VariableOutOfRange { var, num_vars });
        }
        if costs.len() != self.num_labels {
            return Err(SospdError::UnaryLength {
                expected: self.num_labels,
                got: costs.len(),
            });
        }
        let row = &mut self.unary[var * self.num_labels..(var + 1) * self.num_labels];
        for (slot, &c) in row.iter_mut().zip(costs) {
            *slot += c;
        }
        Ok(())
    }

    /// Add a clique. Returns its index.
    ///
    /// Rejects empty cliques, cliques above [`MAX_CLIQUE_SIZE`] and members
    /// outside the current variable range.
    pub fn add_clique(&mut self, clique: Box<dyn Clique>) -> SospdResult<usize> {
        let index = self.cliques.len();
        validate_clique(index, clique.as_ref(), self.num_vars())?;
        self.cliques.push(clique);
        Ok(index)
    }
}

impl EnergyModel for MultilabelEnergy {
    fn num_vars(&self) -> usize {
        self.unary.len() / self.num_labels
    }

    fn num_labels(&self) -> usize {
        self.num_labels
    }

    fn unary(&self, var: VarId, label: Label) -> Energy {
        self.unary[var * self.num_labels + label]
    }

    fn num_cliques(&self) -> usize {
        self.cliques.len()
    }

    fn clique(&self, index: usize) -> &dyn Clique {
        self.cliques[index].as_ref()
    }
}

/// Check the structural preconditions of one clique.
pub(crate) fn validate_clique(index: usize, clique: &dyn Clique, num_vars: usize) -> SospdResult<()> {
    let size = clique.size();
    if size == 0 {
        return Err(SospdError::EmptyClique { clique: index });
    }
    if size > MAX_CLIQUE_SIZE {
        return Err(SospdError::CliqueTooLarge {
            clique: index,
            size,
            max: MAX_CLIQUE_SIZE,
        });
    }
    if let Some(&var) = clique.nodes().iter().find(|&&v| v >= num_vars) {
        return Err(SospdError::VariableOutOfRange { var, num_vars });
    }
    Ok(())
}

// ─── Ready-made cliques ─────────────────────────────────────────────────────

/// Pⁿ Potts clique: zero when every member agrees, `penalty` otherwise.
///
/// Its fusion energies are submodular for any alpha-expansion proposal.
#[derive(Clone, Debug)]
pub struct PottsClique {
    nodes: Vec<VarId>,
    penalty: Energy,
}

impl PottsClique {
    /// Build a Potts clique over `nodes`.
    pub fn new(nodes: Vec<VarId>, penalty: Energy) -> Self {
        Self { nodes, penalty }
    }
}

impl Clique for PottsClique {
    fn nodes(&self) -> &[VarId] {
        &self.nodes
    }

    fn energy(&self, labels: &[Label]) -> Energy {
        match labels.split_first() {
            Some((first, rest)) if rest.iter().any(|l| l != first) => self.penalty,
            _ => 0,
        }
    }
}

/// Clique backed by an arbitrary energy closure.
pub struct FnClique<F>
where
    F: Fn(&[Label]) -> Energy,
{
    nodes: Vec<VarId>,
    energy_fn: F,
}

impl<F> FnClique<F>
where
    F: Fn(&[Label]) -> Energy,
{
    /// Build a clique over `nodes` evaluating `energy_fn`.
    pub fn new(nodes: Vec<VarId>, energy_fn: F) -> Self {
        Self { nodes, energy_fn }
    }
}

impl<F> Clique for FnClique<F>
where
    F: Fn(&[Label]) -> Energy,
{
    fn nodes(&self) -> &[VarId] {
        &self.nodes
    }

    fn energy(&self, labels: &[Label]) -> Energy {
        (self.energy_fn)(labels)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
