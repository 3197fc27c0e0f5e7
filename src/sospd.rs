/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! SoSPD orchestrator: the primal labeling, the dual certificate and the outer loop.
//!
//! # Iteration
//!
//! ```text
//! propose ──► pre-edit dual ──► flow solve ──► primal/dual update ──► post-edit dual
//!    ▲                                                                     │
//!    └─────────────────────────────── iteration += 1 ◄─────────────────────┘
//! ```
//!
//! # State machine
//!
//! ```text
//! Uninitialized ──first solve──► Iterating ──► Converged
//!                                    │  ▲
//!                                    ▼  │ solve again
//!                                 Exhausted
//! ```
//!
//! All per-variable and per-clique storage is allocated once on the first
//! solve and mutated in place afterwards.
//!
//! # Invariants
//! - **Tightness**: after initialisation and after every iteration, each
//!   clique's duals at the current labeling sum exactly to its energy.
//! - **Height consistency**: `h(v, l) = unary(v, l) + Σ λ_C(i, l)` over the
//!   (clique, member) pairs holding `v`.
//! - **Monotone energy**: the energy of the current labeling never increases.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use crate::dual::{DualTable, EvenSplit, HeightTable};
use crate::energy::{validate_clique, Energy, EnergyModel, Label, LabelBuf, VarId, MAX_CLIQUE_SIZE};
use crate::error::{SospdError, SospdResult};
use crate::flow::{AugmentingFlow, SubmodularFlow};
use crate::proposal::{ProposalKind, ProposalStrategy};
use crate::residual::{fill_fusion_table, subtract_linear};

/// Fixed-capacity per-member dual buffer, one clique at a time.
type EnergyBuf = heapless::Vec<Energy, MAX_CLIQUE_SIZE>;

// ─── Configuration ──────────────────────────────────────────────────────────

/// Solver configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SospdConfig {
    /// Proposal strategy the solver starts with.
    pub proposal: ProposalKind,
    /// Evaluate and log the total energy after every iteration (debug level).
    pub trace_energy: bool,
}

/// Lifecycle of a solver instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SolverState {
    /// No solve has run yet; no storage is allocated.
    #[default]
    Uninitialized,
    /// Inside the outer loop.
    Iterating,
    /// The current proposal strategy cannot improve the labeling.
    Converged,
    /// The iteration budget ran out. A later solve resumes.
    Exhausted,
}

/// Result of one `solve` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SolveOutcome {
    /// Completed iterations during this call.
    pub iterations: usize,
    /// State after the call.
    pub state: SolverState,
}

// ─── Sospd ──────────────────────────────────────────────────────────────────

/// Sum-of-submodular primal-dual optimiser over an [`EnergyModel`].
///
/// `F` is the flow oracle solving each binary fusion problem.
pub struct Sospd<'e, E, F = AugmentingFlow>
where
    E: EnergyModel + ?Sized,
    F: SubmodularFlow,
{
    pub(crate) energy: &'e E,
    pub(crate) flow: F,
    pub(crate) num_labels: usize,
    pub(crate) labels: Vec<Label>,
    pub(crate) fusion_labels: Vec<Label>,
    pub(crate) node_cliques: Vec<Vec<(usize, usize)>>,
    pub(crate) dual: DualTable,
    pub(crate) heights: HeightTable,
    pub(crate) iteration: usize,
    pub(crate) unchanged_streak: usize,
    pub(crate) state: SolverState,
    proposal: ProposalStrategy,
    config: SospdConfig,
}

impl<'e, E> Sospd<'e, E, AugmentingFlow>
where
    E: EnergyModel + ?Sized,
{
    /// Solver with the default configuration and the bundled flow oracle.
    pub fn new(energy: &'e E) -> Self {
        Self::with_config(energy, SospdConfig::default())
    }

    /// Solver with `config` and the bundled flow oracle.
    pub fn with_config(energy: &'e E, config: SospdConfig) -> Self {
        Self::with_flow(energy, AugmentingFlow::new(), config)
    }
}

impl<'e, E, F> Sospd<'e, E, F>
where
    E: EnergyModel + ?Sized,
    F: SubmodularFlow,
{
    /// Solver driving a caller-supplied flow oracle.
    ///
    /// The oracle's graph is built on the first solve unless it already holds
    /// one mirroring the model.
    pub fn with_flow(energy: &'e E, flow: F, config: SospdConfig) -> Self {
        Self {
            energy,
            flow,
            num_labels: 0,
            labels: Vec::new(),
            fusion_labels: Vec::new(),
            node_cliques: Vec::new(),
            dual: DualTable::default(),
            heights: HeightTable::default(),
            iteration: 0,
            unchanged_streak: 0,
            state: SolverState::Uninitialized,
            proposal: config.proposal.into(),
            config,
        }
    }

    // ─── Outer loop ─────────────────────────────────────────────────────────

    /// Iterate until convergence.
    pub fn solve(&mut self) -> SospdResult<SolveOutcome> {
        self.solve_iterations(usize::MAX)
    }

    /// Run at most `max_iterations` iterations.
    ///
    /// Returns immediately once converged. An exhausted solver resumes where
    /// it stopped. Any error is fatal for this instance.
    pub fn solve_iterations(&mut self, max_iterations: usize) -> SospdResult<SolveOutcome> {
        if self.state == SolverState::Uninitialized {
            self.initialize()?;
        }
        if self.state == SolverState::Converged {
            return Ok(SolveOutcome {
                iterations: 0,
                state: self.state,
            });
        }

        self.state = SolverState::Iterating;
        let patience = self.proposal.patience(self.num_labels);
        let mut done = 0usize;
        while done < max_iterations {
            self.propose();
            if self.fusion_labels == self.labels {
                self.state = SolverState::Converged;
                break;
            }
            self.pre_edit_dual()?;
            let switched = self.update_primal_dual()?;
            self.post_edit_dual()?;
            self.iteration += 1;
            done += 1;

            if switched == 0 {
                self.unchanged_streak += 1;
            } else {
                self.unchanged_streak = 0;
            }
            if self.config.trace_energy {
                log::debug!(
                    "iteration {}: {} proposal, {} switched, energy {}",
                    self.iteration,
                    self.proposal.name(),
                    switched,
                    self.energy.compute_energy(&self.labels)
                );
            } else {
                log::debug!(
                    "iteration {}: {} proposal, {} switched",
                    self.iteration,
                    self.proposal.name(),
                    switched
                );
            }
            if self.unchanged_streak >= patience {
                self.state = SolverState::Converged;
                break;
            }
        }

        if self.state == SolverState::Converged {
            log::info!("converged after {} iterations", self.iteration);
        } else {
            self.state = SolverState::Exhausted;
            log::info!("iteration budget exhausted at iteration {}", self.iteration);
        }
        Ok(SolveOutcome {
            iterations: done,
            state: self.state,
        })
    }

    // ─── Initialisation ─────────────────────────────────────────────────────

    pub(crate) fn initialize(&mut self) -> SospdResult<()> {
        self.prepare()?;
        self.initial_labeling();
        self.initial_dual()?;
        self.state = SolverState::Iterating;
        log::debug!(
            "initialised: {} variables, {} cliques, {} labels",
            self.labels.len(),
            self.dual.num_cliques(),
            self.num_labels
        );
        Ok(())
    }

    /// Validate the model, build the flow graph and allocate all tables.
    pub(crate) fn prepare(&mut self) -> SospdResult<()> {
        let energy = self.energy;
        let num_labels = energy.num_labels();
        if num_labels == 0 {
            return Err(SospdError::NoLabels);
        }
        let num_vars = energy.num_vars();
        for c in 0..energy.num_cliques() {
            if let Err(err) = validate_clique(c, energy.clique(c), num_vars) {
                log::error!("rejecting energy model: {}", err);
                return Err(err);
            }
        }

        self.setup_graph()?;
        self.num_labels = num_labels;
        self.labels = vec![0; num_vars];
        self.fusion_labels = vec![0; num_vars];
        self.dual = DualTable::new((0..energy.num_cliques()).map(|c| energy.clique(c).size()), num_labels);
        self.heights = HeightTable::new(num_vars, num_labels);
        for v in 0..num_vars {
            for l in 0..num_labels {
                self.heights.set(v, l, energy.unary(v, l));
            }
        }
        self.initial_node_clique_list();
        Ok(())
    }

    /// Mirror the model in the flow oracle: one node per variable, one zeroed
    /// table per clique. An oracle that already holds a graph must match it.
    fn setup_graph(&mut self) -> SospdResult<()> {
        let energy = self.energy;
        if self.flow.cliques().is_empty() {
            if self.flow.num_nodes() == 0 {
                self.flow.add_node(energy.num_vars());
            }
            for c in 0..energy.num_cliques() {
                let clique = energy.clique(c);
                self.flow.add_clique(clique.nodes(), vec![0; 1 << clique.size()])?;
            }
        }
        let got = self.flow.cliques().len();
        if got != energy.num_cliques() || self.flow.num_nodes() != energy.num_vars() {
            log::error!(
                "flow graph has {} nodes and {} cliques, model has {} variables and {} cliques",
                self.flow.num_nodes(),
                got,
                energy.num_vars(),
                energy.num_cliques()
            );
            return Err(SospdError::FlowGraphMismatch {
                expected: energy.num_cliques(),
                got,
            });
        }
        Ok(())
    }

    /// Each variable starts at its cheapest unary label, lowest label on ties.
    fn initial_labeling(&mut self) {
        let energy = self.energy;
        for (v, label) in self.labels.iter_mut().enumerate() {
            let mut best = 0;
            for l in 1..self.num_labels {
                if energy.unary(v, l) < energy.unary(v, best) {
                    best = l;
                }
            }
            *label = best;
        }
    }

    /// Spread each clique's energy at the initial labeling evenly over its members.
    fn initial_dual(&mut self) -> SospdResult<()> {
        let energy = self.energy;
        for c in 0..energy.num_cliques() {
            let clique = energy.clique(c);
            let buf = gather_labels(clique.nodes(), &self.labels);
            let e = clique.energy(&buf);
            if e < 0 {
                log::error!("clique {} has negative energy {} at labeling {:?}", c, e, buf);
                return Err(SospdError::NegativeEnergy { clique: c, energy: e });
            }
            let split = EvenSplit::new(e, clique.size());
            for (i, &v) in clique.nodes().iter().enumerate() {
                let l = self.labels[v];
                let share = split.share(i);
                *self.dual.get_mut(c, i, l) = share;
                self.heights.add(v, l, share);
            }
        }
        Ok(())
    }

    fn initial_node_clique_list(&mut self) {
        let energy = self.energy;
        self.node_cliques = vec![Vec::new(); energy.num_vars()];
        for c in 0..energy.num_cliques() {
            for (i, &v) in energy.clique(c).nodes().iter().enumerate() {
                self.node_cliques[v].push((c, i));
            }
        }
    }

    // ─── Iteration steps ────────────────────────────────────────────────────

    fn propose(&mut self) {
        self.proposal.propose(
            self.iteration,
            &self.heights,
            &self.labels,
            &mut self.fusion_labels,
        );
    }

    /// Fill every flow clique with its residual fusion table.
    fn pre_edit_dual(&mut self) -> SospdResult<()> {
        let energy = self.energy;
        let fixed = &mut self.flow.params_mut().fixed_vars;
        fixed.clear();
        fixed.extend(self.labels.iter().zip(&self.fusion_labels).map(|(a, b)| a == b));

        for c in 0..energy.num_cliques() {
            let clique = energy.clique(c);
            let current = gather_labels(clique.nodes(), &self.labels);
            let fused = gather_labels(clique.nodes(), &self.fusion_labels);
            let mut current_lambda = EnergyBuf::new();
            let mut fused_lambda = EnergyBuf::new();
            for i in 0..clique.size() {
                let _ = current_lambda.push(self.dual.get(c, i, current[i]));
                let _ = fused_lambda.push(self.dual.get(c, i, fused[i]));
            }

            let table = self.flow.cliques_mut()[c].energy_table_mut();
            fill_fusion_table(clique, &current, &fused, table);
            subtract_linear(table, &fused_lambda, &current_lambda);
            if table[0] != 0 {
                log::error!(
                    "tightness violated in clique {} at iteration {}: residual {}, current {:?}, fused {:?}, table {:?}",
                    c,
                    self.iteration,
                    table[0],
                    current,
                    fused,
                    table
                );
                return Err(SospdError::TightnessViolated {
                    clique: c,
                    residual: table[0],
                    table: table.to_vec(),
                });
            }
        }
        Ok(())
    }

    /// Solve the fusion problem and fold the flow back into labels and duals.
    ///
    /// Returns the number of variables that changed label.
    fn update_primal_dual(&mut self) -> SospdResult<usize> {
        let energy = self.energy;
        self.flow.clear_unaries();
        let constant = self.flow.constant_term();
        self.flow.add_constant_term(-constant);
        for v in 0..self.labels.len() {
            let diff = self.heights.get(v, self.labels[v]) - self.heights.get(v, self.fusion_labels[v]);
            if diff > 0 {
                self.flow.add_unary_term(v, diff, 0);
            } else {
                self.flow.add_unary_term(v, 0, -diff);
            }
        }
        let flow_energy = self.flow.solve()?;
        log::trace!("iteration {}: fusion energy {}", self.iteration, flow_energy);

        let mut switched = 0usize;
        for v in 0..self.labels.len() {
            if self.flow.label(v) {
                if self.labels[v] != self.fusion_labels[v] {
                    switched += 1;
                }
                self.labels[v] = self.fusion_labels[v];
            }
        }

        for c in 0..energy.num_cliques() {
            let alpha = self.flow.cliques()[c].alpha_ci();
            for (i, &v) in energy.clique(c).nodes().iter().enumerate() {
                let l = self.fusion_labels[v];
                *self.dual.get_mut(c, i, l) += alpha[i];
                self.heights.add(v, l, alpha[i]);
            }
        }
        Ok(switched)
    }

    /// Restore tightness at the new labeling by spreading the (non-positive) gap.
    fn post_edit_dual(&mut self) -> SospdResult<()> {
        let energy = self.energy;
        for c in 0..energy.num_cliques() {
            let clique = energy.clique(c);
            let buf = gather_labels(clique.nodes(), &self.labels);
            let lambda_sum: Energy = buf
                .iter()
                .enumerate()
                .map(|(i, &l)| self.dual.get(c, i, l))
                .sum();
            let e = clique.energy(&buf);
            if e < 0 {
                log::error!("clique {} has negative energy {} at labeling {:?}", c, e, buf);
                return Err(SospdError::NegativeEnergy { clique: c, energy: e });
            }
            let correction = e - lambda_sum;
            if correction > 0 {
                let table = self.flow.cliques()[c].energy_table().to_vec();
                log::error!(
                    "dual infeasible in clique {} at iteration {}: energy {}, dual sum {}, correction {}, labels {:?}, residual table {:?}",
                    c,
                    self.iteration,
                    e,
                    lambda_sum,
                    correction,
                    buf,
                    table
                );
                return Err(SospdError::DualInfeasible {
                    clique: c,
                    energy: e,
                    lambda_sum,
                    correction,
                    table,
                });
            }

            let split = EvenSplit::new(correction, clique.size());
            for (i, &v) in clique.nodes().iter().enumerate() {
                let l = buf[i];
                let share = split.share(i);
                *self.dual.get_mut(c, i, l) += share;
                self.heights.add(v, l, share);
            }
        }
        Ok(())
    }

    // ─── Accessors ──────────────────────────────────────────────────────────

    /// Current label of `var`, `None` before the first solve or out of range.
    pub fn label(&self, var: VarId) -> Option<Label> {
        if self.state == SolverState::Uninitialized {
            return None;
        }
        self.labels.get(var).copied()
    }

    /// Current labeling; empty before the first solve.
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// `λ_clique(member, label)`, `None` when out of range or uninitialised.
    pub fn dual_variable(&self, clique: usize, member: usize, label: Label) -> Option<Energy> {
        if clique >= self.dual.num_cliques() || label >= self.num_labels {
            return None;
        }
        if member >= self.energy.clique(clique).size() {
            return None;
        }
        Some(self.dual.get(clique, member, label))
    }

    /// `h(var, label)`, `None` when out of range or uninitialised.
    pub fn height(&self, var: VarId, label: Label) -> Option<Energy> {
        if var >= self.heights.num_vars() || label >= self.num_labels {
            return None;
        }
        Some(self.heights.get(var, label))
    }

    /// (clique, member position) pairs holding `var`.
    pub fn adjacent_cliques(&self, var: VarId) -> &[(usize, usize)] {
        self.node_cliques.get(var).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `unary(var, label) + Σ λ_C(i, label)` recomputed from the dual table.
    #[cfg(test)]
    pub(crate) fn height_from_dual(&self, var: VarId, label: Label) -> Energy {
        self.energy.unary(var, label)
            + self.node_cliques[var]
                .iter()
                .map(|&(c, i)| self.dual.get(c, i, label))
                .sum::<Energy>()
    }

    /// Completed iterations since construction.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Lifecycle state.
    pub fn state(&self) -> SolverState {
        self.state
    }

    /// Total energy of the current labeling, `None` before the first solve.
    pub fn current_energy(&self) -> Option<Energy> {
        if self.state == SolverState::Uninitialized {
            return None;
        }
        Some(self.energy.compute_energy(&self.labels))
    }

    /// The energy model being minimised.
    pub fn energy(&self) -> &'e E {
        self.energy
    }

    /// Flow oracle.
    pub fn flow(&self) -> &F {
        &self.flow
    }

    /// Mutable flow oracle, e.g. to adjust its parameters.
    pub fn flow_mut(&mut self) -> &mut F {
        &mut self.flow
    }

    /// Configuration the solver was built with.
    pub fn config(&self) -> &SospdConfig {
        &self.config
    }

    /// Active proposal strategy.
    pub fn proposal(&self) -> &ProposalStrategy {
        &self.proposal
    }

    // ─── Proposal setters ───────────────────────────────────────────────────

    /// Replace the proposal strategy. A converged solver may iterate again.
    pub fn set_proposal_strategy(&mut self, strategy: ProposalStrategy) {
        log::debug!("proposal strategy {} -> {}", self.proposal.name(), strategy.name());
        self.proposal = strategy;
        self.unchanged_streak = 0;
        if self.state == SolverState::Converged {
            self.state = SolverState::Exhausted;
        }
    }

    /// Use a custom proposal closure `(iteration, current, proposed)`.
    pub fn set_proposal_callback<C>(&mut self, callback: C)
    where
        C: FnMut(usize, &[Label], &mut [Label]) + 'static,
    {
        self.set_proposal_strategy(ProposalStrategy::Custom(Box::new(callback)));
    }

    /// Use cyclic alpha expansion.
    pub fn set_alpha_expansion(&mut self) {
        self.set_proposal_strategy(ProposalStrategy::CyclicAlpha);
    }

    /// Use height-weighted alpha expansion.
    pub fn set_height_alpha_expansion(&mut self) {
        self.set_proposal_strategy(ProposalStrategy::HeightAlpha);
    }
}

/// Labels of `nodes` under `labels`, in member order.
pub(crate) fn gather_labels(nodes: &[VarId], labels: &[Label]) -> LabelBuf {
    let mut buf = LabelBuf::new();
    for &v in nodes.iter().take(MAX_CLIQUE_SIZE) {
        let _ = buf.push(labels[v]);
    }
    buf
}

// ─── Tests ──────────────────────────────────────────────────────────────────
