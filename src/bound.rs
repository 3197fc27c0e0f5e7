/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Dual lower bound for models made of 3-member cliques.
//!
//! Every label triple of every clique is visited. Triples with zero energy get
//! their dual sum forced to zero by moving the excess onto the first member
//! whose label differs from the current labeling. Over the remaining triples
//! the worst ratio `dual_sum / energy` is recorded, and the bound is
//!
//! ```text
//! Σ_v min_l h(v, l) / max_ratio
//! ```
//!
//! The routine rewrites duals and heights. It is a diagnostic for a finished
//! solve, not a step of the optimisation.

use crate::energy::{Energy, EnergyModel};
use crate::error::{SospdError, SospdResult};
use crate::flow::SubmodularFlow;
use crate::sospd::{gather_labels, SolverState, Sospd};

impl<'e, E, F> Sospd<'e, E, F>
where
    E: EnergyModel + ?Sized,
    F: SubmodularFlow,
{
    /// Lower bound on the minimum energy; initialises the solver if needed.
    ///
    /// Fails with [`SospdError::LowerBoundCliqueSize`] before touching any state
    /// when a clique does not have exactly three members. When no triple has a
    /// positive dual ratio the dual objective itself is returned.
    pub fn lower_bound(&mut self) -> SospdResult<f64> {
        let energy = self.energy;
        for c in 0..energy.num_cliques() {
            let size = energy.clique(c).size();
            if size != 3 {
                return Err(SospdError::LowerBoundCliqueSize { clique: c, size });
            }
        }
        if self.state == SolverState::Uninitialized {
            self.initialize()?;
        }

        let num_labels = self.num_labels;
        let mut max_ratio = 0.0f64;
        for c in 0..energy.num_cliques() {
            let clique = energy.clique(c);
            let nodes = clique.nodes();
            let current = gather_labels(nodes, &self.labels);
            for a in 0..num_labels {
                for b in 0..num_labels {
                    for d in 0..num_labels {
                        let triple = [a, b, d];
                        let e = clique.energy(&triple);
                        if e < 0 {
                            return Err(SospdError::NegativeEnergy { clique: c, energy: e });
                        }
                        let mut dual_sum: Energy = (0..3).map(|i| self.dual.get(c, i, triple[i])).sum();
                        if e != 0 {
                            max_ratio = max_ratio.max(dual_sum as f64 / e as f64);
                            continue;
                        }
                        if let Some(i) = (0..3).find(|&i| triple[i] != current[i]) {
                            let excess = dual_sum - e;
                            *self.dual.get_mut(c, i, triple[i]) -= excess;
                            self.heights.add(nodes[i], triple[i], -excess);
                            dual_sum = e;
                        }
                        if dual_sum != e {
                            log::error!(
                                "clique {} not tight at its current labeling {:?}: dual sum {}",
                                c,
                                current,
                                dual_sum
                            );
                            return Err(SospdError::TightnessViolated {
                                clique: c,
                                residual: dual_sum - e,
                                table: self.dual.clique(c).to_vec(),
                            });
                        }
                    }
                }
            }
        }

        let dual_objective: Energy = (0..self.heights.num_vars())
            .map(|v| self.heights.row(v).iter().copied().min().unwrap_or(0))
            .sum();
        if max_ratio <= 0.0 {
            log::info!("lower bound: no positive dual ratio, dual objective {}", dual_objective);
            return Ok(dual_objective as f64);
        }
        let bound = dual_objective as f64 / max_ratio;
        log::info!(
            "lower bound {}: dual objective {}, max ratio {}",
            bound,
            dual_objective,
            max_ratio
        );
        Ok(bound)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
