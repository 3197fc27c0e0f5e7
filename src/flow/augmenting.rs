/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Augmenting-path submodular flow over explicit clique tables.
//!
//! Each clique is reparameterised with a greedy base: walking its free
//! members in order, member `p` receives the marginal
//! `base0[p] = table(A ∪ {p}) − table(A)` as a label-1 unary, and the clique
//! keeps the non-negative slack
//!
//! ```text
//! slack(T) = table(T) − table(∅) − Σ_{p∈T} base0[p]
//! ```
//!
//! for every member subset `T`. Flow is pushed from source to sink along
//! breadth-first paths. Inside a clique, flow moves from member `p` to `q`
//! through an exchange arc whose capacity is the smallest slack over subsets
//! containing `p` but not `q`.
//!
//! After the last search, nodes reachable from the source take label 1 and
//! each clique reports `alpha_ci = phi + base0`, where `phi` is the flow it
//! carried.
//!
//! # Complexity
//! Exchange capacities enumerate `2^k` subsets, so the solver is intended for
//! the small cliques SoSPD produces, not for large dense ones.

use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;

use hashbrown::HashMap;

use super::{FlowClique, FlowParams, NodeId, SubmodularFlow};
use crate::energy::{Energy, MAX_CLIQUE_SIZE};
use crate::error::{SospdError, SospdResult};

// ─── AugmentingFlow ─────────────────────────────────────────────────────────

/// Bundled [`SubmodularFlow`] implementation.
#[derive(Clone, Debug, Default)]
pub struct AugmentingFlow {
    params: FlowParams,
    unary0: Vec<Energy>,
    unary1: Vec<Energy>,
    constant: Energy,
    cliques: Vec<FlowClique>,
    labels: Vec<bool>,
}

impl AugmentingFlow {
    /// Empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    fn is_fixed(&self, node: NodeId) -> bool {
        self.params.fixed_vars.get(node).copied().unwrap_or(false)
    }

    /// `E(S)` for the labeling `labels` (indexed by node).
    fn evaluate(&self, labels: &[bool]) -> Energy {
        let mut total = self.constant;
        for (node, &x) in labels.iter().enumerate() {
            total += if x { self.unary1[node] } else { self.unary0[node] };
        }
        for clique in &self.cliques {
            let mask = clique
                .nodes()
                .iter()
                .enumerate()
                .filter(|&(_, &v)| labels[v])
                .fold(0usize, |m, (p, _)| m | (1 << p));
            total += clique.energy_table()[mask];
        }
        total
    }
}

impl SubmodularFlow for AugmentingFlow {
    fn params(&self) -> &FlowParams {
        &self.params
    }

    fn params_mut(&mut self) -> &mut FlowParams {
        &mut self.params
    }

    fn add_node(&mut self, count: usize) -> NodeId {
        let first = self.unary0.len();
        self.unary0.resize(first + count, 0);
        self.unary1.resize(first + count, 0);
        self.labels.resize(first + count, false);
        first
    }

    fn num_nodes(&self) -> usize {
        self.unary0.len()
    }

    fn add_clique(&mut self, nodes: &[NodeId], energy: Vec<Energy>) -> SospdResult<usize> {
        let index = self.cliques.len();
        let k = nodes.len();
        if k == 0 {
            return Err(SospdError::EmptyClique { clique: index });
        }
        if k > MAX_CLIQUE_SIZE {
            return Err(SospdError::CliqueTooLarge {
                clique: index,
                size: k,
                max: MAX_CLIQUE_SIZE,
            });
        }
        let num_vars = self.num_nodes();
        if let Some(&var) = nodes.iter().find(|&&v| v >= num_vars) {
            return Err(SospdError::VariableOutOfRange { var, num_vars });
        }
        if energy.len() != 1 << k {
            return Err(SospdError::EnergyTableSize {
                clique: index,
                expected: 1 << k,
                got: energy.len(),
            });
        }
        self.cliques.push(FlowClique::new(nodes.to_vec(), energy));
        Ok(index)
    }

    fn cliques(&self) -> &[FlowClique] {
        &self.cliques
    }

    fn cliques_mut(&mut self) -> &mut [FlowClique] {
        &mut self.cliques
    }

    fn clear_unaries(&mut self) {
        self.unary0.fill(0);
        self.unary1.fill(0);
    }

    fn add_unary_term(&mut self, node: NodeId, e0: Energy, e1: Energy) {
        self.unary0[node] += e0;
        self.unary1[node] += e1;
    }

    fn constant_term(&self) -> Energy {
        self.constant
    }

    fn add_constant_term(&mut self, delta: Energy) {
        self.constant += delta;
    }

    fn solve(&mut self) -> SospdResult<Energy> {
        let fixed: Vec<bool> = (0..self.num_nodes()).map(|i| self.is_fixed(i)).collect();
        let mut network = Network::build(&self.cliques, fixed, &self.unary0, &self.unary1);

        let mut flow: Energy = 0;
        let mut augmentations = 0usize;
        loop {
            let search = network.search(&self.cliques);
            let Some(end) = search.end else { break };
            let pushed = network.augment(&self.cliques, end, &search.parent);
            if pushed <= 0 {
                log::warn!(
                    "augmenting path ending at node {} has no capacity, stopping at flow {}",
                    end,
                    flow
                );
                break;
            }
            flow += pushed;
            augmentations += 1;
        }

        let search = network.search(&self.cliques);
        for (node, label) in self.labels.iter_mut().enumerate() {
            *label = search.parent[node] != Parent::Unvisited;
        }
        for (clique, residual) in self.cliques.iter_mut().zip(&network.residuals) {
            for (p, alpha) in clique.alpha_ci_mut().iter_mut().enumerate() {
                *alpha = residual.phi[p] + residual.base0[p];
            }
        }

        let energy = self.evaluate(&self.labels);
        log::debug!(
            "flow solve: {} nodes, {} cliques, {} augmentations, flow {}, energy {}",
            self.num_nodes(),
            self.cliques.len(),
            augmentations,
            flow,
            energy
        );
        Ok(energy)
    }

    fn label(&self, node: NodeId) -> bool {
        self.labels.get(node).copied().unwrap_or(false)
    }
}

// ─── Residual network ───────────────────────────────────────────────────────

/// All subsets of `mask`, from `mask` down to the empty set.
fn submasks(mask: usize) -> impl Iterator<Item = usize> {
    core::iter::successors(Some(mask), move |&t| if t == 0 { None } else { Some((t - 1) & mask) })
}

/// `Σ_{p∈T} d[p]`.
fn mask_sum(d: &[Energy], t: usize) -> Energy {
    d.iter()
        .enumerate()
        .filter(|&(p, _)| (t >> p) & 1 == 1)
        .map(|(_, &x)| x)
        .sum()
}

/// Per-clique solve state.
#[derive(Debug)]
struct CliqueResidual {
    free: usize,
    base0: Vec<Energy>,
    slack: Vec<Energy>,
    phi: Vec<Energy>,
}

impl CliqueResidual {
    fn exchange_capacity(&self, p: usize, q: usize) -> Energy {
        submasks(self.free)
            .filter(|&t| (t >> p) & 1 == 1 && (t >> q) & 1 == 0)
            .map(|t| self.slack[t])
            .min()
            .unwrap_or(0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Parent {
    Unvisited,
    Source,
    Exchange {
        from: NodeId,
        clique: usize,
        p: usize,
        q: usize,
    },
}

struct Search {
    end: Option<NodeId>,
    parent: Vec<Parent>,
}

struct Network {
    fixed: Vec<bool>,
    residuals: Vec<CliqueResidual>,
    adjacency: Vec<Vec<(usize, usize)>>,
    source_cap: Vec<Energy>,
    sink_cap: Vec<Energy>,
    source_flow: Vec<Energy>,
    sink_flow: Vec<Energy>,
}

impl Network {
    fn build(cliques: &[FlowClique], fixed: Vec<bool>, unary0: &[Energy], unary1: &[Energy]) -> Self {
        let n = fixed.len();
        let mut e1 = unary1.to_vec();
        let mut adjacency = vec![Vec::new(); n];
        let mut residuals = Vec::with_capacity(cliques.len());

        for (c, clique) in cliques.iter().enumerate() {
            let k = clique.size();
            let table = clique.energy_table();
            let mut free = 0usize;
            for (p, &v) in clique.nodes().iter().enumerate() {
                if !fixed[v] {
                    free |= 1 << p;
                    adjacency[v].push((c, p));
                }
            }

            let base = table[0];
            let mut base0 = vec![0; k];
            let mut acc = 0usize;
            for p in 0..k {
                if (free >> p) & 1 == 1 {
                    base0[p] = table[acc | (1 << p)] - table[acc];
                    acc |= 1 << p;
                    e1[clique.nodes()[p]] += base0[p];
                }
            }
            let slack = (0..table.len())
                .map(|t| table[t] - base - mask_sum(&base0, t))
                .collect();

            residuals.push(CliqueResidual {
                free,
                base0,
                slack,
                phi: vec![0; k],
            });
        }

        let source_cap = (0..n).map(|i| (unary0[i] - e1[i]).max(0)).collect();
        let sink_cap = (0..n).map(|i| (e1[i] - unary0[i]).max(0)).collect();
        Self {
            fixed,
            residuals,
            adjacency,
            source_cap,
            sink_cap,
            source_flow: vec![0; n],
            sink_flow: vec![0; n],
        }
    }

    fn search(&self, cliques: &[FlowClique]) -> Search {
        let n = self.fixed.len();
        let mut parent = vec![Parent::Unvisited; n];
        let mut queue = VecDeque::new();
        for i in 0..n {
            if !self.fixed[i] && self.source_cap[i] - self.source_flow[i] > 0 {
                parent[i] = Parent::Source;
                queue.push_back(i);
            }
        }

        while let Some(u) = queue.pop_front() {
            if self.sink_cap[u] - self.sink_flow[u] > 0 {
                return Search { end: Some(u), parent };
            }
            for &(c, p) in &self.adjacency[u] {
                let residual = &self.residuals[c];
                for (q, &v) in cliques[c].nodes().iter().enumerate() {
                    if q == p || self.fixed[v] || parent[v] != Parent::Unvisited {
                        continue;
                    }
                    if residual.exchange_capacity(p, q) > 0 {
                        parent[v] = Parent::Exchange { from: u, clique: c, p, q };
                        queue.push_back(v);
                    }
                }
            }
        }
        Search { end: None, parent }
    }

    /// Push flow along the path ending at `end`. Returns the amount pushed.
    fn augment(&mut self, cliques: &[FlowClique], end: NodeId, parent: &[Parent]) -> Energy {
        let mut deltas: HashMap<usize, Vec<Energy>> = HashMap::new();
        let mut v = end;
        while let Parent::Exchange { from, clique, p, q } = parent[v] {
            let d = deltas
                .entry(clique)
                .or_insert_with(|| vec![0; cliques[clique].size()]);
            d[p] += 1;
            d[q] -= 1;
            v = from;
        }
        let start = v;

        let mut delta = (self.sink_cap[end] - self.sink_flow[end])
            .min(self.source_cap[start] - self.source_flow[start]);
        for (&c, d) in &deltas {
            let residual = &self.residuals[c];
            for t in submasks(residual.free) {
                let m = mask_sum(d, t);
                if m > 0 {
                    delta = delta.min(residual.slack[t].div_euclid(m));
                }
            }
        }
        if delta <= 0 {
            return 0;
        }

        self.source_flow[start] += delta;
        self.sink_flow[end] += delta;
        for (&c, d) in &deltas {
            let residual = &mut self.residuals[c];
            for (phi, &dp) in residual.phi.iter_mut().zip(d) {
                *phi += delta * dp;
            }
            for (t, slack) in residual.slack.iter_mut().enumerate() {
                *slack -= delta * mask_sum(d, t);
            }
        }
        log::trace!("pushed {} from node {} to node {} across {} cliques", delta, start, end, deltas.len());
        delta
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> u64 {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            self.0 >> 33
        }

        fn range(&mut self, lo: i64, hi: i64) -> i64 {
            lo + (self.next() % (hi - lo) as u64) as i64
        }
    }

    /// Cut function + concave cardinality + modular + offset: always submodular.
    fn submodular_table(rng: &mut Lcg, k: usize) -> Vec<Energy> {
        let offset = rng.range(-3, 4);
        let slope = rng.range(0, 4);
        let cap = rng.range(0, 6);
        let weights: Vec<Vec<Energy>> = (0..k).map(|_| (0..k).map(|_| rng.range(0, 4)).collect()).collect();
        let modular: Vec<Energy> = (0..k).map(|_| rng.range(-4, 5)).collect();
        (0..(1usize << k))
            .map(|t| {
                let mut cut = 0;
                for p in 0..k {
                    for q in (p + 1)..k {
                        if ((t >> p) ^ (t >> q)) & 1 == 1 {
                            cut += weights[p][q];
                        }
                    }
                }
                let c = t.count_ones() as Energy;
                offset + cut + (c * slope).min(cap) + mask_sum(&modular, t)
            })
            .collect()
    }

    fn random_instance(rng: &mut Lcg, n: usize) -> AugmentingFlow {
        let mut flow = AugmentingFlow::new();
        flow.add_node(n);
        for i in 0..n {
            let (e0, e1) = (rng.range(0, 10), rng.range(0, 10));
            flow.add_unary_term(i, e0, e1);
        }
        let num_cliques = rng.range(1, 4) as usize;
        for _ in 0..num_cliques {
            let k = rng.range(2, n.min(4) as i64 + 1) as usize;
            let mut pool: Vec<NodeId> = (0..n).collect();
            let mut nodes = Vec::new();
            for _ in 0..k {
                let idx = rng.range(0, pool.len() as i64) as usize;
                nodes.push(pool.swap_remove(idx));
            }
            let table = submodular_table(rng, k);
            flow.add_clique(&nodes, table).unwrap();
        }
        flow.params_mut().fixed_vars = (0..n).map(|_| rng.range(0, 4) == 0).collect();
        flow
    }

    fn brute_force_min(flow: &AugmentingFlow) -> Energy {
        let n = flow.num_nodes();
        (0..(1usize << n))
            .filter(|s| (0..n).all(|i| !flow.is_fixed(i) || (s >> i) & 1 == 0))
            .map(|s| {
                let labels: Vec<bool> = (0..n).map(|i| (s >> i) & 1 == 1).collect();
                flow.evaluate(&labels)
            })
            .min()
            .unwrap()
    }

    #[test]
    fn test_pairwise_min_cut() {
        let mut flow = AugmentingFlow::new();
        flow.add_node(2);
        flow.add_unary_term(0, 5, 0);
        flow.add_unary_term(1, 0, 1);
        flow.add_clique(&[0, 1], vec![0, 3, 3, 0]).unwrap();
        // 00 → 5, 10 → 3, 01 → 9, 11 → 1
        assert_eq!(flow.solve().unwrap(), 1);
        assert!(flow.label(0));
        assert!(flow.label(1));
    }

    #[test]
    fn test_fixed_nodes_stay_at_zero() {
        let mut flow = AugmentingFlow::new();
        flow.add_node(2);
        flow.add_unary_term(0, 5, 0);
        flow.add_unary_term(1, 5, 0);
        flow.add_clique(&[0, 1], vec![0, 3, 3, 0]).unwrap();
        flow.params_mut().fixed_vars = vec![false, true];
        // node 1 pinned to 0: 00 → 10, 10 → 8
        assert_eq!(flow.solve().unwrap(), 8);
        assert!(flow.label(0));
        assert!(!flow.label(1));
    }

    #[test]
    fn test_add_clique_validates_table() {
        let mut flow = AugmentingFlow::new();
        flow.add_node(3);
        assert_eq!(
            flow.add_clique(&[0, 1], vec![0; 3]),
            Err(SospdError::EnergyTableSize { clique: 0, expected: 4, got: 3 })
        );
        assert_eq!(
            flow.add_clique(&[0, 3], vec![0; 4]),
            Err(SospdError::VariableOutOfRange { var: 3, num_vars: 3 })
        );
        assert_eq!(flow.add_clique(&[], vec![0]), Err(SospdError::EmptyClique { clique: 0 }));
        assert_eq!(flow.add_clique(&[0, 1, 2], vec![0; 8]), Ok(0));
    }

    #[test]
    fn test_matches_brute_force_on_random_submodular_instances() {
        let mut rng = Lcg(0x5eed);
        for round in 0..300 {
            let n = rng.range(2, 8) as usize;
            let mut flow = random_instance(&mut rng, n);
            let expected = brute_force_min(&flow);
            let got = flow.solve().unwrap();
            assert_eq!(got, expected, "round {}", round);
            for i in 0..n {
                if flow.is_fixed(i) {
                    assert!(!flow.label(i), "round {}: fixed node {} moved", round, i);
                }
            }
        }
    }

    #[test]
    fn test_alpha_bounded_by_table() {
        let mut rng = Lcg(42);
        for round in 0..200 {
            let n = rng.range(2, 7) as usize;
            let mut flow = random_instance(&mut rng, n);
            flow.solve().unwrap();
            for clique in flow.cliques() {
                let free = clique
                    .nodes()
                    .iter()
                    .enumerate()
                    .filter(|&(_, &v)| !flow.is_fixed(v))
                    .fold(0usize, |m, (p, _)| m | (1 << p));
                let table = clique.energy_table();
                for t in submasks(free) {
                    let alpha = mask_sum(clique.alpha_ci(), t);
                    assert!(
                        alpha <= table[t] - table[0],
                        "round {}: alpha {} exceeds {} on mask {:#b}",
                        round,
                        alpha,
                        table[t] - table[0],
                        t
                    );
                }
            }
        }
    }
}
