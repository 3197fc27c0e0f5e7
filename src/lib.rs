//! # sospd-core
//!
//! Sum-of-Submodular Primal-Dual (SoSPD) minimisation of higher-order multi-label energies.
//!
//! ---
//!
//! ## What it minimises
//!
//! ```text
//! E(x) = Σ_i unary(i, x_i) + Σ_C f_C(x_C)
//! ```
//!
//! over labelings `x` of discrete variables, where every clique `C` is small
//! (at most 32 members) and its energy `f_C` is an arbitrary non-negative
//! integer function of its members' labels.
//!
//! **Fusion moves**: each iteration proposes an alternative labeling and asks,
//! per variable, "stay or switch?". The answer is a binary problem over the
//! same cliques.
//!
//! **Submodular flow**: when every clique's fusion energy is submodular, that
//! binary problem is a min cut. The flow oracle solves it and also reports how
//! much flow each clique pushed through each member.
//!
//! **Primal-dual bookkeeping**: those flows grow a dual certificate (one value
//! per clique, member and label) that stays tight at the current labeling. The
//! dual feeds the per-variable heights that steer the next proposal and give a
//! lower bound.
//!
//! ---
//!
//! ## The pipeline
//!
//! ```text
//! EnergyModel ──► Sospd ──► ProposalStrategy ──► fusion table (Gray code)
//!                   ▲                                   │
//!                   │                                   ▼
//!          dual + heights ◄── alpha_ci ◄── SubmodularFlow::solve
//! ```
//!
//! ## Module overview
//!
//! | Module | Key types | What it does |
//! |--------|-----------|--------------|
//! | [`energy`] | [`EnergyModel`], [`Clique`], [`MultilabelEnergy`] | Variables, labels, unary costs and cliques |
//! | [`flow`] | [`SubmodularFlow`], [`AugmentingFlow`] | Binary sum-of-submodular min cut with per-clique flows |
//! | [`dual`] | [`DualTable`], [`HeightTable`] | Dual arena and height table |
//! | [`residual`] | [`residual::fill_fusion_table`] | Gray-code fusion tables minus the linear dual term |
//! | [`proposal`] | [`ProposalStrategy`] | Cyclic, height-weighted and custom alpha expansions |
//! | [`sospd`] | [`Sospd`], [`SospdConfig`] | The primal-dual outer loop |
//! | [`bound`] | [`Sospd::lower_bound`] | Dual lower bound for 3-member cliques |
//! | `snapshot` | `SospdSnapshot` | Serialisable solver state (requires `serde` feature) |
//! | [`error`] | [`SospdError`] | Precondition and invariant failures |
//!
//! ## Example
//!
//! ```rust
//! use sospd_core::{MultilabelEnergy, PottsClique, Sospd, SolverState};
//!
//! let mut energy = MultilabelEnergy::new(2)?;
//! energy.add_vars(2);
//! energy.add_unary_term(0, &[0, 5])?;
//! energy.add_unary_term(1, &[5, 0])?;
//! energy.add_clique(Box::new(PottsClique::new(vec![0, 1], 3)))?;
//!
//! let mut solver = Sospd::new(&energy);
//! let outcome = solver.solve()?;
//! assert_eq!(outcome.state, SolverState::Converged);
//! assert_eq!(solver.current_energy(), Some(3));
//! # Ok::<(), sospd_core::SospdError>(())
//! ```
//!
//! ## `no_std`
//!
//! This crate is `#![no_std]` by default and needs only `alloc`. Enable the
//! `std` feature to link the standard library. Enable the `serde` feature for
//! serialisation support (required for `snapshot::SospdSnapshot`).
//!
//! ## Logging
//!
//! Diagnostics go through the [`log`] facade. Install any logger to see
//! per-iteration summaries (`debug`), convergence (`info`) and the full dump
//! that precedes an invariant error (`error`).
//!
//! ## License
//!
//! Business Source License 1.1.

#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod bound;
pub mod dual;
pub mod energy;
pub mod error;
pub mod flow;
pub mod proposal;
pub mod residual;
#[cfg(feature = "serde")]
pub mod snapshot;
pub mod sospd;

pub use dual::{DualTable, EvenSplit, HeightTable};
pub use energy::{
    Clique, Energy, EnergyModel, FnClique, Label, LabelBuf, MultilabelEnergy, PottsClique, VarId,
    MAX_CLIQUE_SIZE,
};
pub use error::{SospdError, SospdResult};
pub use flow::{AugmentingFlow, FlowClique, FlowParams, NodeId, SubmodularFlow};
pub use proposal::{ProposalCallback, ProposalKind, ProposalStrategy};
pub use sospd::{SolveOutcome, SolverState, Sospd, SospdConfig};
