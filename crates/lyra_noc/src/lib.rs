//! Network-on-Chip placement cost engine for the Lyra FPGA toolchain.
//!
//! The simulated-annealing placer optimizes where logical router clusters
//! land on the physical NoC. This crate owns everything NoC-specific the
//! placer needs per step: coherent per-flow routes and per-link bandwidth
//! usage, the four normalized cost terms driving the acceptance test, and
//! fast delta evaluation with O(touched) commit and revert.
//!
//! # Per-step protocol
//!
//! 1. **Propose** — [`move_gen::propose_router_swap`] picks a movable router
//!    cluster and a destination within the annealer's range limit.
//! 2. **Evaluate** — [`NocCostHandler::evaluate_delta`] re-routes the
//!    affected traffic flows and returns the change in all four cost terms.
//! 3. **Commit or revert** — the annealer accepts
//!    ([`NocCostHandler::commit`]) or rejects
//!    ([`NocCostHandler::revert`]) the speculative move.
//!
//! Every N steps the placer calls
//! [`NocCostHandler::recompute_from_scratch`] to reconcile its running
//! totals with the cached per-entity costs, and in debug audits
//! [`NocCostHandler::check_placement`] re-routes the whole design from
//! scratch. [`cdg::routing_has_cycle`] gates routing decisions on
//! deadlock-freedom of the channel-dependency graph, and
//! [`writer::write_placement`] emits the final cluster→router mapping.
//!
//! # Usage
//!
//! ```ignore
//! let mut handler = NocCostHandler::new(&model, &flows, &block_locs, &opts)?;
//! let mut totals = handler.initial_routing(&block_locs, None);
//! let factors = cost::update_norm_factors(&totals);
//!
//! let moves = move_gen::propose_router_swap(rlim, &flows, &block_locs, &model, &mut rng)?;
//! apply(&mut block_locs, &moves);
//! let delta = handler.evaluate_delta(&moves, &block_locs);
//! if accept(delta, &factors) {
//!     handler.commit();
//!     totals += delta;
//! } else {
//!     handler.revert(&moves);
//!     undo(&mut block_locs, &moves);
//! }
//! ```

#![warn(missing_docs)]

pub mod cdg;
pub mod cost;
pub mod handler;
pub mod ids;
pub mod location;
pub mod model;
pub mod move_gen;
pub mod options;
pub mod routing;
pub mod traffic;
pub mod writer;

pub use cdg::{routing_has_cycle, ChannelDependencyGraph};
pub use cost::{NocCostNormFactors, NocCostTerms};
pub use handler::{FlowCostTerms, NocCostHandler};
pub use ids::{ClusterBlockId, NocLinkId, NocRouterId, TrafficFlowId};
pub use location::{BlockLocation, BlockLocations, Region};
pub use model::{GridLocation, NocLink, NocModel, NocRouter};
pub use move_gen::{MoveTransaction, MovedBlock, ProposalAborted};
pub use options::NocOptions;
pub use routing::{create_flow_router, BfsRouting, FlowRouter, XyRouting};
pub use traffic::{TrafficFlow, TrafficFlowStorage};
