//! Pluggable single-flow routing algorithms.
//!
//! The cost engine never routes a flow itself; it delegates to a
//! [`FlowRouter`] chosen by name from the placement options. Routers write
//! the found path into a caller-owned link vector so the engine's route
//! slots can be reused without reallocation.

mod bfs;
mod xy;

pub use bfs::BfsRouting;
pub use xy::XyRouting;

use crate::ids::{NocLinkId, NocRouterId, TrafficFlowId};
use crate::model::NocModel;

/// A single-flow routing algorithm.
///
/// Implementations must overwrite `route` with a loop-free path from
/// `source` to `sink`; they are assumed total on the topologies supplied.
pub trait FlowRouter {
    /// Routes one traffic flow between two physical routers.
    ///
    /// `route` is cleared and refilled with the links of the found path in
    /// traversal order. Routing a router to itself produces an empty route.
    fn route_flow(
        &mut self,
        source: NocRouterId,
        sink: NocRouterId,
        flow: TrafficFlowId,
        route: &mut Vec<NocLinkId>,
        model: &NocModel,
    );
}

/// The routing algorithm name was not recognized.
#[derive(Debug, thiserror::Error)]
#[error("unknown NoC routing algorithm '{name}' (expected 'xy_routing' or 'bfs_routing')")]
pub struct UnknownRoutingAlgorithm {
    /// The name that failed to resolve.
    pub name: String,
}

/// Creates a flow router from its option-string name.
///
/// Recognized names: `"xy_routing"` (dimension-ordered, mesh grids) and
/// `"bfs_routing"` (minimal-hop, arbitrary topologies).
pub fn create_flow_router(name: &str) -> Result<Box<dyn FlowRouter>, UnknownRoutingAlgorithm> {
    match name {
        "xy_routing" => Ok(Box::new(XyRouting)),
        "bfs_routing" => Ok(Box::new(BfsRouting)),
        _ => Err(UnknownRoutingAlgorithm {
            name: name.to_string(),
        }),
    }
}
