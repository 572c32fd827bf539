//! Dimension-ordered (XY) routing for mesh grids.
//!
//! Moves along x until the target column is reached, then along y, then
//! across layers. Deadlock-free on meshes because every turn goes from a
//! higher-priority dimension to a lower one. Candidate links are scanned in
//! ascending link-ID order, so tie-breaks are deterministic.

use crate::ids::{NocLinkId, NocRouterId, TrafficFlowId};
use crate::model::{GridLocation, NocModel};
use crate::routing::FlowRouter;

/// Dimension-ordered XY routing.
#[derive(Debug, Clone, Copy, Default)]
pub struct XyRouting;

impl FlowRouter for XyRouting {
    fn route_flow(
        &mut self,
        source: NocRouterId,
        sink: NocRouterId,
        _flow: TrafficFlowId,
        route: &mut Vec<NocLinkId>,
        model: &NocModel,
    ) {
        route.clear();
        let target = model.router(sink).location;

        let mut current = source;
        while current != sink {
            let here = model.router(current).location;
            match next_link(model, current, here, target) {
                Some(link_id) => {
                    route.push(link_id);
                    current = model.link(link_id).sink;
                }
                // No link makes progress in the required dimension; the grid
                // is not a mesh along this axis. Leave the route empty.
                None => {
                    route.clear();
                    return;
                }
            }
        }
    }
}

/// Picks the lowest-ID outgoing link that makes progress in the highest-
/// priority dimension still differing from the target (x, then y, then layer).
fn next_link(
    model: &NocModel,
    current: NocRouterId,
    here: GridLocation,
    target: GridLocation,
) -> Option<NocLinkId> {
    for &link_id in model.outgoing_links(current) {
        let step = model.router(model.link(link_id).sink).location;
        let good = if here.x != target.x {
            step.y == here.y && step.layer == here.layer && toward(here.x, step.x, target.x)
        } else if here.y != target.y {
            step.x == here.x && step.layer == here.layer && toward(here.y, step.y, target.y)
        } else {
            step.x == here.x && step.y == here.y && toward(here.layer, step.layer, target.layer)
        };
        if good {
            return Some(link_id);
        }
    }
    None
}

/// Returns whether moving from `here` to `step` strictly reduces the
/// remaining distance to `target` along one axis.
fn toward(here: i32, step: i32, target: i32) -> bool {
    (target - step).abs() < (target - here).abs() && (step - here).signum() == (target - here).signum()
}
