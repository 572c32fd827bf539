//! Minimal-hop routing via breadth-first search.
//!
//! Works on arbitrary topologies (meshes, rings, tori) because it only
//! follows the model's link adjacency. Among equal-hop paths the search is
//! deterministic: neighbors expand in ascending link-ID order, so the first
//! parent recorded for a router is the one reached through the lowest link.

use crate::ids::{NocLinkId, NocRouterId, TrafficFlowId};
use crate::model::NocModel;
use crate::routing::FlowRouter;
use std::collections::VecDeque;

/// Breadth-first minimal-hop routing.
#[derive(Debug, Clone, Copy, Default)]
pub struct BfsRouting;

impl FlowRouter for BfsRouting {
    fn route_flow(
        &mut self,
        source: NocRouterId,
        sink: NocRouterId,
        _flow: TrafficFlowId,
        route: &mut Vec<NocLinkId>,
        model: &NocModel,
    ) {
        route.clear();
        if source == sink {
            return;
        }

        // Parent link of each router in the BFS tree; also marks "visited".
        let mut parent: Vec<Option<NocLinkId>> = vec![None; model.router_count()];
        let mut queue = VecDeque::new();
        queue.push_back(source);

        'search: while let Some(current) = queue.pop_front() {
            for &link_id in model.outgoing_links(current) {
                let next = model.link(link_id).sink;
                if next == source || parent[next.index()].is_some() {
                    continue;
                }
                parent[next.index()] = Some(link_id);
                if next == sink {
                    break 'search;
                }
                queue.push_back(next);
            }
        }

        // Walk parent links back from the sink.
        let mut current = sink;
        while current != source {
            match parent[current.index()] {
                Some(link_id) => {
                    route.push(link_id);
                    current = model.link(link_id).source;
                }
                None => {
                    // Sink unreachable; leave the route empty.
                    route.clear();
                    return;
                }
            }
        }
        route.reverse();
    }
}
