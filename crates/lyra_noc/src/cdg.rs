//! Channel-dependency graph and deadlock-freedom check.
//!
//! The channel-dependency graph (CDG) has one node per NoC link and an edge
//! (a → b) whenever some committed route traverses link `a` immediately
//! followed by link `b`. The routing is deadlock-free iff the CDG is
//! acyclic. The graph is rebuilt from scratch for every query; it is cheap
//! relative to the audit cadence and avoids incremental-maintenance bugs.

use crate::ids::NocLinkId;
use crate::model::NocModel;

/// The channel-dependency graph over the current set of routes.
#[derive(Debug, Clone)]
pub struct ChannelDependencyGraph {
    /// Successor links per link, indexed by raw link ID; each list is sorted
    /// and deduplicated.
    adjacency: Vec<Vec<NocLinkId>>,
}

impl ChannelDependencyGraph {
    /// Builds the CDG induced by the given routes.
    pub fn from_routes(model: &NocModel, routes: &[Vec<NocLinkId>]) -> Self {
        let mut adjacency: Vec<Vec<NocLinkId>> = vec![Vec::new(); model.link_count()];

        for route in routes {
            for pair in route.windows(2) {
                adjacency[pair[0].index()].push(pair[1]);
            }
        }
        for successors in &mut adjacency {
            successors.sort();
            successors.dedup();
        }

        Self { adjacency }
    }

    /// Returns the number of nodes (one per link in the model).
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Returns the number of dependency edges.
    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum()
    }

    /// Returns whether the graph contains a cycle.
    ///
    /// Iterative three-color depth-first search: a back edge to a node still
    /// on the DFS stack proves a cycle.
    pub fn has_cycles(&self) -> bool {
        const UNVISITED: u8 = 0;
        const ON_STACK: u8 = 1;
        const DONE: u8 = 2;

        let mut state = vec![UNVISITED; self.adjacency.len()];

        for start in 0..self.adjacency.len() {
            if state[start] != UNVISITED {
                continue;
            }
            state[start] = ON_STACK;
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];

            while let Some(frame) = stack.last_mut() {
                let (node, child) = *frame;
                if child < self.adjacency[node].len() {
                    frame.1 += 1;
                    let next = self.adjacency[node][child].index();
                    match state[next] {
                        UNVISITED => {
                            state[next] = ON_STACK;
                            stack.push((next, 0));
                        }
                        ON_STACK => return true,
                        _ => {}
                    }
                } else {
                    state[node] = DONE;
                    stack.pop();
                }
            }
        }

        false
    }
}

/// Returns whether the given committed routes induce a cyclic channel
/// dependency (a potential deadlock).
pub fn routing_has_cycle(model: &NocModel, routes: &[Vec<NocLinkId>]) -> bool {
    ChannelDependencyGraph::from_routes(model, routes).has_cycles()
}
