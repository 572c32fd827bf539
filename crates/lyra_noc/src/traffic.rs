//! Traffic flows and their association with router cluster blocks.
//!
//! A traffic flow is a directed source→sink communication demand between two
//! logical router clusters. [`TrafficFlowStorage`] owns all flows and the
//! precomputed cluster→flows association the re-route coordinator walks when
//! a router block moves.

use crate::ids::{ClusterBlockId, TrafficFlowId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single traffic flow between two router clusters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficFlow {
    /// The unique ID of this flow.
    pub id: TrafficFlowId,
    /// The logical cluster block injecting the traffic.
    pub source_router_cluster: ClusterBlockId,
    /// The logical cluster block receiving the traffic.
    pub sink_router_cluster: ClusterBlockId,
    /// The bandwidth demand of this flow, in bits per second.
    pub bandwidth: f64,
    /// The importance of this flow relative to other flows.
    pub priority: i32,
    /// The latency constraint on this flow, in seconds.
    pub max_latency: f64,
}

/// Storage for all traffic flows plus the cluster→flows association.
///
/// Flows are handed out by dense [`TrafficFlowId`]; the association lists
/// keep insertion order so that iteration over a router's flows is
/// deterministic for a given netlist.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrafficFlowStorage {
    /// All traffic flows, indexed by [`TrafficFlowId`].
    flows: Vec<TrafficFlow>,
    /// Router clusters in first-seen order.
    router_clusters: Vec<ClusterBlockId>,
    /// Display names per router cluster, parallel to `router_clusters`.
    cluster_names: Vec<String>,
    /// Auxiliary index: cluster to flows it participates in (rebuilt on deserialization).
    #[serde(skip)]
    associated_flows: HashMap<ClusterBlockId, Vec<TrafficFlowId>>,
    /// Auxiliary index: cluster to its slot in `router_clusters` (rebuilt on deserialization).
    #[serde(skip)]
    cluster_index: HashMap<ClusterBlockId, usize>,
}

impl TrafficFlowStorage {
    /// Creates empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a traffic flow and returns its ID.
    ///
    /// Registers both endpoints as router clusters (first occurrence decides
    /// the `router_clusters()` order) and appends the flow to each endpoint's
    /// association list.
    pub fn add_flow(
        &mut self,
        source_router_cluster: ClusterBlockId,
        sink_router_cluster: ClusterBlockId,
        bandwidth: f64,
        priority: i32,
        max_latency: f64,
    ) -> TrafficFlowId {
        let id = TrafficFlowId::from_raw(self.flows.len() as u32);
        self.flows.push(TrafficFlow {
            id,
            source_router_cluster,
            sink_router_cluster,
            bandwidth,
            priority,
            max_latency,
        });

        self.register_cluster(source_router_cluster);
        self.register_cluster(sink_router_cluster);

        self.associated_flows
            .entry(source_router_cluster)
            .or_default()
            .push(id);
        if sink_router_cluster != source_router_cluster {
            self.associated_flows
                .entry(sink_router_cluster)
                .or_default()
                .push(id);
        }

        id
    }

    fn register_cluster(&mut self, cluster: ClusterBlockId) {
        if !self.cluster_index.contains_key(&cluster) {
            self.cluster_index
                .insert(cluster, self.router_clusters.len());
            self.router_clusters.push(cluster);
            self.cluster_names
                .push(format!("noc_router_{}", cluster.as_raw()));
        }
    }

    /// Sets the display name of a router cluster (used by the placement writer).
    ///
    /// The cluster must already participate in at least one flow.
    pub fn set_cluster_name(&mut self, cluster: ClusterBlockId, name: impl Into<String>) {
        let slot = self.cluster_index[&cluster];
        self.cluster_names[slot] = name.into();
    }

    /// Returns the display name of a router cluster.
    pub fn cluster_name(&self, cluster: ClusterBlockId) -> &str {
        &self.cluster_names[self.cluster_index[&cluster]]
    }

    /// Returns the number of traffic flows.
    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    /// Iterates all flow IDs in ascending order.
    pub fn flow_ids(&self) -> impl Iterator<Item = TrafficFlowId> + '_ {
        (0..self.flows.len()).map(|i| TrafficFlowId::from_raw(i as u32))
    }

    /// Returns the flow with the given ID.
    pub fn flow(&self, id: TrafficFlowId) -> &TrafficFlow {
        &self.flows[id.index()]
    }

    /// Returns whether the given cluster block is a router cluster
    /// (participates in at least one traffic flow).
    pub fn is_router_cluster(&self, cluster: ClusterBlockId) -> bool {
        self.cluster_index.contains_key(&cluster)
    }

    /// Returns the flows the given cluster participates in, source- or
    /// sink-side, in insertion order. Empty for non-router clusters.
    pub fn associated_flows(&self, cluster: ClusterBlockId) -> &[TrafficFlowId] {
        self.associated_flows
            .get(&cluster)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns all router clusters in first-seen order.
    pub fn router_clusters(&self) -> &[ClusterBlockId] {
        &self.router_clusters
    }

    /// Rebuilds auxiliary indices after deserialization.
    pub fn rebuild_indices(&mut self) {
        self.cluster_index.clear();
        for (i, &cluster) in self.router_clusters.iter().enumerate() {
            self.cluster_index.insert(cluster, i);
        }
        self.associated_flows.clear();
        for flow in &self.flows {
            self.associated_flows
                .entry(flow.source_router_cluster)
                .or_default()
                .push(flow.id);
            if flow.sink_router_cluster != flow.source_router_cluster {
                self.associated_flows
                    .entry(flow.sink_router_cluster)
                    .or_default()
                    .push(flow.id);
            }
        }
    }
}
