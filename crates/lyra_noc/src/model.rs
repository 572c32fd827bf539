//! The fixed NoC topology used throughout placement.
//!
//! Defines the physical routers, the directed links connecting them, and the
//! coarse latency defaults. The model is built once from the architecture
//! description and is read-only for the whole placement run; the cost engine
//! only ever indexes into it.

use crate::ids::{NocLinkId, NocRouterId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A location on the device grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridLocation {
    /// Horizontal grid coordinate.
    pub x: i32,
    /// Vertical grid coordinate.
    pub y: i32,
    /// Die layer (0 for single-die devices).
    pub layer: i32,
}

impl GridLocation {
    /// Creates a grid location.
    pub fn new(x: i32, y: i32, layer: i32) -> Self {
        Self { x, y, layer }
    }
}

/// A physical router at a fixed grid location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NocRouter {
    /// The unique ID of this router.
    pub id: NocRouterId,
    /// The grid location this router occupies.
    pub location: GridLocation,
    /// The traversal latency through this router, in seconds.
    pub latency: f64,
}

/// A directed link between two routers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NocLink {
    /// The unique ID of this link.
    pub id: NocLinkId,
    /// The router this link leaves from.
    pub source: NocRouterId,
    /// The router this link arrives at.
    pub sink: NocRouterId,
    /// The bandwidth capacity of this link, in bits per second.
    pub bandwidth: f64,
    /// The traversal latency of this link, in seconds.
    pub latency: f64,
}

/// The fixed NoC topology: routers, links, and latency defaults.
///
/// Per-entity latencies are optional refinements: when no router (or link)
/// carries an individual latency, the corresponding `detailed_*` flag stays
/// `false` and cost kernels fall back to the coarse default latency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NocModel {
    /// All physical routers, indexed by [`NocRouterId`].
    routers: Vec<NocRouter>,
    /// All directed links, indexed by [`NocLinkId`].
    links: Vec<NocLink>,
    /// Coarse traversal latency used when `detailed_router_latency` is off.
    default_router_latency: f64,
    /// Coarse traversal latency used when `detailed_link_latency` is off.
    default_link_latency: f64,
    /// Whether any router carries an individual latency.
    detailed_router_latency: bool,
    /// Whether any link carries an individual latency.
    detailed_link_latency: bool,
    /// Auxiliary index: outgoing links per router (rebuilt on deserialization).
    #[serde(skip)]
    outgoing: Vec<Vec<NocLinkId>>,
    /// Auxiliary index: grid location to router (rebuilt on deserialization).
    #[serde(skip)]
    router_by_location: HashMap<GridLocation, NocRouterId>,
}

impl NocModel {
    /// Creates an empty model with the given coarse latency defaults.
    pub fn new(default_router_latency: f64, default_link_latency: f64) -> Self {
        Self {
            routers: Vec::new(),
            links: Vec::new(),
            default_router_latency,
            default_link_latency,
            detailed_router_latency: false,
            detailed_link_latency: false,
            outgoing: Vec::new(),
            router_by_location: HashMap::new(),
        }
    }

    /// Adds a router with the coarse default latency and returns its ID.
    pub fn add_router(&mut self, location: GridLocation) -> NocRouterId {
        let latency = self.default_router_latency;
        self.push_router(location, latency)
    }

    /// Adds a router with an individual latency and returns its ID.
    ///
    /// Switches the model to detailed router latencies.
    pub fn add_router_with_latency(&mut self, location: GridLocation, latency: f64) -> NocRouterId {
        self.detailed_router_latency = true;
        self.push_router(location, latency)
    }

    fn push_router(&mut self, location: GridLocation, latency: f64) -> NocRouterId {
        let id = NocRouterId::from_raw(self.routers.len() as u32);
        self.routers.push(NocRouter {
            id,
            location,
            latency,
        });
        self.outgoing.push(Vec::new());
        self.router_by_location.insert(location, id);
        id
    }

    /// Adds a directed link with the coarse default latency and returns its ID.
    pub fn add_link(
        &mut self,
        source: NocRouterId,
        sink: NocRouterId,
        bandwidth: f64,
    ) -> NocLinkId {
        let latency = self.default_link_latency;
        self.push_link(source, sink, bandwidth, latency)
    }

    /// Adds a directed link with an individual latency and returns its ID.
    ///
    /// Switches the model to detailed link latencies.
    pub fn add_link_with_latency(
        &mut self,
        source: NocRouterId,
        sink: NocRouterId,
        bandwidth: f64,
        latency: f64,
    ) -> NocLinkId {
        self.detailed_link_latency = true;
        self.push_link(source, sink, bandwidth, latency)
    }

    fn push_link(
        &mut self,
        source: NocRouterId,
        sink: NocRouterId,
        bandwidth: f64,
        latency: f64,
    ) -> NocLinkId {
        let id = NocLinkId::from_raw(self.links.len() as u32);
        self.links.push(NocLink {
            id,
            source,
            sink,
            bandwidth,
            latency,
        });
        self.outgoing[source.index()].push(id);
        id
    }

    /// Returns the router with the given ID.
    pub fn router(&self, id: NocRouterId) -> &NocRouter {
        &self.routers[id.index()]
    }

    /// Returns the link with the given ID.
    pub fn link(&self, id: NocLinkId) -> &NocLink {
        &self.links[id.index()]
    }

    /// Returns the number of routers.
    pub fn router_count(&self) -> usize {
        self.routers.len()
    }

    /// Returns the number of links.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Iterates all router IDs in ascending order.
    pub fn router_ids(&self) -> impl Iterator<Item = NocRouterId> + '_ {
        (0..self.routers.len()).map(|i| NocRouterId::from_raw(i as u32))
    }

    /// Iterates all link IDs in ascending order.
    pub fn link_ids(&self) -> impl Iterator<Item = NocLinkId> + '_ {
        (0..self.links.len()).map(|i| NocLinkId::from_raw(i as u32))
    }

    /// Returns all routers in ID order.
    pub fn routers(&self) -> &[NocRouter] {
        &self.routers
    }

    /// Returns the links leaving the given router, in ascending link-ID order.
    pub fn outgoing_links(&self, router: NocRouterId) -> &[NocLinkId] {
        &self.outgoing[router.index()]
    }

    /// Returns the router occupying the given grid location.
    ///
    /// Panics if no router exists there; callers only query locations that
    /// hold router tiles.
    pub fn router_at_location(&self, location: GridLocation) -> NocRouterId {
        self.router_by_location[&location]
    }

    /// Returns whether a router exists at the given grid location.
    pub fn has_router_at_location(&self, location: GridLocation) -> bool {
        self.router_by_location.contains_key(&location)
    }

    /// Returns the coarse router traversal latency.
    pub fn default_router_latency(&self) -> f64 {
        self.default_router_latency
    }

    /// Returns the coarse link traversal latency.
    pub fn default_link_latency(&self) -> f64 {
        self.default_link_latency
    }

    /// Returns whether per-router latencies are in effect.
    pub fn detailed_router_latency(&self) -> bool {
        self.detailed_router_latency
    }

    /// Returns whether per-link latencies are in effect.
    pub fn detailed_link_latency(&self) -> bool {
        self.detailed_link_latency
    }

    /// Rebuilds auxiliary indices after deserialization.
    pub fn rebuild_indices(&mut self) {
        self.outgoing = vec![Vec::new(); self.routers.len()];
        for link in &self.links {
            self.outgoing[link.source.index()].push(link.id);
        }
        self.router_by_location.clear();
        for router in &self.routers {
            self.router_by_location.insert(router.location, router.id);
        }
    }
}
