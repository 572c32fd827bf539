//! Cluster block locations and floorplan region constraints.
//!
//! [`BlockLocations`] is the read-mostly provider mapping each cluster block
//! to its current grid location. The annealer mutates it between
//! transactions; the cost handler only reads it and verifies at construction
//! that it keeps being handed the same provider instance.

use crate::ids::ClusterBlockId;
use crate::model::GridLocation;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The placement state of a single cluster block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockLocation {
    /// The grid location the block currently occupies.
    pub loc: GridLocation,
    /// Whether the block is pinned and must not be moved.
    pub is_fixed: bool,
}

/// An inclusive rectangular floorplan region on a single layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Lowest legal x coordinate.
    pub x_low: i32,
    /// Lowest legal y coordinate.
    pub y_low: i32,
    /// Highest legal x coordinate.
    pub x_high: i32,
    /// Highest legal y coordinate.
    pub y_high: i32,
    /// The layer the region lives on, or `None` for any layer.
    pub layer: Option<i32>,
}

impl Region {
    /// Returns whether the given location falls inside this region.
    pub fn contains(&self, loc: GridLocation) -> bool {
        let layer_ok = self.layer.map_or(true, |layer| layer == loc.layer);
        layer_ok
            && loc.x >= self.x_low
            && loc.x <= self.x_high
            && loc.y >= self.y_low
            && loc.y <= self.y_high
    }
}

/// The block-location provider: cluster block → current location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockLocations {
    locations: HashMap<ClusterBlockId, BlockLocation>,
    regions: HashMap<ClusterBlockId, Region>,
}

impl BlockLocations {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Places (or re-places) a block at the given location.
    pub fn place(&mut self, block: ClusterBlockId, loc: GridLocation, is_fixed: bool) {
        self.locations.insert(block, BlockLocation { loc, is_fixed });
    }

    /// Moves a block to a new location, keeping its fixed flag.
    ///
    /// Panics if the block has never been placed.
    pub fn set_location(&mut self, block: ClusterBlockId, loc: GridLocation) {
        let entry = self
            .locations
            .get_mut(&block)
            .expect("block must be placed before it can be moved");
        entry.loc = loc;
    }

    /// Returns the placement state of a block.
    ///
    /// Panics if the block has never been placed.
    pub fn location(&self, block: ClusterBlockId) -> BlockLocation {
        self.locations[&block]
    }

    /// Constrains a block to a floorplan region.
    pub fn set_region(&mut self, block: ClusterBlockId, region: Region) {
        self.regions.insert(block, region);
    }

    /// Returns whether placing the block at the given location satisfies its
    /// floorplan region constraint (trivially true for unconstrained blocks).
    pub fn region_legal(&self, block: ClusterBlockId, loc: GridLocation) -> bool {
        self.regions.get(&block).map_or(true, |r| r.contains(loc))
    }

    /// Returns the number of placed blocks.
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Returns whether no block has been placed yet.
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}
