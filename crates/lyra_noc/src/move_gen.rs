//! Router-block move proposal for the annealer.
//!
//! Randomly selects a movable router cluster and a compatible destination
//! within the annealer's range limit, producing a [`MoveTransaction`] the
//! cost handler can evaluate. A proposal can abort for several reasons; the
//! annealer treats an abort as a skipped move, not an error.

use crate::ids::ClusterBlockId;
use crate::location::BlockLocations;
use crate::model::{GridLocation, NocModel};
use crate::traffic::TrafficFlowStorage;
use rand::Rng;

/// A single block relocation within a move transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovedBlock {
    /// The cluster block being moved.
    pub block: ClusterBlockId,
    /// Where the block currently is.
    pub from: GridLocation,
    /// Where the block is proposed to go.
    pub to: GridLocation,
}

/// A proposed move: one or more block relocations evaluated atomically.
///
/// A router swap relocates the chosen block and, when the destination is
/// occupied by another router cluster, relocates the occupant back to the
/// vacated location.
#[derive(Debug, Clone, Default)]
pub struct MoveTransaction {
    /// The blocks this move relocates.
    pub moved_blocks: Vec<MovedBlock>,
}

/// Why a router-swap proposal produced no move.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProposalAborted {
    /// The netlist contains no router clusters.
    #[error("no router clusters in the netlist")]
    NoRouterClusters,
    /// The randomly chosen router cluster is fixed in place.
    #[error("selected router cluster is fixed")]
    FixedBlock,
    /// No router tile exists within the range limit of the chosen block.
    #[error("no compatible destination within the range limit")]
    NoCompatibleLocation,
    /// The move would violate a floorplan region constraint.
    #[error("move violates a floorplan region constraint")]
    FloorplanViolation,
}

/// Decides whether the next annealer move should be a router swap.
///
/// Draws a uniform integer in `[0, 99]` and proposes a swap iff it is
/// strictly below `percent`, so the long-run fraction of router swaps
/// matches the user-supplied percentage.
pub fn should_propose_router_swap(percent: u32, rng: &mut impl Rng) -> bool {
    rng.gen_range(0..100u32) < percent
}

/// Proposes a router-block swap within distance `rlim` of the block's
/// current location.
///
/// Uniformly picks a router cluster, then uniformly picks a destination
/// among the physical router tiles within Chebyshev distance `rlim` on the
/// same layer. If the destination is occupied by another (movable) router
/// cluster the two blocks trade places.
pub fn propose_router_swap(
    rlim: f64,
    flows: &TrafficFlowStorage,
    block_locs: &BlockLocations,
    model: &NocModel,
    rng: &mut impl Rng,
) -> Result<MoveTransaction, ProposalAborted> {
    let router_clusters = flows.router_clusters();
    if router_clusters.is_empty() {
        return Err(ProposalAborted::NoRouterClusters);
    }

    let block = router_clusters[rng.gen_range(0..router_clusters.len())];
    let from = block_locs.location(block);
    if from.is_fixed {
        return Err(ProposalAborted::FixedBlock);
    }

    let to = find_to_loc_uniform(model, from.loc, rlim, rng)
        .ok_or(ProposalAborted::NoCompatibleLocation)?;

    let mut transaction = MoveTransaction {
        moved_blocks: vec![MovedBlock {
            block,
            from: from.loc,
            to,
        }],
    };

    // If another router cluster occupies the destination, it trades places
    // with the chosen block.
    if let Some(&occupant) = router_clusters
        .iter()
        .find(|&&c| c != block && block_locs.location(c).loc == to)
    {
        if block_locs.location(occupant).is_fixed {
            return Err(ProposalAborted::FixedBlock);
        }
        transaction.moved_blocks.push(MovedBlock {
            block: occupant,
            from: to,
            to: from.loc,
        });
    }

    for moved in &transaction.moved_blocks {
        if !block_locs.region_legal(moved.block, moved.to) {
            return Err(ProposalAborted::FloorplanViolation);
        }
    }

    Ok(transaction)
}

/// Uniformly picks a router tile within Chebyshev distance `rlim` of `from`
/// on the same layer, excluding `from` itself.
fn find_to_loc_uniform(
    model: &NocModel,
    from: GridLocation,
    rlim: f64,
    rng: &mut impl Rng,
) -> Option<GridLocation> {
    let range = rlim.max(1.0) as i32;

    let candidates: Vec<GridLocation> = model
        .routers()
        .iter()
        .map(|r| r.location)
        .filter(|&loc| {
            loc != from
                && loc.layer == from.layer
                && (loc.x - from.x).abs() <= range
                && (loc.y - from.y).abs() <= range
        })
        .collect();

    if candidates.is_empty() {
        return None;
    }
    Some(candidates[rng.gen_range(0..candidates.len())])
}
