//! Placement output writer.
//!
//! Emits the final NoC placement as plain ASCII, one router cluster per
//! line: the cluster name, the layer it was placed on, and the ID of the
//! physical router it was mapped to. The record order follows the
//! traffic-flow storage's router-cluster order, so output is deterministic
//! for a given netlist.

use crate::location::BlockLocations;
use crate::model::NocModel;
use crate::traffic::TrafficFlowStorage;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Writes the placement of every router cluster to `out`.
///
/// Each record is `<name> <layer> <physical_router_id>` followed by a
/// newline; no header and no trailing blank line.
pub fn write_placement<W: Write>(
    out: &mut W,
    flows: &TrafficFlowStorage,
    block_locs: &BlockLocations,
    model: &NocModel,
) -> io::Result<()> {
    for &cluster in flows.router_clusters() {
        let name = flows.cluster_name(cluster);
        let loc = block_locs.location(cluster).loc;
        let router = model.router_at_location(loc);
        writeln!(out, "{} {} {}", name, loc.layer, router.as_raw())?;
    }
    Ok(())
}

/// Writes the placement of every router cluster to a file at `path`.
pub fn write_placement_file(
    path: &Path,
    flows: &TrafficFlowStorage,
    block_locs: &BlockLocations,
    model: &NocModel,
) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write_placement(&mut out, flows, block_locs, model)?;
    out.flush()
}
