//! Pure cost kernels and cost-term aggregation.
//!
//! Evaluates the quality of a NoC placement along four axes: aggregate
//! bandwidth, latency, latency-constraint overrun, and link congestion. The
//! total cost is a weighted sum of the normalized terms, used by simulated
//! annealing to guide router-block placement. All kernels are pure functions
//! over a route, the read-only model, and a flow's static attributes.

use crate::ids::NocLinkId;
use crate::model::{NocLink, NocModel};
use crate::options::NocOptions;
use crate::traffic::TrafficFlow;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

/// Sentinel marking a proposed cost slot as "not part of the current
/// transaction". Costs are nonnegative, so any negative value is safe.
pub const INVALID_COST_TERM: f64 = -1.0;

/// Latency and latency-overrun terms below this threshold are treated as
/// zero when auditing for drift (round-off can leave tiny residues).
pub const MIN_EXPECTED_LATENCY_COST: f64 = 1e-12;

/// Congestion terms below this threshold are treated as zero when auditing
/// for drift.
pub const MIN_EXPECTED_CONGESTION_COST: f64 = 1e-12;

/// Upper bound on the aggregate-bandwidth normalization factor.
pub const MAX_INV_AGGREGATE_BANDWIDTH_COST: f64 = 1.0;

/// Upper bound on the latency and latency-overrun normalization factors.
pub const MAX_INV_LATENCY_COST: f64 = 1e12;

/// Upper bound on the congestion normalization factor.
pub const MAX_INV_CONGESTION_COST: f64 = 1.0;

/// The four NoC cost terms fed to the annealer's acceptance test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NocCostTerms {
    /// Priority-weighted bandwidth × hop-count over all flows.
    pub aggregate_bandwidth: f64,
    /// Priority-weighted route latency over all flows.
    pub latency: f64,
    /// Priority-weighted latency-constraint overrun over all flows.
    pub latency_overrun: f64,
    /// Over-capacity bandwidth ratio over all links.
    pub congestion: f64,
}

impl NocCostTerms {
    /// All four terms zero.
    pub const ZERO: Self = Self {
        aggregate_bandwidth: 0.0,
        latency: 0.0,
        latency_overrun: 0.0,
        congestion: 0.0,
    };
}

impl Default for NocCostTerms {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Add for NocCostTerms {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            aggregate_bandwidth: self.aggregate_bandwidth + rhs.aggregate_bandwidth,
            latency: self.latency + rhs.latency,
            latency_overrun: self.latency_overrun + rhs.latency_overrun,
            congestion: self.congestion + rhs.congestion,
        }
    }
}

impl AddAssign for NocCostTerms {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Normalization factors rescaling each cost term to a comparable magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NocCostNormFactors {
    /// Factor for the aggregate-bandwidth term.
    pub aggregate_bandwidth: f64,
    /// Factor for the latency term.
    pub latency: f64,
    /// Factor for the latency-overrun term.
    pub latency_overrun: f64,
    /// Factor for the congestion term.
    pub congestion: f64,
}

impl Default for NocCostNormFactors {
    fn default() -> Self {
        Self {
            aggregate_bandwidth: MAX_INV_AGGREGATE_BANDWIDTH_COST,
            latency: MAX_INV_LATENCY_COST,
            latency_overrun: MAX_INV_LATENCY_COST,
            congestion: MAX_INV_CONGESTION_COST,
        }
    }
}

/// Computes the normalization factors for the given cost terms.
///
/// Each factor is `min(1/term, MAX_INV_*)`. Terms that are zero or negative
/// (overrun and congestion can round off below zero) pin their factor to the
/// upper bound, keeping early-iteration behavior well defined.
pub fn update_norm_factors(costs: &NocCostTerms) -> NocCostNormFactors {
    let aggregate_bandwidth =
        (1.0 / costs.aggregate_bandwidth).min(MAX_INV_AGGREGATE_BANDWIDTH_COST);
    let latency = (1.0 / costs.latency).min(MAX_INV_LATENCY_COST);

    let latency_overrun = if costs.latency_overrun > 0.0 {
        (1.0 / costs.latency_overrun).min(MAX_INV_LATENCY_COST)
    } else {
        MAX_INV_LATENCY_COST
    };

    let congestion = if costs.congestion > 0.0 {
        (1.0 / costs.congestion).min(MAX_INV_CONGESTION_COST)
    } else {
        MAX_INV_CONGESTION_COST
    };

    NocCostNormFactors {
        aggregate_bandwidth,
        latency,
        latency_overrun,
        congestion,
    }
}

/// Computes the NoC contribution to the total placement cost.
///
/// A weighted sum over the normalized cost terms, scaled by the overall NoC
/// placement weighting. The per-term weightings are expected to already be
/// normalized to sum to one (see [`NocOptions::normalize_weights`]).
pub fn calculate_total_cost(
    terms: &NocCostTerms,
    norm_factors: &NocCostNormFactors,
    opts: &NocOptions,
) -> f64 {
    opts.noc_placement_weighting
        * (terms.aggregate_bandwidth
            * norm_factors.aggregate_bandwidth
            * opts.noc_aggregate_bandwidth_weighting
            + terms.latency * norm_factors.latency * opts.noc_latency_weighting
            + terms.latency_overrun
                * norm_factors.latency_overrun
                * opts.noc_latency_constraints_weighting
            + terms.congestion * norm_factors.congestion * opts.noc_congestion_weighting)
}

/// Computes a flow's aggregate bandwidth cost: priority × bandwidth × hops.
pub fn aggregate_bandwidth_cost(route: &[NocLinkId], flow: &TrafficFlow) -> f64 {
    f64::from(flow.priority) * flow.bandwidth * route.len() as f64
}

/// Computes a flow's unweighted route latency.
///
/// With detailed link latencies, sums the actual latency of each route link;
/// otherwise the coarse default times the hop count. Router latency is the
/// source router of the first link plus each link's sink router when
/// detailed, or the coarse default times (hops + 1).
pub fn flow_latency(route: &[NocLinkId], model: &NocModel) -> f64 {
    let link_component = if model.detailed_link_latency() {
        route.iter().map(|&l| model.link(l).latency).sum()
    } else {
        model.default_link_latency() * route.len() as f64
    };

    let router_component = if model.detailed_router_latency() {
        let Some(&first) = route.first() else {
            return link_component;
        };
        let source = model.link(first).source;
        let mut latency = model.router(source).latency;
        for &link_id in route {
            latency += model.router(model.link(link_id).sink).latency;
        }
        latency
    } else {
        // A route always visits one more router than it has links.
        model.default_router_latency() * (route.len() + 1) as f64
    };

    router_component + link_component
}

/// Computes a flow's priority-weighted latency cost and latency-overrun cost.
///
/// The overrun is `max(0, latency - max_latency)` of the unweighted latency;
/// the priority scaling is applied once, on the overrun quantity itself.
pub fn latency_cost(route: &[NocLinkId], model: &NocModel, flow: &TrafficFlow) -> (f64, f64) {
    let latency = flow_latency(route, model);
    let latency_overrun = (latency - flow.max_latency).max(0.0);

    let priority = f64::from(flow.priority);
    (priority * latency, priority * latency_overrun)
}

/// Computes a link's congestion cost: over-capacity bandwidth as a fraction
/// of capacity, `max(0, usage - bandwidth) / bandwidth`.
pub fn link_congestion_cost(link: &NocLink, usage: f64) -> f64 {
    (usage - link.bandwidth).max(0.0) / link.bandwidth
}
