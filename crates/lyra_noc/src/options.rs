//! NoC placement options consumed by the cost engine.

use serde::Deserialize;

/// User-facing options controlling NoC-aware placement.
///
/// Deserialized from the toolchain's project configuration; all fields have
/// defaults so a config may specify any subset.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NocOptions {
    /// Name of the flow routing algorithm ("xy_routing" or "bfs_routing").
    pub noc_routing_algorithm: String,
    /// Overall weight of the NoC terms within the placer's total cost.
    pub noc_placement_weighting: f64,
    /// Weight of the aggregate-bandwidth term.
    pub noc_aggregate_bandwidth_weighting: f64,
    /// Weight of the latency term.
    pub noc_latency_weighting: f64,
    /// Weight of the latency-constraints (overrun) term.
    pub noc_latency_constraints_weighting: f64,
    /// Weight of the link-congestion term.
    pub noc_congestion_weighting: f64,
    /// Percentage of annealer moves that should be router-block swaps (0-100).
    pub router_swap_percentage: u32,
}

impl Default for NocOptions {
    fn default() -> Self {
        Self {
            noc_routing_algorithm: "bfs_routing".to_string(),
            noc_placement_weighting: 5.0,
            noc_aggregate_bandwidth_weighting: 0.38,
            noc_latency_weighting: 0.6,
            noc_latency_constraints_weighting: 0.02,
            noc_congestion_weighting: 0.25,
            router_swap_percentage: 0,
        }
    }
}

impl NocOptions {
    /// Rescales the four term weightings so they sum to one.
    pub fn normalize_weights(&mut self) {
        let sum = self.noc_aggregate_bandwidth_weighting
            + self.noc_latency_weighting
            + self.noc_latency_constraints_weighting
            + self.noc_congestion_weighting;

        self.noc_aggregate_bandwidth_weighting /= sum;
        self.noc_latency_weighting /= sum;
        self.noc_latency_constraints_weighting /= sum;
        self.noc_congestion_weighting /= sum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = NocOptions::default();
        assert_eq!(opts.noc_routing_algorithm, "bfs_routing");
        assert_eq!(opts.router_swap_percentage, 0);
        assert!(opts.noc_placement_weighting > 0.0);
    }

    #[test]
    fn normalize_weights_sums_to_one() {
        let mut opts = NocOptions::default();
        opts.normalize_weights();
        let sum = opts.noc_aggregate_bandwidth_weighting
            + opts.noc_latency_weighting
            + opts.noc_latency_constraints_weighting
            + opts.noc_congestion_weighting;
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn normalize_preserves_ratios() {
        let mut opts = NocOptions {
            noc_aggregate_bandwidth_weighting: 2.0,
            noc_latency_weighting: 1.0,
            noc_latency_constraints_weighting: 1.0,
            noc_congestion_weighting: 4.0,
            ..NocOptions::default()
        };
        opts.normalize_weights();
        assert!((opts.noc_aggregate_bandwidth_weighting - 0.25).abs() < 1e-12);
        assert!((opts.noc_latency_weighting - 0.125).abs() < 1e-12);
        assert!((opts.noc_latency_constraints_weighting - 0.125).abs() < 1e-12);
        assert!((opts.noc_congestion_weighting - 0.5).abs() < 1e-12);
    }

    #[test]
    fn deserialize_partial_config() {
        let json = r#"{"noc_routing_algorithm": "xy_routing", "router_swap_percentage": 40}"#;
        let opts: NocOptions = serde_json::from_str(json).unwrap();
        assert_eq!(opts.noc_routing_algorithm, "xy_routing");
        assert_eq!(opts.router_swap_percentage, 40);
        // Unspecified fields fall back to defaults
        assert_eq!(opts.noc_latency_weighting, 0.6);
    }
}
