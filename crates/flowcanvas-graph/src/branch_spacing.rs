use flowcanvas_core::{EngineConfig, LayoutWarning, NodeId, NodeType};

/// Spacing rules of one splitting node type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpacingPolicy {
    pub min_spacing: f64,
    pub optimal_spacing: f64,
    pub max_branches: Option<usize>,
}

impl SpacingPolicy {
    pub const GENERIC: SpacingPolicy = SpacingPolicy {
        min_spacing: 200.0,
        optimal_spacing: 220.0,
        max_branches: None,
    };

    pub fn for_type(node_type: NodeType) -> Self {
        match node_type {
            NodeType::CrowdSplit => Self {
                min_spacing: 220.0,
                optimal_spacing: 280.0,
                max_branches: Some(6),
            },
            NodeType::EventSplit => Self {
                min_spacing: 240.0,
                optimal_spacing: 300.0,
                max_branches: Some(2),
            },
            NodeType::AbTest => Self {
                min_spacing: 230.0,
                optimal_spacing: 290.0,
                max_branches: Some(4),
            },
            _ => Self::GENERIC,
        }
    }
}

/// Two-branch spacing floor.
const PAIR_SPACING: f64 = 200.0;
/// Spacing shrink per branch beyond the second.
const CROWDING_STEP: f64 = 15.0;
/// Rounding slack when comparing centre distances.
const OVERLAP_EPSILON: f64 = 1e-6;

/// Sibling spacing for the children of splitting nodes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BranchSpacingResolver {
    node_width: f64,
    min_gap: f64,
}

impl Default for BranchSpacingResolver {
    fn default() -> Self {
        Self {
            node_width: EngineConfig::DEFAULT_NODE_WIDTH,
            min_gap: EngineConfig::DEFAULT_MIN_GAP,
        }
    }
}

impl BranchSpacingResolver {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            node_width: config.node_width,
            min_gap: config.min_gap,
        }
    }

    /// Smallest centre-to-centre distance that keeps two nodes apart.
    pub fn min_distance(&self) -> f64 {
        self.node_width + self.min_gap
    }

    /// Centre-to-centre spacing for `branch_count` children of a `node_type` node.
    pub fn spacing(&self, node_type: NodeType, branch_count: usize) -> f64 {
        let policy = SpacingPolicy::for_type(node_type);
        let raw = match branch_count {
            0 | 1 => policy.optimal_spacing,
            2 => policy.min_spacing.max(PAIR_SPACING),
            n => policy.optimal_spacing - (n - 2) as f64 * CROWDING_STEP,
        };
        raw.max(policy.min_spacing).max(self.min_distance())
    }

    /// Cross-axis centres of `count` children spread evenly around `center`.
    pub fn branch_positions(&self, center: f64, count: usize, spacing: f64) -> Vec<f64> {
        if count == 0 {
            return Vec::new();
        }
        let start = center - (count - 1) as f64 * spacing / 2.0;
        (0..count).map(|i| start + i as f64 * spacing).collect()
    }

    /// Convenience for `branch_positions` with the policy spacing.
    pub fn fan_out(&self, node_type: NodeType, center: f64, count: usize) -> Vec<f64> {
        self.branch_positions(center, count, self.spacing(node_type, count))
    }

    /// True if any two adjacent centres are closer than `node_width + min_gap`.
    pub fn check_overlap(&self, positions: &[f64], node_width: f64) -> bool {
        self.closest_pair(positions, node_width).is_some()
    }

    /// Closest offending pair as `(distance, required)`.
    pub fn closest_pair(&self, positions: &[f64], node_width: f64) -> Option<(f64, f64)> {
        let required = node_width + self.min_gap;
        let mut sorted = positions.to_vec();
        sorted.sort_by(f64::total_cmp);

        sorted
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .filter(|distance| distance + OVERLAP_EPSILON < required)
            .min_by(f64::total_cmp)
            .map(|distance| (distance, required))
    }

    /// Warning for a splitting node with more branches than its policy allows.
    pub fn check_branch_limit(
        &self,
        node: &NodeId,
        node_type: NodeType,
        count: usize,
    ) -> Option<LayoutWarning> {
        let max = SpacingPolicy::for_type(node_type).max_branches?;
        if count <= max {
            return None;
        }
        tracing::warn!(
            "{} node {} has {} branches, policy allows at most {}",
            node_type,
            node,
            count,
            max
        );
        Some(LayoutWarning::BranchLimitExceeded {
            node: node.clone(),
            node_type,
            count,
            max,
        })
    }
}
