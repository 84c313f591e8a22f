use crate::{NodeId, NodeType, PortId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised by the layout engine.
///
/// Geometry and topology errors abort the current recompute pass; accessor
/// errors are recovered per node by the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("invalid layer index {value}: expected a finite, non-negative integer")]
    InvalidLayerIndex { value: f64 },

    #[error("cycle detected between nodes [{}]", join_ids(.nodes))]
    CyclicGraph { nodes: Vec<NodeId> },

    #[error("node {node:?} does not expose `{accessor}`")]
    MissingNodeAccessor { node: String, accessor: &'static str },

    #[error("port {port} on node {node} has offset {offset} outside the node bounds")]
    InvalidPortOffset {
        node: NodeId,
        port: PortId,
        offset: f64,
    },

    #[error("computed a non-finite coordinate for node {node}")]
    NonFiniteCoordinate { node: NodeId },

    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
}

fn join_ids(ids: &[NodeId]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Non-fatal diagnostics collected during a pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LayoutWarning {
    /// Two sibling boxes would be closer than `node_width + min_gap`.
    OverlapDetected { layer: usize, distance: f64, required: f64 },
    /// Node not reachable from any start node; placed on layer 0.
    OrphanNode { node: NodeId },
    /// A splitting node has more branches than its policy allows.
    BranchLimitExceeded {
        node: NodeId,
        node_type: NodeType,
        count: usize,
        max: usize,
    },
    /// Rendered port offset drifted from the expected one beyond tolerance.
    PortOffsetDrift {
        node: NodeId,
        port: PortId,
        expected: f64,
        actual: f64,
    },
    /// Host handed back a node the adapter could not read.
    SkippedNode { node: String, reason: String },
}

impl fmt::Display for LayoutWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutWarning::OverlapDetected {
                layer,
                distance,
                required,
            } => write!(
                f,
                "overlap on layer {layer}: siblings {distance:.1}px apart, need {required:.1}px"
            ),
            LayoutWarning::OrphanNode { node } => {
                write!(f, "node {node} is unreachable from a start node")
            }
            LayoutWarning::BranchLimitExceeded {
                node,
                node_type,
                count,
                max,
            } => write!(f, "{node_type} node {node} has {count} branches (max {max})"),
            LayoutWarning::PortOffsetDrift {
                node,
                port,
                expected,
                actual,
            } => write!(
                f,
                "port {port} on {node} at {actual:.1}px, expected {expected:.1}px"
            ),
            LayoutWarning::SkippedNode { node, reason } => {
                write!(f, "skipped node {node:?}: {reason}")
            }
        }
    }
}
