//! Port placement.
//!
//! Offsets are measured from the node's vertical centre so they stay valid
//! when the host re-renders a node at a new position. Rows follow the node
//! body: a header, a padding band, then one line per content row (or per
//! branch on splitting nodes).

use flowcanvas_core::{
    Branch, EngineConfig, FlowNode, INPUT_PORT, LayoutDirection, LayoutError, LayoutWarning,
    OUTPUT_PORT, Point, PortGeometry, PortId,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortOffset {
    pub port_id: PortId,
    pub branch_id: Option<String>,
    /// Vertical offset from the node centre.
    pub offset: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePorts {
    pub input: Option<PortOffset>,
    pub outputs: Vec<PortOffset>,
}

impl NodePorts {
    pub fn find(&self, port_id: &PortId) -> Option<&PortOffset> {
        self.input
            .iter()
            .chain(self.outputs.iter())
            .find(|port| &port.port_id == port_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortPositionResolver {
    geometry: PortGeometry,
    direction: LayoutDirection,
}

impl Default for PortPositionResolver {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl PortPositionResolver {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            geometry: config.port,
            direction: config.direction,
        }
    }

    pub fn geometry(&self) -> &PortGeometry {
        &self.geometry
    }

    /// Node height that fits `lines` content rows without clipping ports.
    pub fn required_height(&self, lines: usize) -> f64 {
        let g = &self.geometry;
        g.header_height + 2.0 * g.content_padding + lines.max(1) as f64 * g.line_height
    }

    fn content_lines(node: &FlowNode, branches: &[Branch]) -> usize {
        if node.node_type.is_branching() && !branches.is_empty() {
            branches.len()
        } else {
            node.content_line_count.max(1)
        }
    }

    fn row_offset(&self, row: usize, node_height: f64) -> f64 {
        let g = &self.geometry;
        g.header_height + g.content_padding + row as f64 * g.line_height + g.line_height / 2.0
            - node_height / 2.0
    }

    fn content_center_offset(&self, lines: usize, node_height: f64) -> f64 {
        let g = &self.geometry;
        let content_height = lines as f64 * g.line_height;
        g.header_height + g.content_padding + content_height / 2.0 - node_height / 2.0
    }

    /// Expected port offsets of `node`.
    pub fn resolve(&self, node: &FlowNode, branches: &[Branch]) -> NodePorts {
        let height = node.size.height;
        let lines = Self::content_lines(node, branches);
        let center = self.content_center_offset(lines, height);

        let input = node.node_type.has_input().then(|| PortOffset {
            port_id: PortId::new(INPUT_PORT),
            branch_id: None,
            offset: center,
        });

        let outputs = if !node.node_type.has_output() {
            Vec::new()
        } else if node.node_type.is_branching() {
            branches
                .iter()
                .enumerate()
                .map(|(row, branch)| PortOffset {
                    port_id: branch.port_id(),
                    branch_id: Some(branch.id.clone()),
                    offset: self.row_offset(row, height),
                })
                .collect()
        } else {
            vec![PortOffset {
                port_id: PortId::new(OUTPUT_PORT),
                branch_id: None,
                offset: center,
            }]
        };

        NodePorts { input, outputs }
    }

    fn check_bounds(node: &FlowNode, port: &PortId, offset: f64) -> Result<(), LayoutError> {
        if offset.is_nan() || offset.abs() > node.size.height / 2.0 {
            return Err(LayoutError::InvalidPortOffset {
                node: node.id.clone(),
                port: port.clone(),
                offset,
            });
        }
        Ok(())
    }

    /// Compare rendered offsets against the expected ones.
    ///
    /// Offsets that are NaN or leave the node box fail hard; drift beyond the
    /// geometry tolerance is only reported.
    pub fn validate(
        &self,
        node: &FlowNode,
        branches: &[Branch],
        observed: &[PortOffset],
    ) -> Result<Vec<LayoutWarning>, LayoutError> {
        let expected = self.resolve(node, branches);
        for port in expected.input.iter().chain(expected.outputs.iter()) {
            Self::check_bounds(node, &port.port_id, port.offset)?;
        }

        let mut warnings = Vec::new();
        for actual in observed {
            Self::check_bounds(node, &actual.port_id, actual.offset)?;
            let Some(want) = expected.find(&actual.port_id) else {
                tracing::debug!("Port {} is not expected on node {}", actual.port_id, node.id);
                continue;
            };
            if (actual.offset - want.offset).abs() > self.geometry.tolerance {
                tracing::warn!(
                    "Port {} on node {} drifted to {:.1}px (expected {:.1}px)",
                    actual.port_id,
                    node.id,
                    actual.offset,
                    want.offset
                );
                warnings.push(LayoutWarning::PortOffsetDrift {
                    node: node.id.clone(),
                    port: actual.port_id.clone(),
                    expected: want.offset,
                    actual: actual.offset,
                });
            }
        }
        Ok(warnings)
    }

    /// Absolute canvas position of the input port.
    pub fn input_position(&self, node: &FlowNode, ports: &NodePorts) -> Option<Point> {
        let port = ports.input.as_ref()?;
        let center = node.center();
        Some(match self.direction {
            LayoutDirection::TopBottom => Point::new(center.x, node.position.y),
            LayoutDirection::LeftRight => Point::new(node.position.x, center.y + port.offset),
        })
    }

    /// Absolute canvas position of an output port.
    pub fn output_position(&self, node: &FlowNode, port: &PortOffset) -> Point {
        let center = node.center();
        match self.direction {
            LayoutDirection::TopBottom => {
                Point::new(center.x, node.position.y + node.size.height)
            }
            LayoutDirection::LeftRight => Point::new(
                node.position.x + node.size.width,
                center.y + port.offset,
            ),
        }
    }
}
