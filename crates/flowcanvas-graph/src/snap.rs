use crate::ports::PortPositionResolver;
use crate::preview::{PreviewLine, PreviewState};
use flowcanvas_core::{EngineConfig, FlowNode, INPUT_PORT, NodeId, Point, PortId, PreviewLineId};
use serde::Serialize;

/// Input port the dragged connection would attach to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapTarget {
    pub node_id: NodeId,
    pub port_id: PortId,
    pub port_position: Point,
    pub distance: f64,
}

/// Snap state of the current drag gesture.
///
/// `Idle -> CandidateFound -> Snapped`, with every state falling back to
/// `Idle` on cancel.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SnapState {
    #[default]
    Idle,
    CandidateFound(SnapTarget),
    Snapped(SnapTarget),
}

impl SnapState {
    pub fn target(&self) -> Option<&SnapTarget> {
        match self {
            SnapState::Idle => None,
            SnapState::CandidateFound(target) | SnapState::Snapped(target) => Some(target),
        }
    }
}

/// Preview line whose free end sits on a node's input port.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewSnap {
    pub line_id: PreviewLineId,
    pub source_node_id: NodeId,
    pub source_port_id: PortId,
    pub distance: f64,
}

/// Where the dragged connection starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragSource {
    pub node_id: NodeId,
    pub port_id: PortId,
}

/// Finds the input port nearest to a dragged connection end.
///
/// Only ports strictly closer than any earlier candidate replace it, so on
/// ties the first node in host order wins.
#[derive(Debug, Clone)]
pub struct SnapDetector {
    snap_distance: f64,
    ports: PortPositionResolver,
    state: SnapState,
    dragging: Option<DragSource>,
}

impl Default for SnapDetector {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl SnapDetector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            snap_distance: config.snap_distance,
            ports: PortPositionResolver::new(config),
            state: SnapState::Idle,
            dragging: None,
        }
    }

    pub fn snap_distance(&self) -> f64 {
        self.snap_distance
    }

    pub fn state(&self) -> &SnapState {
        &self.state
    }

    pub fn drag_source(&self) -> Option<&DragSource> {
        self.dragging.as_ref()
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging.is_some()
    }

    /// Absolute input port position, or `None` for nodes without an input.
    pub fn input_port_position(&self, node: &FlowNode) -> Option<Point> {
        if !node.node_type.has_input() {
            return None;
        }
        let ports = self.ports.resolve(node, &node.branches());
        self.ports.input_position(node, &ports)
    }

    pub fn detect_snap_target(
        &self,
        nodes: &[FlowNode],
        pointer: Point,
        exclude: Option<&NodeId>,
    ) -> Option<SnapTarget> {
        if !pointer.is_finite() {
            return None;
        }

        let mut best: Option<SnapTarget> = None;
        for node in nodes {
            if exclude == Some(&node.id) {
                continue;
            }
            let Some(port_position) = self.input_port_position(node) else {
                continue;
            };
            let distance = pointer.distance(port_position);
            if distance > self.snap_distance {
                continue;
            }
            if best.as_ref().is_none_or(|b| distance < b.distance) {
                best = Some(SnapTarget {
                    node_id: node.id.clone(),
                    port_id: PortId::new(INPUT_PORT),
                    port_position,
                    distance,
                });
            }
        }
        best
    }

    /// Nearest visible preview line of another node ending on `node`'s input port.
    pub fn detect_preview_line_snap<'a>(
        &self,
        node: &FlowNode,
        lines: impl IntoIterator<Item = &'a PreviewLine>,
    ) -> Option<PreviewSnap> {
        let port = self.input_port_position(node)?;

        let mut best: Option<PreviewSnap> = None;
        for line in lines {
            if line.source_node_id == node.id || line.state == PreviewState::Hidden {
                continue;
            }
            let distance = port.distance(line.end_position);
            if distance > self.snap_distance {
                continue;
            }
            if best.as_ref().is_none_or(|b| distance < b.distance) {
                best = Some(PreviewSnap {
                    line_id: line.id.clone(),
                    source_node_id: line.source_node_id.clone(),
                    source_port_id: line.source_port_id.clone(),
                    distance,
                });
            }
        }
        best
    }

    pub fn begin_drag(&mut self, node_id: NodeId, port_id: PortId) {
        self.dragging = Some(DragSource { node_id, port_id });
        self.state = SnapState::Idle;
    }

    /// Re-evaluate the candidate for the latest pointer position.
    pub fn update(&mut self, nodes: &[FlowNode], pointer: Point) -> &SnapState {
        let Some(source) = &self.dragging else {
            self.state = SnapState::Idle;
            return &self.state;
        };
        self.state = match self.detect_snap_target(nodes, pointer, Some(&source.node_id)) {
            Some(target) => SnapState::CandidateFound(target),
            None => SnapState::Idle,
        };
        &self.state
    }

    /// End the gesture. Returns the target the connection snapped to.
    pub fn release(&mut self) -> Option<SnapTarget> {
        self.dragging = None;
        match std::mem::take(&mut self.state) {
            SnapState::CandidateFound(target) => {
                self.state = SnapState::Snapped(target.clone());
                Some(target)
            }
            _ => None,
        }
    }

    pub fn cancel(&mut self) {
        self.dragging = None;
        self.state = SnapState::Idle;
    }
}
