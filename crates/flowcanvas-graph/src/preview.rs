//! Preview lines.
//!
//! Every unconnected output port shows a dangling "preview" connection that
//! the user can drag onto a target. This module owns their lifecycle: one
//! line per source port, created when the port is free, retired as soon as a
//! real edge leaves that port.

use crate::ports::{PortOffset, PortPositionResolver};
use flowcanvas_core::{
    Edge, EdgeId, EngineConfig, FlowNode, LayoutDirection, NodeId, Point, PortId, PreviewLineId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Largest cross-axis shift applied to move an endpoint off a neighbour.
const MAX_ENDPOINT_SHIFT: f64 = 60.0;
/// Branch endpoint spread under a node in `TB` layouts.
const MIN_BRANCH_SPREAD: f64 = 60.0;
const MAX_BRANCH_SPREAD: f64 = 120.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PreviewState {
    #[default]
    Default,
    /// A snap target is highlighted for this line.
    Snapping,
    Hidden,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewLine {
    pub id: PreviewLineId,
    pub source_node_id: NodeId,
    pub source_port_id: PortId,
    pub branch_id: Option<String>,
    pub end_position: Point,
    pub state: PreviewState,
}

impl PreviewLine {
    pub fn line_id(node: &NodeId, port: &PortId) -> PreviewLineId {
        PreviewLineId::new(format!("preview:{node}:{port}"))
    }

    /// Edge form handed to hosts that render previews as target-less edges.
    pub fn as_edge(&self) -> Edge {
        Edge {
            id: EdgeId::new(self.id.as_str()),
            source_node_id: self.source_node_id.clone(),
            source_port_id: self.source_port_id.clone(),
            target_node_id: None,
            target_port_id: None,
        }
    }
}

/// An output port together with its place among the node's outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPort {
    pub port: PortOffset,
    pub index: usize,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointInfo {
    pub line_id: PreviewLineId,
    pub source_node_id: NodeId,
    pub position: Point,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PreviewChange {
    Created(PreviewLine),
    Updated(PreviewLine),
    Retired(PreviewLine),
}

impl PreviewChange {
    pub fn line(&self) -> &PreviewLine {
        match self {
            PreviewChange::Created(line)
            | PreviewChange::Updated(line)
            | PreviewChange::Retired(line) => line,
        }
    }

    pub fn is_retired(&self) -> bool {
        matches!(self, PreviewChange::Retired(_))
    }
}

#[derive(Debug, Clone)]
pub struct PreviewLineManager {
    config: EngineConfig,
    ports: PortPositionResolver,
    lines: BTreeMap<PreviewLineId, PreviewLine>,
    moved: BTreeSet<NodeId>,
    graph_dirty: bool,
}

impl Default for PreviewLineManager {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl PreviewLineManager {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            ports: PortPositionResolver::new(&config),
            config,
            lines: BTreeMap::new(),
            moved: BTreeSet::new(),
            graph_dirty: false,
        }
    }

    /// Swap the configuration; endpoints are recomputed on the next flush.
    pub fn reconfigure(&mut self, config: EngineConfig) {
        self.ports = PortPositionResolver::new(&config);
        self.config = config;
        self.graph_dirty = true;
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> impl Iterator<Item = &PreviewLine> {
        self.lines.values()
    }

    pub fn line(&self, id: &PreviewLineId) -> Option<&PreviewLine> {
        self.lines.get(id)
    }

    pub fn line_for_port(&self, node: &NodeId, port: &PortId) -> Option<&PreviewLine> {
        self.lines.get(&PreviewLine::line_id(node, port))
    }

    fn is_usable(node: &FlowNode) -> bool {
        if node.id.is_empty() {
            tracing::warn!("Skipping preview line update for a node without an id");
            return false;
        }
        if !node.position.is_finite() || !node.size.is_valid() {
            tracing::warn!(
                "Skipping preview line update for node {}: position or size is unusable",
                node.id
            );
            return false;
        }
        true
    }

    /// Output ports of `node` in port order.
    pub fn output_ports(&self, node: &FlowNode) -> Vec<OutputPort> {
        let outputs = self.ports.resolve(node, &node.branches()).outputs;
        let count = outputs.len();
        outputs
            .into_iter()
            .enumerate()
            .map(|(index, port)| OutputPort { port, index, count })
            .collect()
    }

    fn default_endpoint(&self, node: &FlowNode, port: &OutputPort) -> Point {
        let stub = self.config.preview_stub_length;
        match self.config.direction {
            LayoutDirection::TopBottom => {
                let center_x = node.position.x + node.size.width / 2.0;
                let y = node.position.y + node.size.height + stub;
                if port.count <= 1 {
                    return Point::new(center_x, y);
                }
                let spread = (node.size.width * 0.8).clamp(MIN_BRANCH_SPREAD, MAX_BRANCH_SPREAD);
                let first = center_x - (port.count - 1) as f64 * spread / 2.0;
                Point::new(first + port.index as f64 * spread, y)
            }
            LayoutDirection::LeftRight => {
                let anchor = self.ports.output_position(node, &port.port);
                Point::new(anchor.x + stub, anchor.y)
            }
        }
    }

    /// `(primary, cross)` split of a point for the current direction.
    fn axes(&self, p: Point) -> (f64, f64) {
        match self.config.direction {
            LayoutDirection::TopBottom => (p.y, p.x),
            LayoutDirection::LeftRight => (p.x, p.y),
        }
    }

    fn with_cross(&self, p: Point, cross: f64) -> Point {
        match self.config.direction {
            LayoutDirection::TopBottom => Point::new(cross, p.y),
            LayoutDirection::LeftRight => Point::new(p.x, cross),
        }
    }

    /// Visible endpoints on the layer at `primary`, sorted along the cross axis.
    fn same_layer_endpoints(
        &self,
        primary: f64,
        tolerance: f64,
        consider: &dyn Fn(&NodeId) -> bool,
    ) -> Vec<EndpointInfo> {
        let mut endpoints: Vec<EndpointInfo> = self
            .lines
            .values()
            .filter(|line| line.state != PreviewState::Hidden && consider(&line.source_node_id))
            .filter(|line| (self.axes(line.end_position).0 - primary).abs() <= tolerance)
            .map(|line| EndpointInfo {
                line_id: line.id.clone(),
                source_node_id: line.source_node_id.clone(),
                position: line.end_position,
            })
            .collect();
        endpoints.sort_by(|a, b| self.axes(a.position).1.total_cmp(&self.axes(b.position).1));
        endpoints
    }

    /// Move `end` along the cross axis until it clears every endpoint of
    /// other nodes on the same layer. Only lines whose source passes
    /// `consider` count; the total shift never exceeds `MAX_ENDPOINT_SHIFT`.
    fn nudge(&self, owner: &NodeId, end: Point, consider: &dyn Fn(&NodeId) -> bool) -> Point {
        let (primary, start) = self.axes(end);
        let min_spacing = self.config.endpoint_min_spacing;
        let others: Vec<f64> = self
            .same_layer_endpoints(primary, self.config.same_layer_tolerance, &|id| {
                id != owner && consider(id)
            })
            .iter()
            .map(|info| self.axes(info.position).1)
            .collect();

        let mut cross = start;
        // Sorted, so one sweep settles past every chained conflict.
        for other in &others {
            if (other - cross).abs() < min_spacing {
                cross = cross.max(other + min_spacing);
            }
        }
        if cross - start > MAX_ENDPOINT_SHIFT {
            tracing::debug!("Endpoint of {} hit the shift cap; it may still overlap", owner);
            cross = start + MAX_ENDPOINT_SHIFT;
        }
        self.with_cross(end, cross)
    }

    fn upsert(
        &mut self,
        node: &FlowNode,
        port: &OutputPort,
        consider: &dyn Fn(&NodeId) -> bool,
    ) -> Option<PreviewChange> {
        let end = self.nudge(&node.id, self.default_endpoint(node, port), consider);
        let id = PreviewLine::line_id(&node.id, &port.port.port_id);

        if let Some(existing) = self.lines.get_mut(&id) {
            if existing.end_position == end && existing.branch_id == port.port.branch_id {
                return None;
            }
            existing.end_position = end;
            existing.branch_id = port.port.branch_id.clone();
            return Some(PreviewChange::Updated(existing.clone()));
        }

        let line = PreviewLine {
            id: id.clone(),
            source_node_id: node.id.clone(),
            source_port_id: port.port.port_id.clone(),
            branch_id: port.port.branch_id.clone(),
            end_position: end,
            state: PreviewState::Default,
        };
        tracing::debug!("Created preview line {}", id);
        self.lines.insert(id, line.clone());
        Some(PreviewChange::Created(line))
    }

    /// Create the line for `port`, or move it to the current default endpoint.
    pub fn create_or_update(&mut self, node: &FlowNode, port: &OutputPort) -> Option<PreviewChange> {
        if !Self::is_usable(node) {
            return None;
        }
        self.upsert(node, port, &|_| true)
    }

    fn retire(&mut self, id: &PreviewLineId) -> Option<PreviewChange> {
        let line = self.lines.remove(id)?;
        tracing::debug!("Retired preview line {}", id);
        Some(PreviewChange::Retired(line))
    }

    fn sync_node_with(
        &mut self,
        node: &FlowNode,
        connected: &HashSet<PortId>,
        consider: &dyn Fn(&NodeId) -> bool,
    ) -> Vec<PreviewChange> {
        if !Self::is_usable(node) {
            return Vec::new();
        }
        let ports = self.output_ports(node);
        let mut changes = Vec::new();

        for port in &ports {
            let change = if connected.contains(&port.port.port_id) {
                self.retire(&PreviewLine::line_id(&node.id, &port.port.port_id))
            } else {
                self.upsert(node, port, consider)
            };
            changes.extend(change);
        }

        let stale: Vec<PreviewLineId> = self
            .lines
            .values()
            .filter(|line| line.source_node_id == node.id)
            .filter(|line| !ports.iter().any(|p| p.port.port_id == line.source_port_id))
            .map(|line| line.id.clone())
            .collect();
        for id in stale {
            changes.extend(self.retire(&id));
        }
        changes
    }

    /// Bring the lines of one node in line with its ports.
    ///
    /// Ports in `connected` already carry a real edge and must not show a
    /// preview; ports that vanished from the node lose theirs.
    pub fn sync_node(&mut self, node: &FlowNode, connected: &HashSet<PortId>) -> Vec<PreviewChange> {
        self.sync_node_with(node, connected, &|_| true)
    }

    /// Full pass over every node in host order.
    pub fn sync_all(&mut self, nodes: &[FlowNode], edges: &[Edge]) -> Vec<PreviewChange> {
        let connected = connected_ports(edges);
        let empty = HashSet::new();
        let mut changes = Vec::new();

        // Endpoints only avoid lines of nodes handled earlier in this pass,
        // which keeps the result independent of the previous state.
        let mut done: HashSet<NodeId> = HashSet::new();
        for node in nodes {
            let ports = connected.get(&node.id).unwrap_or(&empty);
            changes.extend(self.sync_node_with(node, ports, &|id| done.contains(id)));
            done.insert(node.id.clone());
        }

        let live: HashSet<&NodeId> = nodes.iter().map(|node| &node.id).collect();
        let orphaned: Vec<PreviewLineId> = self
            .lines
            .values()
            .filter(|line| !live.contains(&line.source_node_id))
            .map(|line| line.id.clone())
            .collect();
        for id in orphaned {
            changes.extend(self.retire(&id));
        }

        self.graph_dirty = false;
        self.moved.clear();
        changes
    }

    pub fn mark_moved(&mut self, node: &NodeId) {
        self.moved.insert(node.clone());
    }

    pub fn mark_graph_changed(&mut self) {
        self.graph_dirty = true;
    }

    pub fn has_pending_work(&self) -> bool {
        self.graph_dirty || !self.moved.is_empty()
    }

    /// Apply queued work. Hosts call this at most once per animation frame.
    pub fn flush(&mut self, nodes: &[FlowNode], edges: &[Edge]) -> Vec<PreviewChange> {
        if self.graph_dirty {
            return self.sync_all(nodes, edges);
        }
        let moved = std::mem::take(&mut self.moved);
        if moved.is_empty() {
            return Vec::new();
        }

        let connected = connected_ports(edges);
        let empty = HashSet::new();
        let mut changes = Vec::new();
        for node in nodes.iter().filter(|node| moved.contains(&node.id)) {
            let ports = connected.get(&node.id).unwrap_or(&empty);
            changes.extend(self.sync_node(node, ports));
        }
        changes
    }

    /// A real edge now leaves `port`; its preview line goes away.
    pub fn on_edge_connected(&mut self, source: &NodeId, port: &PortId) -> Option<PreviewChange> {
        self.retire(&PreviewLine::line_id(source, port))
    }

    pub fn on_node_removed(&mut self, node: &NodeId) -> Vec<PreviewChange> {
        self.moved.remove(node);
        let ids: Vec<PreviewLineId> = self
            .lines
            .values()
            .filter(|line| &line.source_node_id == node)
            .map(|line| line.id.clone())
            .collect();
        ids.iter().filter_map(|id| self.retire(id)).collect()
    }

    /// Endpoints of other nodes' visible lines whose primary coordinate
    /// (y in `TB`, x in `LR`) lies within `tolerance` of `target_y`, ordered
    /// along the cross axis.
    pub fn analyze_same_layer_endpoints(
        &self,
        target_y: f64,
        tolerance: f64,
        exclude_node: &NodeId,
    ) -> Vec<EndpointInfo> {
        self.same_layer_endpoints(target_y, tolerance, &|id| id != exclude_node)
    }

    pub fn set_state(&mut self, id: &PreviewLineId, state: PreviewState) -> Option<PreviewChange> {
        let line = self.lines.get_mut(id)?;
        if line.state == state {
            return None;
        }
        line.state = state;
        Some(PreviewChange::Updated(line.clone()))
    }

    /// Hide or show every line of a node, e.g. while the node itself is dragged.
    pub fn set_node_hidden(&mut self, node: &NodeId, hidden: bool) -> Vec<PreviewChange> {
        let (from, to) = if hidden {
            (PreviewState::Default, PreviewState::Hidden)
        } else {
            (PreviewState::Hidden, PreviewState::Default)
        };
        let ids: Vec<PreviewLineId> = self
            .lines
            .values()
            .filter(|line| &line.source_node_id == node && line.state == from)
            .map(|line| line.id.clone())
            .collect();
        ids.iter().filter_map(|id| self.set_state(id, to)).collect()
    }

    /// Drop every snapping highlight.
    pub fn clear_snapping(&mut self) -> Vec<PreviewChange> {
        let ids: Vec<PreviewLineId> = self
            .lines
            .values()
            .filter(|line| line.state == PreviewState::Snapping)
            .map(|line| line.id.clone())
            .collect();
        ids.iter()
            .filter_map(|id| self.set_state(id, PreviewState::Default))
            .collect()
    }
}

/// Output ports that already carry a real edge, per source node.
fn connected_ports(edges: &[Edge]) -> HashMap<NodeId, HashSet<PortId>> {
    let mut connected: HashMap<NodeId, HashSet<PortId>> = HashMap::new();
    for edge in edges.iter().filter(|edge| !edge.is_preview()) {
        connected
            .entry(edge.source_node_id.clone())
            .or_default()
            .insert(edge.source_port_id.clone());
    }
    connected
}
