//! Host graph boundary.
//!
//! The canvas owns node and edge identity. The engine sees nodes only through
//! [`NodeHandle`], adapts each one into a [`FlowNode`] snapshot once per pass,
//! and writes geometry back through [`HostGraph`].

use crate::preview::PreviewLine;
use flowcanvas_core::{
    Edge, EdgeId, FlowNode, LayoutError, NodeId, NodeType, Point, PreviewLineId, Size,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Narrow view of a host node.
///
/// Accessors return `None` when the host reference is stale or only
/// partially constructed.
pub trait NodeHandle {
    fn id(&self) -> &str;
    fn node_type(&self) -> Option<NodeType>;
    fn position(&self) -> Option<Point>;
    fn size(&self) -> Option<Size>;
    fn data(&self) -> Option<&Value>;
    fn content_line_count(&self) -> Option<usize> {
        None
    }
}

/// Result of looking up an id that may name either kind of cell.
pub enum Cell<'a> {
    Node(&'a dyn NodeHandle),
    Edge(Edge),
}

/// Graph operations the engine needs from the canvas.
pub trait HostGraph {
    /// Node ids in the host's deterministic iteration order.
    fn node_ids(&self) -> Vec<NodeId>;
    fn node(&self, id: &NodeId) -> Option<&dyn NodeHandle>;
    fn edges(&self) -> Vec<Edge>;
    fn set_node_position(&mut self, id: &NodeId, position: Point) -> bool;
    fn add_edge(&mut self, edge: Edge);
    fn remove_edge(&mut self, id: &EdgeId) -> bool;
    fn upsert_preview_line(&mut self, line: &PreviewLine);
    fn remove_preview_line(&mut self, id: &PreviewLineId) -> bool;

    fn cell_by_id(&self, id: &str) -> Option<Cell<'_>> {
        let node_id = NodeId::new(id);
        if let Some(node) = self.node(&node_id) {
            return Some(Cell::Node(node));
        }
        self.edges()
            .into_iter()
            .find(|edge| edge.id.as_str() == id)
            .map(Cell::Edge)
    }
}

/// Build the engine snapshot of a host node.
///
/// This is the single place accessor availability is checked; callers skip
/// the node on error instead of failing the whole pass.
pub fn adapt_node(handle: &dyn NodeHandle) -> Result<FlowNode, LayoutError> {
    let missing = |accessor: &'static str| LayoutError::MissingNodeAccessor {
        node: handle.id().to_string(),
        accessor,
    };

    if handle.id().trim().is_empty() {
        return Err(missing("id"));
    }
    let node_type = handle.node_type().ok_or_else(|| missing("getData().type"))?;
    let position = handle
        .position()
        .filter(Point::is_finite)
        .ok_or_else(|| missing("getPosition"))?;
    let size = handle
        .size()
        .filter(Size::is_valid)
        .ok_or_else(|| missing("getSize"))?;
    let config = handle.data().cloned().unwrap_or(Value::Null);
    let content_line_count = handle
        .content_line_count()
        .unwrap_or_else(|| node_type.default_content_lines());

    Ok(FlowNode {
        id: NodeId::new(handle.id()),
        node_type,
        position,
        size,
        layer_index: None,
        config,
        content_line_count,
    })
}

/// Plain node record stored by [`GraphModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: Option<NodeType>,
    pub position: Option<Point>,
    pub size: Option<Size>,
    pub data: Option<Value>,
    pub content_line_count: Option<usize>,
}

impl From<FlowNode> for NodeRecord {
    fn from(node: FlowNode) -> Self {
        Self {
            id: node.id.0,
            node_type: Some(node.node_type),
            position: Some(node.position),
            size: Some(node.size),
            data: Some(node.config),
            content_line_count: Some(node.content_line_count),
        }
    }
}

impl NodeHandle for NodeRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn node_type(&self) -> Option<NodeType> {
        self.node_type
    }

    fn position(&self) -> Option<Point> {
        self.position
    }

    fn size(&self) -> Option<Size> {
        self.size
    }

    fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    fn content_line_count(&self) -> Option<usize> {
        self.content_line_count
    }
}

/// Serializable `{nodes, edges}` snapshot accepted by [`GraphModel`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// In-memory host graph.
#[derive(Debug, Default)]
pub struct GraphModel {
    nodes: Vec<NodeRecord>,
    node_map: HashMap<NodeId, usize>,
    edges: Vec<Edge>,
    preview_lines: BTreeMap<PreviewLineId, PreviewLine>,
}

impl GraphModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        let mut model = Self::new();
        for node in snapshot.nodes {
            model.add_record(node);
        }
        for edge in snapshot.edges {
            model.add_edge(edge);
        }
        model
    }

    pub fn add_node(&mut self, node: FlowNode) {
        self.add_record(node.into());
    }

    pub fn add_record(&mut self, record: NodeRecord) {
        let id = NodeId::new(record.id.clone());
        if self.node_map.contains_key(&id) {
            tracing::warn!("Ignoring duplicate node {}", id);
            return;
        }
        self.node_map.insert(id, self.nodes.len());
        self.nodes.push(record);
    }

    /// Remove a node together with every edge touching it.
    pub fn remove_node(&mut self, id: &NodeId) -> bool {
        let Some(index) = self.node_map.remove(id) else {
            return false;
        };
        self.nodes.remove(index);
        for slot in self.node_map.values_mut() {
            if *slot > index {
                *slot -= 1;
            }
        }
        self.edges.retain(|edge| {
            &edge.source_node_id != id && edge.target_node_id.as_ref() != Some(id)
        });
        true
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn record(&self, id: &NodeId) -> Option<&NodeRecord> {
        self.node_map.get(id).map(|&idx| &self.nodes[idx])
    }

    pub fn record_mut(&mut self, id: &NodeId) -> Option<&mut NodeRecord> {
        self.node_map.get(id).map(|&idx| &mut self.nodes[idx])
    }

    pub fn preview_lines(&self) -> impl Iterator<Item = &PreviewLine> {
        self.preview_lines.values()
    }

    pub fn preview_line_count(&self) -> usize {
        self.preview_lines.len()
    }
}

impl HostGraph for GraphModel {
    fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| NodeId::new(n.id.clone())).collect()
    }

    fn node(&self, id: &NodeId) -> Option<&dyn NodeHandle> {
        self.record(id).map(|record| record as &dyn NodeHandle)
    }

    fn edges(&self) -> Vec<Edge> {
        self.edges.clone()
    }

    fn set_node_position(&mut self, id: &NodeId, position: Point) -> bool {
        match self.record_mut(id) {
            Some(record) => {
                record.position = Some(position);
                true
            }
            None => false,
        }
    }

    fn add_edge(&mut self, edge: Edge) {
        if !self.node_map.contains_key(&edge.source_node_id) {
            tracing::warn!(
                "Dropping edge {} because source node {} is missing from graph model",
                edge.id,
                edge.source_node_id
            );
            return;
        }
        if let Some(target) = &edge.target_node_id
            && !self.node_map.contains_key(target)
        {
            tracing::warn!(
                "Dropping edge {} because target node {} is missing from graph model",
                edge.id,
                target
            );
            return;
        }
        self.edges.push(edge);
    }

    fn remove_edge(&mut self, id: &EdgeId) -> bool {
        let before = self.edges.len();
        self.edges.retain(|edge| &edge.id != id);
        self.edges.len() != before
    }

    fn upsert_preview_line(&mut self, line: &PreviewLine) {
        self.preview_lines.insert(line.id.clone(), line.clone());
    }

    fn remove_preview_line(&mut self, id: &PreviewLineId) -> bool {
        self.preview_lines.remove(id).is_some()
    }
}
