use crate::branch_spacing::{BranchSpacingResolver, SpacingPolicy};
use crate::coordinate::CoordinateCalculator;
use crate::layering::{LayerAssignment, assign_layers};
use flowcanvas_core::{
    Edge, EngineConfig, FlowNode, LayoutDirection, LayoutError, LayoutWarning, NodeId, Point,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub trait Layouter {
    fn execute(&self, nodes: &[FlowNode], edges: &[Edge]) -> Result<LayoutModel, LayoutError>;
}

/// Result of one layout pass. Built whole, then published.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutModel {
    pub node_to_layer: BTreeMap<NodeId, usize>,
    pub layers: Vec<Vec<NodeId>>,
    /// Top-left corner of every node.
    pub node_positions: BTreeMap<NodeId, Point>,
    pub warnings: Vec<LayoutWarning>,
}

impl LayoutModel {
    pub fn layer_of(&self, id: &NodeId) -> Option<usize> {
        self.node_to_layer.get(id).copied()
    }

    pub fn position_of(&self, id: &NodeId) -> Option<Point> {
        self.node_positions.get(id).copied()
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Write positions and layer indices back into node snapshots.
    pub fn apply_to(&self, nodes: &mut [FlowNode]) {
        for node in nodes {
            if let Some(position) = self.position_of(&node.id) {
                node.position = position;
            }
            node.layer_index = self.layer_of(&node.id);
        }
    }
}

/// Put every node of a layer on the mean primary coordinate of that layer.
///
/// Returns the mean, or `None` when no node of the layer has a position.
pub fn align_layer_to_mean(
    positions: &mut BTreeMap<NodeId, Point>,
    layer_nodes: &[NodeId],
    direction: LayoutDirection,
) -> Option<f64> {
    let primary = |p: &Point| match direction {
        LayoutDirection::TopBottom => p.y,
        LayoutDirection::LeftRight => p.x,
    };

    let values: Vec<f64> = layer_nodes
        .iter()
        .filter_map(|id| positions.get(id).map(primary))
        .collect();
    if values.is_empty() {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;

    for id in layer_nodes {
        if let Some(position) = positions.get_mut(id) {
            match direction {
                LayoutDirection::TopBottom => position.y = mean,
                LayoutDirection::LeftRight => position.x = mean,
            }
        }
    }
    Some(mean)
}

/// Layered layout for flow graphs.
///
/// Children of a splitting node fan out in branch order around their parent,
/// nodes with several parents sit at the mean of their parent slots, and each
/// layer is then pushed apart until siblings no longer overlap.
#[derive(Debug, Clone)]
pub struct FlowLayouter {
    config: EngineConfig,
    coordinates: CoordinateCalculator,
    spacing: BranchSpacingResolver,
}

impl Default for FlowLayouter {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// `(parent, cross-axis offset from the parent centre)` per child.
type ParentSlots<'a> = HashMap<&'a NodeId, Vec<(&'a NodeId, f64)>>;

impl FlowLayouter {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            coordinates: CoordinateCalculator::new(&config),
            spacing: BranchSpacingResolver::new(&config),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn coordinates(&self) -> &CoordinateCalculator {
        &self.coordinates
    }

    fn cross_extent(&self, node: &FlowNode) -> f64 {
        match self.config.direction {
            LayoutDirection::TopBottom => node.size.width,
            LayoutDirection::LeftRight => node.size.height,
        }
    }

    fn root_spacing(&self) -> f64 {
        SpacingPolicy::GENERIC
            .optimal_spacing
            .max(self.spacing.min_distance())
    }

    /// Children of `parent` in slot order. Splitting nodes reserve one slot
    /// per branch so a child keeps its place while sibling branches are
    /// still unconnected.
    fn child_slots<'a>(
        &self,
        parent: &FlowNode,
        outgoing: &[&'a Edge],
        layer_of: &HashMap<NodeId, usize>,
        warnings: &mut Vec<LayoutWarning>,
    ) -> Vec<Option<&'a NodeId>> {
        let Some(&parent_layer) = layer_of.get(&parent.id) else {
            return Vec::new();
        };
        let below = |id: &NodeId| layer_of.get(id).is_some_and(|&l| l > parent_layer);

        let mut slots: Vec<Option<&NodeId>> = Vec::new();
        let branches = parent.branches();
        if parent.node_type.is_branching() {
            if let Some(warning) =
                self.spacing
                    .check_branch_limit(&parent.id, parent.node_type, branches.len())
            {
                warnings.push(warning);
            }
            slots.resize(branches.len(), None);
        }

        for edge in outgoing {
            let Some(child) = edge.target_node_id.as_ref() else {
                continue;
            };
            if !below(child) || slots.contains(&Some(child)) {
                continue;
            }
            let branch_slot = branches
                .iter()
                .position(|branch| branch.port_id() == edge.source_port_id);
            match branch_slot {
                Some(i) if slots[i].is_none() => slots[i] = Some(child),
                _ => slots.push(Some(child)),
            }
        }
        slots
    }

    fn parent_slots<'a>(
        &self,
        nodes: &[FlowNode],
        edges: &'a [Edge],
        assignment: &'a LayerAssignment,
        warnings: &mut Vec<LayoutWarning>,
    ) -> ParentSlots<'a> {
        let mut outgoing: HashMap<&NodeId, Vec<&Edge>> = HashMap::new();
        for edge in edges.iter().filter(|edge| !edge.is_preview()) {
            outgoing.entry(&edge.source_node_id).or_default().push(edge);
        }

        let mut slots: ParentSlots<'a> = HashMap::new();
        for parent in nodes {
            let Some((parent_id, _)) = assignment.node_to_layer.get_key_value(&parent.id) else {
                continue;
            };
            let out = outgoing.get(&parent.id).map(Vec::as_slice).unwrap_or_default();
            let children = self.child_slots(parent, out, &assignment.node_to_layer, warnings);
            if children.iter().all(Option::is_none) {
                continue;
            }
            let offsets = self.spacing.fan_out(parent.node_type, 0.0, children.len());
            for (child, offset) in children.into_iter().zip(offsets) {
                if let Some(child) = child {
                    slots.entry(child).or_default().push((parent_id, offset));
                }
            }
        }
        slots
    }

    /// Minimum centre distance between two neighbours of cross-axis size `a` and `b`.
    fn gap(&self, a: f64, b: f64) -> f64 {
        self.spacing
            .min_distance()
            .max((a + b) / 2.0 + self.config.min_gap)
    }

    /// Push overlapping neighbours apart, then shift the layer back so its
    /// mean matches the mean of the requested centres.
    fn separate(&self, desired: &[f64], extents: &[f64]) -> Vec<f64> {
        if desired.is_empty() {
            return Vec::new();
        }
        let mut order: Vec<usize> = (0..desired.len()).collect();
        order.sort_by(|&a, &b| desired[a].total_cmp(&desired[b]));

        let mut placed = vec![0.0; desired.len()];
        let mut prev: Option<usize> = None;
        for &i in &order {
            placed[i] = match prev {
                Some(p) => desired[i].max(placed[p] + self.gap(extents[p], extents[i])),
                None => desired[i],
            };
            prev = Some(i);
        }

        let count = desired.len() as f64;
        let shift = (placed.iter().sum::<f64>() - desired.iter().sum::<f64>()) / count;
        placed.iter_mut().for_each(|x| *x -= shift);
        placed
    }
}

impl Layouter for FlowLayouter {
    fn execute(&self, nodes: &[FlowNode], edges: &[Edge]) -> Result<LayoutModel, LayoutError> {
        let assignment = assign_layers(nodes, edges)?;
        let mut warnings = assignment.warnings.clone();
        let slots = self.parent_slots(nodes, edges, &assignment, &mut warnings);
        let by_id: HashMap<&NodeId, &FlowNode> = nodes.iter().map(|n| (&n.id, n)).collect();

        let mut centers: HashMap<&NodeId, f64> = HashMap::with_capacity(nodes.len());
        let mut node_positions = BTreeMap::new();

        for (layer, layer_nodes) in assignment.layers.iter().enumerate() {
            let mut desired: Vec<Option<f64>> = Vec::with_capacity(layer_nodes.len());
            for id in layer_nodes {
                let anchors: Vec<f64> = slots
                    .get(id)
                    .into_iter()
                    .flatten()
                    .filter_map(|(parent, offset)| centers.get(parent).map(|c| c + offset))
                    .collect();
                desired.push(
                    (!anchors.is_empty())
                        .then(|| anchors.iter().sum::<f64>() / anchors.len() as f64),
                );
            }

            let roots = desired.iter().filter(|d| d.is_none()).count();
            let mut root_positions = self
                .spacing
                .branch_positions(self.config.base_x, roots, self.root_spacing())
                .into_iter();
            let desired: Vec<f64> = desired
                .into_iter()
                .map(|d| d.or_else(|| root_positions.next()).unwrap_or(self.config.base_x))
                .collect();

            let extents: Vec<f64> = layer_nodes
                .iter()
                .map(|id| {
                    by_id
                        .get(id)
                        .map_or(self.config.node_width, |node| self.cross_extent(node))
                })
                .collect();
            let placed = self.separate(&desired, &extents);

            if let Some((distance, required)) =
                self.spacing.closest_pair(&placed, self.config.node_width)
            {
                tracing::warn!(
                    "Layer {} still has siblings {:.1}px apart (need {:.1}px)",
                    layer,
                    distance,
                    required
                );
                warnings.push(LayoutWarning::OverlapDetected {
                    layer,
                    distance,
                    required,
                });
            }

            let primary = self.coordinates.layer_y(layer);
            for ((id, center), extent) in layer_nodes.iter().zip(placed).zip(extents) {
                let position = match self.config.direction {
                    LayoutDirection::TopBottom => Point::new(center - extent / 2.0, primary),
                    LayoutDirection::LeftRight => Point::new(primary, center - extent / 2.0),
                };
                if !position.is_finite() {
                    return Err(LayoutError::NonFiniteCoordinate { node: id.clone() });
                }
                centers.insert(id, center);
                node_positions.insert(id.clone(), position);
            }
        }

        tracing::debug!(
            "Laid out {} nodes across {} layers ({} warnings)",
            node_positions.len(),
            assignment.layers.len(),
            warnings.len()
        );

        Ok(LayoutModel {
            node_to_layer: assignment.node_to_layer.clone().into_iter().collect(),
            layers: assignment.layers.clone(),
            node_positions,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcanvas_core::{NodeType, OUTPUT_PORT};
    use serde_json::json;

    fn add_node(nodes: &mut Vec<FlowNode>, id: &str, node_type: NodeType) {
        nodes.push(FlowNode::new(id, node_type));
    }

    fn add_edge(edges: &mut Vec<Edge>, source: &str, port: &str, target: &str) {
        edges.push(Edge::connect(
            format!("{source}:{port}->{target}"),
            source,
            port,
            target,
        ));
    }

    fn center_x(model: &LayoutModel, id: &str) -> f64 {
        model.position_of(&NodeId::new(id)).unwrap().x + 60.0
    }

    #[test]
    fn test_chain_follows_layer_coordinates() {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        add_node(&mut nodes, "s", NodeType::Start);
        add_node(&mut nodes, "sms", NodeType::Sms);
        add_edge(&mut edges, "s", OUTPUT_PORT, "sms");

        let model = FlowLayouter::default().execute(&nodes, &edges).unwrap();

        assert_eq!(model.position_of(&NodeId::new("s")), Some(Point::new(340.0, 100.0)));
        assert_eq!(model.position_of(&NodeId::new("sms")), Some(Point::new(340.0, 250.0)));
        assert_eq!(model.layer_count(), 2);
    }

    #[test]
    fn test_crowd_split_children_fan_out_in_branch_order() {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        add_node(&mut nodes, "s", NodeType::Start);
        nodes.push(
            FlowNode::new("split", NodeType::CrowdSplit)
                .with_config(json!({"crowdLayers": [{"crowdName": "VIP"}, {"crowdName": "Normal"}]})),
        );
        add_node(&mut nodes, "rest", NodeType::Wait);
        add_node(&mut nodes, "vip", NodeType::Sms);
        add_node(&mut nodes, "normal", NodeType::AiCall);
        add_edge(&mut edges, "s", OUTPUT_PORT, "split");
        // Connected out of host order on purpose.
        add_edge(&mut edges, "split", "out-unmatch_default", "rest");
        add_edge(&mut edges, "split", "out-audience_0", "vip");
        add_edge(&mut edges, "split", "out-audience_1", "normal");

        let model = FlowLayouter::default().execute(&nodes, &edges).unwrap();

        assert_eq!(center_x(&model, "vip"), 135.0);
        assert_eq!(center_x(&model, "normal"), 400.0);
        assert_eq!(center_x(&model, "rest"), 665.0);
        assert!(model.warnings.is_empty());
    }

    #[test]
    fn test_merge_node_sits_between_parents() {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        add_node(&mut nodes, "s", NodeType::Start);
        nodes.push(FlowNode::new("event", NodeType::EventSplit).with_config(json!({"isConfigured": true})));
        add_node(&mut nodes, "yes", NodeType::Sms);
        add_node(&mut nodes, "no", NodeType::Wait);
        add_node(&mut nodes, "end", NodeType::End);
        add_edge(&mut edges, "s", OUTPUT_PORT, "event");
        add_edge(&mut edges, "event", "out-event_yes", "yes");
        add_edge(&mut edges, "event", "out-event_no", "no");
        add_edge(&mut edges, "yes", OUTPUT_PORT, "end");
        add_edge(&mut edges, "no", OUTPUT_PORT, "end");

        let model = FlowLayouter::default().execute(&nodes, &edges).unwrap();

        assert_eq!(center_x(&model, "yes"), 280.0);
        assert_eq!(center_x(&model, "no"), 520.0);
        assert_eq!(center_x(&model, "end"), 400.0);
        assert_eq!(model.layer_of(&NodeId::new("end")), Some(3));
    }

    #[test]
    fn test_crowded_layer_is_separated_around_its_mean() {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        add_node(&mut nodes, "s", NodeType::Start);
        for split in ["e1", "e2"] {
            nodes.push(FlowNode::new(split, NodeType::EventSplit).with_config(json!({"isConfigured": true})));
            add_edge(&mut edges, "s", OUTPUT_PORT, split);
        }
        for (parent, port, child) in [
            ("e1", "out-event_yes", "a"),
            ("e1", "out-event_no", "b"),
            ("e2", "out-event_yes", "c"),
            ("e2", "out-event_no", "d"),
        ] {
            add_node(&mut nodes, child, NodeType::Sms);
            add_edge(&mut edges, parent, port, child);
        }

        let model = FlowLayouter::default().execute(&nodes, &edges).unwrap();
        let xs: Vec<f64> = ["a", "b", "c", "d"].iter().map(|id| center_x(&model, id)).collect();

        assert!(xs.windows(2).all(|pair| pair[1] - pair[0] >= 150.0 - 1e-9));
        let mean = xs.iter().sum::<f64>() / 4.0;
        assert!((mean - 400.0).abs() < 1e-9);
        assert!(model.warnings.is_empty());
    }

    #[test]
    fn test_left_right_swaps_axes() {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        add_node(&mut nodes, "s", NodeType::Start);
        add_node(&mut nodes, "sms", NodeType::Sms);
        add_edge(&mut edges, "s", OUTPUT_PORT, "sms");

        let layouter =
            FlowLayouter::new(EngineConfig::default().with_direction(LayoutDirection::LeftRight));
        let model = layouter.execute(&nodes, &edges).unwrap();

        let s = model.position_of(&NodeId::new("s")).unwrap();
        let sms = model.position_of(&NodeId::new("sms")).unwrap();
        assert_eq!(sms.x - s.x, 150.0);
        assert_eq!(s.y, sms.y);
    }

    #[test]
    fn test_two_roots_share_layer_zero() {
        let mut nodes = Vec::new();
        add_node(&mut nodes, "s1", NodeType::Start);
        add_node(&mut nodes, "s2", NodeType::Start);

        let model = FlowLayouter::default().execute(&nodes, &[]).unwrap();
        assert_eq!(center_x(&model, "s1"), 290.0);
        assert_eq!(center_x(&model, "s2"), 510.0);
    }

    #[test]
    fn test_cycle_aborts_pass() {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        add_node(&mut nodes, "s", NodeType::Start);
        add_node(&mut nodes, "a", NodeType::Sms);
        add_edge(&mut edges, "s", OUTPUT_PORT, "a");
        add_edge(&mut edges, "a", OUTPUT_PORT, "a");

        let err = FlowLayouter::default().execute(&nodes, &edges).unwrap_err();
        assert!(matches!(err, LayoutError::CyclicGraph { .. }));
    }

    #[test]
    fn test_align_layer_to_mean() {
        let mut positions = BTreeMap::new();
        positions.insert(NodeId::new("a"), Point::new(0.0, 200.0));
        positions.insert(NodeId::new("b"), Point::new(150.0, 250.0));
        positions.insert(NodeId::new("c"), Point::new(300.0, 180.0));
        let layer = vec![NodeId::new("a"), NodeId::new("b"), NodeId::new("c")];

        let mean = align_layer_to_mean(&mut positions, &layer, LayoutDirection::TopBottom);

        assert_eq!(mean, Some(210.0));
        assert!(positions.values().all(|p| p.y == 210.0));
        assert_eq!(positions[&NodeId::new("b")].x, 150.0);
        assert_eq!(
            align_layer_to_mean(&mut positions, &[NodeId::new("zz")], LayoutDirection::TopBottom),
            None
        );
    }
}
