use flowcanvas_core::{Edge, FlowNode, LayoutError, LayoutWarning, NodeId, NodeType};
use std::collections::{HashMap, VecDeque};

/// Layer of every node plus the per-layer membership lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerAssignment {
    pub node_to_layer: HashMap<NodeId, usize>,
    /// `layers[k]` lists the nodes of layer `k` in host iteration order.
    pub layers: Vec<Vec<NodeId>>,
    pub warnings: Vec<LayoutWarning>,
}

impl LayerAssignment {
    pub fn layer_of(&self, id: &NodeId) -> Option<usize> {
        self.node_to_layer.get(id).copied()
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}

/// Real edges between known nodes, as index pairs.
fn resolve_edges(index: &HashMap<&NodeId, usize>, edges: &[Edge]) -> Vec<(usize, usize)> {
    let mut resolved = Vec::with_capacity(edges.len());
    for edge in edges {
        let Some(target) = &edge.target_node_id else {
            continue;
        };
        match (index.get(&edge.source_node_id), index.get(target)) {
            (Some(&source), Some(&target)) => resolved.push((source, target)),
            _ => tracing::warn!(
                "Ignoring edge {} during layering: endpoint {} -> {} is not in the snapshot",
                edge.id,
                edge.source_node_id,
                target
            ),
        }
    }
    resolved
}

fn indegree_of(edges: &[(usize, usize)], node: usize) -> usize {
    edges.iter().filter(|&&(_, target)| target == node).count()
}

/// Kahn's algorithm. Returns the topological order or the nodes left on a cycle.
fn topological_order(
    node_count: usize,
    outgoing: &[Vec<usize>],
    mut indegree: Vec<usize>,
) -> Result<Vec<usize>, Vec<usize>> {
    let mut queue: VecDeque<usize> = (0..node_count).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(node_count);

    while let Some(node) = queue.pop_front() {
        order.push(node);
        for &next in &outgoing[node] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if order.len() == node_count {
        Ok(order)
    } else {
        Err((0..node_count).filter(|&i| indegree[i] > 0).collect())
    }
}

/// Assign every node to a layer.
///
/// Layers propagate from `Start` nodes using the longest-path rule, so a node
/// always sits strictly below each of its predecessors. Nodes that no start
/// node reaches land on layer 0 and are reported as orphans.
pub fn assign_layers(nodes: &[FlowNode], edges: &[Edge]) -> Result<LayerAssignment, LayoutError> {
    let index: HashMap<&NodeId, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (&node.id, i))
        .collect();

    let resolved = resolve_edges(&index, edges);
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut indegree = vec![0usize; nodes.len()];
    for &(source, target) in &resolved {
        outgoing[source].push(target);
        indegree[target] += 1;
    }

    let order = topological_order(nodes.len(), &outgoing, indegree).map_err(|stuck| {
        LayoutError::CyclicGraph {
            nodes: stuck.into_iter().map(|i| nodes[i].id.clone()).collect(),
        }
    })?;

    let mut reachable = vec![false; nodes.len()];
    let mut frontier: VecDeque<usize> = nodes
        .iter()
        .enumerate()
        .filter(|(_, node)| node.node_type == NodeType::Start)
        .map(|(i, _)| i)
        .collect();
    for &start in &frontier {
        reachable[start] = true;
    }
    while let Some(node) = frontier.pop_front() {
        for &next in &outgoing[node] {
            if !reachable[next] {
                reachable[next] = true;
                frontier.push_back(next);
            }
        }
    }

    // Longest path over the topological order; only reachable edges count.
    // Start nodes stay on layer 0 so their successors are placed from there.
    let mut layer = vec![0usize; nodes.len()];
    for &node in &order {
        if !reachable[node] {
            continue;
        }
        for &next in &outgoing[node] {
            if nodes[next].node_type == NodeType::Start {
                continue;
            }
            layer[next] = layer[next].max(layer[node] + 1);
        }
    }

    let mut warnings = Vec::new();
    for (i, node) in nodes.iter().enumerate() {
        if !reachable[i] {
            tracing::warn!(
                "Node {} is not reachable from any start node; placing it on layer 0",
                node.id
            );
            layer[i] = 0;
            warnings.push(LayoutWarning::OrphanNode {
                node: node.id.clone(),
            });
        } else if node.node_type == NodeType::Start && indegree_of(&resolved, i) > 0 {
            tracing::warn!("Start node {} has incoming edges; pinning it to layer 0", node.id);
        }
    }

    let layer_count = layer.iter().max().map_or(0, |max| max + 1);
    let mut layers = vec![Vec::new(); layer_count];
    let mut node_to_layer = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        layers[layer[i]].push(node.id.clone());
        node_to_layer.insert(node.id.clone(), layer[i]);
    }

    Ok(LayerAssignment {
        node_to_layer,
        layers,
        warnings,
    })
}
