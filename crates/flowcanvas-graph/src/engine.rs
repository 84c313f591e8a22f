use crate::graph::{HostGraph, adapt_node};
use crate::layout::{FlowLayouter, LayoutModel, Layouter};
use crate::ports::{PortOffset, PortPositionResolver};
use crate::preview::{PreviewChange, PreviewLine, PreviewLineManager, PreviewState};
use crate::scheduler::FrameThrottle;
use crate::snap::{PreviewSnap, SnapDetector, SnapState, SnapTarget};
use flowcanvas_core::{
    Edge, EdgeId, EngineConfig, FlowNode, LayoutError, LayoutWarning, NodeId, Point, PortId,
    PreviewLineId, output_port_ids,
};
use flowcanvas_events::{Event, EventBus, TopologyChange};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// What happened during one animation frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub recomputed: bool,
    pub layout_error: Option<LayoutError>,
    pub preview_changes: usize,
    pub snap: Option<SnapTarget>,
}

/// Node, edge and diagnostics snapshot of the host taken at the start of a pass.
struct Snapshot {
    nodes: Vec<FlowNode>,
    edges: Vec<Edge>,
    skipped: Vec<LayoutWarning>,
}

/// Whether `to` can be reached from `from` along real edges.
fn reaches(edges: &[Edge], from: &NodeId, to: &NodeId) -> bool {
    let mut seen: HashSet<&NodeId> = HashSet::from([from]);
    let mut queue = VecDeque::from([from]);
    while let Some(node) = queue.pop_front() {
        if node == to {
            return true;
        }
        let next = edges
            .iter()
            .filter(|edge| &edge.source_node_id == node)
            .filter_map(|edge| edge.target_node_id.as_ref());
        for target in next {
            if seen.insert(target) {
                queue.push_back(target);
            }
        }
    }
    false
}

/// Entry point for canvas hosts.
///
/// Hosts report changes as they happen (`notify_*`, `drag_move`) and call
/// [`CanvasEngine::on_animation_frame`] from their render loop. Layout and
/// preview work is coalesced so each frame runs at most one pass; the
/// published layout is only replaced after a pass succeeds.
pub struct CanvasEngine {
    config: EngineConfig,
    layouter: FlowLayouter,
    layout: Option<Arc<LayoutModel>>,
    previews: PreviewLineManager,
    snap: SnapDetector,
    layout_throttle: FrameThrottle,
    preview_throttle: FrameThrottle,
    pending_pointer: Option<Point>,
    bus: Option<EventBus>,
}

impl CanvasEngine {
    pub fn new(config: EngineConfig) -> Result<Self, LayoutError> {
        config.validate()?;
        Ok(Self {
            layouter: FlowLayouter::new(config.clone()),
            previews: PreviewLineManager::new(config.clone()),
            snap: SnapDetector::new(&config),
            config,
            layout: None,
            layout_throttle: FrameThrottle::new(),
            preview_throttle: FrameThrottle::new(),
            pending_pointer: None,
            bus: None,
        })
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Last successfully computed layout.
    pub fn layout(&self) -> Option<Arc<LayoutModel>> {
        self.layout.clone()
    }

    pub fn preview_lines(&self) -> impl Iterator<Item = &PreviewLine> {
        self.previews.lines()
    }

    pub fn previews(&self) -> &PreviewLineManager {
        &self.previews
    }

    pub fn snap_state(&self) -> &SnapState {
        self.snap.state()
    }

    pub fn has_pending_layout(&self) -> bool {
        self.layout_throttle.is_pending()
    }

    fn publish(&self, event: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(event);
        }
    }

    fn snapshot(host: &dyn HostGraph) -> Snapshot {
        let mut nodes = Vec::new();
        let mut skipped = Vec::new();
        for id in host.node_ids() {
            let adapted = match host.node(&id) {
                Some(handle) => adapt_node(handle),
                None => Err(LayoutError::MissingNodeAccessor {
                    node: id.to_string(),
                    accessor: "getCellById",
                }),
            };
            match adapted {
                Ok(node) => nodes.push(node),
                Err(err) => {
                    tracing::warn!("Skipping node {} for this pass: {}", id, err);
                    skipped.push(LayoutWarning::SkippedNode {
                        node: id.to_string(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        Snapshot {
            nodes,
            edges: host.edges(),
            skipped,
        }
    }

    fn apply_preview_changes(&self, host: &mut dyn HostGraph, changes: &[PreviewChange]) {
        for change in changes {
            match change {
                PreviewChange::Created(line) => {
                    host.upsert_preview_line(line);
                    self.publish(Event::PreviewLineCreated {
                        id: line.id.clone(),
                        source_node_id: line.source_node_id.clone(),
                        source_port_id: line.source_port_id.clone(),
                        end_position: Some(line.end_position),
                    });
                }
                PreviewChange::Updated(line) => host.upsert_preview_line(line),
                PreviewChange::Retired(line) => {
                    host.remove_preview_line(&line.id);
                    self.publish(Event::PreviewLineRetired {
                        id: line.id.clone(),
                        source_node_id: line.source_node_id.clone(),
                    });
                }
            }
        }
    }

    fn run_pass(&mut self, host: &mut dyn HostGraph) -> Result<(Arc<LayoutModel>, usize), LayoutError> {
        let Snapshot {
            mut nodes,
            edges,
            skipped,
        } = Self::snapshot(host);

        let mut model = match self.layouter.execute(&nodes, &edges) {
            Ok(model) => model,
            Err(err) => {
                tracing::error!("Layout pass failed, keeping the previous layout: {}", err);
                self.publish(Event::LayoutFailed {
                    message: err.to_string(),
                });
                return Err(err);
            }
        };
        model.warnings.splice(0..0, skipped);

        for (id, position) in &model.node_positions {
            if !host.set_node_position(id, *position) {
                tracing::warn!("Host rejected position update for node {}", id);
            }
        }
        model.apply_to(&mut nodes);

        let changes = self.previews.sync_all(&nodes, &edges);
        self.apply_preview_changes(host, &changes);

        for warning in &model.warnings {
            self.publish(Event::Warning(warning.clone()));
        }
        self.publish(Event::LayoutRecomputed {
            node_count: model.node_positions.len(),
            layer_count: model.layer_count(),
            warning_count: model.warnings.len(),
        });
        tracing::debug!(
            "Recomputed layout: {} nodes, {} layers, {} preview changes",
            model.node_positions.len(),
            model.layer_count(),
            changes.len()
        );

        let model = Arc::new(model);
        self.layout = Some(Arc::clone(&model));
        self.layout_throttle.cancel();
        self.preview_throttle.cancel();
        Ok((model, changes.len()))
    }

    /// Run a full layout pass now and publish the result.
    ///
    /// On error the previous layout stays published and a single
    /// `LayoutFailed` event is emitted.
    pub fn recompute(&mut self, host: &mut dyn HostGraph) -> Result<Arc<LayoutModel>, LayoutError> {
        self.run_pass(host).map(|(model, _)| model)
    }

    fn flush_previews(&mut self, host: &mut dyn HostGraph) -> usize {
        let snapshot = Self::snapshot(host);
        let changes = self.previews.flush(&snapshot.nodes, &snapshot.edges);
        self.apply_preview_changes(host, &changes);
        changes.len()
    }

    pub fn notify_topology_changed(&mut self, change: TopologyChange) {
        self.layout_throttle.request();
        self.previews.mark_graph_changed();
        self.publish(Event::TopologyChanged { change });
    }

    pub fn notify_node_moved(&mut self, id: &NodeId, position: Point) {
        self.previews.mark_moved(id);
        self.preview_throttle.request();
        self.publish(Event::NodeMoved {
            id: id.clone(),
            position,
        });
    }

    /// The host deleted a node; its preview lines go with it.
    pub fn notify_node_removed(&mut self, host: &mut dyn HostGraph, id: &NodeId) {
        let changes = self.previews.on_node_removed(id);
        self.apply_preview_changes(host, &changes);
        self.notify_topology_changed(TopologyChange::NodeRemoved);
    }

    /// Swap in a new configuration snapshot. Any drag in progress is cancelled.
    pub fn reconfigure(&mut self, config: EngineConfig) -> Result<(), LayoutError> {
        config.validate()?;
        self.layouter = FlowLayouter::new(config.clone());
        self.snap = SnapDetector::new(&config);
        self.previews.reconfigure(config.clone());
        self.pending_pointer = None;
        self.config = config;
        self.notify_topology_changed(TopologyChange::Reconfigured);
        Ok(())
    }

    /// Drive deferred work. Call once per rendered frame.
    pub fn on_animation_frame(&mut self, host: &mut dyn HostGraph, frame: u64) -> FrameReport {
        let mut report = FrameReport::default();

        if self.layout_throttle.on_frame(frame) {
            report.recomputed = true;
            match self.run_pass(host) {
                Ok((_, changes)) => report.preview_changes = changes,
                Err(err) => {
                    report.preview_changes = self.flush_previews(host);
                    report.layout_error = Some(err);
                }
            }
        } else if self.preview_throttle.on_frame(frame) {
            report.preview_changes = self.flush_previews(host);
        }

        if let Some(pointer) = self.pending_pointer.take() {
            report.snap = self.evaluate_snap(host, pointer);
        }
        report
    }

    /// Start dragging the preview line of `port` on `source`.
    pub fn begin_drag(&mut self, source: &NodeId, port: &PortId) -> bool {
        if self.previews.line_for_port(source, port).is_none() {
            tracing::warn!(
                "Ignoring drag from {}:{} because the port has no preview line",
                source,
                port
            );
            return false;
        }
        self.snap.begin_drag(source.clone(), port.clone());
        self.pending_pointer = None;
        true
    }

    /// Record the pointer; it is evaluated on the next animation frame.
    pub fn drag_move(&mut self, pointer: Point) {
        if self.snap.is_dragging() {
            self.pending_pointer = Some(pointer);
        }
    }

    fn set_line_state(&mut self, host: &mut dyn HostGraph, id: &PreviewLineId, state: PreviewState) {
        if let Some(change) = self.previews.set_state(id, state) {
            self.apply_preview_changes(host, &[change]);
        }
    }

    fn evaluate_snap(&mut self, host: &mut dyn HostGraph, pointer: Point) -> Option<SnapTarget> {
        let source = self.snap.drag_source()?.clone();
        let line_id = PreviewLine::line_id(&source.node_id, &source.port_id);
        let previous = self.snap.state().target().map(|t| t.node_id.clone());

        let snapshot = Self::snapshot(host);
        let target = self.snap.update(&snapshot.nodes, pointer).target().cloned();

        match &target {
            Some(target) => {
                self.set_line_state(host, &line_id, PreviewState::Snapping);
                if previous.as_ref() != Some(&target.node_id) {
                    self.publish(Event::SnapCandidate {
                        node_id: target.node_id.clone(),
                        distance: target.distance,
                    });
                }
            }
            None => {
                self.set_line_state(host, &line_id, PreviewState::Default);
                if previous.is_some() {
                    self.publish(Event::SnapCleared);
                }
            }
        }
        target
    }

    /// Finish the drag. Connects to the snapped input port, if any.
    pub fn end_drag(&mut self, host: &mut dyn HostGraph) -> Option<Edge> {
        if let Some(pointer) = self.pending_pointer.take() {
            self.evaluate_snap(host, pointer);
        }
        let source = self.snap.drag_source().cloned();
        let target = self.snap.release();

        let cleared = self.previews.clear_snapping();
        self.apply_preview_changes(host, &cleared);

        let (source, target) = (source?, target?);
        self.connect(host, &source.node_id, &source.port_id, &target.node_id)
    }

    /// Abort the drag and drop any snapping highlight.
    pub fn cancel_drag(&mut self, host: &mut dyn HostGraph) {
        let had_candidate = self.snap.state().target().is_some();
        self.snap.cancel();
        self.pending_pointer = None;
        let cleared = self.previews.clear_snapping();
        self.apply_preview_changes(host, &cleared);
        if had_candidate {
            self.publish(Event::SnapCleared);
        }
    }

    /// Create a real edge from `port` on `source` to the input of `target`.
    ///
    /// The port's preview line is retired in the same step. Returns `None`
    /// (with a warning) when either node is missing, the target has no input,
    /// or the port already carries an edge.
    pub fn connect(
        &mut self,
        host: &mut dyn HostGraph,
        source: &NodeId,
        port: &PortId,
        target: &NodeId,
    ) -> Option<Edge> {
        if source == target {
            tracing::warn!("Refusing to connect node {} to itself", source);
            return None;
        }
        let Some(source_handle) = host.node(source) else {
            tracing::warn!("Cannot connect from missing node {}", source);
            return None;
        };
        let source_node = match adapt_node(source_handle) {
            Ok(node) => node,
            Err(err) => {
                tracing::warn!("Cannot connect from node {}: {}", source, err);
                return None;
            }
        };
        let has_port = output_port_ids(source_node.node_type, &source_node.branches())
            .iter()
            .any(|(id, _)| id == port);
        if !has_port {
            tracing::warn!("Node {} has no output port {}", source, port);
            return None;
        }
        let Some(target_handle) = host.node(target) else {
            tracing::warn!("Cannot connect to missing node {}", target);
            return None;
        };
        if target_handle.node_type().is_some_and(|t| !t.has_input()) {
            tracing::warn!("Node {} has no input port", target);
            return None;
        }
        let edges = host.edges();
        let occupied = edges.iter().any(|edge| {
            !edge.is_preview() && &edge.source_node_id == source && &edge.source_port_id == port
        });
        if occupied {
            tracing::warn!("Port {}:{} is already connected", source, port);
            return None;
        }
        if reaches(&edges, target, source) {
            tracing::warn!("Connecting {} to {} would close a cycle", source, target);
            return None;
        }

        let edge = Edge::connect(
            EdgeId::new(format!("{source}:{port}->{target}")),
            source.clone(),
            port.clone(),
            target.clone(),
        );
        host.add_edge(edge.clone());
        if let Some(change) = self.previews.on_edge_connected(source, port) {
            self.apply_preview_changes(host, &[change]);
        }
        self.publish(Event::EdgeConnected {
            id: edge.id.clone(),
            source_node_id: source.clone(),
            source_port_id: port.clone(),
            target_node_id: target.clone(),
        });
        self.notify_topology_changed(TopologyChange::EdgeAdded);
        Some(edge)
    }

    /// Remove an edge; the freed port gets its preview line back on the next frame.
    pub fn disconnect(&mut self, host: &mut dyn HostGraph, edge: &EdgeId) -> bool {
        if !host.remove_edge(edge) {
            return false;
        }
        self.notify_topology_changed(TopologyChange::EdgeRemoved);
        true
    }

    /// Preview line of another node whose end lies on `node`'s input port.
    pub fn preview_line_snap_for(&self, host: &dyn HostGraph, node: &NodeId) -> Option<PreviewSnap> {
        let handle = host.node(node)?;
        match adapt_node(handle) {
            Ok(node) => self.snap.detect_preview_line_snap(&node, self.previews.lines()),
            Err(err) => {
                tracing::warn!("Cannot check preview line snap: {}", err);
                None
            }
        }
    }

    /// Hide a node's preview lines while the node itself is dragged.
    pub fn set_preview_lines_hidden(&mut self, host: &mut dyn HostGraph, node: &NodeId, hidden: bool) {
        let changes = self.previews.set_node_hidden(node, hidden);
        self.apply_preview_changes(host, &changes);
    }

    /// Check rendered port offsets of a node against the expected geometry.
    pub fn validate_ports(
        &self,
        host: &dyn HostGraph,
        node: &NodeId,
        observed: &[PortOffset],
    ) -> Result<Vec<LayoutWarning>, LayoutError> {
        let handle = host.node(node).ok_or_else(|| LayoutError::MissingNodeAccessor {
            node: node.to_string(),
            accessor: "getCellById",
        })?;
        let node = adapt_node(handle)?;
        let warnings =
            PortPositionResolver::new(&self.config).validate(&node, &node.branches(), observed)?;
        for warning in &warnings {
            self.publish(Event::Warning(warning.clone()));
        }
        Ok(warnings)
    }
}
