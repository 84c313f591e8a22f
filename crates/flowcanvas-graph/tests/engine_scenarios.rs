use flowcanvas_core::{INPUT_PORT, OUTPUT_PORT};
use flowcanvas_events::{Event, EventBus, TopologyChange};
use flowcanvas_graph::{
    CanvasEngine, Edge, EngineConfig, FlowNode, GraphModel, HostGraph, LayoutDirection,
    LayoutWarning, NodeId, NodeRecord, NodeType, Point, PortId, PreviewState,
};
use serde_json::json;
use std::sync::Arc;

fn engine_with_bus() -> anyhow::Result<(CanvasEngine, EventBus)> {
    let bus = EventBus::new();
    let engine = CanvasEngine::new(EngineConfig::default())?.with_event_bus(bus.clone());
    Ok((engine, bus))
}

fn crowd_split_graph() -> GraphModel {
    let mut host = GraphModel::new();
    host.add_node(FlowNode::new("start", NodeType::Start));
    host.add_node(
        FlowNode::new("split", NodeType::CrowdSplit)
            .with_size(120.0, 156.0)
            .with_config(json!({"crowdLayers": [{"crowdName": "VIP"}, {"crowdName": "Normal"}]})),
    );
    host.add_node(FlowNode::new("vip-sms", NodeType::Sms));
    host.add_edge(Edge::connect("e1", "start", OUTPUT_PORT, "split"));
    host
}

fn lines_of(host: &GraphModel, node: &str) -> usize {
    host.preview_lines()
        .filter(|line| line.source_node_id.as_str() == node)
        .count()
}

#[test]
fn test_crowd_split_gets_one_preview_line_per_branch() -> anyhow::Result<()> {
    let (mut engine, _bus) = engine_with_bus()?;
    let mut host = crowd_split_graph();

    engine.recompute(&mut host)?;

    assert_eq!(lines_of(&host, "split"), 3);
    let ports: Vec<String> = host
        .preview_lines()
        .filter(|line| line.source_node_id.as_str() == "split")
        .map(|line| line.source_port_id.to_string())
        .collect();
    assert!(ports.contains(&"out-unmatch_default".to_string()));
    Ok(())
}

#[test]
fn test_connecting_a_branch_retires_exactly_one_line() -> anyhow::Result<()> {
    let (mut engine, bus) = engine_with_bus()?;
    let mut host = crowd_split_graph();
    engine.recompute(&mut host)?;
    bus.drain();

    let edge = engine.connect(
        &mut host,
        &NodeId::new("split"),
        &PortId::new("out-audience_0"),
        &NodeId::new("vip-sms"),
    );
    assert!(edge.is_some());

    let retired = bus
        .drain()
        .into_iter()
        .filter(|event| matches!(event, Event::PreviewLineRetired { .. }))
        .count();
    assert_eq!(retired, 1);
    assert_eq!(lines_of(&host, "split"), 2);

    // The follow-up pass must not bring the line back.
    engine.on_animation_frame(&mut host, 1);
    assert_eq!(lines_of(&host, "split"), 2);
    assert_eq!(
        engine.layout().and_then(|l| l.layer_of(&NodeId::new("vip-sms"))),
        Some(2)
    );
    Ok(())
}

#[test]
fn test_same_layer_analysis_never_reports_own_lines() -> anyhow::Result<()> {
    let (mut engine, _bus) = engine_with_bus()?;
    let mut host = GraphModel::new();
    host.add_node(FlowNode::new("start", NodeType::Start));
    host.add_node(FlowNode::new("event", NodeType::EventSplit).with_config(json!({"isConfigured": true})));
    host.add_node(FlowNode::new("a", NodeType::Sms));
    host.add_node(FlowNode::new("b", NodeType::Wait));
    host.add_edge(Edge::connect("e1", "start", OUTPUT_PORT, "event"));
    host.add_edge(Edge::connect("e2", "event", "out-event_yes", "a"));
    host.add_edge(Edge::connect("e3", "event", "out-event_no", "b"));
    engine.recompute(&mut host)?;

    let a = engine.previews().line_for_port(&NodeId::new("a"), &PortId::new(OUTPUT_PORT));
    let end_y = a.map(|line| line.end_position.y).unwrap_or_default();
    let endpoints = engine
        .previews()
        .analyze_same_layer_endpoints(end_y, 50.0, &NodeId::new("a"));

    assert_eq!(endpoints.len(), 1);
    assert_eq!(endpoints[0].source_node_id, NodeId::new("b"));
    assert!(endpoints.iter().all(|e| e.source_node_id.as_str() != "a"));
    Ok(())
}

#[test]
fn test_failed_pass_keeps_previous_layout() -> anyhow::Result<()> {
    let (mut engine, bus) = engine_with_bus()?;
    let mut host = GraphModel::new();
    host.add_node(FlowNode::new("start", NodeType::Start));
    host.add_node(FlowNode::new("a", NodeType::Sms));
    host.add_node(FlowNode::new("b", NodeType::Wait));
    host.add_edge(Edge::connect("e1", "start", OUTPUT_PORT, "a"));
    host.add_edge(Edge::connect("e2", "a", OUTPUT_PORT, "b"));
    let before = engine.recompute(&mut host)?;
    bus.drain();

    host.add_edge(Edge::connect("loop", "b", OUTPUT_PORT, "a"));
    engine.notify_topology_changed(TopologyChange::EdgeAdded);
    let report = engine.on_animation_frame(&mut host, 1);

    assert!(report.recomputed);
    assert!(report.layout_error.is_some());
    let after = engine.layout().ok_or_else(|| anyhow::anyhow!("layout missing"))?;
    assert!(Arc::ptr_eq(&before, &after));

    let failures = bus
        .drain()
        .into_iter()
        .filter(|event| matches!(event, Event::LayoutFailed { .. }))
        .count();
    assert_eq!(failures, 1);
    Ok(())
}

/// start -> sms, plus an unconnected wait node on layer 0.
fn drag_graph() -> GraphModel {
    let mut host = GraphModel::new();
    host.add_node(FlowNode::new("start", NodeType::Start));
    host.add_node(FlowNode::new("wait", NodeType::Wait));
    host.add_node(FlowNode::new("sms", NodeType::Sms));
    host.add_edge(Edge::connect("e1", "start", OUTPUT_PORT, "sms"));
    host
}

fn wait_input(host: &GraphModel) -> Point {
    let position = host
        .record(&NodeId::new("wait"))
        .and_then(|record| record.position)
        .unwrap_or_default();
    Point::new(position.x + 60.0, position.y)
}

#[test]
fn test_drag_snaps_and_connects() -> anyhow::Result<()> {
    let (mut engine, _bus) = engine_with_bus()?;
    let mut host = drag_graph();
    engine.recompute(&mut host)?;

    let sms = NodeId::new("sms");
    let out = PortId::new(OUTPUT_PORT);
    assert!(engine.begin_drag(&sms, &out));

    let target = wait_input(&host);
    engine.drag_move(Point::new(target.x - 5.0, target.y + 5.0));
    let report = engine.on_animation_frame(&mut host, 1);
    assert_eq!(report.snap.map(|s| s.node_id), Some(NodeId::new("wait")));
    assert!(
        host.preview_lines()
            .any(|line| line.source_node_id == sms && line.state == PreviewState::Snapping)
    );

    let edge = engine
        .end_drag(&mut host)
        .ok_or_else(|| anyhow::anyhow!("drag did not connect"))?;
    assert_eq!(edge.target_node_id, Some(NodeId::new("wait")));
    assert_eq!(edge.target_port_id, Some(PortId::new(INPUT_PORT)));
    assert_eq!(lines_of(&host, "sms"), 0);
    Ok(())
}

#[test]
fn test_cancelled_drag_leaves_no_snapping_line() -> anyhow::Result<()> {
    let (mut engine, bus) = engine_with_bus()?;
    let mut host = drag_graph();
    engine.recompute(&mut host)?;

    engine.begin_drag(&NodeId::new("sms"), &PortId::new(OUTPUT_PORT));
    engine.drag_move(wait_input(&host));
    engine.on_animation_frame(&mut host, 1);
    engine.cancel_drag(&mut host);

    assert!(host.preview_lines().all(|line| line.state != PreviewState::Snapping));
    assert!(engine.preview_lines().all(|line| line.state != PreviewState::Snapping));
    assert!(bus.drain().iter().any(|event| matches!(event, Event::SnapCleared)));

    // A pointer recorded after cancel is ignored.
    engine.drag_move(wait_input(&host));
    assert!(engine.on_animation_frame(&mut host, 2).snap.is_none());
    assert_eq!(host.edges().len(), 1);
    Ok(())
}

#[test]
fn test_at_most_one_recompute_per_frame() -> anyhow::Result<()> {
    let (mut engine, bus) = engine_with_bus()?;
    let mut host = drag_graph();

    for _ in 0..10 {
        engine.notify_topology_changed(TopologyChange::NodeAdded);
    }
    let mut passes = 0;
    for frame in [1, 1, 1, 2, 3] {
        if engine.on_animation_frame(&mut host, frame).recomputed {
            passes += 1;
        }
    }

    assert_eq!(passes, 1);
    let recomputed = bus
        .drain()
        .into_iter()
        .filter(|event| matches!(event, Event::LayoutRecomputed { .. }))
        .count();
    assert_eq!(recomputed, 1);
    Ok(())
}

#[test]
fn test_malformed_node_is_skipped_not_fatal() -> anyhow::Result<()> {
    let (mut engine, _bus) = engine_with_bus()?;
    let mut host = drag_graph();
    host.add_record(NodeRecord {
        id: "half-built".to_string(),
        node_type: Some(NodeType::Sms),
        position: None,
        size: None,
        data: None,
        content_line_count: None,
    });

    let layout = engine.recompute(&mut host)?;

    assert!(layout.position_of(&NodeId::new("half-built")).is_none());
    assert!(layout.position_of(&NodeId::new("sms")).is_some());
    assert!(layout.warnings.iter().any(
        |w| matches!(w, LayoutWarning::SkippedNode { node, .. } if node == "half-built")
    ));
    Ok(())
}

#[test]
fn test_disconnect_restores_preview_line() -> anyhow::Result<()> {
    let (mut engine, _bus) = engine_with_bus()?;
    let mut host = drag_graph();
    engine.recompute(&mut host)?;
    assert_eq!(lines_of(&host, "start"), 0);

    assert!(engine.disconnect(&mut host, &"e1".into()));
    engine.on_animation_frame(&mut host, 1);
    assert_eq!(lines_of(&host, "start"), 1);
    Ok(())
}

#[test]
fn test_node_move_updates_its_lines_on_next_frame() -> anyhow::Result<()> {
    let (mut engine, _bus) = engine_with_bus()?;
    let mut host = drag_graph();
    engine.recompute(&mut host)?;

    let sms = NodeId::new("sms");
    host.set_node_position(&sms, Point::new(1000.0, 1000.0));
    engine.notify_node_moved(&sms, Point::new(1000.0, 1000.0));
    let report = engine.on_animation_frame(&mut host, 1);

    assert!(!report.recomputed);
    assert_eq!(report.preview_changes, 1);
    let line = engine
        .previews()
        .line_for_port(&sms, &PortId::new(OUTPUT_PORT))
        .ok_or_else(|| anyhow::anyhow!("line missing"))?;
    assert_eq!(line.end_position, Point::new(1060.0, 1196.0));
    Ok(())
}

#[test]
fn test_reconfigure_to_left_right() -> anyhow::Result<()> {
    let (mut engine, _bus) = engine_with_bus()?;
    let mut host = drag_graph();
    engine.recompute(&mut host)?;

    let lr = engine.config().with_direction(LayoutDirection::LeftRight);
    engine.reconfigure(lr)?;
    assert!(engine.has_pending_layout());
    engine.on_animation_frame(&mut host, 1);

    let layout = engine.layout().ok_or_else(|| anyhow::anyhow!("layout missing"))?;
    let start = layout.position_of(&NodeId::new("start")).unwrap_or_default();
    let sms = layout.position_of(&NodeId::new("sms")).unwrap_or_default();
    assert_eq!(sms.x - start.x, 150.0);
    assert!(engine.reconfigure(EngineConfig::default().with_layer_spacing(0.0)).is_err());
    Ok(())
}

#[test]
fn test_node_dragged_onto_preview_end_is_detected() -> anyhow::Result<()> {
    let (mut engine, _bus) = engine_with_bus()?;
    let mut host = drag_graph();
    engine.recompute(&mut host)?;

    let end = engine
        .previews()
        .line_for_port(&NodeId::new("sms"), &PortId::new(OUTPUT_PORT))
        .map(|line| line.end_position)
        .ok_or_else(|| anyhow::anyhow!("line missing"))?;
    let wait = NodeId::new("wait");
    host.set_node_position(&wait, Point::new(end.x - 60.0, end.y + 4.0));

    let snap = engine
        .preview_line_snap_for(&host, &wait)
        .ok_or_else(|| anyhow::anyhow!("no snap"))?;
    assert_eq!(snap.source_node_id, NodeId::new("sms"));
    Ok(())
}
