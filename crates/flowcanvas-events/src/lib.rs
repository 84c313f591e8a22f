use crossbeam_channel::{Receiver, Sender, unbounded};
use flowcanvas_core::{EdgeId, LayoutWarning, NodeId, Point, PortId, PreviewLineId};
use serde::{Deserialize, Serialize};

/// Why a topology change was signalled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopologyChange {
    NodeAdded,
    NodeRemoved,
    EdgeAdded,
    EdgeRemoved,
    NodeReconfigured,
    Reconfigured,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Topology
    TopologyChanged {
        change: TopologyChange,
    },
    NodeMoved {
        id: NodeId,
        position: Point,
    },

    // Layout
    LayoutRecomputed {
        node_count: usize,
        layer_count: usize,
        warning_count: usize,
    },
    /// Recompute pass aborted; the previous layout stays on screen.
    LayoutFailed {
        message: String,
    },
    Warning(LayoutWarning),

    // Preview lines
    PreviewLineCreated {
        id: PreviewLineId,
        source_node_id: NodeId,
        source_port_id: PortId,
        end_position: Option<Point>,
    },
    PreviewLineRetired {
        id: PreviewLineId,
        source_node_id: NodeId,
    },
    EdgeConnected {
        id: EdgeId,
        source_node_id: NodeId,
        source_port_id: PortId,
        target_node_id: NodeId,
    },

    // Drag & snap
    SnapCandidate {
        node_id: NodeId,
        distance: f64,
    },
    SnapCleared,
}

#[derive(Clone)]
pub struct EventBus {
    tx: Sender<Event>,
    rx: Receiver<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> Sender<Event> {
        self.tx.clone()
    }

    pub fn receiver(&self) -> Receiver<Event> {
        self.rx.clone()
    }

    pub fn publish(&self, event: Event) {
        if self.tx.send(event).is_err() {
            tracing::debug!("event bus has no receivers; dropping event");
        }
    }

    /// Dispatch all pending events to a listener.
    /// Hosts call this from their frame loop.
    pub fn dispatch_to<L: EventListener>(&self, listener: &mut L) {
        while let Ok(event) = self.rx.try_recv() {
            listener.handle_event(&event);
        }
    }

    /// Take every pending event without dispatching.
    pub fn drain(&self) -> Vec<Event> {
        self.rx.try_iter().collect()
    }
}

/// Trait for components that respond to events.
/// Implement this to receive events from the EventBus.
pub trait EventListener {
    fn handle_event(&mut self, event: &Event);
}

/// Adapts a closure into an `EventListener` that only sees topology changes.
pub struct OnTopologyChanged<F>(pub F);

impl<F: FnMut(TopologyChange)> EventListener for OnTopologyChanged<F> {
    fn handle_event(&mut self, event: &Event) {
        if let Event::TopologyChanged { change } = event {
            (self.0)(*change);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_bus_publish_receive() {
        let bus = EventBus::new();
        let sender = bus.sender();
        let receiver = bus.receiver();

        sender
            .send(Event::NodeMoved {
                id: NodeId::new("sms-1"),
                position: Point::new(10.0, 20.0),
            })
            .unwrap();

        match receiver.recv().unwrap() {
            Event::NodeMoved { id, position } => {
                assert_eq!(id.as_str(), "sms-1");
                assert_eq!(position, Point::new(10.0, 20.0));
            }
            _ => panic!("Expected NodeMoved event"),
        }
    }

    #[test]
    fn test_topology_callback_ignores_other_events() {
        let bus = EventBus::new();
        bus.publish(Event::SnapCleared);
        bus.publish(Event::TopologyChanged {
            change: TopologyChange::EdgeAdded,
        });
        bus.publish(Event::LayoutFailed {
            message: "cycle".to_string(),
        });

        let mut seen = Vec::new();
        let mut listener = OnTopologyChanged(|change| seen.push(change));
        bus.dispatch_to(&mut listener);

        assert_eq!(seen, vec![TopologyChange::EdgeAdded]);
        assert!(bus.drain().is_empty());
    }
}
