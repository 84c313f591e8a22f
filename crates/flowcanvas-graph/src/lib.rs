pub mod branch_spacing;
pub mod coordinate;
pub mod engine;
pub mod graph;
pub mod layering;
pub mod layout;
pub mod ports;
pub mod preview;
pub mod scheduler;
pub mod snap;

pub use branch_spacing::{BranchSpacingResolver, SpacingPolicy};
pub use coordinate::CoordinateCalculator;
pub use engine::{CanvasEngine, FrameReport};
pub use graph::{Cell, GraphModel, GraphSnapshot, HostGraph, NodeHandle, NodeRecord, adapt_node};
pub use layering::{LayerAssignment, assign_layers};
pub use layout::{FlowLayouter, LayoutModel, Layouter, align_layer_to_mean};
pub use ports::{NodePorts, PortOffset, PortPositionResolver};
pub use preview::{
    EndpointInfo, OutputPort, PreviewChange, PreviewLine, PreviewLineManager, PreviewState,
};
pub use scheduler::FrameThrottle;
pub use snap::{DragSource, PreviewSnap, SnapDetector, SnapState, SnapTarget};

pub use flowcanvas_core::{
    Edge, EdgeId, EngineConfig, FlowNode, LayoutDirection, LayoutError, LayoutWarning, NodeId,
    NodeType, Point, PortId, PreviewLineId, Size,
};
