use serde::{Deserialize, Serialize};
use std::fmt;

pub mod branch;
pub mod config;
pub mod error;
pub mod node_type;

pub use branch::{Branch, branches_for, output_port_ids};
pub use config::{EngineConfig, PortGeometry};
pub use error::{LayoutError, LayoutWarning};
pub use node_type::{EnumConversionError, NodeType};

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(NodeId);
string_id!(EdgeId);
string_id!(PortId);
string_id!(PreviewLineId);

/// Id of the single input port every non-start node carries.
pub const INPUT_PORT: &str = "in";
/// Id of the output port of a non-branching node.
pub const OUTPUT_PORT: &str = "out";

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn distance(&self, other: Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Direction in which layers advance on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LayoutDirection {
    /// Layers advance downwards; siblings spread horizontally.
    #[default]
    #[serde(rename = "TB")]
    TopBottom,
    /// Layers advance to the right; siblings spread vertically.
    #[serde(rename = "LR")]
    LeftRight,
}

impl std::str::FromStr for LayoutDirection {
    type Err = EnumConversionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "TB" => Ok(LayoutDirection::TopBottom),
            "LR" => Ok(LayoutDirection::LeftRight),
            _ => Err(EnumConversionError::InvalidDirection(value.to_string())),
        }
    }
}

/// Engine-side snapshot of a canvas node.
///
/// The host graph owns node identity; this value is rebuilt from a
/// `NodeHandle` on every pass and only carries what layout needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub position: Point,
    pub size: Size,
    /// Derived; recomputed whenever topology changes.
    #[serde(default)]
    pub layer_index: Option<usize>,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub content_line_count: usize,
}

impl FlowNode {
    pub fn new(id: impl Into<NodeId>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            node_type,
            position: Point::default(),
            size: Size::new(120.0, 96.0),
            layer_index: None,
            config: serde_json::Value::Null,
            content_line_count: node_type.default_content_lines(),
        }
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Point::new(x, y);
        self
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.size = Size::new(width, height);
        self
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_content_lines(mut self, lines: usize) -> Self {
        self.content_line_count = lines;
        self
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.position.x + self.size.width / 2.0,
            self.position.y + self.size.height / 2.0,
        )
    }

    /// Branches of a splitting node, derived from its config.
    pub fn branches(&self) -> Vec<Branch> {
        branches_for(self.node_type, &self.config)
    }
}

/// A connection from an output port.
///
/// A real edge has both endpoints bound; a preview edge has no target and
/// its visual end is a free coordinate owned by the preview-line manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    pub source_node_id: NodeId,
    pub source_port_id: PortId,
    #[serde(default)]
    pub target_node_id: Option<NodeId>,
    #[serde(default)]
    pub target_port_id: Option<PortId>,
}

impl Edge {
    pub fn connect(
        id: impl Into<EdgeId>,
        source: impl Into<NodeId>,
        source_port: impl Into<PortId>,
        target: impl Into<NodeId>,
    ) -> Self {
        Self {
            id: id.into(),
            source_node_id: source.into(),
            source_port_id: source_port.into(),
            target_node_id: Some(target.into()),
            target_port_id: Some(PortId::new(INPUT_PORT)),
        }
    }

    pub fn is_preview(&self) -> bool {
        self.target_node_id.is_none()
    }
}
