use crate::{LayoutDirection, LayoutError};
use serde::{Deserialize, Serialize};

/// Row geometry used to align ports with node content lines.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PortGeometry {
    pub header_height: f64,
    pub content_padding: f64,
    pub line_height: f64,
    /// Drift (px) tolerated between rendered and expected port offsets.
    pub tolerance: f64,
}

impl Default for PortGeometry {
    fn default() -> Self {
        Self {
            header_height: 36.0,
            content_padding: 12.0,
            line_height: 32.0,
            tolerance: 2.0,
        }
    }
}

/// Immutable configuration snapshot handed to the engine.
///
/// Changing a setting at runtime means building a new snapshot with one of
/// the `with_*` methods and passing it to `CanvasEngine::reconfigure`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub direction: LayoutDirection,
    /// Primary-axis coordinate of layer 0.
    pub base_y: f64,
    /// Primary-axis distance between consecutive layers.
    pub layer_spacing: f64,
    /// Cross-axis centre of layer 0.
    pub base_x: f64,
    pub snap_distance: f64,
    pub node_width: f64,
    pub node_height: f64,
    pub min_gap: f64,
    pub preview_stub_length: f64,
    pub same_layer_tolerance: f64,
    pub endpoint_min_spacing: f64,
    pub port: PortGeometry,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            direction: LayoutDirection::TopBottom,
            base_y: Self::DEFAULT_BASE_Y,
            layer_spacing: Self::DEFAULT_LAYER_SPACING,
            base_x: 400.0,
            snap_distance: Self::DEFAULT_SNAP_DISTANCE,
            node_width: Self::DEFAULT_NODE_WIDTH,
            node_height: 96.0,
            min_gap: Self::DEFAULT_MIN_GAP,
            preview_stub_length: 100.0,
            same_layer_tolerance: 50.0,
            endpoint_min_spacing: 25.0,
            port: PortGeometry::default(),
        }
    }
}

impl EngineConfig {
    pub const DEFAULT_BASE_Y: f64 = 100.0;
    pub const DEFAULT_LAYER_SPACING: f64 = 150.0;
    pub const DEFAULT_SNAP_DISTANCE: f64 = 20.0;
    pub const DEFAULT_NODE_WIDTH: f64 = 120.0;
    pub const DEFAULT_MIN_GAP: f64 = 30.0;

    pub fn with_direction(&self, direction: LayoutDirection) -> Self {
        Self {
            direction,
            ..self.clone()
        }
    }

    pub fn with_layer_spacing(&self, layer_spacing: f64) -> Self {
        Self {
            layer_spacing,
            ..self.clone()
        }
    }

    pub fn with_base_y(&self, base_y: f64) -> Self {
        Self {
            base_y,
            ..self.clone()
        }
    }

    pub fn with_snap_distance(&self, snap_distance: f64) -> Self {
        Self {
            snap_distance,
            ..self.clone()
        }
    }

    pub fn with_node_width(&self, node_width: f64) -> Self {
        Self {
            node_width,
            ..self.clone()
        }
    }

    pub fn with_min_gap(&self, min_gap: f64) -> Self {
        Self {
            min_gap,
            ..self.clone()
        }
    }

    /// Minimum centre-to-centre distance between sibling nodes.
    pub fn min_sibling_distance(&self) -> f64 {
        self.node_width + self.min_gap
    }

    pub fn validate(&self) -> Result<(), LayoutError> {
        let finite = [
            ("baseY", self.base_y),
            ("baseX", self.base_x),
            ("layerSpacing", self.layer_spacing),
            ("snapDistance", self.snap_distance),
            ("nodeWidth", self.node_width),
            ("nodeHeight", self.node_height),
            ("minGap", self.min_gap),
            ("previewStubLength", self.preview_stub_length),
            ("sameLayerTolerance", self.same_layer_tolerance),
            ("endpointMinSpacing", self.endpoint_min_spacing),
            ("port.headerHeight", self.port.header_height),
            ("port.contentPadding", self.port.content_padding),
            ("port.lineHeight", self.port.line_height),
            ("port.tolerance", self.port.tolerance),
        ];
        if let Some((name, value)) = finite.iter().find(|(_, value)| !value.is_finite()) {
            return Err(LayoutError::InvalidConfig(format!(
                "{name} must be finite, got {value}"
            )));
        }

        let positive = [
            ("layerSpacing", self.layer_spacing),
            ("nodeWidth", self.node_width),
            ("nodeHeight", self.node_height),
            ("port.lineHeight", self.port.line_height),
        ];
        if let Some((name, value)) = positive.iter().find(|(_, value)| *value <= 0.0) {
            return Err(LayoutError::InvalidConfig(format!(
                "{name} must be positive, got {value}"
            )));
        }

        let non_negative = [
            ("snapDistance", self.snap_distance),
            ("minGap", self.min_gap),
            ("sameLayerTolerance", self.same_layer_tolerance),
            ("endpointMinSpacing", self.endpoint_min_spacing),
            ("port.tolerance", self.port.tolerance),
        ];
        if let Some((name, value)) = non_negative.iter().find(|(_, value)| *value < 0.0) {
            return Err(LayoutError::InvalidConfig(format!(
                "{name} must not be negative, got {value}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.snap_distance, 20.0);
        assert_eq!(config.min_sibling_distance(), 150.0);
    }

    #[test]
    fn test_with_methods_return_new_snapshot() {
        let config = EngineConfig::default();
        let lr = config.with_direction(LayoutDirection::LeftRight);
        assert_eq!(config.direction, LayoutDirection::TopBottom);
        assert_eq!(lr.direction, LayoutDirection::LeftRight);
        assert_eq!(lr.layer_spacing, config.layer_spacing);
    }

    #[test]
    fn test_validate_rejects_bad_spacing() {
        let zero = EngineConfig::default().with_layer_spacing(0.0);
        assert!(matches!(zero.validate(), Err(LayoutError::InvalidConfig(_))));

        let nan = EngineConfig::default().with_base_y(f64::NAN);
        let err = nan.validate().unwrap_err();
        assert!(err.to_string().contains("baseY"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"direction": "LR", "layerSpacing": 200}"#).unwrap();
        assert_eq!(config.direction, LayoutDirection::LeftRight);
        assert_eq!(config.layer_spacing, 200.0);
        assert_eq!(config.base_y, EngineConfig::DEFAULT_BASE_Y);
        assert_eq!(config.port.line_height, 32.0);
    }
}
