use flowcanvas_core::{EngineConfig, LayoutError};

/// Maps layer indices onto the primary axis.
///
/// Every component that needs "the Y of layer k" goes through this type, so
/// there is exactly one `base_y` and one `layer_spacing` in play.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateCalculator {
    base_y: f64,
    layer_spacing: f64,
}

impl Default for CoordinateCalculator {
    fn default() -> Self {
        Self {
            base_y: EngineConfig::DEFAULT_BASE_Y,
            layer_spacing: EngineConfig::DEFAULT_LAYER_SPACING,
        }
    }
}

impl CoordinateCalculator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            base_y: config.base_y,
            layer_spacing: config.layer_spacing,
        }
    }

    pub fn from_parts(base_y: f64, layer_spacing: f64) -> Result<Self, LayoutError> {
        if !base_y.is_finite() {
            return Err(LayoutError::InvalidConfig(format!(
                "baseY must be finite, got {base_y}"
            )));
        }
        if !layer_spacing.is_finite() || layer_spacing <= 0.0 {
            return Err(LayoutError::InvalidConfig(format!(
                "layerSpacing must be positive, got {layer_spacing}"
            )));
        }
        Ok(Self {
            base_y,
            layer_spacing,
        })
    }

    pub fn base_y(&self) -> f64 {
        self.base_y
    }

    pub fn layer_spacing(&self) -> f64 {
        self.layer_spacing
    }

    /// Primary coordinate of a layer that is already known to be valid.
    pub fn layer_y(&self, layer: usize) -> f64 {
        self.base_y + layer as f64 * self.layer_spacing
    }

    /// Primary coordinate of `layer_index`.
    ///
    /// Layer indices arrive from host data as plain numbers; anything that is
    /// not a finite non-negative integer is rejected.
    pub fn calculate_layer_y(&self, layer_index: f64) -> Result<f64, LayoutError> {
        if !layer_index.is_finite() || layer_index < 0.0 || layer_index.fract() != 0.0 {
            return Err(LayoutError::InvalidLayerIndex { value: layer_index });
        }
        Ok(self.base_y + layer_index * self.layer_spacing)
    }

    /// Lenient variant for render paths: invalid indices land on `base_y`.
    pub fn calculate_layer_y_or_base(&self, layer_index: f64) -> f64 {
        match self.calculate_layer_y(layer_index) {
            Ok(y) => y,
            Err(err) => {
                tracing::warn!("{err}; falling back to base y {}", self.base_y);
                self.base_y
            }
        }
    }

    /// Nearest layer to a primary coordinate, if it lies within `tolerance`.
    pub fn layer_at(&self, y: f64, tolerance: f64) -> Option<usize> {
        if !y.is_finite() {
            return None;
        }
        let raw = ((y - self.base_y) / self.layer_spacing).round();
        if raw < 0.0 {
            return None;
        }
        let layer = raw as usize;
        ((self.layer_y(layer) - y).abs() <= tolerance).then_some(layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_y_is_linear() {
        let calc = CoordinateCalculator::default();
        assert_eq!(calc.calculate_layer_y(0.0).unwrap(), 100.0);
        assert_eq!(calc.calculate_layer_y(3.0).unwrap(), 550.0);
        assert_eq!(calc.layer_y(3), 550.0);
    }

    #[test]
    fn test_invalid_layer_index_is_rejected() {
        let calc = CoordinateCalculator::default();
        for bad in [-1.0, 1.5, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                calc.calculate_layer_y(bad),
                Err(LayoutError::InvalidLayerIndex { .. })
            ));
        }
        assert_eq!(calc.calculate_layer_y_or_base(-2.0), 100.0);
    }

    #[test]
    fn test_from_parts_validates() {
        assert!(CoordinateCalculator::from_parts(0.0, 0.0).is_err());
        assert!(CoordinateCalculator::from_parts(f64::NAN, 10.0).is_err());
        let calc = CoordinateCalculator::from_parts(50.0, 200.0).unwrap();
        assert_eq!(calc.layer_y(2), 450.0);
    }

    #[test]
    fn test_layer_at_round_trips_within_tolerance() {
        let calc = CoordinateCalculator::default();
        assert_eq!(calc.layer_at(260.0, 20.0), Some(1));
        assert_eq!(calc.layer_at(300.0, 20.0), None);
        assert_eq!(calc.layer_at(-400.0, 20.0), None);
    }
}
