//! Runtime parameters and the modifiers that link them to scenes.
//!
//! A parameter is a designer-defined control (e.g. "rain intensity") whose
//! value is set at runtime. Scenes carry modifiers that map the parameter's
//! normalized value onto volume and density multipliers.

use ambiverse_common::ParameterId;
use serde::{Deserialize, Serialize};

use crate::error::{DescriptorError, DescriptorResult};

/// A parameter definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter ID.
    pub id: ParameterId,
    /// Raw value range `(min, max)`.
    pub range: (f32, f32),
    /// Initial raw value.
    pub default: f32,
}

impl Parameter {
    /// Create a parameter with the given range, defaulting to the range minimum.
    #[must_use]
    pub fn new(id: impl Into<ParameterId>, min: f32, max: f32) -> Self {
        Self {
            id: id.into(),
            range: (min, max),
            default: min,
        }
    }

    /// With default raw value (clamped into the range).
    #[must_use]
    pub fn with_default(mut self, value: f32) -> Self {
        let (min, max) = self.range;
        self.default = if min <= max { value.clamp(min, max) } else { value };
        self
    }

    /// Map a raw value onto `[0, 1]`, clamping to the range.
    #[must_use]
    pub fn normalize(&self, value: f32) -> f32 {
        let (min, max) = self.range;
        let span = max - min;
        if span.abs() <= f32::EPSILON {
            return 0.0;
        }
        ((value - min) / span).clamp(0.0, 1.0)
    }

    /// Normalized default value.
    #[must_use]
    pub fn normalized_default(&self) -> f32 {
        self.normalize(self.default)
    }

    /// Validate the range.
    pub fn validate(&self) -> DescriptorResult<()> {
        let (min, max) = self.range;
        if !(min.is_finite() && max.is_finite() && min < max) {
            return Err(DescriptorError::InvalidParameterRange {
                parameter: self.id.clone(),
                min,
                max,
            });
        }
        Ok(())
    }
}

/// Links a parameter to a scene's volume and density.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterModifier {
    /// The parameter driving this modifier.
    pub parameter: ParameterId,
    /// Volume multiplier at normalized value 0 and 1.
    #[serde(default = "unit_range")]
    pub volume_range: (f32, f32),
    /// Density multiplier at normalized value 0 and 1.
    #[serde(default = "unit_range")]
    pub density_range: (f32, f32),
}

fn unit_range() -> (f32, f32) {
    (1.0, 1.0)
}

impl ParameterModifier {
    /// Create a modifier with neutral ranges.
    #[must_use]
    pub fn new(parameter: impl Into<ParameterId>) -> Self {
        Self {
            parameter: parameter.into(),
            volume_range: unit_range(),
            density_range: unit_range(),
        }
    }

    /// With volume range.
    #[must_use]
    pub fn with_volume_range(mut self, at_zero: f32, at_one: f32) -> Self {
        self.volume_range = (at_zero, at_one);
        self
    }

    /// With density range.
    #[must_use]
    pub fn with_density_range(mut self, at_zero: f32, at_one: f32) -> Self {
        self.density_range = (at_zero, at_one);
        self
    }

    /// Volume multiplier for a normalized parameter value.
    #[must_use]
    pub fn volume_at(&self, normalized: f32) -> f32 {
        lerp(self.volume_range, normalized)
    }

    /// Density multiplier for a normalized parameter value.
    #[must_use]
    pub fn density_at(&self, normalized: f32) -> f32 {
        lerp(self.density_range, normalized)
    }
}

fn lerp((a, b): (f32, f32), t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    a + (b - a) * t
}
