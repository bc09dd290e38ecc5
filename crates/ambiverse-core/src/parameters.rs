//! Runtime parameter values and the scalars they produce.

use std::collections::BTreeMap;

use ambiverse_assets::{Parameter, SceneDescriptor};
use ambiverse_common::{AmbiverseError, AmbiverseResult, ParameterId};
use tracing::{debug, warn};

/// Density and volume multipliers for a scene at the current parameter values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scalars {
    /// Trigger rate multiplier. Intervals are divided by this.
    pub density: f32,
    /// Volume multiplier.
    pub volume: f32,
}

impl Default for Scalars {
    fn default() -> Self {
        Self {
            density: 1.0,
            volume: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
struct ParameterSlot {
    definition: Parameter,
    normalized: f32,
}

/// Holds parameter definitions and their current normalized values.
#[derive(Debug, Default)]
pub struct ParameterManager {
    slots: BTreeMap<ParameterId, ParameterSlot>,
}

impl ParameterManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter at its default value.
    ///
    /// Returns `false` if it was already registered; the current value is kept.
    pub fn register(&mut self, parameter: Parameter) -> bool {
        if self.slots.contains_key(&parameter.id) {
            return false;
        }
        debug!(parameter = %parameter.id, "Registered parameter");
        let normalized = parameter.normalized_default();
        self.slots.insert(
            parameter.id.clone(),
            ParameterSlot {
                definition: parameter,
                normalized,
            },
        );
        true
    }

    /// Set a raw value. Returns the normalized value.
    pub fn set(&mut self, id: &ParameterId, raw: f32) -> AmbiverseResult<f32> {
        let slot = self
            .slots
            .get_mut(id)
            .ok_or_else(|| AmbiverseError::UnknownParameter(id.clone()))?;
        slot.normalized = slot.definition.normalize(raw);
        debug!(parameter = %id, raw, normalized = slot.normalized, "Parameter changed");
        Ok(slot.normalized)
    }

    /// Current normalized value.
    #[must_use]
    pub fn value(&self, id: &ParameterId) -> Option<f32> {
        self.slots.get(id).map(|s| s.normalized)
    }

    /// Whether a parameter is registered.
    #[must_use]
    pub fn contains(&self, id: &ParameterId) -> bool {
        self.slots.contains_key(id)
    }

    /// Scalars for a scene: its own multipliers times every modifier's
    /// interpolated value.
    #[must_use]
    pub fn scalars_for(&self, scene: &SceneDescriptor) -> Scalars {
        let mut scalars = Scalars {
            density: scene.density,
            volume: scene.volume,
        };

        for modifier in &scene.parameters {
            let Some(value) = self.value(&modifier.parameter) else {
                continue;
            };
            scalars.density *= modifier.density_at(value);
            scalars.volume *= modifier.volume_at(value);
        }

        scalars.density = scalars.density.max(0.0);
        scalars.volume = scalars.volume.max(0.0);
        scalars
    }

    /// Warn about modifiers on a scene that reference unknown parameters.
    pub fn check_scene(&self, scene: &SceneDescriptor) -> usize {
        let mut missing = 0;
        for modifier in &scene.parameters {
            if !self.contains(&modifier.parameter) {
                warn!(scene = %scene.id, parameter = %modifier.parameter, "Scene references unregistered parameter; modifier ignored");
                missing += 1;
            }
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use ambiverse_assets::ParameterModifier;
    use ambiverse_common::SceneId;

    use super::*;

    fn rainy_scene() -> SceneDescriptor {
        SceneDescriptor::new(SceneId::new(1), 4)
            .with_density(2.0)
            .with_volume(0.5)
            .with_parameter(
                ParameterModifier::new("rain")
                    .with_density_range(0.0, 4.0)
                    .with_volume_range(0.5, 1.0),
            )
    }

    #[test]
    fn test_set_unknown_parameter() {
        let mut params = ParameterManager::new();
        let result = params.set(&ParameterId::new("rain"), 1.0);
        assert!(matches!(result, Err(AmbiverseError::UnknownParameter(_))));
    }

    #[test]
    fn test_set_normalizes() {
        let mut params = ParameterManager::new();
        assert!(params.register(Parameter::new("rain", 0.0, 10.0)));
        assert!(!params.register(Parameter::new("rain", 0.0, 100.0)));

        let normalized = params.set(&ParameterId::new("rain"), 5.0).expect("registered");
        assert!((normalized - 0.5).abs() < f32::EPSILON);
        let normalized = params.set(&ParameterId::new("rain"), 50.0).expect("registered");
        assert!((normalized - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_scalars_combine_scene_and_modifiers() {
        let mut params = ParameterManager::new();
        params.register(Parameter::new("rain", 0.0, 1.0).with_default(0.25));

        let scalars = params.scalars_for(&rainy_scene());
        // density: 2.0 * lerp(0, 4, 0.25) = 2.0; volume: 0.5 * lerp(0.5, 1.0, 0.25) = 0.3125
        assert!((scalars.density - 2.0).abs() < 1e-6);
        assert!((scalars.volume - 0.3125).abs() < 1e-6);
    }

    #[test]
    fn test_unregistered_modifier_ignored() {
        let params = ParameterManager::new();
        let scene = rainy_scene();
        assert_eq!(params.check_scene(&scene), 1);

        let scalars = params.scalars_for(&scene);
        assert!((scalars.density - 2.0).abs() < f32::EPSILON);
        assert!((scalars.volume - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_zero_density_at_minimum() {
        let mut params = ParameterManager::new();
        params.register(Parameter::new("rain", 0.0, 1.0));
        let scalars = params.scalars_for(&rainy_scene());
        assert!(scalars.density.abs() < f32::EPSILON);
    }
}
