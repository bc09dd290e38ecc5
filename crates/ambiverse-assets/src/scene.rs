//! Scene descriptors.

use std::collections::{BTreeMap, BTreeSet};

use ambiverse_common::{Category, ElementId, SceneId};
use serde::{Deserialize, Serialize};

use crate::element::SoundElement;
use crate::error::{DescriptorError, DescriptorResult};
use crate::parameter::ParameterModifier;

/// A named bundle of sound elements plus its concurrency constraints.
///
/// Descriptors are read-only once handed to the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDescriptor {
    /// Scene ID.
    pub id: SceneId,
    /// Designer-facing name.
    #[serde(default)]
    pub name: String,
    /// Elements, in authoring order.
    pub elements: Vec<SoundElement>,
    /// Maximum simultaneous voices for this scene.
    pub global_cap: usize,
    /// Per-category voice caps. Categories without an entry are only bound by the global cap.
    #[serde(default)]
    pub category_caps: BTreeMap<Category, usize>,
    /// Volume multiplier for every element.
    #[serde(default = "one")]
    pub volume: f32,
    /// Trigger rate multiplier for every element.
    #[serde(default = "one")]
    pub density: f32,
    /// Parameters influencing this scene.
    #[serde(default)]
    pub parameters: Vec<ParameterModifier>,
    /// Seconds after activation at which the scene expires.
    #[serde(default)]
    pub lifetime: Option<f64>,
}

fn one() -> f32 {
    1.0
}

impl SceneDescriptor {
    /// Create an empty scene.
    #[must_use]
    pub fn new(id: SceneId, global_cap: usize) -> Self {
        Self {
            id,
            name: String::new(),
            elements: Vec::new(),
            global_cap,
            category_caps: BTreeMap::new(),
            volume: 1.0,
            density: 1.0,
            parameters: Vec::new(),
            lifetime: None,
        }
    }

    /// With name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add an element.
    #[must_use]
    pub fn with_element(mut self, element: SoundElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Set a category cap.
    #[must_use]
    pub fn with_category_cap(mut self, category: impl Into<Category>, cap: usize) -> Self {
        self.category_caps.insert(category.into(), cap);
        self
    }

    /// With volume multiplier.
    #[must_use]
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    /// With density multiplier.
    #[must_use]
    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    /// Add a parameter modifier.
    #[must_use]
    pub fn with_parameter(mut self, modifier: ParameterModifier) -> Self {
        self.parameters.push(modifier);
        self
    }

    /// With lifetime in seconds.
    #[must_use]
    pub fn with_lifetime(mut self, seconds: f64) -> Self {
        self.lifetime = Some(seconds);
        self
    }

    /// Look up an element by ID.
    #[must_use]
    pub fn element(&self, id: ElementId) -> Option<&SoundElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    /// Cap for a category, if any.
    #[must_use]
    pub fn category_cap(&self, category: &Category) -> Option<usize> {
        self.category_caps.get(category).copied()
    }

    /// Validate the scene and every element in it.
    pub fn validate(&self) -> DescriptorResult<()> {
        if self.global_cap == 0 {
            return Err(DescriptorError::ZeroGlobalCap { scene: self.id });
        }

        for (field, value) in [("volume", self.volume), ("density", self.density)] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(DescriptorError::InvalidMultiplier {
                    scene: self.id,
                    field,
                    value,
                });
            }
        }

        if let Some(lifetime) = self.lifetime {
            if !(lifetime > 0.0 && lifetime.is_finite()) {
                return Err(DescriptorError::InvalidLifetime {
                    scene: self.id,
                    lifetime,
                });
            }
        }

        let mut seen = BTreeSet::new();
        for element in &self.elements {
            if !seen.insert(element.id) {
                return Err(DescriptorError::DuplicateElement {
                    scene: self.id,
                    element: element.id,
                });
            }
            element.validate()?;
        }

        Ok(())
    }
}
