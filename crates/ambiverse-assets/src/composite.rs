//! Composites: groups of scenes pushed and popped together.

use ambiverse_common::SceneId;
use serde::{Deserialize, Serialize};

use crate::error::DescriptorResult;
use crate::scene::SceneDescriptor;

/// Collection of scenes that can be activated at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composite {
    /// Designer-facing name.
    #[serde(default)]
    pub name: String,
    /// Member scenes.
    pub scenes: Vec<SceneDescriptor>,
    /// When pushed, deactivate every active scene that is not a member.
    #[serde(default)]
    pub stop_non_composite: bool,
}

impl Composite {
    /// Create an empty composite.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scenes: Vec::new(),
            stop_non_composite: false,
        }
    }

    /// Add a member scene.
    #[must_use]
    pub fn with_scene(mut self, scene: SceneDescriptor) -> Self {
        self.scenes.push(scene);
        self
    }

    /// With stop-non-composite behavior.
    #[must_use]
    pub fn with_stop_non_composite(mut self, stop: bool) -> Self {
        self.stop_non_composite = stop;
        self
    }

    /// Whether a scene is a member.
    #[must_use]
    pub fn contains(&self, id: SceneId) -> bool {
        self.scenes.iter().any(|s| s.id == id)
    }

    /// Validate every member scene.
    pub fn validate(&self) -> DescriptorResult<()> {
        self.scenes.iter().try_for_each(SceneDescriptor::validate)
    }
}
