//! Runtime error types.

use ambiverse_assets::DescriptorError;
use ambiverse_common::{AmbiverseError, Category, ElementId, SceneId};
use thiserror::Error;

/// Why a trigger candidate was not admitted.
///
/// Rejections are soft: the candidate is dropped and the element gets a
/// fresh chance on its next eligible cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionRejected {
    /// The scene gate is closed (deactivating or inactive).
    #[error("{scene} is not accepting new voices")]
    SceneNotAccepting {
        /// Scene
        scene: SceneId,
    },

    /// The candidate names a scene the runtime does not know.
    #[error("Unknown {scene}")]
    UnknownScene {
        /// Scene
        scene: SceneId,
    },

    /// The candidate names an element missing from its scene.
    #[error("Unknown {element} in {scene}")]
    UnknownElement {
        /// Scene
        scene: SceneId,
        /// Element
        element: ElementId,
    },

    /// The system-wide voice budget is exhausted.
    #[error("System voice cap reached ({cap})")]
    SystemCapReached {
        /// Cap
        cap: usize,
    },

    /// The scene's global cap is exhausted.
    #[error("{scene} voice cap reached ({cap})")]
    SceneCapReached {
        /// Scene
        scene: SceneId,
        /// Cap
        cap: usize,
    },

    /// The category cap within the scene is exhausted.
    #[error("{scene} category '{category}' cap reached ({cap})")]
    CategoryCapReached {
        /// Scene
        scene: SceneId,
        /// Category
        category: Category,
        /// Cap
        cap: usize,
    },

    /// A non-polyphonic element already holds a voice.
    #[error("{element} in {scene} is already playing")]
    ElementAlreadyActive {
        /// Scene
        scene: SceneId,
        /// Element
        element: ElementId,
    },
}

/// Scene lifecycle errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneError {
    /// Scene is already active.
    #[error("{0} is already active")]
    AlreadyActive(SceneId),

    /// Scene is not active.
    #[error("{0} is not active")]
    NotActive(SceneId),

    /// Descriptor failed validation.
    #[error("Invalid scene: {0}")]
    Invalid(#[from] DescriptorError),

    /// Element is not part of the scene.
    #[error("{element} not found in {scene}")]
    UnknownElement {
        /// Scene
        scene: SceneId,
        /// Element
        element: ElementId,
    },
}

impl From<SceneError> for AmbiverseError {
    fn from(err: SceneError) -> Self {
        match err {
            SceneError::UnknownElement { scene, element } => Self::UnknownElement { scene, element },
            other => Self::Scene(other.to_string()),
        }
    }
}

/// Result type for scene operations.
pub type SceneResult<T> = Result<T, SceneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_display() {
        let err = AdmissionRejected::CategoryCapReached {
            scene: SceneId::new(1),
            category: Category::new("ambience"),
            cap: 1,
        };
        assert_eq!(err.to_string(), "scene#1 category 'ambience' cap reached (1)");
    }

    #[test]
    fn test_scene_error_converts() {
        let err: AmbiverseError = SceneError::NotActive(SceneId::new(4)).into();
        assert!(matches!(err, AmbiverseError::Scene(_)));

        let err: AmbiverseError = SceneError::UnknownElement {
            scene: SceneId::new(4),
            element: ElementId::new(2),
        }
        .into();
        assert!(matches!(err, AmbiverseError::UnknownElement { .. }));
    }
}
