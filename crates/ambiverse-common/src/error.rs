//! Error types for Ambiverse.

use thiserror::Error;

use crate::ids::{ElementId, ParameterId, SceneId};

/// Top-level error type for Ambiverse operations.
#[derive(Debug, Error)]
pub enum AmbiverseError {
    /// Invalid scene or element descriptor
    #[error("Descriptor error: {0}")]
    Descriptor(String),

    /// Scene lifecycle errors
    #[error("Scene error: {0}")]
    Scene(String),

    /// Parameter errors
    #[error("Unknown parameter '{0}'")]
    UnknownParameter(ParameterId),

    /// Unknown element within a scene
    #[error("Element {element} not found in {scene}")]
    UnknownElement {
        /// Scene that was searched
        scene: SceneId,
        /// Missing element
        element: ElementId,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Ambiverse operations.
pub type AmbiverseResult<T> = Result<T, AmbiverseError>;
