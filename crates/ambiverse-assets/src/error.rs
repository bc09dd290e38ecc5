//! Descriptor validation errors.

use ambiverse_common::{AmbiverseError, ElementId, ParameterId, SceneId};
use thiserror::Error;

use crate::element::PlaybackMode;

/// Reasons a scene or element descriptor is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DescriptorError {
    /// Trigger policy is not allowed for the element's playback mode.
    #[error("{element}: trigger policy '{trigger}' is not valid for {mode:?} elements")]
    TriggerModeMismatch {
        /// Offending element
        element: ElementId,
        /// Playback mode
        mode: PlaybackMode,
        /// Trigger policy name
        trigger: &'static str,
    },

    /// Interval window is negative or inverted.
    #[error("{element}: invalid interval [{min}, {max}]")]
    InvalidInterval {
        /// Offending element
        element: ElementId,
        /// Lower bound
        min: f64,
        /// Upper bound
        max: f64,
    },

    /// Chance policy has an out of range probability or a non-positive window.
    #[error("{element}: invalid chance {probability} per {window}s")]
    InvalidChance {
        /// Offending element
        element: ElementId,
        /// Probability per window
        probability: f64,
        /// Window length in seconds
        window: f64,
    },

    /// A sound in the element's list has zero weight.
    #[error("{element}: sound '{sound}' has zero weight")]
    ZeroWeight {
        /// Offending element
        element: ElementId,
        /// Sound reference
        sound: String,
    },

    /// Element volume is negative or not finite.
    #[error("{element}: invalid volume {volume}")]
    InvalidVolume {
        /// Offending element
        element: ElementId,
        /// Volume
        volume: f32,
    },

    /// Expected duration is not positive.
    #[error("{element}: invalid expected duration {duration}")]
    InvalidDuration {
        /// Offending element
        element: ElementId,
        /// Duration in seconds
        duration: f64,
    },

    /// Two elements in a scene share an ID.
    #[error("{scene}: duplicate {element}")]
    DuplicateElement {
        /// Scene
        scene: SceneId,
        /// Duplicated element
        element: ElementId,
    },

    /// Scene global cap is zero.
    #[error("{scene}: global voice cap must be at least 1")]
    ZeroGlobalCap {
        /// Scene
        scene: SceneId,
    },

    /// Scene volume or density multiplier is negative or not finite.
    #[error("{scene}: invalid {field} multiplier {value}")]
    InvalidMultiplier {
        /// Scene
        scene: SceneId,
        /// Field name
        field: &'static str,
        /// Value
        value: f32,
    },

    /// Scene lifetime is not positive.
    #[error("{scene}: invalid lifetime {lifetime}")]
    InvalidLifetime {
        /// Scene
        scene: SceneId,
        /// Lifetime in seconds
        lifetime: f64,
    },

    /// Parameter range is empty or inverted.
    #[error("parameter '{parameter}': invalid range [{min}, {max}]")]
    InvalidParameterRange {
        /// Parameter
        parameter: ParameterId,
        /// Lower bound
        min: f32,
        /// Upper bound
        max: f32,
    },
}

impl From<DescriptorError> for AmbiverseError {
    fn from(err: DescriptorError) -> Self {
        Self::Descriptor(err.to_string())
    }
}

/// Result type for descriptor validation.
pub type DescriptorResult<T> = Result<T, DescriptorError>;
