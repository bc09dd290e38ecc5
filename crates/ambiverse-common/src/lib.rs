//! # Ambiverse Common
//!
//! Common types shared by every Ambiverse crate:
//! - ID types (SceneId, ElementId, VoiceId, EngineHandle, ParameterId)
//! - Concurrency category labels
//! - Top-level error types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod ids;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::*;
    pub use crate::ids::*;
}

pub use prelude::*;
