//! # Ambiverse Assets
//!
//! Read-only descriptors consumed by the Ambiverse runtime:
//! - Sound elements (playback mode, trigger policy, concurrency class)
//! - Scenes (element bundles with voice caps)
//! - Parameters and the modifiers linking them to scenes
//! - Composites (scene groups)
//! - Distribution data and weighted sound lists
//!
//! Nothing here is mutated by the runtime; descriptors are validated once
//! when a scene is activated.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod composite;
pub mod distribution;
pub mod element;
pub mod error;
pub mod parameter;
pub mod scene;
pub mod sound;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::composite::*;
    pub use crate::distribution::*;
    pub use crate::element::*;
    pub use crate::error::*;
    pub use crate::parameter::*;
    pub use crate::scene::*;
    pub use crate::sound::*;
}

pub use prelude::*;
