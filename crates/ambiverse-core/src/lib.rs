//! # Ambiverse Core
//!
//! Runtime scheduling and playback-lifecycle engine for procedural
//! soundscapes.
//!
//! This crate provides:
//! - Voice handle registry with atomic cap checks
//! - Trigger scheduler (interval, chance, always-active policies)
//! - Density governor enforcing system, scene and category caps
//! - Playback lifecycle coordinator (engine requests, completions, timeouts)
//! - Parameter manager producing density and volume scalars
//! - The [`Ambiverse`] runtime facade that sequences a tick
//! - A deterministic simulated audio engine
//!
//! The audio renderer is injected as an [`AudioRenderEngine`] and reports
//! back asynchronously through an [`EngineEventSender`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod governor;
pub mod parameters;
pub mod registry;
pub mod request;
pub mod runtime;
pub mod scene;
pub mod scheduler;
pub mod simulated;


/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::*;
    pub use crate::coordinator::*;
    pub use crate::engine::*;
    pub use crate::error::*;
    pub use crate::governor::*;
    pub use crate::parameters::*;
    pub use crate::registry::*;
    pub use crate::request::*;
    pub use crate::runtime::*;
    pub use crate::scene::*;
    pub use crate::scheduler::*;
    pub use crate::simulated::*;
}

pub use prelude::*;
