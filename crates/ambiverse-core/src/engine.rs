//! Interface to the external audio rendering engine.
//!
//! The runtime never blocks on the engine. Requests return a handle (or an
//! immediate failure) right away; acknowledgment and completion arrive later
//! as [`EngineEvent`]s posted through an [`EngineEventSender`], possibly from
//! the engine's own audio thread. The tick loop drains those events, so no
//! engine callback ever reenters the scheduler.
//!
//! ```text
//! ┌──────────────┐ request_playback ┌──────────────────┐
//! │ Coordinator  │─────────────────▶│ AudioRenderEngine │
//! │ (tick loop)  │◀─ ─ ─ ─ ─ ─ ─ ─ ─│ (any thread)      │
//! └──────────────┘  EngineEvent     └──────────────────┘
//!        ▲              queue                │
//!        └────────── drain() ◀── send() ─────┘
//! ```

use std::collections::BTreeMap;

use ambiverse_assets::SoundRef;
use ambiverse_common::{ElementId, EngineHandle, SceneId, VoiceId};
use crossbeam_channel::{unbounded, Receiver, Sender};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

/// Everything the engine needs to start one voice.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackRequest {
    /// Runtime voice this request belongs to.
    pub voice: VoiceId,
    /// Originating scene.
    pub scene: SceneId,
    /// Originating element.
    pub element: ElementId,
    /// Selected sound, if the element has any.
    pub sound: Option<SoundRef>,
    /// Final volume (element × scene × parameters).
    pub volume: f32,
    /// World position, if the element is distributed around the listener.
    pub position: Option<Vec3>,
    /// Whether the engine should loop the sound.
    pub looping: bool,
    /// Opaque engine parameters copied from the element.
    pub params: BTreeMap<String, f32>,
}

/// Immediate refusal of a playback request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineFailure {
    /// The engine has no free voices.
    #[error("No free engine voices (max: {max})")]
    NoCapacity {
        /// Engine voice limit.
        max: usize,
    },

    /// The sound could not be resolved.
    #[error("Sound not found: {0}")]
    SoundNotFound(String),

    /// The request carried no sound at all.
    #[error("Request has no sound")]
    NoSound,

    /// The engine is not running.
    #[error("Audio engine unavailable")]
    Unavailable,

    /// Engine-specific failure.
    #[error("Engine failure: {0}")]
    Other(String),
}

/// How a voice ended, as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackOutcome {
    /// The sound played to its end.
    FinishedNaturally,
    /// The sound was stopped on request.
    CutoffRequested,
    /// The engine hit an error while playing.
    EngineError,
}

/// Asynchronous notification from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// The engine confirmed the request is playing.
    Acknowledged(EngineHandle),
    /// The voice reached a terminal state.
    Completed {
        /// Engine handle.
        handle: EngineHandle,
        /// How it ended.
        outcome: PlaybackOutcome,
    },
}

/// An audio rendering backend.
///
/// Implementations must not block: `request_playback` returns as soon as the
/// request is queued, and the outcome is reported through the event sender
/// handed to the engine at construction.
///
/// Handles must be unique for the engine's lifetime. Events are matched to
/// voices by handle alone, so a reused handle would let a late `Completed`
/// for a stopped voice release whichever voice holds the handle now.
pub trait AudioRenderEngine: Send + Sync {
    /// Request playback. Returns the engine's handle or an immediate failure.
    fn request_playback(&self, request: &PlaybackRequest) -> Result<EngineHandle, EngineFailure>;

    /// Ask the engine to stop a voice. Fire-and-forget.
    fn stop_playback(&self, handle: EngineHandle);
}

/// Cloneable, thread-safe handle for posting engine events.
#[derive(Debug, Clone)]
pub struct EngineEventSender {
    sender: Sender<EngineEvent>,
}

impl EngineEventSender {
    /// Post an event.
    pub fn send(&self, event: EngineEvent) {
        // Fails only once the runtime is gone.
        if self.sender.send(event).is_err() {
            trace!(?event, "Engine event dropped, runtime is gone");
        }
    }

    /// Report that a voice started playing.
    pub fn acknowledged(&self, handle: EngineHandle) {
        self.send(EngineEvent::Acknowledged(handle));
    }

    /// Report that a voice ended.
    pub fn completed(&self, handle: EngineHandle, outcome: PlaybackOutcome) {
        self.send(EngineEvent::Completed { handle, outcome });
    }
}

/// Receiving end of the engine event queue, owned by the runtime.
#[derive(Debug)]
pub struct EngineEventReceiver {
    receiver: Receiver<EngineEvent>,
    sender: Sender<EngineEvent>,
}

impl EngineEventReceiver {
    /// A new sender feeding this receiver.
    #[must_use]
    pub fn sender(&self) -> EngineEventSender {
        EngineEventSender {
            sender: self.sender.clone(),
        }
    }

    /// Drains all pending events without blocking.
    pub fn drain(&self) -> Vec<EngineEvent> {
        self.receiver.try_iter().collect()
    }

    /// Returns the number of pending events.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }
}

/// Create a connected sender/receiver pair.
#[must_use]
pub fn event_channel() -> (EngineEventSender, EngineEventReceiver) {
    let (sender, receiver) = unbounded();
    let events = EngineEventReceiver {
        receiver,
        sender: sender.clone(),
    };
    (EngineEventSender { sender }, events)
}
