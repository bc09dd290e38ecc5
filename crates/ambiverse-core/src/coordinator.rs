//! Playback lifecycle coordinator.
//!
//! Owns the per-voice state machine between admission and slot release:
//!
//! ```text
//!            dispatch            Acknowledged
//! (admitted) ────────▶ Requested ────────────▶ Playing
//!                         │                      │
//!      immediate failure, │                      │ Completed(outcome),
//!      stale timeout      │                      │ overrun, cutoff
//!                         ▼                      ▼
//!                       Failed        Completed / Cutoff / Failed
//! ```
//!
//! Every terminal transition releases the registry slot.

use std::sync::Arc;

use ambiverse_common::{ElementId, EngineHandle, SceneId, VoiceId};
use tracing::{debug, trace, warn};

use crate::engine::{
    AudioRenderEngine, EngineEvent, EngineEventReceiver, EngineEventSender, EngineFailure, PlaybackOutcome,
    PlaybackRequest,
};
use crate::governor::Admission;
use crate::registry::{ActiveVoice, VoiceRegistry, VoiceState};

/// Why a voice changed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleCause {
    /// Slot reserved and playback requested.
    Admitted,
    /// Engine confirmed playback.
    Acknowledged,
    /// Engine reported a natural finish.
    FinishedNaturally,
    /// Engine reported the voice was stopped.
    CutoffRequested,
    /// Engine reported an error during playback.
    EngineError,
    /// Engine refused the request outright.
    EngineImmediateFailure(EngineFailure),
    /// No acknowledgment within the stale request timeout.
    StaleRequestTimeout,
    /// Still playing well past the expected end.
    Overrun,
    /// Replaced by a restart of the same element.
    Restarted,
    /// Owning scene was deactivated.
    SceneDeactivated,
}

/// One voice state transition.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleEvent {
    /// Voice.
    pub voice: VoiceId,
    /// Owning scene.
    pub scene: SceneId,
    /// Originating element.
    pub element: ElementId,
    /// New state.
    pub state: VoiceState,
    /// Why.
    pub cause: LifecycleCause,
    /// Tick time.
    pub at: f64,
}

impl LifecycleEvent {
    fn from_voice(voice: &ActiveVoice, state: VoiceState, cause: LifecycleCause, at: f64) -> Self {
        Self {
            voice: voice.id,
            scene: voice.scene,
            element: voice.element,
            state,
            cause,
            at,
        }
    }
}

/// Bridges admissions to the engine and reclaims slots.
pub struct PlaybackCoordinator {
    engine: Arc<dyn AudioRenderEngine>,
    registry: Arc<VoiceRegistry>,
    events: EngineEventReceiver,
    stale_request_timeout: f64,
    overrun_grace: Option<f64>,
}

impl PlaybackCoordinator {
    /// Create a coordinator.
    #[must_use]
    pub fn new(
        engine: Arc<dyn AudioRenderEngine>,
        registry: Arc<VoiceRegistry>,
        events: EngineEventReceiver,
        stale_request_timeout: f64,
        overrun_grace: Option<f64>,
    ) -> Self {
        Self {
            engine,
            registry,
            events,
            stale_request_timeout,
            overrun_grace,
        }
    }

    /// A sender the engine can post events through.
    #[must_use]
    pub fn event_sender(&self) -> EngineEventSender {
        self.events.sender()
    }

    /// Request playback for an admitted voice.
    ///
    /// The voice stays `Requested` until the engine acknowledges it. An
    /// immediate engine refusal releases the slot right away.
    pub fn dispatch(&self, admission: &Admission, request: &PlaybackRequest, now: f64) -> Vec<LifecycleEvent> {
        let mut events = Vec::with_capacity(2);

        if let Some(replaced) = &admission.replaced {
            if let Some(handle) = replaced.handle {
                self.engine.stop_playback(handle);
            }
            debug!(voice = %replaced.id, by = %admission.voice, "Voice restarted");
            events.push(LifecycleEvent::from_voice(
                replaced,
                VoiceState::Cutoff,
                LifecycleCause::Restarted,
                now,
            ));
        }

        let candidate = &admission.candidate;
        events.push(LifecycleEvent {
            voice: admission.voice,
            scene: candidate.scene,
            element: candidate.element,
            state: VoiceState::Requested,
            cause: LifecycleCause::Admitted,
            at: now,
        });

        match self.engine.request_playback(request) {
            Ok(handle) => {
                if !self.registry.attach_handle(admission.voice, handle) {
                    // Released while the request was in flight.
                    self.engine.stop_playback(handle);
                }
                trace!(voice = %admission.voice, handle = handle.raw(), "Playback requested");
            },
            Err(failure) => {
                warn!(voice = %admission.voice, scene = %candidate.scene, element = %candidate.element, %failure, "Engine refused playback");
                if let Some(voice) = self.registry.release(admission.voice, VoiceState::Failed) {
                    events.push(LifecycleEvent::from_voice(
                        &voice,
                        VoiceState::Failed,
                        LifecycleCause::EngineImmediateFailure(failure),
                        now,
                    ));
                }
            },
        }

        events
    }

    /// Apply every queued engine event.
    pub fn pump(&self, now: f64) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        for event in self.events.drain() {
            match event {
                EngineEvent::Acknowledged(handle) => {
                    if let Some(voice) = self.registry.commit(handle, now) {
                        events.push(LifecycleEvent::from_voice(
                            &voice,
                            VoiceState::Playing,
                            LifecycleCause::Acknowledged,
                            now,
                        ));
                    } else {
                        trace!(handle = handle.raw(), "Ignoring acknowledgment for unknown or committed handle");
                    }
                },
                EngineEvent::Completed { handle, outcome } => {
                    let (state, cause) = match outcome {
                        PlaybackOutcome::FinishedNaturally => (VoiceState::Completed, LifecycleCause::FinishedNaturally),
                        PlaybackOutcome::CutoffRequested => (VoiceState::Cutoff, LifecycleCause::CutoffRequested),
                        PlaybackOutcome::EngineError => (VoiceState::Failed, LifecycleCause::EngineError),
                    };
                    if let Some(voice) = self.registry.release_by_handle(handle, state) {
                        if outcome == PlaybackOutcome::EngineError {
                            warn!(voice = %voice.id, scene = %voice.scene, element = %voice.element, "Engine error during playback");
                        }
                        events.push(LifecycleEvent::from_voice(&voice, state, cause, now));
                    } else {
                        trace!(handle = handle.raw(), ?outcome, "Ignoring completion for unknown handle");
                    }
                },
            }
        }
        events
    }

    /// Fail requests the engine never acknowledged and voices that overran.
    pub fn reap(&self, now: f64) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();

        for id in self.registry.stale_requests(now, self.stale_request_timeout) {
            if let Some(voice) = self.registry.release(id, VoiceState::Failed) {
                warn!(voice = %voice.id, scene = %voice.scene, element = %voice.element, "Stale request timed out");
                if let Some(handle) = voice.handle {
                    self.engine.stop_playback(handle);
                }
                events.push(LifecycleEvent::from_voice(
                    &voice,
                    VoiceState::Failed,
                    LifecycleCause::StaleRequestTimeout,
                    now,
                ));
            }
        }

        if let Some(grace) = self.overrun_grace {
            for id in self.registry.overdue_voices(now, grace) {
                if let Some(voice) = self.registry.release(id, VoiceState::Failed) {
                    warn!(voice = %voice.id, scene = %voice.scene, element = %voice.element, "Voice overran its expected end");
                    if let Some(handle) = voice.handle {
                        self.engine.stop_playback(handle);
                    }
                    events.push(LifecycleEvent::from_voice(&voice, VoiceState::Failed, LifecycleCause::Overrun, now));
                }
            }
        }

        events
    }

    /// Stop and release one voice.
    pub fn cutoff_voice(&self, id: VoiceId, cause: LifecycleCause, now: f64) -> Option<LifecycleEvent> {
        let voice = self.registry.release(id, VoiceState::Cutoff)?;
        if let Some(handle) = voice.handle {
            self.engine.stop_playback(handle);
        }
        Some(LifecycleEvent::from_voice(&voice, VoiceState::Cutoff, cause, now))
    }

    /// Stop and release every voice of a scene.
    pub fn cutoff_scene(&self, scene: SceneId, now: f64) -> Vec<LifecycleEvent> {
        let events: Vec<_> = self
            .registry
            .voices_for_scene(scene)
            .into_iter()
            .filter_map(|voice| self.cutoff_voice(voice.id, LifecycleCause::SceneDeactivated, now))
            .collect();
        if !events.is_empty() {
            debug!(%scene, count = events.len(), "Cut off scene voices");
        }
        events
    }

    /// Engine handle of a voice, if attached.
    #[must_use]
    pub fn handle_of(&self, voice: VoiceId) -> Option<EngineHandle> {
        self.registry.voice(voice).and_then(|v| v.handle)
    }
}
