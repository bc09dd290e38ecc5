//! Deterministic stand-in for an audio rendering engine.
//!
//! Used by the host binary and the tests. Voices are acknowledged after a
//! fixed latency and complete after a per-sound duration; looping voices play
//! until stopped. Chosen elements can be refused, dropped (never
//! acknowledged) or made to fail mid-playback.

use std::collections::{BTreeMap, BTreeSet};

use ambiverse_common::{ElementId, EngineHandle};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::engine::{AudioRenderEngine, EngineEventSender, EngineFailure, PlaybackOutcome, PlaybackRequest};

/// Behavior of the simulated engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Seconds between a request and its acknowledgment
    pub ack_latency: f64,
    /// Length of non-looping sounds without an entry in `durations`
    pub default_duration: f64,
    /// Per-sound lengths in seconds
    pub durations: BTreeMap<String, f64>,
    /// Maximum concurrent engine voices (None = unlimited)
    pub capacity: Option<usize>,
    /// Refuse requests that carry no sound
    pub require_sound: bool,
    /// Elements whose requests are refused immediately
    pub refuse_elements: BTreeSet<ElementId>,
    /// Elements whose requests are accepted but never acknowledged
    pub drop_elements: BTreeSet<ElementId>,
    /// Elements that fail with an engine error right after starting
    pub error_elements: BTreeSet<ElementId>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            ack_latency: 0.05,
            default_duration: 3.0,
            durations: BTreeMap::new(),
            capacity: None,
            require_sound: false,
            refuse_elements: BTreeSet::new(),
            drop_elements: BTreeSet::new(),
            error_elements: BTreeSet::new(),
        }
    }
}

impl SimulationSettings {
    /// With acknowledgment latency.
    #[must_use]
    pub fn with_ack_latency(mut self, seconds: f64) -> Self {
        self.ack_latency = seconds;
        self
    }

    /// With default sound length.
    #[must_use]
    pub fn with_default_duration(mut self, seconds: f64) -> Self {
        self.default_duration = seconds;
        self
    }

    /// With the length of one sound.
    #[must_use]
    pub fn with_duration(mut self, sound: impl Into<String>, seconds: f64) -> Self {
        self.durations.insert(sound.into(), seconds);
        self
    }

    /// With engine voice capacity.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Refuse an element's requests.
    #[must_use]
    pub fn refusing(mut self, element: ElementId) -> Self {
        self.refuse_elements.insert(element);
        self
    }

    /// Never acknowledge an element's requests.
    #[must_use]
    pub fn dropping(mut self, element: ElementId) -> Self {
        self.drop_elements.insert(element);
        self
    }

    /// Fail an element's voices after they start.
    #[must_use]
    pub fn erroring(mut self, element: ElementId) -> Self {
        self.error_elements.insert(element);
        self
    }
}

#[derive(Debug)]
struct SimVoice {
    request: PlaybackRequest,
    requested_at: f64,
    acknowledged: bool,
    ends_at: Option<f64>,
}

#[derive(Debug, Default)]
struct SimState {
    now: f64,
    next_handle: u64,
    voices: BTreeMap<u64, SimVoice>,
    requests: Vec<PlaybackRequest>,
    stops: Vec<EngineHandle>,
}

/// Simulated audio engine.
pub struct SimulatedEngine {
    settings: SimulationSettings,
    state: Mutex<SimState>,
    events: EngineEventSender,
}

impl SimulatedEngine {
    /// Create an engine posting events through `events`.
    #[must_use]
    pub fn new(events: EngineEventSender, settings: SimulationSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(SimState::default()),
            events,
        }
    }

    /// Settings in use.
    #[must_use]
    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    /// Advance the engine clock, posting acknowledgments and completions.
    pub fn advance(&self, dt: f64) {
        let mut state = self.state.lock();
        state.now += dt;
        let now = state.now;

        let mut finished = Vec::new();
        for (&raw, voice) in &mut state.voices {
            let handle = EngineHandle::new(raw);
            let element = voice.request.element;

            if !voice.acknowledged {
                if self.settings.drop_elements.contains(&element) || now - voice.requested_at < self.settings.ack_latency {
                    continue;
                }
                voice.acknowledged = true;
                self.events.acknowledged(handle);

                if self.settings.error_elements.contains(&element) {
                    self.events.completed(handle, PlaybackOutcome::EngineError);
                    finished.push(raw);
                    continue;
                }

                voice.ends_at = if voice.request.looping {
                    None
                } else {
                    Some(now + self.duration_of(&voice.request))
                };
            }

            if voice.ends_at.is_some_and(|end| now >= end) {
                self.events.completed(handle, PlaybackOutcome::FinishedNaturally);
                finished.push(raw);
            }
        }

        for raw in finished {
            state.voices.remove(&raw);
        }
    }

    fn duration_of(&self, request: &PlaybackRequest) -> f64 {
        request
            .sound
            .as_ref()
            .and_then(|sound| self.settings.durations.get(sound.as_str()))
            .copied()
            .unwrap_or(self.settings.default_duration)
    }

    /// Every request received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<PlaybackRequest> {
        self.state.lock().requests.clone()
    }

    /// Every stop received, in order.
    #[must_use]
    pub fn stops(&self) -> Vec<EngineHandle> {
        self.state.lock().stops.clone()
    }

    /// Voices the engine is currently holding (acknowledged or not).
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.state.lock().voices.len()
    }

    /// Voices that have been acknowledged and not yet finished.
    #[must_use]
    pub fn playing_count(&self) -> usize {
        self.state.lock().voices.values().filter(|v| v.acknowledged).count()
    }
}

impl AudioRenderEngine for SimulatedEngine {
    fn request_playback(&self, request: &PlaybackRequest) -> Result<EngineHandle, EngineFailure> {
        let mut state = self.state.lock();
        state.requests.push(request.clone());

        if self.settings.refuse_elements.contains(&request.element) {
            return Err(EngineFailure::Other(format!("{} refused by simulation", request.element)));
        }
        if self.settings.require_sound && request.sound.is_none() {
            return Err(EngineFailure::NoSound);
        }
        if let Some(max) = self.settings.capacity {
            if state.voices.len() >= max {
                return Err(EngineFailure::NoCapacity { max });
            }
        }

        state.next_handle += 1;
        let raw = state.next_handle;
        let requested_at = state.now;
        state.voices.insert(
            raw,
            SimVoice {
                request: request.clone(),
                requested_at,
                acknowledged: false,
                ends_at: None,
            },
        );
        trace!(handle = raw, voice = %request.voice, "Simulated playback queued");
        Ok(EngineHandle::new(raw))
    }

    fn stop_playback(&self, handle: EngineHandle) {
        let mut state = self.state.lock();
        state.stops.push(handle);
        if state.voices.remove(&handle.raw()).is_some() {
            self.events.completed(handle, PlaybackOutcome::CutoffRequested);
        } else {
            debug!(handle = handle.raw(), "Stop for unknown simulated voice");
        }
    }
}
