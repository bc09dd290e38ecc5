//! The Ambiverse runtime.
//!
//! Host-facing facade that owns the clock, the active scenes and every
//! subsystem, and sequences them once per tick:
//!
//! 1. advance the clock
//! 2. apply queued engine events
//! 3. reap stale requests and overrunning voices
//! 4. scene housekeeping (closed gates, expired lifetimes, activation)
//! 5. collect trigger candidates
//! 6. admit candidates, reserving slots
//! 7. dispatch admitted voices to the engine

use std::collections::BTreeMap;
use std::sync::Arc;

use ambiverse_assets::{Composite, Parameter, SceneDescriptor};
use ambiverse_common::{AmbiverseResult, ElementId, ParameterId, SceneId};
use glam::Vec3;
use tracing::{debug, info, warn};

use crate::config::RuntimeConfig;
use crate::coordinator::{LifecycleCause, LifecycleEvent, PlaybackCoordinator};
use crate::engine::{AudioRenderEngine, EngineEventReceiver, EngineEventSender};
use crate::error::{AdmissionRejected, SceneError, SceneResult};
use crate::governor::{Admission, DensityGovernor};
use crate::parameters::{ParameterManager, Scalars};
use crate::registry::{ActiveVoice, VoiceRegistry, VoiceState};
use crate::request::RequestBuilder;
use crate::scene::{ActiveScene, SceneGate, SceneState};
use crate::scheduler::{ScheduledScene, TriggerCandidate, TriggerScheduler};

/// Stream offset separating request randomness from trigger timing.
const REQUEST_STREAM: u64 = 0x9e37_79b9_7f4a_7c15;

/// What happened during one tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Clock after the tick.
    pub now: f64,
    /// Candidates produced by the scheduler.
    pub candidates: Vec<TriggerCandidate>,
    /// Admitted candidates.
    pub admitted: Vec<Admission>,
    /// Rejected candidates.
    pub rejected: Vec<(TriggerCandidate, AdmissionRejected)>,
    /// Voice state transitions, in the order they happened.
    pub lifecycle: Vec<LifecycleEvent>,
    /// Scenes that became active this tick.
    pub activated: Vec<SceneId>,
    /// Scenes torn down this tick.
    pub deactivated: Vec<SceneId>,
}

impl TickReport {
    /// Transitions into a given state.
    pub fn transitions_to(&self, state: VoiceState) -> impl Iterator<Item = &LifecycleEvent> {
        self.lifecycle.iter().filter(move |e| e.state == state)
    }
}

/// Procedural ambience runtime.
pub struct Ambiverse {
    config: RuntimeConfig,
    now: f64,
    tick: u64,
    scenes: BTreeMap<SceneId, ActiveScene>,
    registry: Arc<VoiceRegistry>,
    scheduler: TriggerScheduler,
    governor: DensityGovernor,
    coordinator: PlaybackCoordinator,
    parameters: ParameterManager,
    requests: RequestBuilder,
}

impl Ambiverse {
    /// Create a runtime driving `engine`, which posts its events into `events`.
    #[must_use]
    pub fn new(mut config: RuntimeConfig, engine: Arc<dyn AudioRenderEngine>, events: EngineEventReceiver) -> Self {
        config.validate();
        let registry = Arc::new(VoiceRegistry::new());
        let coordinator = PlaybackCoordinator::new(
            engine,
            Arc::clone(&registry),
            events,
            config.stale_request_timeout,
            config.overrun_grace,
        );

        info!(seed = config.seed, max_voices = config.max_voices, "Ambiverse runtime created");

        Self {
            scheduler: TriggerScheduler::new(config.seed, config.warm_up_count, config.failure_backoff),
            governor: DensityGovernor::new(config.max_voices),
            requests: RequestBuilder::new(config.seed ^ REQUEST_STREAM),
            parameters: ParameterManager::new(),
            scenes: BTreeMap::new(),
            now: 0.0,
            tick: 0,
            registry,
            coordinator,
            config,
        }
    }

    /// Sender the engine posts acknowledgments and completions through.
    #[must_use]
    pub fn event_sender(&self) -> EngineEventSender {
        self.coordinator.event_sender()
    }

    /// Configuration in effect (after clamping).
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Current clock in seconds.
    #[must_use]
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Ticks processed so far.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// The voice registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<VoiceRegistry> {
        &self.registry
    }

    // ========================================================================
    // Scenes
    // ========================================================================

    /// Load a scene. It starts scheduling on the next tick.
    pub fn activate_scene(&mut self, descriptor: impl Into<Arc<SceneDescriptor>>) -> SceneResult<()> {
        let descriptor: Arc<SceneDescriptor> = descriptor.into();
        descriptor.validate()?;

        let id = descriptor.id;
        if self.scenes.contains_key(&id) {
            return Err(SceneError::AlreadyActive(id));
        }

        self.parameters.check_scene(&descriptor);
        self.scheduler.prime_scene(&descriptor);
        info!(scene = %id, name = %descriptor.name, elements = descriptor.elements.len(), "Scene activating");
        self.scenes.insert(id, ActiveScene::new(descriptor, self.now));
        Ok(())
    }

    /// Tear a scene down: close its gate, cut off its voices and unload it.
    pub fn deactivate_scene(&mut self, id: SceneId) -> SceneResult<Vec<LifecycleEvent>> {
        if !self.scenes.contains_key(&id) {
            return Err(SceneError::NotActive(id));
        }
        Ok(self.teardown(id))
    }

    fn teardown(&mut self, id: SceneId) -> Vec<LifecycleEvent> {
        let Some(scene) = self.scenes.get_mut(&id) else {
            return Vec::new();
        };
        scene.gate().close();
        scene.set_state(SceneState::Deactivating);

        let events = self.coordinator.cutoff_scene(id, self.now);
        self.scheduler.forget_scene(id);
        self.scenes.remove(&id);
        info!(scene = %id, cut = events.len(), "Scene deactivated");
        events
    }

    /// Activate every scene of a composite.
    ///
    /// Members that are already active are left running. With
    /// `stop_non_composite`, every other scene is deactivated first.
    pub fn push_composite(&mut self, composite: &Composite) -> SceneResult<Vec<LifecycleEvent>> {
        composite.validate()?;

        let mut events = Vec::new();
        if composite.stop_non_composite {
            let others: Vec<_> = self.scenes.keys().copied().filter(|id| !composite.contains(*id)).collect();
            for id in others {
                events.extend(self.teardown(id));
            }
        }

        for scene in &composite.scenes {
            if self.scenes.contains_key(&scene.id) {
                debug!(scene = %scene.id, composite = %composite.name, "Composite member already active");
                continue;
            }
            self.activate_scene(scene.clone())?;
        }

        info!(composite = %composite.name, scenes = composite.scenes.len(), "Composite pushed");
        Ok(events)
    }

    /// Deactivate every active scene of a composite.
    pub fn pop_composite(&mut self, composite: &Composite) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        for scene in &composite.scenes {
            if self.scenes.contains_key(&scene.id) {
                events.extend(self.teardown(scene.id));
            }
        }
        info!(composite = %composite.name, "Composite popped");
        events
    }

    /// State of a scene.
    #[must_use]
    pub fn scene_state(&self, id: SceneId) -> SceneState {
        self.scenes.get(&id).map_or(SceneState::Inactive, ActiveScene::state)
    }

    /// Admission gate of a loaded scene. Closing it from any thread stops
    /// admissions immediately; the next tick completes the teardown.
    #[must_use]
    pub fn scene_gate(&self, id: SceneId) -> Option<SceneGate> {
        self.scenes.get(&id).map(|s| s.gate().clone())
    }

    /// Fraction of a scene's lifetime used so far.
    #[must_use]
    pub fn lifetime_ratio(&self, id: SceneId) -> Option<f64> {
        self.scenes.get(&id).and_then(ActiveScene::lifetime_ratio)
    }

    /// IDs of loaded scenes.
    #[must_use]
    pub fn scene_ids(&self) -> Vec<SceneId> {
        self.scenes.keys().copied().collect()
    }

    /// Restart an element on the next tick.
    pub fn retrigger(&mut self, scene: SceneId, element: ElementId) -> SceneResult<()> {
        let loaded = self.scenes.get(&scene).ok_or(SceneError::NotActive(scene))?;
        if loaded.descriptor().element(element).is_none() {
            return Err(SceneError::UnknownElement { scene, element });
        }
        self.scheduler.request_retrigger(scene, element);
        Ok(())
    }

    // ========================================================================
    // Parameters and listener
    // ========================================================================

    /// Register a parameter at its default value.
    pub fn register_parameter(&mut self, parameter: Parameter) -> AmbiverseResult<bool> {
        parameter.validate()?;
        Ok(self.parameters.register(parameter))
    }

    /// Set a parameter's raw value. Returns the normalized value.
    ///
    /// Pending interval waits of affected scenes rescale from the next tick.
    pub fn set_parameter(&mut self, id: impl Into<ParameterId>, value: f32) -> AmbiverseResult<f32> {
        self.parameters.set(&id.into(), value)
    }

    /// Current normalized value of a parameter.
    #[must_use]
    pub fn parameter(&self, id: &ParameterId) -> Option<f32> {
        self.parameters.value(id)
    }

    /// Scalars a scene currently runs at.
    #[must_use]
    pub fn scalars(&self, id: SceneId) -> Option<Scalars> {
        self.scenes.get(&id).map(|s| self.parameters.scalars_for(s.descriptor()))
    }

    /// Move the listener.
    pub fn set_listener(&mut self, position: Vec3) {
        self.requests.set_listener(position);
    }

    /// Listener position.
    #[must_use]
    pub fn listener(&self) -> Vec3 {
        self.requests.listener()
    }

    // ========================================================================
    // Voices
    // ========================================================================

    /// Voices held system-wide.
    #[must_use]
    pub fn active_voice_count(&self) -> usize {
        self.registry.occupied()
    }

    /// Voices held by a scene.
    #[must_use]
    pub fn voices_in_scene(&self, id: SceneId) -> Vec<ActiveVoice> {
        self.registry.voices_for_scene(id)
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Run one tick of `dt` seconds.
    pub fn advance(&mut self, dt: f64) -> TickReport {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.now += dt;
        self.tick += 1;
        let now = self.now;

        let mut report = TickReport {
            tick: self.tick,
            now,
            ..TickReport::default()
        };

        report.lifecycle.extend(self.coordinator.pump(now));
        report.lifecycle.extend(self.coordinator.reap(now));
        self.note_failures(&report.lifecycle, now);
        self.housekeeping(dt, &mut report);

        let candidates = {
            let scheduled: Vec<ScheduledScene<'_>> = self
                .scenes
                .values()
                .filter(|s| s.state() == SceneState::Active)
                .map(|s| ScheduledScene {
                    descriptor: s.descriptor(),
                    density: self.parameters.scalars_for(s.descriptor()).density,
                })
                .collect();
            self.scheduler.collect(now, dt, &scheduled, &self.registry)
        };
        report.candidates.clone_from(&candidates);

        let admissions = self.governor.admit(candidates, &self.scenes, &self.registry, now);
        for admission in &admissions.admitted {
            let events = self.dispatch(admission, now);
            self.note_failures(&events, now);
            report.lifecycle.extend(events);
        }
        report.admitted = admissions.admitted;
        report.rejected = admissions.rejected;

        if !report.admitted.is_empty() || !report.lifecycle.is_empty() {
            debug!(
                tick = self.tick,
                admitted = report.admitted.len(),
                rejected = report.rejected.len(),
                transitions = report.lifecycle.len(),
                voices = self.registry.occupied(),
                "Tick"
            );
        }

        report
    }

    fn note_failures(&mut self, events: &[LifecycleEvent], now: f64) {
        for event in events.iter().filter(|e| e.state == VoiceState::Failed) {
            self.scheduler.record_failure(event.scene, event.element, now);
        }
    }

    fn housekeeping(&mut self, dt: f64, report: &mut TickReport) {
        let mut teardown = Vec::new();
        for (id, scene) in &mut self.scenes {
            if !scene.gate().is_open() {
                debug!(scene = %id, "Scene gate closed externally");
                teardown.push(*id);
                continue;
            }

            scene.accumulate(dt);
            if scene.is_expired() {
                info!(scene = %id, lifetime = ?scene.descriptor().lifetime, "Scene lifetime expired");
                teardown.push(*id);
                continue;
            }

            if scene.state() == SceneState::Activating {
                scene.set_state(SceneState::Active);
                report.activated.push(*id);
            }
        }

        for id in teardown {
            report.lifecycle.extend(self.teardown(id));
            report.deactivated.push(id);
        }
    }

    fn dispatch(&mut self, admission: &Admission, now: f64) -> Vec<LifecycleEvent> {
        let candidate = &admission.candidate;
        let Some(scene) = self.scenes.get(&candidate.scene) else {
            return Vec::new();
        };
        let descriptor = scene.descriptor();
        let Some(element) = descriptor.element(candidate.element) else {
            warn!(scene = %candidate.scene, element = %candidate.element, "Admitted element vanished");
            return self
                .coordinator
                .cutoff_voice(admission.voice, LifecycleCause::SceneDeactivated, now)
                .into_iter()
                .collect();
        };

        let scalars = self.parameters.scalars_for(descriptor);
        let request = self.requests.build(admission.voice, descriptor, element, scalars);
        self.coordinator.dispatch(admission, &request, now)
    }
}
