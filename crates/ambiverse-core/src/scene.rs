//! Runtime state of activated scenes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ambiverse_assets::SceneDescriptor;
use ambiverse_common::SceneId;

/// Activation state of a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SceneState {
    /// Not loaded.
    #[default]
    Inactive,
    /// Loaded this tick; starts scheduling on the next one.
    Activating,
    /// Scheduling and admitting.
    Active,
    /// Tearing down; admits nothing.
    Deactivating,
}

/// Admission gate for one scene.
///
/// Clones share the same flag, so any thread holding a gate can close it.
/// The governor checks the gate at admission time; once closed, nothing new
/// is admitted for the scene and the next tick completes the teardown.
#[derive(Debug, Clone)]
pub struct SceneGate {
    open: Arc<AtomicBool>,
}

impl SceneGate {
    /// Create an open gate.
    #[must_use]
    pub fn new() -> Self {
        Self {
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Whether admissions are allowed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Stop admissions.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }
}

impl Default for SceneGate {
    fn default() -> Self {
        Self::new()
    }
}

/// A scene loaded into the runtime.
#[derive(Debug, Clone)]
pub struct ActiveScene {
    descriptor: Arc<SceneDescriptor>,
    state: SceneState,
    gate: SceneGate,
    activated_at: f64,
    active_duration: f64,
}

impl ActiveScene {
    /// Load a scene in the `Activating` state.
    #[must_use]
    pub fn new(descriptor: Arc<SceneDescriptor>, now: f64) -> Self {
        Self {
            descriptor,
            state: SceneState::Activating,
            gate: SceneGate::new(),
            activated_at: now,
            active_duration: 0.0,
        }
    }

    /// Scene ID.
    #[must_use]
    pub fn id(&self) -> SceneId {
        self.descriptor.id
    }

    /// The descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &SceneDescriptor {
        &self.descriptor
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SceneState {
        self.state
    }

    /// Admission gate.
    #[must_use]
    pub fn gate(&self) -> &SceneGate {
        &self.gate
    }

    /// When the scene was activated.
    #[must_use]
    pub fn activated_at(&self) -> f64 {
        self.activated_at
    }

    /// Seconds spent in the `Active` state.
    #[must_use]
    pub fn active_duration(&self) -> f64 {
        self.active_duration
    }

    /// Fraction of the lifetime used, if the scene has one.
    #[must_use]
    pub fn lifetime_ratio(&self) -> Option<f64> {
        self.descriptor
            .lifetime
            .map(|lifetime| (self.active_duration / lifetime).clamp(0.0, 1.0))
    }

    /// Whether the lifetime has run out.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.descriptor.lifetime.is_some_and(|lifetime| self.active_duration >= lifetime)
    }

    pub(crate) fn set_state(&mut self, state: SceneState) {
        self.state = state;
    }

    pub(crate) fn accumulate(&mut self, dt: f64) {
        if self.state == SceneState::Active {
            self.active_duration += dt;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_shared_between_clones() {
        let gate = SceneGate::new();
        let remote = gate.clone();
        assert!(gate.is_open());

        std::thread::spawn(move || remote.close()).join().expect("closer panicked");
        assert!(!gate.is_open());
    }

    #[test]
    fn test_lifetime_tracking() {
        let descriptor = Arc::new(SceneDescriptor::new(SceneId::new(1), 2).with_lifetime(4.0));
        let mut scene = ActiveScene::new(descriptor, 0.0);
        assert_eq!(scene.state(), SceneState::Activating);

        scene.accumulate(1.0);
        assert_eq!(scene.lifetime_ratio(), Some(0.0));

        scene.set_state(SceneState::Active);
        scene.accumulate(2.0);
        assert_eq!(scene.lifetime_ratio(), Some(0.5));
        assert!(!scene.is_expired());

        scene.accumulate(2.0);
        assert!(scene.is_expired());
        assert_eq!(scene.lifetime_ratio(), Some(1.0));
    }

    #[test]
    fn test_no_lifetime_never_expires() {
        let mut scene = ActiveScene::new(Arc::new(SceneDescriptor::new(SceneId::new(2), 1)), 0.0);
        scene.set_state(SceneState::Active);
        scene.accumulate(1e6);
        assert!(!scene.is_expired());
        assert_eq!(scene.lifetime_ratio(), None);
    }
}
