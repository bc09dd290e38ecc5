//! Voice handle registry.
//!
//! Tracks every live voice, its engine handle, and the occupancy counters the
//! density governor checks. All mutation happens inside one
//! `parking_lot::Mutex` critical section per operation, so a cap check and
//! the slot it guards can never be separated by another thread. System-wide
//! occupancy is mirrored in an atomic for lock-free reads.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use ahash::AHashMap;
use ambiverse_common::{Category, ElementId, EngineHandle, SceneId, VoiceId};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::AdmissionRejected;

/// Lifecycle state of a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceState {
    /// Slot reserved and playback requested; not yet acknowledged.
    Requested,
    /// Acknowledged by the engine.
    Playing,
    /// Finished naturally.
    Completed,
    /// Stopped on request.
    Cutoff,
    /// Engine error, immediate failure, or timeout.
    Failed,
}

impl VoiceState {
    /// Whether the state is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cutoff | Self::Failed)
    }
}

/// A voice occupying a slot.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveVoice {
    /// Voice ID.
    pub id: VoiceId,
    /// Owning scene.
    pub scene: SceneId,
    /// Originating element.
    pub element: ElementId,
    /// Concurrency class.
    pub category: Category,
    /// Current state.
    pub state: VoiceState,
    /// Engine handle, once the engine accepted the request.
    pub handle: Option<EngineHandle>,
    /// When the slot was reserved.
    pub requested_at: f64,
    /// When the engine acknowledged.
    pub started_at: Option<f64>,
    /// Expected completion time, for voices with a known duration.
    pub expected_end: Option<f64>,
    /// Expected duration carried over from the element.
    pub expected_duration: Option<f64>,
}

/// What a slot is being reserved for.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotRequest {
    /// Scene.
    pub scene: SceneId,
    /// Element.
    pub element: ElementId,
    /// Concurrency class.
    pub category: Category,
    /// Whether the element may hold more than one voice.
    pub polyphonic: bool,
    /// Expected playback length.
    pub expected_duration: Option<f64>,
}

/// Caps a reservation must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLimits {
    /// System-wide budget.
    pub system: usize,
    /// Scene global cap.
    pub scene: usize,
    /// Category cap within the scene, if any.
    pub category: Option<usize>,
}

#[derive(Default)]
struct RegistryInner {
    voices: AHashMap<VoiceId, ActiveVoice>,
    by_handle: AHashMap<EngineHandle, VoiceId>,
    scene_counts: AHashMap<SceneId, usize>,
    category_counts: AHashMap<(SceneId, Category), usize>,
    element_counts: AHashMap<(SceneId, ElementId), usize>,
}

impl RegistryInner {
    fn check(&self, slot: &SlotRequest, limits: SlotLimits, occupied: usize) -> Result<(), AdmissionRejected> {
        if occupied >= limits.system {
            return Err(AdmissionRejected::SystemCapReached { cap: limits.system });
        }

        let in_scene = self.scene_counts.get(&slot.scene).copied().unwrap_or(0);
        if in_scene >= limits.scene {
            return Err(AdmissionRejected::SceneCapReached {
                scene: slot.scene,
                cap: limits.scene,
            });
        }

        if let Some(cap) = limits.category {
            let key = (slot.scene, slot.category.clone());
            if self.category_counts.get(&key).copied().unwrap_or(0) >= cap {
                return Err(AdmissionRejected::CategoryCapReached {
                    scene: slot.scene,
                    category: slot.category.clone(),
                    cap,
                });
            }
        }

        if !slot.polyphonic && self.element_counts.get(&(slot.scene, slot.element)).copied().unwrap_or(0) > 0 {
            return Err(AdmissionRejected::ElementAlreadyActive {
                scene: slot.scene,
                element: slot.element,
            });
        }

        Ok(())
    }

    fn account(&mut self, voice: &ActiveVoice) {
        *self.scene_counts.entry(voice.scene).or_insert(0) += 1;
        *self.category_counts.entry((voice.scene, voice.category.clone())).or_insert(0) += 1;
        *self.element_counts.entry((voice.scene, voice.element)).or_insert(0) += 1;
    }

    fn unaccount(&mut self, voice: &ActiveVoice) {
        decrement(&mut self.scene_counts, &voice.scene);
        decrement(&mut self.category_counts, &(voice.scene, voice.category.clone()));
        decrement(&mut self.element_counts, &(voice.scene, voice.element));
    }

    fn remove(&mut self, id: VoiceId) -> Option<ActiveVoice> {
        let voice = self.voices.remove(&id)?;
        if let Some(handle) = voice.handle {
            self.by_handle.remove(&handle);
        }
        self.unaccount(&voice);
        Some(voice)
    }

    fn insert(&mut self, voice: ActiveVoice) {
        self.account(&voice);
        if let Some(handle) = voice.handle {
            self.by_handle.insert(handle, voice.id);
        }
        self.voices.insert(voice.id, voice);
    }
}

fn decrement<K: std::hash::Hash + Eq>(counts: &mut AHashMap<K, usize>, key: &K) {
    if let Some(count) = counts.get_mut(key) {
        *count = count.saturating_sub(1);
        if *count == 0 {
            counts.remove(key);
        }
    }
}

/// Registry of live voices.
pub struct VoiceRegistry {
    inner: Mutex<RegistryInner>,
    occupied: AtomicUsize,
    next_id: AtomicU64,
}

impl Default for VoiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            occupied: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
        }
    }

    fn new_voice(&self, slot: &SlotRequest, now: f64) -> ActiveVoice {
        ActiveVoice {
            id: VoiceId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed)),
            scene: slot.scene,
            element: slot.element,
            category: slot.category.clone(),
            state: VoiceState::Requested,
            handle: None,
            requested_at: now,
            started_at: None,
            expected_end: None,
            expected_duration: slot.expected_duration,
        }
    }

    /// Check every cap and reserve a slot in one step.
    pub fn reserve(&self, slot: &SlotRequest, limits: SlotLimits, now: f64) -> Result<VoiceId, AdmissionRejected> {
        let mut inner = self.inner.lock();
        inner.check(slot, limits, self.occupied.load(Ordering::Acquire))?;

        let voice = self.new_voice(slot, now);
        let id = voice.id;
        inner.insert(voice);
        self.occupied.fetch_add(1, Ordering::AcqRel);
        trace!(%id, scene = %slot.scene, element = %slot.element, "Reserved voice slot");
        Ok(id)
    }

    /// Release `old` and reserve a new slot for the same element atomically.
    ///
    /// If the new reservation is refused the old voice is left untouched.
    /// Returns the new voice and the released one (if it was still present).
    pub fn reserve_replacing(
        &self,
        old: VoiceId,
        slot: &SlotRequest,
        limits: SlotLimits,
        now: f64,
    ) -> Result<(VoiceId, Option<ActiveVoice>), AdmissionRejected> {
        let mut inner = self.inner.lock();

        let mut released = inner.remove(old);
        let mut occupied = self.occupied.load(Ordering::Acquire);
        if released.is_some() {
            occupied -= 1;
        }

        if let Err(rejected) = inner.check(slot, limits, occupied) {
            if let Some(voice) = released.take() {
                inner.insert(voice);
            }
            return Err(rejected);
        }

        let voice = self.new_voice(slot, now);
        let id = voice.id;
        inner.insert(voice);
        if released.is_none() {
            self.occupied.fetch_add(1, Ordering::AcqRel);
        }

        if let Some(voice) = released.as_mut() {
            voice.state = VoiceState::Cutoff;
        }
        debug!(%old, new = %id, scene = %slot.scene, element = %slot.element, "Replaced voice");
        Ok((id, released))
    }

    /// Put back a voice released by [`Self::reserve_replacing`] whose
    /// replacement was rolled back. Caps are not rechecked.
    pub fn reinstate(&self, mut voice: ActiveVoice) {
        voice.state = if voice.started_at.is_some() {
            VoiceState::Playing
        } else {
            VoiceState::Requested
        };
        let id = voice.id;
        self.inner.lock().insert(voice);
        self.occupied.fetch_add(1, Ordering::AcqRel);
        trace!(%id, "Reinstated voice");
    }

    /// Record the engine handle for a requested voice.
    ///
    /// Returns `false` if the voice no longer exists (it was released while
    /// the request was in flight), in which case the caller owns the handle.
    pub fn attach_handle(&self, voice: VoiceId, handle: EngineHandle) -> bool {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.voices.get_mut(&voice) else {
            return false;
        };
        entry.handle = Some(handle);
        inner.by_handle.insert(handle, voice);
        true
    }

    /// Mark the voice behind `handle` as playing.
    ///
    /// Returns a snapshot of the voice if it transitioned; duplicate or late
    /// acknowledgments return `None`.
    pub fn commit(&self, handle: EngineHandle, now: f64) -> Option<ActiveVoice> {
        let mut inner = self.inner.lock();
        let id = *inner.by_handle.get(&handle)?;
        let voice = inner.voices.get_mut(&id)?;
        if voice.state != VoiceState::Requested {
            return None;
        }
        voice.state = VoiceState::Playing;
        voice.started_at = Some(now);
        voice.expected_end = voice.expected_duration.map(|d| now + d);
        Some(voice.clone())
    }

    /// Remove a voice and free its slot, recording the terminal state.
    pub fn release(&self, voice: VoiceId, terminal: VoiceState) -> Option<ActiveVoice> {
        let mut inner = self.inner.lock();
        let mut removed = inner.remove(voice)?;
        self.occupied.fetch_sub(1, Ordering::AcqRel);
        removed.state = terminal;
        trace!(%voice, ?terminal, "Released voice slot");
        Some(removed)
    }

    /// Release the voice behind an engine handle.
    pub fn release_by_handle(&self, handle: EngineHandle, terminal: VoiceState) -> Option<ActiveVoice> {
        let id = self.voice_for_handle(handle)?;
        self.release(id, terminal)
    }

    /// Voice ID for an engine handle.
    #[must_use]
    pub fn voice_for_handle(&self, handle: EngineHandle) -> Option<VoiceId> {
        self.inner.lock().by_handle.get(&handle).copied()
    }

    /// Snapshot of a voice.
    #[must_use]
    pub fn voice(&self, id: VoiceId) -> Option<ActiveVoice> {
        self.inner.lock().voices.get(&id).cloned()
    }

    /// Whether the element holds any voice.
    #[must_use]
    pub fn is_element_active(&self, scene: SceneId, element: ElementId) -> bool {
        self.inner.lock().element_counts.contains_key(&(scene, element))
    }

    /// Oldest voice held by an element.
    #[must_use]
    pub fn oldest_for_element(&self, scene: SceneId, element: ElementId) -> Option<VoiceId> {
        self.inner
            .lock()
            .voices
            .values()
            .filter(|v| v.scene == scene && v.element == element)
            .map(|v| v.id)
            .min()
    }

    /// All voices of a scene, ordered by ID.
    #[must_use]
    pub fn voices_for_scene(&self, scene: SceneId) -> Vec<ActiveVoice> {
        let mut voices: Vec<_> = self.inner.lock().voices.values().filter(|v| v.scene == scene).cloned().collect();
        voices.sort_by_key(|v| v.id);
        voices
    }

    /// All voices, ordered by ID.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ActiveVoice> {
        let mut voices: Vec<_> = self.inner.lock().voices.values().cloned().collect();
        voices.sort_by_key(|v| v.id);
        voices
    }

    /// Requested voices older than `timeout`.
    #[must_use]
    pub fn stale_requests(&self, now: f64, timeout: f64) -> Vec<VoiceId> {
        let mut ids: Vec<_> = self
            .inner
            .lock()
            .voices
            .values()
            .filter(|v| v.state == VoiceState::Requested && now - v.requested_at >= timeout)
            .map(|v| v.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Playing voices past their expected end plus `grace`.
    #[must_use]
    pub fn overdue_voices(&self, now: f64, grace: f64) -> Vec<VoiceId> {
        let mut ids: Vec<_> = self
            .inner
            .lock()
            .voices
            .values()
            .filter(|v| v.state == VoiceState::Playing && v.expected_end.is_some_and(|end| now >= end + grace))
            .map(|v| v.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// System-wide occupancy. Lock-free.
    #[must_use]
    pub fn occupied(&self) -> usize {
        self.occupied.load(Ordering::Acquire)
    }

    /// Occupancy of a scene.
    #[must_use]
    pub fn occupied_in_scene(&self, scene: SceneId) -> usize {
        self.inner.lock().scene_counts.get(&scene).copied().unwrap_or(0)
    }

    /// Occupancy of a category within a scene.
    #[must_use]
    pub fn occupied_in_category(&self, scene: SceneId, category: &Category) -> usize {
        self.inner
            .lock()
            .category_counts
            .get(&(scene, category.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Returns true if no voices are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.occupied() == 0
    }
}
