//! Trigger scheduler.
//!
//! Decides, once per tick, which elements of the active scenes want a voice.
//! The scheduler only proposes; admission is the governor's job.
//!
//! Interval timers count down in reference seconds, scaled by the scene's
//! density each tick. A density of 2 halves every pending wait, a density of
//! 0 freezes it, and a parameter change mid-wait rescales whatever is left
//! without losing the elapsed fraction.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use ambiverse_assets::{IntervalRange, PlaybackMode, SceneDescriptor, SoundElement, TriggerPolicy};
use ambiverse_common::{ElementId, SceneId, VoiceId};
use tracing::trace;

use crate::registry::VoiceRegistry;

type ElementKey = (SceneId, ElementId);

/// What an admitted candidate should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// Start a new voice.
    Start,
    /// Start the held voice of a continuous element.
    EnsureActive,
    /// Replace an existing voice of the same element.
    Restart {
        /// Voice being replaced.
        replaces: VoiceId,
    },
}

/// A proposal to start a voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerCandidate {
    /// Scene.
    pub scene: SceneId,
    /// Element.
    pub element: ElementId,
    /// Element priority.
    pub priority: i32,
    /// Kind of trigger.
    pub kind: TriggerKind,
    /// Tick time the candidate was produced at.
    pub at: f64,
}

impl TriggerCandidate {
    fn order_key(&self) -> (Reverse<i32>, SceneId, ElementId) {
        (Reverse(self.priority), self.scene, self.element)
    }
}

/// Sort candidates into admission order: priority descending, then scene and
/// element ascending.
pub fn sort_candidates(candidates: &mut [TriggerCandidate]) {
    candidates.sort_by_key(TriggerCandidate::order_key);
}

/// A scene as seen by one `collect` pass.
#[derive(Debug, Clone, Copy)]
pub struct ScheduledScene<'a> {
    /// Descriptor.
    pub descriptor: &'a SceneDescriptor,
    /// Current density scalar.
    pub density: f32,
}

/// Per-element trigger state for all active scenes.
pub struct TriggerScheduler {
    rng: fastrand::Rng,
    warm_up_count: u32,
    failure_backoff: f64,
    /// Remaining wait per interval element, in reference seconds.
    timers: BTreeMap<ElementKey, f64>,
    backoff_until: BTreeMap<ElementKey, f64>,
    retriggers: BTreeSet<ElementKey>,
}

impl TriggerScheduler {
    /// Create a scheduler.
    #[must_use]
    pub fn new(seed: u64, warm_up_count: u32, failure_backoff: f64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
            warm_up_count,
            failure_backoff,
            timers: BTreeMap::new(),
            backoff_until: BTreeMap::new(),
            retriggers: BTreeSet::new(),
        }
    }

    /// Initialize interval timers for a newly activated scene.
    ///
    /// Each warm-up round takes the element that would fire first, advances
    /// every other timer by its wait and resamples it, as if the scene had
    /// already been running. This staggers first triggers.
    pub fn prime_scene(&mut self, scene: &SceneDescriptor) {
        self.forget_scene(scene.id);

        let mut pending: Vec<(ElementKey, IntervalRange, f64)> = scene
            .elements
            .iter()
            .filter_map(|element| match element.trigger {
                TriggerPolicy::Interval(range) => Some(((scene.id, element.id), range)),
                _ => None,
            })
            .map(|(key, range)| (key, range, range.sample(&mut self.rng)))
            .collect();

        for _ in 0..self.warm_up_count {
            let Some(first) = pending
                .iter()
                .enumerate()
                .min_by(|a, b| a.1 .2.total_cmp(&b.1 .2))
                .map(|(index, _)| index)
            else {
                break;
            };

            let elapsed = pending[first].2;
            for (index, entry) in pending.iter_mut().enumerate() {
                if index != first {
                    entry.2 -= elapsed;
                }
            }
            let range = pending[first].1;
            pending[first].2 = range.sample(&mut self.rng);
        }

        for (key, _, remaining) in pending {
            trace!(scene = %key.0, element = %key.1, remaining, "Primed interval timer");
            self.timers.insert(key, remaining);
        }
    }

    /// Drop all state for a scene.
    pub fn forget_scene(&mut self, scene: SceneId) {
        self.timers.retain(|key, _| key.0 != scene);
        self.backoff_until.retain(|key, _| key.0 != scene);
        self.retriggers.retain(|key| key.0 != scene);
    }

    /// Force a restart of an element on the next collect.
    pub fn request_retrigger(&mut self, scene: SceneId, element: ElementId) {
        self.retriggers.insert((scene, element));
    }

    /// Hold off an always-active element after a failed start.
    pub fn record_failure(&mut self, scene: SceneId, element: ElementId, now: f64) {
        self.backoff_until.insert((scene, element), now + self.failure_backoff);
    }

    /// Remaining wait of an interval element, in reference seconds.
    #[must_use]
    pub fn remaining(&self, scene: SceneId, element: ElementId) -> Option<f64> {
        self.timers.get(&(scene, element)).copied()
    }

    /// Real seconds until an interval element fires at the given density.
    #[must_use]
    pub fn time_until(&self, scene: SceneId, element: ElementId, density: f32) -> Option<f64> {
        let remaining = self.remaining(scene, element)?;
        if density <= 0.0 {
            return Some(f64::INFINITY);
        }
        Some(remaining.max(0.0) / f64::from(density))
    }

    /// Produce this tick's candidates, already sorted into admission order.
    pub fn collect(
        &mut self,
        now: f64,
        dt: f64,
        scenes: &[ScheduledScene<'_>],
        registry: &VoiceRegistry,
    ) -> Vec<TriggerCandidate> {
        let mut candidates = Vec::new();

        for scene in scenes {
            let density = f64::from(scene.density.max(0.0));
            for element in &scene.descriptor.elements {
                let key = (scene.descriptor.id, element.id);
                let fired = self.evaluate(key, element, now, dt, density, registry);
                let retrigger = self.retriggers.remove(&key);

                let kind = if retrigger {
                    Some(match registry.oldest_for_element(key.0, key.1) {
                        Some(replaces) => TriggerKind::Restart { replaces },
                        None => start_kind(element),
                    })
                } else if fired {
                    Some(fire_kind(key, element, registry))
                } else {
                    None
                };

                if let Some(kind) = kind {
                    trace!(scene = %key.0, element = %key.1, ?kind, "Trigger candidate");
                    candidates.push(TriggerCandidate {
                        scene: key.0,
                        element: key.1,
                        priority: element.priority,
                        kind,
                        at: now,
                    });
                }
            }
        }

        sort_candidates(&mut candidates);
        candidates
    }

    fn evaluate(
        &mut self,
        key: ElementKey,
        element: &SoundElement,
        now: f64,
        dt: f64,
        density: f64,
        registry: &VoiceRegistry,
    ) -> bool {
        match element.trigger {
            TriggerPolicy::Interval(range) => {
                let rng = &mut self.rng;
                let remaining = self.timers.entry(key).or_insert_with(|| range.sample(rng));
                if density <= 0.0 {
                    return false;
                }
                *remaining -= dt * density;
                if *remaining <= 0.0 {
                    *remaining = range.sample(&mut self.rng);
                    true
                } else {
                    false
                }
            },
            TriggerPolicy::Chance { probability, window } => {
                let draw = self.rng.f64();
                let chance = (probability * (dt / window) * density).min(1.0);
                draw < chance
            },
            TriggerPolicy::AlwaysActive => {
                if let Some(&until) = self.backoff_until.get(&key) {
                    if now < until {
                        return false;
                    }
                    self.backoff_until.remove(&key);
                }
                !registry.is_element_active(key.0, key.1)
            },
        }
    }
}

fn start_kind(element: &SoundElement) -> TriggerKind {
    match element.mode {
        PlaybackMode::Continuous => TriggerKind::EnsureActive,
        PlaybackMode::OneShot | PlaybackMode::Looping => TriggerKind::Start,
    }
}

fn fire_kind(key: ElementKey, element: &SoundElement, registry: &VoiceRegistry) -> TriggerKind {
    if element.mode == PlaybackMode::Looping && !element.polyphonic {
        if let Some(replaces) = registry.oldest_for_element(key.0, key.1) {
            return TriggerKind::Restart { replaces };
        }
    }
    start_kind(element)
}

#[cfg(test)]
mod tests {
    use ambiverse_common::Category;

    use super::*;
    use crate::registry::{SlotLimits, SlotRequest};

    fn hold(registry: &VoiceRegistry, scene: u32, element: u32) -> VoiceId {
        registry
            .reserve(
                &SlotRequest {
                    scene: SceneId::new(scene),
                    element: ElementId::new(element),
                    category: Category::new("test"),
                    polyphonic: false,
                    expected_duration: None,
                },
                SlotLimits {
                    system: 16,
                    scene: 16,
                    category: None,
                },
                0.0,
            )
            .expect("slot available")
    }

    fn run(scheduler: &mut TriggerScheduler, scene: &SceneDescriptor, density: f32, ticks: u32) -> Vec<f64> {
        let registry = VoiceRegistry::new();
        let scheduled = [ScheduledScene {
            descriptor: scene,
            density,
        }];
        let mut fired = Vec::new();
        for tick in 1..=ticks {
            let now = f64::from(tick);
            fired.extend(scheduler.collect(now, 1.0, &scheduled, &registry).iter().map(|c| c.at));
        }
        fired
    }

    #[test]
    fn test_interval_matches_resampling() {
        let range = IntervalRange::new(5.0, 10.0);
        let scene = SceneDescriptor::new(SceneId::new(1), 4).with_element(SoundElement::one_shot(1, range, "oneshot"));

        let mut scheduler = TriggerScheduler::new(42, 0, 1.0);
        scheduler.prime_scene(&scene);
        let fired = run(&mut scheduler, &scene, 1.0, 20);

        let mut rng = fastrand::Rng::with_seed(42);
        let mut next = range.sample(&mut rng);
        let mut expected = Vec::new();
        for tick in 1..=20 {
            let now = f64::from(tick);
            if now >= next {
                expected.push(now);
                next = now + range.sample(&mut rng);
            }
        }

        assert_eq!(fired, expected);
        assert!((2..=4).contains(&fired.len()), "fired {fired:?}");
    }

    #[test]
    fn test_same_seed_same_timestamps() {
        let scene = SceneDescriptor::new(SceneId::new(1), 4)
            .with_element(SoundElement::one_shot(1, IntervalRange::new(5.0, 10.0), "oneshot"))
            .with_element(SoundElement::one_shot(2, IntervalRange::new(1.0, 3.0), "oneshot"))
            .with_element(
                SoundElement::one_shot(3, IntervalRange::fixed(1.0), "oneshot").with_trigger(TriggerPolicy::Chance {
                    probability: 0.5,
                    window: 2.0,
                }),
            );

        let mut a = TriggerScheduler::new(7, 3, 1.0);
        let mut b = TriggerScheduler::new(7, 3, 1.0);
        a.prime_scene(&scene);
        b.prime_scene(&scene);
        assert_eq!(run(&mut a, &scene, 1.0, 60), run(&mut b, &scene, 1.0, 60));
    }

    #[test]
    fn test_warm_up_staggers_timers() {
        let scene = SceneDescriptor::new(SceneId::new(1), 4)
            .with_element(SoundElement::one_shot(1, IntervalRange::new(5.0, 10.0), "oneshot"))
            .with_element(SoundElement::one_shot(2, IntervalRange::new(5.0, 10.0), "oneshot"));

        let mut scheduler = TriggerScheduler::new(3, 3, 1.0);
        scheduler.prime_scene(&scene);

        for element in [1, 2] {
            let remaining = scheduler.remaining(SceneId::new(1), ElementId::new(element)).expect("timer");
            assert!((0.0..=10.0).contains(&remaining), "remaining {remaining}");
        }
    }

    #[test]
    fn test_density_rescales_pending_wait() {
        let scene = SceneDescriptor::new(SceneId::new(1), 4)
            .with_element(SoundElement::one_shot(1, IntervalRange::fixed(10.0), "oneshot"));
        let mut scheduler = TriggerScheduler::new(1, 0, 1.0);
        scheduler.prime_scene(&scene);

        assert!(run(&mut scheduler, &scene, 1.0, 5).is_empty());
        let wait = scheduler.time_until(SceneId::new(1), ElementId::new(1), 2.0).expect("timer");
        assert!((wait - 2.5).abs() < 1e-9);

        // Doubling the density halves the remaining five seconds.
        let fired = run(&mut scheduler, &scene, 2.0, 3);
        assert_eq!(fired, vec![3.0]);
    }

    #[test]
    fn test_zero_density_never_fires() {
        let scene = SceneDescriptor::new(SceneId::new(1), 4)
            .with_element(SoundElement::one_shot(1, IntervalRange::fixed(1.0), "oneshot"));
        let mut scheduler = TriggerScheduler::new(1, 0, 1.0);
        scheduler.prime_scene(&scene);

        assert!(run(&mut scheduler, &scene, 0.0, 100).is_empty());
        assert_eq!(
            scheduler.time_until(SceneId::new(1), ElementId::new(1), 0.0),
            Some(f64::INFINITY)
        );
    }

    #[test]
    fn test_chance_certain_and_never() {
        let always = SoundElement::one_shot(1, IntervalRange::fixed(1.0), "a").with_trigger(TriggerPolicy::Chance {
            probability: 1.0,
            window: 1.0,
        });
        let never = SoundElement::one_shot(2, IntervalRange::fixed(1.0), "a").with_trigger(TriggerPolicy::Chance {
            probability: 0.0,
            window: 1.0,
        });
        let scene = SceneDescriptor::new(SceneId::new(1), 4).with_element(always).with_element(never);

        let mut scheduler = TriggerScheduler::new(9, 0, 1.0);
        let registry = VoiceRegistry::new();
        let scheduled = [ScheduledScene {
            descriptor: &scene,
            density: 1.0,
        }];
        for tick in 1..=10 {
            let candidates = scheduler.collect(f64::from(tick), 1.0, &scheduled, &registry);
            assert_eq!(candidates.len(), 1);
            assert_eq!(candidates[0].element, ElementId::new(1));
        }
    }

    #[test]
    fn test_continuous_idempotent() {
        let scene = SceneDescriptor::new(SceneId::new(1), 4).with_element(SoundElement::continuous(1, "ambience"));
        let mut scheduler = TriggerScheduler::new(1, 3, 1.0);
        let registry = VoiceRegistry::new();
        let scheduled = [ScheduledScene {
            descriptor: &scene,
            density: 1.0,
        }];

        let first = scheduler.collect(0.1, 0.1, &scheduled, &registry);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].kind, TriggerKind::EnsureActive);

        hold(&registry, 1, 1);
        assert!(scheduler.collect(0.2, 0.1, &scheduled, &registry).is_empty());
        assert!(scheduler.collect(0.3, 0.1, &scheduled, &registry).is_empty());
    }

    #[test]
    fn test_continuous_backoff_after_failure() {
        let scene = SceneDescriptor::new(SceneId::new(1), 4).with_element(SoundElement::continuous(1, "ambience"));
        let mut scheduler = TriggerScheduler::new(1, 0, 1.0);
        let registry = VoiceRegistry::new();
        let scheduled = [ScheduledScene {
            descriptor: &scene,
            density: 1.0,
        }];

        scheduler.record_failure(SceneId::new(1), ElementId::new(1), 0.0);
        assert!(scheduler.collect(0.5, 0.5, &scheduled, &registry).is_empty());
        assert_eq!(scheduler.collect(1.0, 0.5, &scheduled, &registry).len(), 1);
    }

    #[test]
    fn test_looping_fires_restart_when_held() {
        let scene = SceneDescriptor::new(SceneId::new(1), 4)
            .with_element(SoundElement::looping(1, IntervalRange::fixed(2.0), "loop"));
        let mut scheduler = TriggerScheduler::new(1, 0, 1.0);
        scheduler.prime_scene(&scene);
        let registry = VoiceRegistry::new();
        let held = hold(&registry, 1, 1);
        let scheduled = [ScheduledScene {
            descriptor: &scene,
            density: 1.0,
        }];

        assert!(scheduler.collect(1.0, 1.0, &scheduled, &registry).is_empty());
        let candidates = scheduler.collect(2.0, 1.0, &scheduled, &registry);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].kind, TriggerKind::Restart { replaces: held });
    }

    #[test]
    fn test_retrigger_forces_restart() {
        let scene = SceneDescriptor::new(SceneId::new(1), 4)
            .with_element(SoundElement::looping(1, IntervalRange::fixed(100.0), "loop"));
        let mut scheduler = TriggerScheduler::new(1, 0, 1.0);
        scheduler.prime_scene(&scene);
        let registry = VoiceRegistry::new();
        let scheduled = [ScheduledScene {
            descriptor: &scene,
            density: 1.0,
        }];

        scheduler.request_retrigger(SceneId::new(1), ElementId::new(1));
        let candidates = scheduler.collect(1.0, 1.0, &scheduled, &registry);
        assert_eq!(candidates[0].kind, TriggerKind::Start);

        let held = hold(&registry, 1, 1);
        scheduler.request_retrigger(SceneId::new(1), ElementId::new(1));
        let candidates = scheduler.collect(2.0, 1.0, &scheduled, &registry);
        assert_eq!(candidates[0].kind, TriggerKind::Restart { replaces: held });
        assert!(scheduler.collect(3.0, 1.0, &scheduled, &registry).is_empty());
    }

    #[test]
    fn test_candidates_sorted() {
        let a = SceneDescriptor::new(SceneId::new(2), 4)
            .with_element(SoundElement::continuous(1, "x").with_priority(1))
            .with_element(SoundElement::continuous(2, "x").with_priority(5));
        let b = SceneDescriptor::new(SceneId::new(1), 4).with_element(SoundElement::continuous(9, "x").with_priority(1));

        let mut scheduler = TriggerScheduler::new(1, 0, 1.0);
        let registry = VoiceRegistry::new();
        let scheduled = [
            ScheduledScene {
                descriptor: &a,
                density: 1.0,
            },
            ScheduledScene {
                descriptor: &b,
                density: 1.0,
            },
        ];

        let order: Vec<_> = scheduler
            .collect(0.0, 0.1, &scheduled, &registry)
            .iter()
            .map(|c| (c.scene.raw(), c.element.raw()))
            .collect();
        assert_eq!(order, vec![(2, 2), (1, 9), (2, 1)]);
    }

    #[test]
    fn test_forget_scene_drops_timers() {
        let scene = SceneDescriptor::new(SceneId::new(1), 4)
            .with_element(SoundElement::one_shot(1, IntervalRange::fixed(3.0), "oneshot"));
        let mut scheduler = TriggerScheduler::new(1, 0, 1.0);
        scheduler.prime_scene(&scene);
        assert!(scheduler.remaining(SceneId::new(1), ElementId::new(1)).is_some());

        scheduler.forget_scene(SceneId::new(1));
        assert!(scheduler.remaining(SceneId::new(1), ElementId::new(1)).is_none());
    }
}
