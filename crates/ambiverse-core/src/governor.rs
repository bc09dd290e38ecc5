//! Density governor.
//!
//! Walks the scheduler's candidates in admission order and reserves a
//! registry slot for each one that fits under every cap. Reservation happens
//! here, synchronously, so a slot is accounted for before the engine is ever
//! asked to play anything.

use std::collections::BTreeMap;

use ambiverse_assets::PlaybackMode;
use ambiverse_common::{SceneId, VoiceId};
use tracing::{debug, trace};

use crate::error::AdmissionRejected;
use crate::registry::{ActiveVoice, SlotLimits, SlotRequest, VoiceRegistry, VoiceState};
use crate::scene::{ActiveScene, SceneGate};
use crate::scheduler::{sort_candidates, TriggerCandidate, TriggerKind};

/// A candidate that got a slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Admission {
    /// The admitted candidate.
    pub candidate: TriggerCandidate,
    /// Reserved voice.
    pub voice: VoiceId,
    /// Voice released to make room, for restarts.
    pub replaced: Option<ActiveVoice>,
}

/// Result of one admission pass.
#[derive(Debug, Clone, Default)]
pub struct AdmissionReport {
    /// Admitted candidates, in admission order.
    pub admitted: Vec<Admission>,
    /// Dropped candidates and why.
    pub rejected: Vec<(TriggerCandidate, AdmissionRejected)>,
}

/// Applies the system, scene, category and polyphony caps.
#[derive(Debug, Clone, Copy)]
pub struct DensityGovernor {
    max_voices: usize,
}

impl DensityGovernor {
    /// Create a governor with a system-wide voice budget.
    #[must_use]
    pub fn new(max_voices: usize) -> Self {
        Self { max_voices }
    }

    /// System-wide voice budget.
    #[must_use]
    pub fn max_voices(&self) -> usize {
        self.max_voices
    }

    /// Admit as many candidates as the caps allow.
    pub fn admit(
        &self,
        mut candidates: Vec<TriggerCandidate>,
        scenes: &BTreeMap<SceneId, ActiveScene>,
        registry: &VoiceRegistry,
        now: f64,
    ) -> AdmissionReport {
        sort_candidates(&mut candidates);
        let mut report = AdmissionReport::default();

        for candidate in candidates {
            match self.admit_one(&candidate, scenes, registry, now) {
                Ok((voice, replaced)) => {
                    trace!(%voice, scene = %candidate.scene, element = %candidate.element, "Admitted");
                    report.admitted.push(Admission {
                        candidate,
                        voice,
                        replaced,
                    });
                },
                Err(reason) => {
                    debug!(scene = %candidate.scene, element = %candidate.element, %reason, "Candidate rejected");
                    report.rejected.push((candidate, reason));
                },
            }
        }

        report
    }

    fn admit_one(
        &self,
        candidate: &TriggerCandidate,
        scenes: &BTreeMap<SceneId, ActiveScene>,
        registry: &VoiceRegistry,
        now: f64,
    ) -> Result<(VoiceId, Option<ActiveVoice>), AdmissionRejected> {
        let scene = scenes
            .get(&candidate.scene)
            .ok_or(AdmissionRejected::UnknownScene { scene: candidate.scene })?;

        if !scene.gate().is_open() {
            return Err(AdmissionRejected::SceneNotAccepting { scene: candidate.scene });
        }

        let descriptor = scene.descriptor();
        let element = descriptor
            .element(candidate.element)
            .ok_or(AdmissionRejected::UnknownElement {
                scene: candidate.scene,
                element: candidate.element,
            })?;

        let slot = SlotRequest {
            scene: candidate.scene,
            element: candidate.element,
            category: element.category.clone(),
            polyphonic: element.polyphonic,
            // Only one-shots end on their own; held voices end on a stop or cutoff
            expected_duration: element
                .expected_duration
                .filter(|_| element.mode == PlaybackMode::OneShot),
        };
        let limits = SlotLimits {
            system: self.max_voices,
            scene: descriptor.global_cap,
            category: descriptor.category_cap(&element.category),
        };

        let reserved = match candidate.kind {
            TriggerKind::Restart { replaces } => registry.reserve_replacing(replaces, &slot, limits, now)?,
            TriggerKind::Start | TriggerKind::EnsureActive => (registry.reserve(&slot, limits, now)?, None),
        };
        confirm_open(scene.gate(), candidate.scene, registry, reserved)
    }
}

/// Keep a reservation only if the gate is still open.
///
/// A gate closed between the first check and the reservation rolls the slot
/// back, putting any replaced voice back in place for teardown to stop.
fn confirm_open(
    gate: &SceneGate,
    scene: SceneId,
    registry: &VoiceRegistry,
    reserved: (VoiceId, Option<ActiveVoice>),
) -> Result<(VoiceId, Option<ActiveVoice>), AdmissionRejected> {
    if gate.is_open() {
        return Ok(reserved);
    }

    let (voice, replaced) = reserved;
    registry.release(voice, VoiceState::Cutoff);
    if let Some(old) = replaced {
        registry.reinstate(old);
    }
    debug!(%scene, %voice, "Gate closed during admission, reservation rolled back");
    Err(AdmissionRejected::SceneNotAccepting { scene })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ambiverse_assets::{IntervalRange, SceneDescriptor, SoundElement};
    use ambiverse_common::{Category, ElementId};
    use proptest::prelude::*;

    use super::*;
    use crate::scene::SceneState;

    fn candidate(scene: u32, element: u32, priority: i32) -> TriggerCandidate {
        TriggerCandidate {
            scene: SceneId::new(scene),
            element: ElementId::new(element),
            priority,
            kind: TriggerKind::Start,
            at: 0.0,
        }
    }

    fn table(descriptors: Vec<SceneDescriptor>) -> BTreeMap<SceneId, ActiveScene> {
        descriptors
            .into_iter()
            .map(|d| {
                let mut scene = ActiveScene::new(Arc::new(d), 0.0);
                scene.set_state(SceneState::Active);
                (scene.id(), scene)
            })
            .collect()
    }

    #[test]
    fn test_priority_admission_under_caps() {
        let scene = SceneDescriptor::new(SceneId::new(1), 2)
            .with_category_cap("ambience", 1)
            .with_category_cap("oneshot", 2)
            .with_element(SoundElement::one_shot(1, IntervalRange::fixed(1.0), "oneshot").with_priority(3))
            .with_element(SoundElement::one_shot(2, IntervalRange::fixed(1.0), "oneshot").with_priority(2))
            .with_element(SoundElement::one_shot(3, IntervalRange::fixed(1.0), "oneshot").with_priority(1));
        let scenes = table(vec![scene]);
        let registry = VoiceRegistry::new();
        let governor = DensityGovernor::new(32);

        // Deliberately out of order.
        let report = governor.admit(
            vec![candidate(1, 3, 1), candidate(1, 1, 3), candidate(1, 2, 2)],
            &scenes,
            &registry,
            0.0,
        );

        let admitted: Vec<_> = report.admitted.iter().map(|a| a.candidate.priority).collect();
        assert_eq!(admitted, vec![3, 2]);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].0.priority, 1);
        assert!(matches!(report.rejected[0].1, AdmissionRejected::SceneCapReached { .. }));
        assert_eq!(registry.occupied(), 2);
    }

    #[test]
    fn test_closed_gate_rejects() {
        let scenes = table(vec![SceneDescriptor::new(SceneId::new(1), 4)
            .with_element(SoundElement::continuous(1, "ambience"))]);
        scenes[&SceneId::new(1)].gate().close();

        let registry = VoiceRegistry::new();
        let report = DensityGovernor::new(8).admit(vec![candidate(1, 1, 0)], &scenes, &registry, 0.0);
        assert!(report.admitted.is_empty());
        assert_eq!(
            report.rejected[0].1,
            AdmissionRejected::SceneNotAccepting { scene: SceneId::new(1) }
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unknown_scene_and_element() {
        let scenes = table(vec![SceneDescriptor::new(SceneId::new(1), 4)]);
        let registry = VoiceRegistry::new();
        let report = DensityGovernor::new(8).admit(
            vec![candidate(1, 5, 0), candidate(9, 1, 0)],
            &scenes,
            &registry,
            0.0,
        );
        let reasons: Vec<_> = report.rejected.into_iter().map(|(_, r)| r).collect();
        assert!(reasons.contains(&AdmissionRejected::UnknownScene { scene: SceneId::new(9) }));
        assert!(reasons.contains(&AdmissionRejected::UnknownElement {
            scene: SceneId::new(1),
            element: ElementId::new(5),
        }));
    }

    #[test]
    fn test_system_cap_spans_scenes() {
        let scenes = table(vec![
            SceneDescriptor::new(SceneId::new(1), 4).with_element(SoundElement::continuous(1, "a")),
            SceneDescriptor::new(SceneId::new(2), 4).with_element(SoundElement::continuous(1, "a")),
        ]);
        let registry = VoiceRegistry::new();
        let report = DensityGovernor::new(1).admit(vec![candidate(1, 1, 0), candidate(2, 1, 0)], &scenes, &registry, 0.0);
        assert_eq!(report.admitted.len(), 1);
        assert_eq!(report.rejected[0].1, AdmissionRejected::SystemCapReached { cap: 1 });
    }

    #[test]
    fn test_restart_replaces_held_voice() {
        let scenes = table(vec![SceneDescriptor::new(SceneId::new(1), 1)
            .with_element(SoundElement::looping(1, IntervalRange::fixed(5.0), "loop"))]);
        let registry = VoiceRegistry::new();
        let governor = DensityGovernor::new(8);

        let first = governor.admit(vec![candidate(1, 1, 0)], &scenes, &registry, 0.0);
        let held = first.admitted[0].voice;

        let mut restart = candidate(1, 1, 0);
        restart.kind = TriggerKind::Restart { replaces: held };
        let second = governor.admit(vec![restart], &scenes, &registry, 5.0);

        assert_eq!(second.admitted.len(), 1);
        assert_eq!(second.admitted[0].replaced.as_ref().map(|v| v.id), Some(held));
        assert_eq!(registry.occupied(), 1);
    }

    #[test]
    fn test_gate_closed_during_reserve_rolls_back() {
        let scenes = table(vec![SceneDescriptor::new(SceneId::new(1), 4)
            .with_element(SoundElement::continuous(1, "ambience"))]);
        let scene = &scenes[&SceneId::new(1)];
        let registry = VoiceRegistry::new();
        let slot = SlotRequest {
            scene: SceneId::new(1),
            element: ElementId::new(1),
            category: Category::new("ambience"),
            polyphonic: false,
            expected_duration: None,
        };
        let limits = SlotLimits {
            system: 8,
            scene: 4,
            category: None,
        };

        let voice = registry.reserve(&slot, limits, 0.0).expect("slot");
        scene.gate().close();

        let result = confirm_open(scene.gate(), SceneId::new(1), &registry, (voice, None));
        assert_eq!(result, Err(AdmissionRejected::SceneNotAccepting { scene: SceneId::new(1) }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_gate_closed_during_restart_reinstates_old_voice() {
        let scenes = table(vec![SceneDescriptor::new(SceneId::new(1), 1)
            .with_element(SoundElement::looping(1, IntervalRange::fixed(5.0), "loop"))]);
        let scene = &scenes[&SceneId::new(1)];
        let registry = VoiceRegistry::new();
        let governor = DensityGovernor::new(8);

        let held = governor.admit(vec![candidate(1, 1, 0)], &scenes, &registry, 0.0).admitted[0].voice;
        let slot = SlotRequest {
            scene: SceneId::new(1),
            element: ElementId::new(1),
            category: Category::new("loop"),
            polyphonic: false,
            expected_duration: None,
        };
        let limits = SlotLimits {
            system: 8,
            scene: 1,
            category: None,
        };
        let reserved = registry.reserve_replacing(held, &slot, limits, 5.0).expect("restart");
        scene.gate().close();

        let result = confirm_open(scene.gate(), SceneId::new(1), &registry, reserved);
        assert!(result.is_err());
        assert_eq!(registry.occupied(), 1);
        let old = registry.voice(held).expect("old voice back in place");
        assert_eq!(old.state, VoiceState::Requested);
    }

    #[test]
    fn test_held_voices_carry_no_expected_duration() {
        let scenes = table(vec![SceneDescriptor::new(SceneId::new(1), 4)
            .with_element(SoundElement::continuous(1, "ambience").with_expected_duration(1.0))
            .with_element(SoundElement::looping(2, IntervalRange::fixed(5.0), "loop").with_expected_duration(1.0))
            .with_element(SoundElement::one_shot(3, IntervalRange::fixed(5.0), "oneshot").with_expected_duration(1.0))]);
        let registry = VoiceRegistry::new();
        let report = DensityGovernor::new(8).admit(
            vec![candidate(1, 1, 0), candidate(1, 2, 0), candidate(1, 3, 0)],
            &scenes,
            &registry,
            0.0,
        );

        let durations: Vec<_> = report
            .admitted
            .iter()
            .map(|a| registry.voice(a.voice).and_then(|v| v.expected_duration))
            .collect();
        assert_eq!(durations, vec![None, None, Some(1.0)]);
    }

    proptest! {
        #[test]
        fn prop_caps_never_exceeded(
            system in 1usize..12,
            scene_caps in prop::collection::vec(1usize..6, 1..4),
            category_cap in prop::option::of(0usize..4),
            picks in prop::collection::vec((0usize..4, 0u32..6, -5i32..5, any::<bool>()), 0..60),
        ) {
            let categories = ["a", "b", "c"];
            let descriptors: Vec<_> = scene_caps
                .iter()
                .enumerate()
                .map(|(i, &cap)| {
                    let mut scene = SceneDescriptor::new(SceneId::new(i as u32), cap);
                    if let Some(c) = category_cap {
                        scene = scene.with_category_cap("a", c);
                    }
                    for e in 0..6u32 {
                        scene = scene.with_element(
                            SoundElement::one_shot(e, IntervalRange::fixed(1.0), categories[(e % 3) as usize])
                                .with_polyphonic(e % 2 == 0),
                        );
                    }
                    scene
                })
                .collect();
            let scenes = table(descriptors);
            let registry = VoiceRegistry::new();
            let governor = DensityGovernor::new(system);

            for chunk in picks.chunks(7) {
                let candidates = chunk
                    .iter()
                    .map(|&(s, e, p, _)| candidate((s % scene_caps.len()) as u32, e, p))
                    .collect();
                let report = governor.admit(candidates, &scenes, &registry, 0.0);

                // Release a few voices between passes to exercise reuse.
                for (admission, &(_, _, _, release)) in report.admitted.iter().zip(chunk) {
                    if release {
                        registry.release(admission.voice, crate::registry::VoiceState::Completed);
                    }
                }

                prop_assert!(registry.occupied() <= system);
                for (id, scene) in &scenes {
                    let descriptor = scene.descriptor();
                    prop_assert!(registry.occupied_in_scene(*id) <= descriptor.global_cap);
                    if let Some(c) = category_cap {
                        prop_assert!(registry.occupied_in_category(*id, &Category::new("a")) <= c);
                    }
                    for element in &descriptor.elements {
                        if !element.polyphonic {
                            let held = registry
                                .voices_for_scene(*id)
                                .iter()
                                .filter(|v| v.element == element.id)
                                .count();
                            prop_assert!(held <= 1);
                        }
                    }
                }
            }
        }
    }
}
